//! Resource CRUD handlers: list, read, create, replace, merge-update, delete.
//!
//! Mutations validate a typed view of the document; what gets persisted is the raw JSON
//! object, so fields the typed view does not know about are kept.

use crate::error::AppError;
use crate::merge::merge_maps;
use crate::repository::{id_of, Document, Update, ID_FIELD};
use crate::state::ResourceState;
use crate::validation::Locale;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

fn body_to_document(body: &Bytes) -> Result<Document, AppError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("malformed JSON body: {}", e)))?;
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

fn typed<T: DeserializeOwned>(name: &str, doc: &Document) -> Result<T, AppError> {
    serde_json::from_value(Value::Object(doc.clone()))
        .map_err(|e| AppError::BadRequest(format!("body does not fit {}: {}", name, e)))
}

fn not_found<T>(state: &ResourceState<T>, id: &str) -> AppError {
    AppError::NotFound(format!("{}/{}", state.name, id))
}

pub async fn list<T>(State(state): State<Arc<ResourceState<T>>>) -> Result<impl IntoResponse, AppError>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    let docs = state.repo.list().await?;
    Ok(Json(docs))
}

pub async fn read<T>(
    State(state): State<Arc<ResourceState<T>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    let doc = state.repo.get(&id).await?.ok_or_else(|| not_found(&state, &id))?;
    Ok(Json(doc))
}

pub async fn create<T>(
    State(state): State<Arc<ResourceState<T>>>,
    locale: Locale,
    body: Bytes,
) -> Result<impl IntoResponse, AppError>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    let doc = body_to_document(&body)?;
    let candidate: T = typed(&state.name, &doc)?;
    state.validators.save.validate(&candidate, &locale)?;
    let saved = state.repo.save(doc).await?;
    tracing::debug!(collection = %state.name, id = ?id_of(&saved), "document created");
    Ok((StatusCode::CREATED, Json(saved)))
}

/// An unknown id is 404 whatever the body; the body is validated only for a stored document.
pub async fn replace<T>(
    State(state): State<Arc<ResourceState<T>>>,
    Path(id): Path<String>,
    locale: Locale,
    body: Bytes,
) -> Result<impl IntoResponse, AppError>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    if state.repo.get(&id).await?.is_none() {
        return Err(not_found(&state, &id));
    }
    let mut doc = body_to_document(&body)?;
    doc.remove(ID_FIELD);
    let candidate: T = typed(&state.name, &doc)?;
    state.validators.replace.validate(&candidate, &locale)?;
    let replaced = state
        .repo
        .replace_by_id(&id, doc)
        .await?
        .ok_or_else(|| not_found(&state, &id))?;
    Ok(Json(replaced))
}

/// Fetch, merge the body over the stored document, validate the merged result, persist.
/// Fetch and persist are separate store calls: concurrent merges on one id are last writer wins.
pub async fn merge_update<T>(
    State(state): State<Arc<ResourceState<T>>>,
    Path(id): Path<String>,
    locale: Locale,
    body: Bytes,
) -> Result<impl IntoResponse, AppError>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    let mut merged = state.repo.get(&id).await?.ok_or_else(|| not_found(&state, &id))?;
    let mut patch = body_to_document(&body)?;
    patch.remove(ID_FIELD);
    merge_maps(&mut merged, patch);
    let candidate: T = typed(&state.name, &merged)?;
    state.validators.update.validate(&candidate, &locale)?;
    merged.remove(ID_FIELD);
    let updated = state
        .repo
        .update_by_id(&id, &Update::set(merged))
        .await?
        .ok_or_else(|| not_found(&state, &id))?;
    Ok(Json(updated))
}

/// The body is only read when the module has delete rules and the document exists; an
/// empty body then counts as `{}`.
pub async fn delete<T>(
    State(state): State<Arc<ResourceState<T>>>,
    Path(id): Path<String>,
    locale: Locale,
    body: Bytes,
) -> Result<impl IntoResponse, AppError>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    if !state.validators.delete.is_empty() {
        if state.repo.get(&id).await?.is_none() {
            return Err(not_found(&state, &id));
        }
        let doc = if body.iter().all(u8::is_ascii_whitespace) {
            Document::new()
        } else {
            body_to_document(&body)?
        };
        let candidate: T = typed(&state.name, &doc)?;
        state.validators.delete.validate(&candidate, &locale)?;
    }
    let deleted = state
        .repo
        .delete_by_id(&id)
        .await?
        .ok_or_else(|| not_found(&state, &id))?;
    tracing::debug!(collection = %state.name, id = %id, "document deleted");
    Ok(Json(deleted))
}
