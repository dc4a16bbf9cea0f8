//! Resolve the caller's locale: `lang` query parameter, else the first `Accept-Language`
//! tag, else the default.

use crate::validation::Locale;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query},
    http::{header::ACCEPT_LANGUAGE, request::Parts, Uri},
};
use serde::Deserialize;

/// `?lang=` overrides `Accept-Language`.
#[derive(Deserialize)]
struct LangQuery {
    lang: Option<String>,
}

fn lang_param(uri: &Uri) -> Option<String> {
    let Query(query) = Query::<LangQuery>::try_from_uri(uri).ok()?;
    query
        .lang
        .map(|lang| lang.trim().to_string())
        .filter(|lang| !lang.is_empty())
}

fn preferred_language(header: &str) -> Option<String> {
    header
        .split(',')
        .map(|tag| tag.split(';').next().unwrap_or("").trim())
        .find(|tag| !tag.is_empty() && *tag != "*")
        .map(str::to_string)
}

#[async_trait]
impl<S> FromRequestParts<S> for Locale
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(lang) = lang_param(&parts.uri) {
            return Ok(Locale::new(lang));
        }
        let header = parts
            .headers
            .get(ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok())
            .and_then(preferred_language);
        Ok(header.map(Locale::new).unwrap_or_default())
    }
}
