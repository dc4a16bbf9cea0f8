//! Postgres-backed collections: one JSONB payload table per collection.
//! Tables live in the schema given by `store.schema` (default `resource_server`).

use super::{generate_id, id_of, with_id, Document, Repository, StoreError, Update, ID_FIELD};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

pub struct PgRepository {
    pool: PgPool,
    name: String,
    table: String,
}

/// Collection and schema names become SQL identifiers; keep them to `[A-Za-z_][A-Za-z0-9_]*`.
pub(crate) fn valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Bind parameter: ids and key lists are SQL text, documents are JSONB.
enum Arg {
    Text(String),
    Json(Value),
    TextArray(Vec<String>),
}

fn into_document(collection: &str, payload: Value) -> Result<Document, StoreError> {
    match payload {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::Corrupt(collection.to_string())),
    }
}

impl PgRepository {
    /// Bind `collection` in `schema`, creating the table if needed.
    pub async fn open(pool: PgPool, schema: &str, collection: &str) -> Result<Self, StoreError> {
        for name in [schema, collection] {
            if !valid_identifier(name) {
                return Err(StoreError::InvalidCollection(name.to_string()));
            }
        }
        let table = format!("{}.{}", quote_ident(schema), quote_ident(collection));
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                payload JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            table
        );
        sqlx::query(&ddl).execute(&pool).await?;
        tracing::debug!(table = %table, "collection table ensured");
        Ok(Self {
            pool,
            name: collection.to_string(),
            table,
        })
    }

    /// Subquery selecting the id of the first document containing `$1`.
    fn first_match(&self) -> String {
        format!(
            "SELECT id FROM {} WHERE payload @> $1 ORDER BY created_at, id LIMIT 1",
            self.table
        )
    }

    async fn fetch_one(&self, sql: &str, args: Vec<Arg>) -> Result<Option<Document>, StoreError> {
        tracing::debug!(sql = %sql, collection = %self.name, "store query");
        let mut query = sqlx::query_scalar::<_, Value>(sql);
        for arg in args {
            query = match arg {
                Arg::Text(s) => query.bind(s),
                Arg::Json(v) => query.bind(v),
                Arg::TextArray(keys) => query.bind(keys),
            };
        }
        query
            .fetch_optional(&self.pool)
            .await?
            .map(|payload| into_document(&self.name, payload))
            .transpose()
    }
}

#[async_trait]
impl Repository for PgRepository {
    fn collection_name(&self) -> &str {
        &self.name
    }

    async fn save(&self, doc: Document) -> Result<Document, StoreError> {
        let id = id_of(&doc).map(str::to_string).unwrap_or_else(generate_id);
        let doc = with_id(doc, &id);
        let sql = format!(
            "INSERT INTO {} (id, payload) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET payload = EXCLUDED.payload, updated_at = NOW() \
             RETURNING payload",
            self.table
        );
        let payload: Value = sqlx::query_scalar(&sql)
            .bind(&id)
            .bind(Value::Object(doc))
            .fetch_one(&self.pool)
            .await?;
        into_document(&self.name, payload)
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let sql = format!("SELECT payload FROM {} WHERE id = $1", self.table);
        let payload: Option<Value> = sqlx::query_scalar(&sql).bind(id).fetch_optional(&self.pool).await?;
        payload.map(|p| into_document(&self.name, p)).transpose()
    }

    async fn list(&self) -> Result<Vec<Document>, StoreError> {
        let sql = format!("SELECT payload FROM {} ORDER BY created_at, id", self.table);
        let rows: Vec<Value> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(|p| into_document(&self.name, p)).collect()
    }

    async fn find(&self, query: &Document) -> Result<Vec<Document>, StoreError> {
        let sql = format!(
            "SELECT payload FROM {} WHERE payload @> $1 ORDER BY created_at, id",
            self.table
        );
        let rows: Vec<Value> = sqlx::query_scalar(&sql)
            .bind(Value::Object(query.clone()))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|p| into_document(&self.name, p)).collect()
    }

    async fn find_one(&self, query: &Document) -> Result<Option<Document>, StoreError> {
        let sql = format!(
            "SELECT payload FROM {} WHERE payload @> $1 ORDER BY created_at, id LIMIT 1",
            self.table
        );
        self.fetch_one(&sql, vec![Arg::Json(Value::Object(query.clone()))]).await
    }

    async fn update_by_id(&self, id: &str, update: &Update) -> Result<Option<Document>, StoreError> {
        let sql = format!(
            "UPDATE {} SET payload = (payload || $2) - $3::text[], updated_at = NOW() \
             WHERE id = $1 RETURNING payload",
            self.table
        );
        self.fetch_one(
            &sql,
            vec![
                Arg::Text(id.to_string()),
                Arg::Json(Value::Object(update.set_fields())),
                Arg::TextArray(update.unset_fields()),
            ],
        )
        .await
    }

    async fn update(&self, query: &Document, update: &Update) -> Result<Option<Document>, StoreError> {
        let sql = format!(
            "UPDATE {} SET payload = (payload || $2) - $3::text[], updated_at = NOW() \
             WHERE id = ({}) RETURNING payload",
            self.table,
            self.first_match()
        );
        self.fetch_one(
            &sql,
            vec![
                Arg::Json(Value::Object(query.clone())),
                Arg::Json(Value::Object(update.set_fields())),
                Arg::TextArray(update.unset_fields()),
            ],
        )
        .await
    }

    async fn replace_by_id(&self, id: &str, doc: Document) -> Result<Option<Document>, StoreError> {
        let sql = format!(
            "UPDATE {} SET payload = $2, updated_at = NOW() WHERE id = $1 RETURNING payload",
            self.table
        );
        self.fetch_one(
            &sql,
            vec![Arg::Text(id.to_string()), Arg::Json(Value::Object(with_id(doc, id)))],
        )
        .await
    }

    async fn replace(&self, query: &Document, mut doc: Document) -> Result<Option<Document>, StoreError> {
        doc.remove(ID_FIELD);
        let sql = format!(
            "UPDATE {} SET payload = $2 || jsonb_build_object('{}', id), updated_at = NOW() \
             WHERE id = ({}) RETURNING payload",
            self.table,
            ID_FIELD,
            self.first_match()
        );
        self.fetch_one(
            &sql,
            vec![Arg::Json(Value::Object(query.clone())), Arg::Json(Value::Object(doc))],
        )
        .await
    }

    async fn delete_by_id(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = $1 RETURNING payload", self.table);
        self.fetch_one(&sql, vec![Arg::Text(id.to_string())]).await
    }

    async fn delete(&self, query: &Document) -> Result<Option<Document>, StoreError> {
        let sql = format!(
            "DELETE FROM {} WHERE id = ({}) RETURNING payload",
            self.table,
            self.first_match()
        );
        self.fetch_one(&sql, vec![Arg::Json(Value::Object(query.clone()))]).await
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let sql = format!("DELETE FROM {}", self.table);
        let done = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(done.rows_affected())
    }

    async fn drop_collection(&self) -> Result<(), StoreError> {
        let sql = format!("DROP TABLE IF EXISTS {}", self.table);
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::debug!(collection = %self.name, "postgres binding closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_restricted() {
        assert!(valid_identifier("widgets"));
        assert!(valid_identifier("_private_2"));
        assert!(!valid_identifier("2widgets"));
        assert!(!valid_identifier("drop table"));
        assert!(!valid_identifier(""));
    }

    #[test]
    fn quote_ident_doubles_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
