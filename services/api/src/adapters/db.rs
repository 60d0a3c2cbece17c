//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the PostgreSQL implementation of
//! the `DocumentStore` and `ObjectStore` ports from the `core` crate. Documents
//! live in a single JSONB table partitioned by collection name; source documents
//! live in a key/value text table.

use async_trait::async_trait;
use course_forge_core::ports::{DocumentStore, ObjectStore, PortError, PortResult, ID_FIELD};
use serde_json::Value;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the storage ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Re-attaches the row id to the stored body under [`ID_FIELD`].
fn with_id(id: Uuid, mut body: Value) -> Value {
    if let Value::Object(map) = &mut body {
        map.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    }
    body
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for DbAdapter {
    async fn insert(&self, collection: &str, mut doc: Value) -> PortResult<String> {
        if let Value::Object(map) = &mut doc {
            map.remove(ID_FIELD);
        }
        let id = Uuid::new_v4();

        sqlx::query("INSERT INTO documents (id, collection, body) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(collection)
            .bind(Json(&doc))
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        Ok(id.to_string())
    }

    async fn find_one(&self, collection: &str, mut filter: Value) -> PortResult<Option<Value>> {
        // `_id` is a column, not part of the JSON body.
        let id_filter = match &mut filter {
            Value::Object(map) => map.remove(ID_FIELD),
            _ => None,
        };

        let row: Option<(Uuid, Json<Value>)> = match id_filter {
            Some(raw_id) => {
                let Some(id) = raw_id.as_str().and_then(|s| Uuid::parse_str(s).ok()) else {
                    return Ok(None);
                };
                sqlx::query_as(
                    "SELECT id, body FROM documents \
                     WHERE collection = $1 AND id = $2 AND body @> $3 \
                     LIMIT 1",
                )
                .bind(collection)
                .bind(id)
                .bind(Json(&filter))
                .fetch_optional(&self.pool)
                .await
                .map_err(unexpected)?
            }
            None => sqlx::query_as(
                "SELECT id, body FROM documents \
                 WHERE collection = $1 AND body @> $2 \
                 ORDER BY created_at ASC LIMIT 1",
            )
            .bind(collection)
            .bind(Json(&filter))
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?,
        };

        Ok(row.map(|(id, Json(body))| with_id(id, body)))
    }

    async fn update(&self, collection: &str, id: &str, mut patch: Value) -> PortResult<bool> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(false);
        };
        if let Value::Object(map) = &mut patch {
            map.remove(ID_FIELD);
        }

        let result = sqlx::query(
            "UPDATE documents SET body = body || $3, updated_at = NOW() \
             WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .bind(Json(&patch))
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(result.rows_affected() > 0)
    }
}

//=========================================================================================
// `ObjectStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ObjectStore for DbAdapter {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT body FROM objects WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(row.map(|(body,)| body))
    }

    async fn put(&self, key: &str, text: &str) -> PortResult<String> {
        sqlx::query(
            "INSERT INTO objects (key, body) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET body = EXCLUDED.body, updated_at = NOW()",
        )
        .bind(key)
        .bind(text)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(key.to_string())
    }
}
