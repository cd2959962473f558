use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use crate::{Document, DocumentStore, Error, Fields, Result, StoreBackend};

/// Create a connection pool to PostgreSQL.
pub async fn create_pool(database_url: &str) -> std::result::Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: String,
    data: Json<Fields>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: row.id,
            fields: row.data.0,
        }
    }
}

/// Documents stored as JSONB rows in a single `documents` table keyed by
/// `(collection, id)`. Merges use `||`, and `jsonb_strip_nulls` turns null
/// values into field removals.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using `DATABASE_URL` and run migrations.
    pub async fn from_env() -> Result<Self> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| Error::MissingEnv("DATABASE_URL".into()))?;
        let pool = create_pool(&url).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let row: Option<DocumentRow> =
            sqlx::query_as("SELECT id, data FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Document::from))
    }

    async fn set_merge(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO documents (collection, id, data)
               VALUES ($1, $2, jsonb_strip_nulls($3))
               ON CONFLICT (collection, id)
               DO UPDATE SET data = jsonb_strip_nulls(documents.data || $3),
                             updated_at = now()"#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(&fields))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE documents
               SET data = jsonb_strip_nulls(data || $3),
                   updated_at = now()
               WHERE collection = $1 AND id = $2"#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(&fields))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        sqlx::query(
            "INSERT INTO documents (collection, id, data) VALUES ($1, $2, jsonb_strip_nulls($3))",
        )
        .bind(collection)
        .bind(&id)
        .bind(Json(&fields))
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn find_first(
        &self,
        collection: &str,
        filters: &[(&str, serde_json::Value)],
    ) -> Result<Option<Document>> {
        // Equality on every pair is JSONB containment of the filter object.
        let filter: Fields = filters
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();

        let row: Option<DocumentRow> = sqlx::query_as(
            r#"SELECT id, data FROM documents
               WHERE collection = $1 AND data @> $2
               ORDER BY created_at, id
               LIMIT 1"#,
        )
        .bind(collection)
        .bind(Json(&filter))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Document::from))
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Postgres
    }
}
