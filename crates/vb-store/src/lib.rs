pub mod firestore;
pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("firestore error: {0}")]
    Firestore(#[from] firestore_api::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("malformed document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("missing env var: {0}")]
    MissingEnv(String),

    #[error("unknown store backend: {0}")]
    UnknownBackend(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level fields of a document, as plain JSON.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// A stored document: store-assigned id plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

/// Minimal document-store interface over named collections.
///
/// Writes are last-write-wins; there are no transactions. In `set_merge` and
/// `update`, a `null` field value removes that field from the document.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Fetch one document by id.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Merge `fields` into the document, creating it if absent.
    async fn set_merge(&self, collection: &str, id: &str, fields: Fields) -> Result<()>;

    /// Merge `fields` into an existing document. Fails with `NotFound` if absent.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()>;

    /// Create a document with a store-assigned id and return that id.
    async fn create(&self, collection: &str, fields: Fields) -> Result<String>;

    /// First document whose fields equal every `(field, value)` pair, in
    /// store order.
    async fn find_first(
        &self,
        collection: &str,
        filters: &[(&str, serde_json::Value)],
    ) -> Result<Option<Document>>;

    fn backend(&self) -> StoreBackend;
}

/// Known document-store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Firestore,
    Postgres,
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Firestore => "firestore",
            Self::Postgres => "postgres",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "firestore" => Ok(Self::Firestore),
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(Error::UnknownBackend(other.to_string())),
        }
    }
}

/// Build the store selected by `STORE_BACKEND` (default: `firestore`).
///
/// Each backend loads its own settings from the environment.
pub async fn build_store() -> Result<Arc<dyn DocumentStore>> {
    dotenvy::dotenv().ok();

    let backend: StoreBackend = std::env::var("STORE_BACKEND")
        .unwrap_or_else(|_| "firestore".into())
        .parse()?;

    let store: Arc<dyn DocumentStore> = match backend {
        StoreBackend::Firestore => Arc::new(firestore::FirestoreStore::from_env()?),
        StoreBackend::Postgres => Arc::new(postgres::PgDocumentStore::from_env().await?),
        StoreBackend::Memory => {
            tracing::warn!("using in-memory document store; all state is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    tracing::info!(backend = %backend, "document store ready");
    Ok(store)
}
