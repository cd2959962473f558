use std::collections::HashMap;

use async_trait::async_trait;
use firestore_api::{FirestoreClient, ServiceAccountKey, StructuredQuery, Value};
use tracing::info;

use crate::{Document, DocumentStore, Error, Fields, Result, StoreBackend};

/// Cloud Firestore backend.
///
/// Delegates to `firestore_api::FirestoreClient` for all HTTP calls.
pub struct FirestoreStore {
    client: FirestoreClient,
}

impl FirestoreStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Create from env vars:
    ///
    /// - `FIRESTORE_EMULATOR_HOST` (optional; talk to a local emulator)
    /// - `FIREBASE_CREDENTIALS` (default: `"firebase-credentials.json"`)
    /// - `FIREBASE_PROJECT_ID` (optional; defaults to the key's project)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let project_id = std::env::var("FIREBASE_PROJECT_ID").ok();

        if let Ok(host) = std::env::var("FIRESTORE_EMULATOR_HOST") {
            let project = project_id.unwrap_or_else(|| "demo-project".into());
            info!(%host, %project, "firestore: using emulator");
            return Ok(Self::new(FirestoreClient::emulator(&host, project)));
        }

        let path = std::env::var("FIREBASE_CREDENTIALS")
            .unwrap_or_else(|_| "firebase-credentials.json".into());
        let key = ServiceAccountKey::from_file(&path)?;
        info!(project = %key.project_id, "firestore: loaded service account");

        Ok(Self::new(FirestoreClient::with_service_account(key, project_id)))
    }
}

/// Split a patch into the update mask (every key) and the encoded body
/// (non-null keys only). Masked keys absent from the body are deleted.
fn encode_patch(fields: &Fields) -> (Vec<String>, HashMap<String, Value>) {
    let mask = fields.keys().cloned().collect();
    let body = encode_fields(fields);
    (mask, body)
}

fn encode_fields(fields: &Fields) -> HashMap<String, Value> {
    fields
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), Value::from_json(v)))
        .collect()
}

fn decode(doc: firestore_api::Document) -> Document {
    let id = doc.id().to_string();
    Document {
        id,
        fields: doc.into_json_fields(),
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let doc = self.client.get_document(collection, id).await?;
        Ok(doc.map(decode))
    }

    async fn set_merge(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let (mask, body) = encode_patch(&fields);
        self.client
            .patch_document(collection, id, body, &mask, false)
            .await?;
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let (mask, body) = encode_patch(&fields);
        match self
            .client
            .patch_document(collection, id, body, &mask, true)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Err(Error::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<String> {
        let doc = self
            .client
            .create_document(collection, encode_fields(&fields))
            .await?;
        Ok(doc.id().to_string())
    }

    async fn find_first(
        &self,
        collection: &str,
        filters: &[(&str, serde_json::Value)],
    ) -> Result<Option<Document>> {
        let filters: Vec<(String, Value)> = filters
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from_json(v)))
            .collect();
        let query = StructuredQuery::equality(collection, &filters, Some(1));

        let docs = self.client.run_query(query).await?;
        Ok(docs.into_iter().next().map(decode))
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Firestore
    }
}
