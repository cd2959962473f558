use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Document, DocumentStore, Error, Fields, Result, StoreBackend};

/// Process-local store. Documents keep insertion order within a collection.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_patch(target: &mut Fields, patch: Fields) {
    for (key, value) in patch {
        if value.is_null() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }
}

fn without_nulls(fields: Fields) -> Fields {
    fields.into_iter().filter(|(_, v)| !v.is_null()).collect()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .cloned())
    }

    async fn set_merge(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|d| d.id == id) {
            Some(doc) => apply_patch(&mut doc.fields, fields),
            None => docs.push(Document {
                id: id.to_string(),
                fields: without_nulls(fields),
            }),
        }
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let mut collections = self.collections.write().await;
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| Error::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        apply_patch(&mut doc.fields, fields);
        Ok(())
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .push(Document {
                id: id.clone(),
                fields: without_nulls(fields),
            });
        Ok(id)
    }

    async fn find_first(
        &self,
        collection: &str,
        filters: &[(&str, serde_json::Value)],
    ) -> Result<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|d| filters.iter().all(|(k, v)| d.fields.get(*k) == Some(v)))
                .cloned()
        }))
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Memory
    }
}
