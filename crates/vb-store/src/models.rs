use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{Document, DocumentStore, Fields, Result};

pub const USERS: &str = "users";
pub const VPS: &str = "vps";

fn fields(value: serde_json::Value) -> Fields {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Fields::new(),
    }
}

// ── UserEntitlement ─────────────────────────────────────────────────

/// Slot entitlement for one user, stored at `users/{user_id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntitlement {
    pub user_id: String,
    pub slots: u32,
}

/// Older documents carry `vps_slots` instead of `slots`.
#[derive(Deserialize)]
struct UserRecord {
    #[serde(default)]
    slots: Option<i64>,
    #[serde(default)]
    vps_slots: Option<i64>,
}

impl UserEntitlement {
    fn from_document(doc: Document) -> Result<Self> {
        let record: UserRecord = serde_json::from_value(serde_json::Value::Object(doc.fields))?;
        Ok(Self {
            user_id: doc.id,
            // Negative counts from hand-edited documents read as no slots.
            slots: record
                .slots
                .or(record.vps_slots)
                .map_or(0, |n| u32::try_from(n.max(0)).unwrap_or(u32::MAX)),
        })
    }

    pub async fn get(store: &dyn DocumentStore, user_id: &str) -> Result<Option<Self>> {
        store
            .get(USERS, user_id)
            .await?
            .map(Self::from_document)
            .transpose()
    }

    /// Slot count for a user; 0 when no entitlement record exists.
    pub async fn slots_for(store: &dyn DocumentStore, user_id: &str) -> Result<u32> {
        Ok(Self::get(store, user_id).await?.map_or(0, |e| e.slots))
    }

    /// Overwrite the slot count (never additive). Drops the legacy field.
    pub async fn set_slots(store: &dyn DocumentStore, user_id: &str, slots: u32) -> Result<()> {
        store
            .set_merge(
                USERS,
                user_id,
                fields(json!({ "slots": slots, "vps_slots": null })),
            )
            .await
    }
}

// ── VpsInstance ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VpsStatus {
    Available,
    Running,
    Stopped,
}

impl VpsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for VpsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One container-backed VPS, stored at `vps/{id}`.
///
/// `container_id` and `connection_string` are set only while `Running`.
#[derive(Debug, Clone, PartialEq)]
pub struct VpsInstance {
    pub id: String,
    pub owner_id: Option<String>,
    pub status: VpsStatus,
    pub image: Option<String>,
    pub container_id: Option<String>,
    pub connection_string: Option<String>,
    pub deployed_at: Option<DateTime<Utc>>,
}

/// Older documents carry `user_id` instead of `owner_id`.
#[derive(Deserialize)]
struct VpsRecord {
    #[serde(default)]
    owner_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    status: VpsStatus,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    container_id: Option<String>,
    #[serde(default)]
    connection_string: Option<String>,
    #[serde(default)]
    deployed_at: Option<DateTime<Utc>>,
}

/// Fields written when a container comes up.
pub struct Deployment<'a> {
    pub container_id: &'a str,
    pub image: &'a str,
    pub connection_string: &'a str,
    pub deployed_at: DateTime<Utc>,
}

impl VpsInstance {
    fn from_document(doc: Document) -> Result<Self> {
        let record: VpsRecord = serde_json::from_value(serde_json::Value::Object(doc.fields))?;
        Ok(Self {
            id: doc.id,
            owner_id: record.owner_id.or(record.user_id),
            status: record.status,
            image: record.image,
            container_id: record.container_id,
            connection_string: record.connection_string,
            deployed_at: record.deployed_at,
        })
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id.as_deref() == Some(user_id)
    }

    /// Provision an `available` instance. No command does this; instances
    /// are created out-of-band.
    pub async fn insert_available(
        store: &dyn DocumentStore,
        owner_id: Option<&str>,
        image: Option<&str>,
    ) -> Result<Self> {
        let id = store
            .create(
                VPS,
                fields(json!({
                    "owner_id": owner_id,
                    "status": VpsStatus::Available,
                    "image": image,
                })),
            )
            .await?;

        Ok(Self {
            id,
            owner_id: owner_id.map(str::to_string),
            status: VpsStatus::Available,
            image: image.map(str::to_string),
            container_id: None,
            connection_string: None,
            deployed_at: None,
        })
    }

    pub async fn get(store: &dyn DocumentStore, id: &str) -> Result<Option<Self>> {
        store.get(VPS, id).await?.map(Self::from_document).transpose()
    }

    /// First `available` instance owned by `owner_id`, in store order.
    pub async fn find_available_for_owner(
        store: &dyn DocumentStore,
        owner_id: &str,
    ) -> Result<Option<Self>> {
        for owner_field in ["owner_id", "user_id"] {
            let doc = store
                .find_first(
                    VPS,
                    &[
                        (owner_field, json!(owner_id)),
                        ("status", json!(VpsStatus::Available)),
                    ],
                )
                .await?;

            if let Some(doc) = doc {
                let vps = Self::from_document(doc)?;
                if vps.status == VpsStatus::Available && vps.is_owned_by(owner_id) {
                    return Ok(Some(vps));
                }
            }
        }
        Ok(None)
    }

    /// Record a successful deploy. Merges, so unrelated fields survive.
    pub async fn mark_running(
        store: &dyn DocumentStore,
        id: &str,
        deployment: &Deployment<'_>,
    ) -> Result<()> {
        store
            .set_merge(
                VPS,
                id,
                fields(json!({
                    "container_id": deployment.container_id,
                    "image": deployment.image,
                    "status": VpsStatus::Running,
                    "connection_string": deployment.connection_string,
                    "deployed_at": deployment.deployed_at,
                })),
            )
            .await
    }

    /// Record a stop and drop the running-only fields.
    pub async fn mark_stopped(store: &dyn DocumentStore, id: &str) -> Result<()> {
        store
            .update(
                VPS,
                id,
                fields(json!({
                    "status": VpsStatus::Stopped,
                    "container_id": null,
                    "connection_string": null,
                })),
            )
            .await
    }

    pub async fn set_owner(store: &dyn DocumentStore, id: &str, owner_id: &str) -> Result<()> {
        store
            .update(
                VPS,
                id,
                fields(json!({ "owner_id": owner_id, "user_id": null })),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    #[tokio::test]
    async fn missing_entitlement_means_zero_slots() {
        let store = MemoryStore::new();
        assert_eq!(UserEntitlement::slots_for(&store, "nobody").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn set_slots_overwrites() {
        let store = MemoryStore::new();
        UserEntitlement::set_slots(&store, "u1", 3).await.unwrap();
        UserEntitlement::set_slots(&store, "u1", 3).await.unwrap();
        assert_eq!(UserEntitlement::slots_for(&store, "u1").await.unwrap(), 3);

        UserEntitlement::set_slots(&store, "u1", 1).await.unwrap();
        assert_eq!(UserEntitlement::slots_for(&store, "u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn legacy_vps_slots_field_is_read_and_replaced() {
        let store = MemoryStore::new();
        store
            .set_merge(USERS, "u1", fields(json!({ "vps_slots": 4 })))
            .await
            .unwrap();
        assert_eq!(UserEntitlement::slots_for(&store, "u1").await.unwrap(), 4);

        UserEntitlement::set_slots(&store, "u1", 2).await.unwrap();
        let doc = store.get(USERS, "u1").await.unwrap().unwrap();
        assert_eq!(doc.fields, fields(json!({ "slots": 2 })));
    }

    #[tokio::test]
    async fn negative_slot_counts_read_as_zero() {
        let store = MemoryStore::new();
        store
            .set_merge(USERS, "u1", fields(json!({ "vps_slots": -1 })))
            .await
            .unwrap();
        store
            .set_merge(USERS, "u2", fields(json!({ "slots": -5 })))
            .await
            .unwrap();
        assert_eq!(UserEntitlement::slots_for(&store, "u1").await.unwrap(), 0);
        assert_eq!(UserEntitlement::slots_for(&store, "u2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn find_available_skips_other_owners_and_states() {
        let store = MemoryStore::new();
        let running = VpsInstance::insert_available(&store, Some("a"), None)
            .await
            .unwrap();
        VpsInstance::mark_running(
            &store,
            &running.id,
            &Deployment {
                container_id: "c0",
                image: "ubuntu-tmate",
                connection_string: "ssh x@host",
                deployed_at: Utc::now(),
            },
        )
        .await
        .unwrap();
        VpsInstance::insert_available(&store, Some("b"), None)
            .await
            .unwrap();

        assert!(
            VpsInstance::find_available_for_owner(&store, "a")
                .await
                .unwrap()
                .is_none()
        );

        let mine = VpsInstance::insert_available(&store, Some("a"), None)
            .await
            .unwrap();
        let found = VpsInstance::find_available_for_owner(&store, "a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, mine.id);
        assert_eq!(found.status, VpsStatus::Available);
        assert!(found.is_owned_by("a"));
    }

    #[tokio::test]
    async fn legacy_user_id_owner_is_found() {
        let store = MemoryStore::new();
        let id = store
            .create(VPS, fields(json!({ "user_id": "a", "status": "available" })))
            .await
            .unwrap();

        let found = VpsInstance::find_available_for_owner(&store, "a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.owner_id.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn stop_clears_running_fields() {
        let store = MemoryStore::new();
        let vps = VpsInstance::insert_available(&store, Some("a"), Some("debian-tmate"))
            .await
            .unwrap();
        let deployed_at = Utc::now();
        VpsInstance::mark_running(
            &store,
            &vps.id,
            &Deployment {
                container_id: "c1",
                image: "debian-tmate",
                connection_string: "ssh c1@host",
                deployed_at,
            },
        )
        .await
        .unwrap();

        let running = VpsInstance::get(&store, &vps.id).await.unwrap().unwrap();
        assert_eq!(running.status, VpsStatus::Running);
        assert_eq!(running.container_id.as_deref(), Some("c1"));
        assert_eq!(running.deployed_at, Some(deployed_at));

        VpsInstance::mark_stopped(&store, &vps.id).await.unwrap();
        let stopped = VpsInstance::get(&store, &vps.id).await.unwrap().unwrap();
        assert_eq!(stopped.status, VpsStatus::Stopped);
        assert!(stopped.container_id.is_none());
        assert!(stopped.connection_string.is_none());
        assert_eq!(stopped.owner_id.as_deref(), Some("a"));
    }
}
