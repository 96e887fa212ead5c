use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use super::events::KeyAuditEvent;
use super::ids::KeyIdScheme;
use super::models::{KeyDraft, KeyRecord, KeyStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key material already registered for owner")]
    Duplicate,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("stored row is invalid: {0}")]
    InvalidRow(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a revoke against a stored key.
#[derive(Clone, Debug)]
pub enum RevokeOutcome {
    /// This call moved the key from active to disabled.
    Revoked(KeyRecord),
    /// The key was already disabled; the stored record is unchanged.
    AlreadyDisabled(KeyRecord),
}

/// key: public-key-store
/// Persistence seam for key records and their audit trail.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Inserts a new active key, assigning the owner's next sequence and the derived id.
    /// Fails with [`StoreError::Duplicate`] when the owner already holds the same material.
    async fn insert(&self, draft: KeyDraft, ids: &KeyIdScheme) -> StoreResult<KeyRecord>;
    async fn get(&self, id: &str) -> StoreResult<Option<KeyRecord>>;
    /// Keys of `owner` in sequence order.
    async fn list_by_owner(&self, owner: &str) -> StoreResult<Vec<KeyRecord>>;
    async fn update_label(
        &self,
        id: &str,
        label: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<KeyRecord>>;
    /// Moves an active key to disabled. Only one caller observes [`RevokeOutcome::Revoked`].
    async fn revoke(&self, id: &str, at: DateTime<Utc>) -> StoreResult<Option<RevokeOutcome>>;
    async fn append_event(&self, event: &KeyAuditEvent) -> StoreResult<()>;
    async fn events_for(&self, key_id: &str) -> StoreResult<Vec<KeyAuditEvent>>;
}

#[derive(Default)]
struct OwnerIndex {
    next_sequence: i64,
    key_ids: Vec<String>,
}

/// In-process key store for local runs and tests.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: DashMap<String, KeyRecord>,
    owners: DashMap<String, OwnerIndex>,
    events: RwLock<Vec<KeyAuditEvent>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn insert(&self, draft: KeyDraft, ids: &KeyIdScheme) -> StoreResult<KeyRecord> {
        // The owner entry stays locked until the record is in place.
        let mut owner = self.owners.entry(draft.owner.clone()).or_default();
        let duplicate = owner.key_ids.iter().any(|id| {
            self.keys
                .get(id)
                .map(|existing| existing.public_key_pem == draft.public_key_pem)
                .unwrap_or(false)
        });
        if duplicate {
            return Err(StoreError::Duplicate);
        }

        owner.next_sequence += 1;
        let sequence = owner.next_sequence;
        let record = KeyRecord {
            id: ids.mint(&draft.owner, sequence),
            owner: draft.owner,
            sequence,
            label: draft.label,
            public_key_pem: draft.public_key_pem,
            private_key_pem: draft.private_key_pem,
            status: KeyStatus::Active,
            revoked: None,
            created_at: draft.created_at,
            updated_at: draft.created_at,
        };
        if self.keys.contains_key(&record.id) {
            owner.next_sequence -= 1;
            return Err(StoreError::Duplicate);
        }
        owner.key_ids.push(record.id.clone());
        self.keys.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, id: &str) -> StoreResult<Option<KeyRecord>> {
        Ok(self.keys.get(id).map(|entry| entry.value().clone()))
    }

    async fn list_by_owner(&self, owner: &str) -> StoreResult<Vec<KeyRecord>> {
        let Some(index) = self.owners.get(owner) else {
            return Ok(Vec::new());
        };
        Ok(index
            .key_ids
            .iter()
            .filter_map(|id| self.keys.get(id).map(|entry| entry.value().clone()))
            .collect())
    }

    async fn update_label(
        &self,
        id: &str,
        label: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<KeyRecord>> {
        Ok(self.keys.get_mut(id).map(|mut entry| {
            entry.label = label.to_string();
            entry.updated_at = at;
            entry.value().clone()
        }))
    }

    async fn revoke(&self, id: &str, at: DateTime<Utc>) -> StoreResult<Option<RevokeOutcome>> {
        Ok(self.keys.get_mut(id).map(|mut entry| {
            if entry.status == KeyStatus::Active {
                entry.status = KeyStatus::Disabled;
                entry.revoked = Some(at);
                entry.updated_at = at;
                RevokeOutcome::Revoked(entry.value().clone())
            } else {
                RevokeOutcome::AlreadyDisabled(entry.value().clone())
            }
        }))
    }

    async fn append_event(&self, event: &KeyAuditEvent) -> StoreResult<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn events_for(&self, key_id: &str) -> StoreResult<Vec<KeyAuditEvent>> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|event| event.key_id == key_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> KeyIdScheme {
        KeyIdScheme::new("https://keys.test", "/keys")
    }

    fn draft(owner: &str, pem: &str) -> KeyDraft {
        KeyDraft {
            owner: owner.to_string(),
            label: "Signing Key 1".to_string(),
            public_key_pem: pem.to_string(),
            private_key_pem: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_assigns_per_owner_sequences() {
        let store = MemoryKeyStore::new();
        let first = store.insert(draft("u1", "PEM1"), &ids()).await.unwrap();
        let second = store.insert(draft("u1", "PEM2"), &ids()).await.unwrap();
        let other = store.insert(draft("u2", "PEM1"), &ids()).await.unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(other.sequence, 1);
        assert_eq!(first.id, ids().mint("u1", 1));

        let listed = store.list_by_owner("u1").await.unwrap();
        let listed_ids: Vec<_> = listed.iter().map(|record| record.id.as_str()).collect();
        assert_eq!(listed_ids, vec![first.id.as_str(), second.id.as_str()]);
    }

    #[tokio::test]
    async fn same_material_for_same_owner_is_duplicate() {
        let store = MemoryKeyStore::new();
        store.insert(draft("u1", "PEM1"), &ids()).await.unwrap();
        let err = store.insert(draft("u1", "PEM1"), &ids()).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate));
        assert_eq!(store.list_by_owner("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn revoke_only_stamps_active_keys() {
        let store = MemoryKeyStore::new();
        let record = store.insert(draft("u1", "PEM1"), &ids()).await.unwrap();
        let first_at = Utc::now();
        let RevokeOutcome::Revoked(revoked) =
            store.revoke(&record.id, first_at).await.unwrap().unwrap()
        else {
            panic!("expected the first revoke to transition");
        };
        assert_eq!(revoked.status, KeyStatus::Disabled);
        assert_eq!(revoked.revoked, Some(first_at));

        let later = first_at + chrono::Duration::seconds(5);
        let RevokeOutcome::AlreadyDisabled(again) =
            store.revoke(&record.id, later).await.unwrap().unwrap()
        else {
            panic!("expected the second revoke to be a no-op");
        };
        assert_eq!(again.revoked, Some(first_at));
        assert!(store.revoke("missing", later).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_owner_lists_nothing() {
        let store = MemoryKeyStore::new();
        assert!(store.list_by_owner("nobody").await.unwrap().is_empty());
    }
}
