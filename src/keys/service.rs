use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use super::events::{KeyAuditEvent, KeyAuditEventType};
use super::ids::KeyIdScheme;
use super::models::{AddKey, KeyDraft, KeyFilter, KeyPatch, KeyRecord, PublicKey};
use super::policy::{Actor, AuthorizationError, Authorizer, KeyPermission};
use super::store::{KeyStore, RevokeOutcome, StoreError};
use super::validator::{KeyPairError, KeyPairValidator};

/// Default JSON-LD context for identity documents.
pub const IDENTITY_CONTEXT_V1_URL: &str = "https://w3id.org/identity/v1";

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("the key is a duplicate and could not be added")]
    DuplicateKey,
    #[error("invalid key pair: {0}")]
    InvalidKeyPair(#[from] KeyPairError),
    #[error("permission denied: {0}")]
    PermissionDenied(#[from] AuthorizationError),
    #[error("incorrect key id")]
    KeyIdMismatch { url_id: String, body_id: String },
    #[error("key not found")]
    NotFound,
    #[error("key store failure: {0}")]
    Store(#[source] StoreError),
}

impl From<StoreError> for KeyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => KeyError::DuplicateKey,
            other => KeyError::Store(other),
        }
    }
}

/// Result of applying a [`KeyPatch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Revoked(PublicKey),
    Updated,
}

#[derive(Clone, Debug)]
pub struct KeyServiceConfig {
    pub context_url: String,
    pub ids: KeyIdScheme,
}

impl KeyServiceConfig {
    pub fn new(ids: KeyIdScheme) -> Self {
        Self {
            context_url: IDENTITY_CONTEXT_V1_URL.to_string(),
            ids,
        }
    }
}

/// key: public-key-lifecycle-service
/// Owns the `absent -> active -> disabled` lifecycle of key records and who may drive it.
#[derive(Clone)]
pub struct KeyLifecycleService {
    store: Arc<dyn KeyStore>,
    authorizer: Arc<dyn Authorizer>,
    validator: Arc<dyn KeyPairValidator>,
    config: KeyServiceConfig,
}

impl KeyLifecycleService {
    pub fn new(
        store: Arc<dyn KeyStore>,
        authorizer: Arc<dyn Authorizer>,
        validator: Arc<dyn KeyPairValidator>,
        config: KeyServiceConfig,
    ) -> Self {
        Self {
            store,
            authorizer,
            validator,
            config,
        }
    }

    pub fn config(&self) -> &KeyServiceConfig {
        &self.config
    }

    pub async fn add_key(&self, actor: &Actor, request: AddKey) -> Result<PublicKey, KeyError> {
        let owner = request.owner.unwrap_or_else(|| actor.id.clone());
        self.authorizer
            .authorize(actor, KeyPermission::Create, &owner)
            .await?;

        if let Some(private_key_pem) = request.private_key_pem.as_deref() {
            self.validator
                .verify_pair(&request.public_key_pem, private_key_pem)?;
        }

        let draft = KeyDraft {
            owner,
            label: request.label,
            public_key_pem: request.public_key_pem,
            private_key_pem: request.private_key_pem,
            created_at: Utc::now(),
        };
        let record = self.store.insert(draft, &self.config.ids).await?;
        info!(
            key_id = %record.id,
            owner = %record.owner,
            actor = %actor.id,
            sign = record.private_key_pem.is_some(),
            "public key added"
        );

        self.record_event(
            &record,
            Some(actor),
            KeyAuditEventType::Added,
            json!({
                "label": record.label,
                "sequence": record.sequence,
                "private_key_linked": record.private_key_pem.is_some(),
            }),
        )
        .await;

        Ok(self.public_view(&record))
    }

    /// Public keys are discoverable by anyone, so `_actor` does not gate the read.
    pub async fn get_key(&self, _actor: Option<&Actor>, key_id: &str) -> Result<PublicKey, KeyError> {
        let record = self.store.get(key_id).await?.ok_or(KeyError::NotFound)?;
        Ok(self.public_view(&record))
    }

    pub async fn list_keys(
        &self,
        _actor: Option<&Actor>,
        owner: &str,
        filter: &KeyFilter,
    ) -> Result<Vec<PublicKey>, KeyError> {
        let records = self.store.list_by_owner(owner).await?;
        Ok(records
            .iter()
            .filter(|record| {
                filter
                    .capability
                    .map_or(true, |capability| record.has_capability(capability))
            })
            .map(|record| self.public_view(record))
            .collect())
    }

    pub async fn update_key(
        &self,
        actor: &Actor,
        key_id: &str,
        patch: KeyPatch,
    ) -> Result<UpdateOutcome, KeyError> {
        if patch.id != key_id {
            warn!(url_id = %key_id, body_id = %patch.id, "key id mismatch on update");
            return Err(KeyError::KeyIdMismatch {
                url_id: key_id.to_string(),
                body_id: patch.id,
            });
        }

        let record = self.store.get(key_id).await?.ok_or(KeyError::NotFound)?;

        if patch.revoked.is_some() {
            return self.revoke(actor, record).await;
        }

        self.authorizer
            .authorize(actor, KeyPermission::Edit, &record.owner)
            .await?;

        let Some(label) = patch.label else {
            return Ok(UpdateOutcome::Updated);
        };
        if label == record.label {
            return Ok(UpdateOutcome::Updated);
        }

        let updated = self
            .store
            .update_label(key_id, &label, Utc::now())
            .await?
            .ok_or(KeyError::NotFound)?;
        info!(key_id = %updated.id, actor = %actor.id, "public key label updated");
        self.record_event(
            &updated,
            Some(actor),
            KeyAuditEventType::LabelUpdated,
            json!({ "previous_label": record.label, "label": updated.label }),
        )
        .await;

        Ok(UpdateOutcome::Updated)
    }

    async fn revoke(&self, actor: &Actor, record: KeyRecord) -> Result<UpdateOutcome, KeyError> {
        self.authorizer
            .authorize(actor, KeyPermission::Remove, &record.owner)
            .await?;

        if record.is_disabled() {
            return Ok(UpdateOutcome::Revoked(self.public_view(&record)));
        }

        let revoked = match self
            .store
            .revoke(&record.id, Utc::now())
            .await?
            .ok_or(KeyError::NotFound)?
        {
            RevokeOutcome::Revoked(revoked) => revoked,
            // A concurrent request disabled the key first and owns the audit event.
            RevokeOutcome::AlreadyDisabled(current) => {
                return Ok(UpdateOutcome::Revoked(self.public_view(&current)));
            }
        };
        info!(key_id = %revoked.id, actor = %actor.id, "public key revoked");
        self.record_event(
            &revoked,
            Some(actor),
            KeyAuditEventType::Revoked,
            json!({ "previous_status": record.status, "revoked": revoked.revoked }),
        )
        .await;

        Ok(UpdateOutcome::Revoked(self.public_view(&revoked)))
    }

    fn public_view(&self, record: &KeyRecord) -> PublicKey {
        record.to_public_key(&self.config.context_url)
    }

    async fn record_event(
        &self,
        record: &KeyRecord,
        actor: Option<&Actor>,
        event_type: KeyAuditEventType,
        payload: serde_json::Value,
    ) {
        let event = KeyAuditEvent::new(
            &record.id,
            &record.owner,
            actor.map(|actor| actor.id.as_str()),
            event_type,
            payload,
            Utc::now(),
        );
        if let Err(err) = self.store.append_event(&event).await {
            warn!(?err, key_id = %record.id, event = event_type.as_str(), "failed to append key audit event");
        }
    }
}
