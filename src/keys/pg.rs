use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::events::{KeyAuditEvent, KeyAuditEventType};
use super::ids::KeyIdScheme;
use super::models::{KeyDraft, KeyRecord, KeyStatus};
use super::store::{KeyStore, RevokeOutcome, StoreError, StoreResult};

const UNIQUE_VIOLATION: &str = "23505";

const KEY_COLUMNS: &str = "id, owner, sequence, label, public_key_pem, private_key_pem, sys_status, revoked, created_at, updated_at";

/// key: public-key-pg-store
/// Postgres-backed key store. Sequencing is serialized per owner with an advisory lock.
#[derive(Clone)]
pub struct PgKeyStore {
    pool: PgPool,
}

impl PgKeyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: &str) -> StoreResult<Option<KeyRecord>> {
        let row = sqlx::query_as::<_, KeyRow>(&format!(
            "SELECT {KEY_COLUMNS} FROM public_keys WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(KeyRecord::try_from).transpose()
    }
}

fn map_insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StoreError::Duplicate;
        }
    }
    StoreError::Db(err)
}

#[async_trait]
impl KeyStore for PgKeyStore {
    async fn insert(&self, draft: KeyDraft, ids: &KeyIdScheme) -> StoreResult<KeyRecord> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&draft.owner)
            .execute(&mut *tx)
            .await?;

        let sequence: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM public_keys WHERE owner = $1",
        )
        .bind(&draft.owner)
        .fetch_one(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, KeyRow>(&format!(
            "INSERT INTO public_keys(id, owner, sequence, label, public_key_pem, private_key_pem, sys_status, revoked, created_at, updated_at) \
             VALUES($1,$2,$3,$4,$5,$6,$7,NULL,$8,$8) RETURNING {KEY_COLUMNS}"
        ))
        .bind(ids.mint(&draft.owner, sequence))
        .bind(&draft.owner)
        .bind(sequence)
        .bind(&draft.label)
        .bind(&draft.public_key_pem)
        .bind(&draft.private_key_pem)
        .bind(KeyStatus::Active.as_str())
        .bind(draft.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        tx.commit().await?;
        row.try_into()
    }

    async fn get(&self, id: &str) -> StoreResult<Option<KeyRecord>> {
        self.fetch(id).await
    }

    async fn list_by_owner(&self, owner: &str) -> StoreResult<Vec<KeyRecord>> {
        let rows = sqlx::query_as::<_, KeyRow>(&format!(
            "SELECT {KEY_COLUMNS} FROM public_keys WHERE owner = $1 ORDER BY sequence"
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(KeyRecord::try_from).collect()
    }

    async fn update_label(
        &self,
        id: &str,
        label: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<KeyRecord>> {
        let row = sqlx::query_as::<_, KeyRow>(&format!(
            "UPDATE public_keys SET label = $1, updated_at = $2 WHERE id = $3 RETURNING {KEY_COLUMNS}"
        ))
        .bind(label)
        .bind(at)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(KeyRecord::try_from).transpose()
    }

    async fn revoke(&self, id: &str, at: DateTime<Utc>) -> StoreResult<Option<RevokeOutcome>> {
        let row = sqlx::query_as::<_, KeyRow>(&format!(
            "UPDATE public_keys SET sys_status = $1, revoked = $2, updated_at = $2 \
             WHERE id = $3 AND sys_status = $4 RETURNING {KEY_COLUMNS}"
        ))
        .bind(KeyStatus::Disabled.as_str())
        .bind(at)
        .bind(id)
        .bind(KeyStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(RevokeOutcome::Revoked(row.try_into()?))),
            // Lost the race or already disabled: report what is stored now.
            None => Ok(self.fetch(id).await?.map(RevokeOutcome::AlreadyDisabled)),
        }
    }

    async fn append_event(&self, event: &KeyAuditEvent) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO public_key_events(id, key_id, owner, actor, event_type, payload, occurred_at) VALUES($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(event.id)
        .bind(&event.key_id)
        .bind(&event.owner)
        .bind(&event.actor)
        .bind(event.event_type.as_str())
        .bind(&event.payload)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn events_for(&self, key_id: &str) -> StoreResult<Vec<KeyAuditEvent>> {
        let rows = sqlx::query_as::<_, KeyEventRow>(
            "SELECT id, key_id, owner, actor, event_type, payload, occurred_at FROM public_key_events WHERE key_id = $1 ORDER BY occurred_at",
        )
        .bind(key_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().filter_map(KeyEventRow::into_event).collect())
    }
}

#[derive(sqlx::FromRow)]
struct KeyRow {
    id: String,
    owner: String,
    sequence: i64,
    label: String,
    public_key_pem: String,
    private_key_pem: Option<String>,
    sys_status: String,
    revoked: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<KeyRow> for KeyRecord {
    type Error = StoreError;

    fn try_from(row: KeyRow) -> Result<Self, Self::Error> {
        let status = KeyStatus::parse(&row.sys_status).ok_or_else(|| {
            StoreError::InvalidRow(format!("unknown sys_status '{}'", row.sys_status))
        })?;
        Ok(KeyRecord {
            id: row.id,
            owner: row.owner,
            sequence: row.sequence,
            label: row.label,
            public_key_pem: row.public_key_pem,
            private_key_pem: row.private_key_pem,
            status,
            revoked: row.revoked,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct KeyEventRow {
    id: Uuid,
    key_id: String,
    owner: String,
    actor: Option<String>,
    event_type: String,
    payload: Value,
    occurred_at: DateTime<Utc>,
}

impl KeyEventRow {
    fn into_event(self) -> Option<KeyAuditEvent> {
        let event_type = KeyAuditEventType::parse(&self.event_type)?;
        Some(KeyAuditEvent {
            id: self.id,
            key_id: self.key_id,
            owner: self.owner,
            actor: self.actor,
            event_type,
            payload: self.payload,
            occurred_at: self.occurred_at,
        })
    }
}
