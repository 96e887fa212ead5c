use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// key: public-key-audit-event
/// Audit envelope appended whenever a key is added or transitions state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyAuditEvent {
    pub id: Uuid,
    pub key_id: String,
    pub owner: String,
    pub actor: Option<String>,
    pub event_type: KeyAuditEventType,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
}

impl KeyAuditEvent {
    pub fn new(
        key_id: &str,
        owner: &str,
        actor: Option<&str>,
        event_type: KeyAuditEventType,
        payload: Value,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            key_id: key_id.to_string(),
            owner: owner.to_string(),
            actor: actor.map(str::to_string),
            event_type,
            payload,
            occurred_at,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyAuditEventType {
    Added,
    LabelUpdated,
    Revoked,
}

impl KeyAuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAuditEventType::Added => "added",
            KeyAuditEventType::LabelUpdated => "label_updated",
            KeyAuditEventType::Revoked => "revoked",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "added" => Some(Self::Added),
            "label_updated" => Some(Self::LabelUpdated),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }
}
