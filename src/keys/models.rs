use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// JSON-LD type stamped on every public key document.
pub const CRYPTOGRAPHIC_KEY_TYPE: &str = "CryptographicKey";

/// key: public-key-document
/// Public view of a key record as served over HTTP. Never carries private material.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    #[serde(rename = "type")]
    pub key_type: String,
    pub owner: String,
    pub label: String,
    pub public_key_pem: String,
    pub sys_status: KeyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Active,
    Disabled,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Active => "active",
            KeyStatus::Disabled => "disabled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(KeyStatus::Active),
            "disabled" => Some(KeyStatus::Disabled),
            _ => None,
        }
    }
}

/// Static capability metadata used to narrow owner listings.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyCapability {
    Verify,
    Sign,
}

impl KeyCapability {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "verify" => Some(KeyCapability::Verify),
            "sign" => Some(KeyCapability::Sign),
            _ => None,
        }
    }
}

/// key: public-key-record
/// Stored key record, including the optional linked private key material.
#[derive(Clone)]
pub struct KeyRecord {
    pub id: String,
    pub owner: String,
    pub sequence: i64,
    pub label: String,
    pub public_key_pem: String,
    pub private_key_pem: Option<String>,
    pub status: KeyStatus,
    pub revoked: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KeyRecord {
    pub fn has_capability(&self, capability: KeyCapability) -> bool {
        match capability {
            KeyCapability::Verify => true,
            KeyCapability::Sign => self.private_key_pem.is_some(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.status == KeyStatus::Disabled
    }

    pub fn to_public_key(&self, context: &str) -> PublicKey {
        PublicKey {
            context: context.to_string(),
            id: self.id.clone(),
            key_type: CRYPTOGRAPHIC_KEY_TYPE.to_string(),
            owner: self.owner.clone(),
            label: self.label.clone(),
            public_key_pem: self.public_key_pem.clone(),
            sys_status: self.status,
            revoked: self.revoked,
        }
    }
}

// Private key material stays out of debug output.
impl std::fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRecord")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("sequence", &self.sequence)
            .field("label", &self.label)
            .field("has_private_key", &self.private_key_pem.is_some())
            .field("status", &self.status)
            .field("revoked", &self.revoked)
            .finish()
    }
}

/// Key material accepted for insertion; the store assigns sequence and id.
#[derive(Clone, Debug)]
pub struct KeyDraft {
    pub owner: String,
    pub label: String,
    pub public_key_pem: String,
    pub private_key_pem: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request to register a key for an owner. `owner` falls back to the requester.
#[derive(Clone, Debug, Default)]
pub struct AddKey {
    pub owner: Option<String>,
    pub label: String,
    pub public_key_pem: String,
    pub private_key_pem: Option<String>,
}

/// Partial update of a key. Only present fields are acted on.
#[derive(Clone, Debug, Default)]
pub struct KeyPatch {
    pub id: String,
    pub label: Option<String>,
    pub revoked: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct KeyFilter {
    pub capability: Option<KeyCapability>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(private_key_pem: Option<&str>) -> KeyRecord {
        let now = Utc::now();
        KeyRecord {
            id: "https://keys.test/keys/abc-1".into(),
            owner: "did:example:alice".into(),
            sequence: 1,
            label: "Signing Key 1".into(),
            public_key_pem: "PEM1".into(),
            private_key_pem: private_key_pem.map(str::to_string),
            status: KeyStatus::Active,
            revoked: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn sign_capability_requires_private_material() {
        assert!(record(None).has_capability(KeyCapability::Verify));
        assert!(!record(None).has_capability(KeyCapability::Sign));
        assert!(record(Some("PRIVATE")).has_capability(KeyCapability::Sign));
    }

    #[test]
    fn public_view_omits_private_material_and_unset_revocation() {
        let doc = serde_json::to_value(record(Some("PRIVATE")).to_public_key("ctx")).unwrap();
        assert_eq!(doc["@context"], "ctx");
        assert_eq!(doc["type"], "CryptographicKey");
        assert_eq!(doc["publicKeyPem"], "PEM1");
        assert_eq!(doc["sysStatus"], "active");
        assert!(doc.get("privateKeyPem").is_none());
        assert!(doc.get("revoked").is_none());
    }

    #[test]
    fn unknown_status_is_not_coerced() {
        assert_eq!(KeyStatus::parse("active"), Some(KeyStatus::Active));
        assert_eq!(KeyStatus::parse("disabled"), Some(KeyStatus::Disabled));
        assert_eq!(KeyStatus::parse("suspended"), None);
    }

    #[test]
    fn debug_output_redacts_private_material() {
        let rendered = format!("{:?}", record(Some("PRIVATE")));
        assert!(!rendered.contains("PRIVATE"));
        assert!(rendered.contains("has_private_key: true"));
    }
}
