//! Public key lifecycle: records, ownership checks and persistence seams.

pub mod events;
pub mod ids;
pub mod models;
pub mod pg;
pub mod policy;
pub mod service;
pub mod store;
pub mod validator;

pub use events::{KeyAuditEvent, KeyAuditEventType};
pub use ids::KeyIdScheme;
pub use models::{
    AddKey, KeyCapability, KeyDraft, KeyFilter, KeyPatch, KeyRecord, KeyStatus, PublicKey,
};
pub use pg::PgKeyStore;
pub use policy::{Actor, AuthorizationError, Authorizer, KeyPermission, RoleAuthorizer, RolePolicy};
pub use service::{
    KeyError, KeyLifecycleService, KeyServiceConfig, UpdateOutcome, IDENTITY_CONTEXT_V1_URL,
};
pub use store::{KeyStore, MemoryKeyStore, RevokeOutcome, StoreError};
pub use validator::{KeyPairError, KeyPairValidator, RsaKeyPairValidator};
