use sha2::{Digest, Sha256};

/// key: public-key-id-scheme
/// Derives key identifiers from owner and per-owner sequence, and maps URL slugs back to ids.
#[derive(Clone, Debug)]
pub struct KeyIdScheme {
    base_uri: String,
    base_path: String,
}

impl KeyIdScheme {
    pub fn new(base_uri: impl Into<String>, base_path: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into().trim_end_matches('/').to_string(),
            base_path: base_path.into(),
        }
    }

    /// Stable slug for the `sequence`-th key of `owner`.
    pub fn slug(&self, owner: &str, sequence: i64) -> String {
        let digest = Sha256::digest(owner.as_bytes());
        format!("{}-{}", &hex::encode(digest)[..16], sequence)
    }

    pub fn mint(&self, owner: &str, sequence: i64) -> String {
        self.from_slug(&self.slug(owner, sequence))
    }

    pub fn from_slug(&self, slug: &str) -> String {
        format!("{}{}/{}", self.base_uri, self.base_path, slug)
    }
}
