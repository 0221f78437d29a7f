//! Errors reported while maintaining and persisting break-glass grants.

/// Bootstrap could not access the index and no grants were restored.
#[derive(Debug, thiserror::Error)]
#[error("grants index is not available, bootstrap skipped")]
pub struct IndexUnavailable;

/// The API key and token of a grant were sealed with different encryption keys.
#[derive(Debug, thiserror::Error)]
#[error("API key sealed with key {api_key} but token sealed with key {token}")]
pub struct KeyIdMismatch {
    pub api_key: u32,
    pub token: u32,
}

/// Grants without an identity can't be persisted.
#[derive(Debug, thiserror::Error)]
#[error("grants without an identity can't be persisted")]
pub struct MissingIdentity;

/// Unable to load grants from the index.
#[derive(Debug, thiserror::Error)]
#[error("unable to load grants from index '{0}'")]
pub struct SearchFailed(pub String);
