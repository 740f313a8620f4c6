//! Error taxonomy for the limiter's public surface.

use crate::store::StoreClientError;

/// Errors the limiter can return. Mirrors the taxonomy the store and
/// script layers can raise, collapsed to one type at the public API.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// A rule was missing `interval`/`limit`, or either was non-positive.
    #[error("invalid rule configuration: {0}")]
    ConfigError(String),

    /// Every identifier in the input list was empty after trimming.
    #[error("no valid keys after dropping empty identifiers")]
    NoValidKeys,

    /// `ScriptCache::exec` was called with a name that was never registered.
    #[error("unknown script name: {0}")]
    UnknownScriptName(String),

    /// Any store-side failure other than the "unknown script" signal.
    #[error("store error: {0}")]
    StoreError(#[source] anyhow::Error),

    /// The atomic script returned a value outside `{0, 1, 2}`.
    #[error("script returned unexpected value: {0}")]
    ScriptError(i64),
}

impl From<StoreClientError> for RateLimitError {
    fn from(e: StoreClientError) -> Self {
        match e {
            StoreClientError::UnknownScript => {
                RateLimitError::StoreError(anyhow::anyhow!("unknown script (unresolved after fallback)"))
            }
            StoreClientError::Other(err) => RateLimitError::StoreError(err),
        }
    }
}
