//! The Store Client Adapter contract (spec §4.1).
//!
//! This is a thin abstraction only — no algorithm lives here. A
//! concrete store (Redis, or the in-process [`crate::memory::InMemoryStore`]
//! used for tests) implements it; the [`crate::limiter::RateLimiter`]
//! and [`crate::script_cache::ScriptCache`] only ever see this trait.

use async_trait::async_trait;

/// The single discriminant callers need out of a store failure: did the
/// store not recognize a script digest, or did something else go wrong.
#[derive(Debug, thiserror::Error)]
pub enum StoreClientError {
    /// The store has no script cached under the given SHA-1 digest.
    #[error("unknown script")]
    UnknownScript,

    /// Any other store-side failure, propagated unchanged.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Contract a remote (or in-process) key-value store with server-side
/// scripting must fulfill. Connection construction, pooling and auth
/// are deliberately outside this trait's concern — see spec.md §1.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Evaluate a script by its SHA-1 digest. Must return
    /// `Err(StoreClientError::UnknownScript)`, and only that variant,
    /// when the store has no script cached under `sha`.
    async fn eval_by_hash(
        &self,
        sha: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<i64, StoreClientError>;

    /// Evaluate a script by source. The store is expected to retain the
    /// script under its own digest as a side effect, so a subsequent
    /// `eval_by_hash` with that digest succeeds.
    async fn eval_by_body(
        &self,
        body: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<i64, StoreClientError>;

    /// Read a single hash field as an integer, if present.
    async fn hget(&self, hash_key: &str, field: &str) -> Result<Option<i64>, StoreClientError>;

    /// List keys matching a glob pattern.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreClientError>;

    /// Add a member to a set.
    async fn sadd(&self, set: &str, member: &str) -> Result<(), StoreClientError>;

    /// Remove a member from a set.
    async fn srem(&self, set: &str, member: &str) -> Result<(), StoreClientError>;
}
