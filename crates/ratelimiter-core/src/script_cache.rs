//! Script Cache (spec §4.2): SHA-1-addressed atomic scripts, with
//! fall back to sending the body on an "unknown script" signal.

use std::collections::HashMap;

use sha1::{Digest, Sha1};
use tracing::debug;

use crate::error::RateLimitError;
use crate::store::{StoreClient, StoreClientError};

struct ScriptRecord {
    digest: String,
    body: String,
}

fn sha1_hex(body: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(body.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Named atomic scripts, digested once at construction and never
/// invalidated client-side.
pub struct ScriptCache {
    scripts: HashMap<String, ScriptRecord>,
}

impl ScriptCache {
    /// Build a cache from `(name, body)` pairs, computing each body's
    /// SHA-1 digest once.
    pub fn new<I, N, B>(scripts: I) -> Self
    where
        I: IntoIterator<Item = (N, B)>,
        N: Into<String>,
        B: Into<String>,
    {
        let scripts = scripts
            .into_iter()
            .map(|(name, body)| {
                let body = body.into();
                let digest = sha1_hex(&body);
                (name.into(), ScriptRecord { digest, body })
            })
            .collect();
        Self { scripts }
    }

    /// Execute a named script by digest, falling back to sending the
    /// body on (and only on) an "unknown script" error. Any other
    /// error propagates unchanged.
    pub async fn exec(
        &self,
        store: &dyn StoreClient,
        name: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<i64, RateLimitError> {
        let record = self
            .scripts
            .get(name)
            .ok_or_else(|| RateLimitError::UnknownScriptName(name.to_string()))?;

        match store.eval_by_hash(&record.digest, keys, args).await {
            Ok(v) => Ok(v),
            Err(StoreClientError::UnknownScript) => {
                debug!(script = name, digest = %record.digest, "script unknown to store, falling back to body");
                store
                    .eval_by_body(&record.body, keys, args)
                    .await
                    .map_err(RateLimitError::from)
            }
            Err(other) => Err(RateLimitError::from(other)),
        }
    }
}
