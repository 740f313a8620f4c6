//! An in-process [`StoreClient`], backing tests and local development.
//!
//! It recognizes the two script bodies from [`crate::scripts`] by
//! content and runs the equivalent [`crate::algorithm`] logic instead
//! of an embedded Lua interpreter — there is no general `EVAL` here.
//! A single [`std::sync::Mutex`] makes every call atomic within one
//! process, which is the scope this store claims: it does not share
//! state across processes the way a real store would, so it must not
//! be used where spec.md's cross-instance atomicity guarantee matters.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::algorithm::{self, CounterState};
use crate::rules::Rule;
use crate::scripts;
use crate::store::{StoreClient, StoreClientError};

struct State {
    hashes: HashMap<String, CounterState>,
    sets: HashMap<String, HashSet<String>>,
    /// digest -> whether the cached script is the check-and-increment
    /// one (`true`) or the check-only one (`false`). Populated lazily
    /// the first time a body reaches `eval_by_body`, mirroring a real
    /// store caching a script under its digest as a side effect.
    known_scripts: HashMap<String, bool>,
}

/// In-memory [`StoreClient`]. See module docs for its scope.
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                hashes: HashMap::new(),
                sets: HashMap::new(),
                known_scripts: HashMap::new(),
            }),
        }
    }

    /// Parse the script's `ARGV` layout (spec §4.5) out of the
    /// generic string args every `StoreClient` call carries.
    fn parse_args(args: &[String]) -> Result<(Vec<Rule>, u64, u64, String, String), StoreClientError> {
        let rules_json = args
            .first()
            .ok_or_else(|| StoreClientError::Other(anyhow::anyhow!("missing rules argument")))?;
        let raw: Vec<Vec<u64>> = serde_json::from_str(rules_json)
            .map_err(|e| StoreClientError::Other(anyhow::anyhow!("invalid rules JSON: {e}")))?;
        let rules = raw
            .into_iter()
            .map(|r| {
                let interval = r[0];
                let limit = r[1];
                let precision = r.get(2).copied();
                Rule::new(interval, limit, precision)
                    .map_err(|e| StoreClientError::Other(anyhow::anyhow!("{e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let now: u64 = args
            .get(1)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| StoreClientError::Other(anyhow::anyhow!("missing/invalid now")))?;
        let weight: u64 = args
            .get(2)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| StoreClientError::Other(anyhow::anyhow!("missing/invalid weight")))?;
        let whitelist_key = args
            .get(3)
            .cloned()
            .ok_or_else(|| StoreClientError::Other(anyhow::anyhow!("missing whitelist key")))?;
        let blacklist_key = args
            .get(4)
            .cloned()
            .ok_or_else(|| StoreClientError::Other(anyhow::anyhow!("missing blacklist key")))?;

        Ok((rules, now, weight, whitelist_key, blacklist_key))
    }

    fn run(
        &self,
        is_incr: bool,
        keys: &[String],
        args: &[String],
    ) -> Result<i64, StoreClientError> {
        let (rules, now, weight, whitelist_key, blacklist_key) = Self::parse_args(args)?;
        let mut state = self.state.lock().unwrap();

        for key in keys {
            if state
                .sets
                .get(&whitelist_key)
                .map(|s| s.contains(key))
                .unwrap_or(false)
            {
                return Ok(0);
            }
            if state
                .sets
                .get(&blacklist_key)
                .map(|s| s.contains(key))
                .unwrap_or(false)
            {
                return Ok(2);
            }
        }

        if is_incr {
            let denied = algorithm::check_and_incr_multi(&rules, now, weight, &mut state.hashes, keys);
            Ok(if denied { 1 } else { 0 })
        } else {
            let denied = algorithm::check_only_multi(&rules, now, &state.hashes, keys);
            Ok(if denied { 1 } else { 0 })
        }
    }

    fn register_body(&self, body: &str) -> String {
        let digest = sha1_hex(body);
        let mut state = self.state.lock().unwrap();
        state
            .known_scripts
            .entry(digest.clone())
            .or_insert_with(|| scripts::is_incr_body(body));
        digest
    }
}

fn sha1_hex(body: &str) -> String {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(body.as_bytes());
    hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect()
}

#[async_trait]
impl StoreClient for InMemoryStore {
    async fn eval_by_hash(
        &self,
        sha: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<i64, StoreClientError> {
        let is_incr = {
            let state = self.state.lock().unwrap();
            match state.known_scripts.get(sha) {
                Some(is_incr) => *is_incr,
                None => return Err(StoreClientError::UnknownScript),
            }
        };
        self.run(is_incr, keys, args)
    }

    async fn eval_by_body(
        &self,
        body: &str,
        keys: &[String],
        args: &[String],
    ) -> Result<i64, StoreClientError> {
        let is_incr = scripts::is_incr_body(body);
        self.register_body(body);
        self.run(is_incr, keys, args)
    }

    async fn hget(&self, hash_key: &str, field: &str) -> Result<Option<i64>, StoreClientError> {
        let state = self.state.lock().unwrap();
        Ok(state.hashes.get(hash_key).and_then(|h| h.get(field)).copied())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreClientError> {
        let state = self.state.lock().unwrap();
        let all_keys = state.hashes.keys().cloned().chain(state.sets.keys().cloned());
        if let Some(prefix) = pattern.strip_suffix('*') {
            Ok(all_keys.filter(|k| k.starts_with(prefix)).collect())
        } else {
            Ok(all_keys.filter(|k| k == pattern).collect())
        }
    }

    async fn sadd(&self, set: &str, member: &str) -> Result<(), StoreClientError> {
        let mut state = self.state.lock().unwrap();
        state.sets.entry(set.to_string()).or_default().insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, set: &str, member: &str) -> Result<(), StoreClientError> {
        let mut state = self.state.lock().unwrap();
        if let Some(s) = state.sets.get_mut(set) {
            s.remove(member);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_hash_reports_the_single_discriminant() {
        let store = InMemoryStore::new();
        let err = store.eval_by_hash("deadbeef", &[], &[]).await.unwrap_err();
        assert!(matches!(err, StoreClientError::UnknownScript));
    }

    #[tokio::test]
    async fn body_eval_caches_the_digest_for_later_hash_eval() {
        let store = InMemoryStore::new();
        let body = scripts::check_rate_limit_body();
        let digest = sha1_hex(&body);
        let args = vec![
            "[[1,5]]".to_string(),
            "0".to_string(),
            "1".to_string(),
            "wl".to_string(),
            "bl".to_string(),
        ];
        store.eval_by_body(&body, &["k".to_string()], &args).await.unwrap();
        let result = store.eval_by_hash(&digest, &["k".to_string()], &args).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn keys_strips_nothing_itself_and_supports_prefix_glob() {
        let store = InMemoryStore::new();
        store.sadd("ratelimit:whitelist", "ratelimit:a").await.unwrap();
        let found = store.keys("ratelimit:*").await.unwrap();
        assert_eq!(found, vec!["ratelimit:whitelist".to_string()]);
    }
}
