//! Limiter Core (spec §4.4): the public surface most callers touch.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::error::RateLimitError;
use crate::keys::KeyArg;
use crate::rules::RuleSet;
use crate::script_cache::ScriptCache;
use crate::scripts;
use crate::store::StoreClient;
use crate::{RateLimiterConfig, Rule};

/// A rule an identifier is currently violating, as reported by
/// [`RateLimiter::violated_rules`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViolatedRule {
    pub interval: u64,
    pub limit: u64,
}

/// Applies spec.md's `prefix(key, force)` policy (§4.3) to identifiers
/// and to the whitelist/blacklist set names.
struct Prefixer {
    prefix: String,
    client_prefix_mode: bool,
}

impl Prefixer {
    fn apply(&self, key: &str, force: bool) -> String {
        if self.client_prefix_mode && !force {
            return key.to_string();
        }
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.prefix, key)
        }
    }

    fn whitelist_set(&self) -> String {
        self.apply("whitelist", true)
    }

    fn blacklist_set(&self) -> String {
        self.apply("blacklist", true)
    }

    fn glob_all(&self) -> String {
        if self.prefix.is_empty() {
            "*".to_string()
        } else {
            format!("{}:*", self.prefix)
        }
    }

    fn strip(&self, raw: &str) -> String {
        if self.prefix.is_empty() {
            raw.to_string()
        } else {
            let needle = format!("{}:", self.prefix);
            raw.strip_prefix(needle.as_str()).unwrap_or(raw).to_string()
        }
    }
}

fn current_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs()
}

/// The sliding-window rate limiter. Stateless beyond its store handle —
/// every decision and every mutation lives on the store (spec §5).
pub struct RateLimiter {
    store: Arc<dyn StoreClient>,
    scripts: ScriptCache,
    rules: RuleSet,
    prefixer: Prefixer,
}

impl RateLimiter {
    /// Validate `config` and build a limiter against `store`.
    pub fn new(store: Arc<dyn StoreClient>, config: RateLimiterConfig) -> Result<Self, RateLimitError> {
        let rules = RuleSet::try_new(config.rules)?;
        let scripts = ScriptCache::new(scripts::bodies());
        let prefixer = Prefixer {
            prefix: config.prefix,
            client_prefix_mode: config.client_prefix_mode,
        };
        Ok(Self {
            store,
            scripts,
            rules,
            prefixer,
        })
    }

    /// Drop empty identifiers, fail if none remain (spec §4.3).
    fn normalize(&self, keys: impl Into<KeyArg>) -> Result<Vec<String>, RateLimitError> {
        let raw = keys.into().into_vec();
        let trimmed: Vec<String> = raw
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if trimmed.is_empty() {
            return Err(RateLimitError::NoValidKeys);
        }
        Ok(trimmed)
    }

    fn prefixed_identifiers(&self, raw_keys: &[String]) -> Vec<String> {
        raw_keys.iter().map(|k| self.prefixer.apply(k, false)).collect()
    }

    fn script_args(&self, weight: u64) -> Vec<String> {
        vec![
            self.rules.rules_json(),
            current_unix_seconds().to_string(),
            weight.to_string(),
            self.prefixer.whitelist_set(),
            self.prefixer.blacklist_set(),
        ]
    }

    fn interpret(code: i64) -> Result<bool, RateLimitError> {
        match code {
            0 => Ok(false),
            1 | 2 => Ok(true),
            other => Err(RateLimitError::ScriptError(other)),
        }
    }

    /// `true` iff the identifier(s) would currently be denied. Never
    /// mutates counter state (spec §3 invariant, §8 "check purity").
    pub async fn check(&self, keys: impl Into<KeyArg>) -> Result<bool, RateLimitError> {
        let raw = self.normalize(keys)?;
        let prefixed = self.prefixed_identifiers(&raw);
        let args = self.script_args(1);
        let code = self
            .scripts
            .exec(self.store.as_ref(), scripts::CHECK_RATE_LIMIT, &prefixed, &args)
            .await?;
        Self::interpret(code)
    }

    /// Atomically check-and-increment. Returns `true` (denied) without
    /// mutating counters, or `false` after incrementing every
    /// applicable rule counter for every key by `weight` (default 1,
    /// floored to 1 if given as 0).
    pub async fn incr(&self, keys: impl Into<KeyArg>, weight: Option<u64>) -> Result<bool, RateLimitError> {
        let raw = self.normalize(keys)?;
        let prefixed = self.prefixed_identifiers(&raw);
        let weight = weight.unwrap_or(1).max(1);
        let args = self.script_args(weight);
        let code = self
            .scripts
            .exec(self.store.as_ref(), scripts::CHECK_LIMIT_INCR, &prefixed, &args)
            .await?;
        let denied = Self::interpret(code)?;
        if denied {
            debug!(keys = ?raw, "incr denied");
        }
        Ok(denied)
    }

    /// Read-only inspection of which rules an identifier is currently
    /// violating (spec §4.4). Missing fields read as `-1` and never
    /// report — see spec.md's open question on precision mismatches
    /// after a reconfiguration without a key flush.
    pub async fn violated_rules(&self, keys: impl Into<KeyArg>) -> Result<Vec<ViolatedRule>, RateLimitError> {
        let raw = self.normalize(keys)?;
        let mut out = Vec::new();
        for key in &raw {
            let hash_key = self.prefixer.apply(key, false);
            for rule in self.rules.iter() {
                let field = rule.count_field();
                let count = self
                    .store
                    .hget(&hash_key, &field)
                    .await
                    .map(|v| v.unwrap_or(-1))?;
                if count >= rule.limit() as i64 {
                    out.push(ViolatedRule {
                        interval: rule.interval(),
                        limit: rule.limit(),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Filters the input keys down to the ones `check` currently
    /// denies. One store round trip per key — documented, not
    /// optimized (spec §4.4).
    pub async fn limited_keys(&self, keys: impl Into<KeyArg>) -> Result<Vec<String>, RateLimitError> {
        let raw = self.normalize(keys)?;
        let mut out = Vec::new();
        for key in raw {
            if self.check(key.clone()).await? {
                out.push(key);
            }
        }
        Ok(out)
    }

    /// All keys under this limiter's prefix, with the prefix stripped.
    /// Whitelist/blacklist set names are not filtered out (spec.md's
    /// open question on `keys()` leaking set names) — callers filter.
    pub async fn keys(&self) -> Result<Vec<String>, RateLimitError> {
        let raw = self.store.keys(&self.prefixer.glob_all()).await?;
        Ok(raw.iter().map(|k| self.prefixer.strip(k)).collect())
    }

    /// Per key (not grouped into one atomic unit across the list):
    /// remove from the blacklist set, then add to the whitelist set.
    pub async fn whitelist(&self, keys: impl Into<KeyArg>) -> Result<(), RateLimitError> {
        let raw = self.normalize(keys)?;
        let whitelist = self.prefixer.whitelist_set();
        let blacklist = self.prefixer.blacklist_set();
        for key in raw {
            let member = self.prefixer.apply(&key, false);
            self.store.srem(&blacklist, &member).await?;
            self.store.sadd(&whitelist, &member).await?;
        }
        Ok(())
    }

    /// Remove from the whitelist set only.
    pub async fn unwhitelist(&self, keys: impl Into<KeyArg>) -> Result<(), RateLimitError> {
        let raw = self.normalize(keys)?;
        let whitelist = self.prefixer.whitelist_set();
        for key in raw {
            let member = self.prefixer.apply(&key, false);
            self.store.srem(&whitelist, &member).await?;
        }
        Ok(())
    }

    /// Per key: remove from the whitelist set, then add to the
    /// blacklist set.
    pub async fn blacklist(&self, keys: impl Into<KeyArg>) -> Result<(), RateLimitError> {
        let raw = self.normalize(keys)?;
        let whitelist = self.prefixer.whitelist_set();
        let blacklist = self.prefixer.blacklist_set();
        for key in raw {
            let member = self.prefixer.apply(&key, false);
            self.store.srem(&whitelist, &member).await?;
            self.store.sadd(&blacklist, &member).await?;
        }
        Ok(())
    }

    /// Remove from the blacklist set only.
    pub async fn unblacklist(&self, keys: impl Into<KeyArg>) -> Result<(), RateLimitError> {
        let raw = self.normalize(keys)?;
        let blacklist = self.prefixer.blacklist_set();
        for key in raw {
            let member = self.prefixer.apply(&key, false);
            self.store.srem(&blacklist, &member).await?;
        }
        Ok(())
    }

    /// The rules this limiter was constructed with.
    pub fn rules(&self) -> &[Rule] {
        self.rules.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::RuleSpec;

    fn limiter(rules: Vec<RuleSpec>) -> RateLimiter {
        RateLimiter::new(
            Arc::new(InMemoryStore::new()),
            RateLimiterConfig {
                rules,
                ..RateLimiterConfig::default()
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn empty_identifiers_are_rejected() {
        let limiter = limiter(vec![RuleSpec {
            interval_seconds: 1,
            limit: 5,
            precision_seconds: None,
        }]);
        let err = limiter.check("   ").await.unwrap_err();
        assert!(matches!(err, RateLimitError::NoValidKeys));
    }

    #[tokio::test]
    async fn prefix_is_elided_when_empty() {
        let limiter = RateLimiter::new(
            Arc::new(InMemoryStore::new()),
            RateLimiterConfig {
                prefix: String::new(),
                client_prefix_mode: false,
                rules: vec![RuleSpec {
                    interval_seconds: 1,
                    limit: 5,
                    precision_seconds: None,
                }],
            },
        )
        .unwrap();
        assert!(!limiter.check("ip").await.unwrap());
        let all = limiter.keys().await.unwrap();
        assert!(all.contains(&"whitelist".to_string()) || all.is_empty());
    }

    #[tokio::test]
    async fn blacklist_then_whitelist_gives_whitelist_precedence() {
        let limiter = limiter(vec![RuleSpec {
            interval_seconds: 60,
            limit: 1,
            precision_seconds: None,
        }]);
        limiter.blacklist("x").await.unwrap();
        assert!(limiter.check("x").await.unwrap());
        limiter.whitelist("x").await.unwrap();
        assert!(!limiter.check("x").await.unwrap());
    }

    #[tokio::test]
    async fn blacklisted_incr_does_not_touch_counters() {
        let limiter = limiter(vec![RuleSpec {
            interval_seconds: 60,
            limit: 5,
            precision_seconds: None,
        }]);
        limiter.blacklist("bad").await.unwrap();
        assert!(limiter.incr("bad", Some(1)).await.unwrap());
        let violations = limiter.violated_rules("bad").await.unwrap();
        assert!(violations.is_empty(), "blacklisted incr must not create counter fields");
    }
}
