//! Constructor configuration (spec §6).

/// One input rule, before validation/normalization into [`crate::rules::Rule`].
#[derive(Debug, Clone)]
pub struct RuleSpec {
    pub interval_seconds: u64,
    pub limit: u64,
    pub precision_seconds: Option<u64>,
}

/// Everything [`crate::limiter::RateLimiter::new`] needs besides the
/// store client itself.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Prefix applied to every identifier and to the whitelist/blacklist
    /// set names. Empty string is allowed and elides the `:` delimiter.
    pub prefix: String,

    /// When `true`, identifier keys are passed to the store unprefixed
    /// (the store client is assumed to prepend the prefix transparently
    /// on the wire). Whitelist/blacklist set names are always fully
    /// qualified regardless of this flag.
    pub client_prefix_mode: bool,

    /// Non-empty list of rules; validated by `RateLimiter::new`.
    pub rules: Vec<RuleSpec>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            prefix: "ratelimit".to_string(),
            client_prefix_mode: false,
            rules: Vec::new(),
        }
    }
}
