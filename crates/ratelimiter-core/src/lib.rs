//! Atomic sliding-window rate limiter, backed by a remote key-value
//! store that supports server-side scripting.
//!
//! The hard part lives here: the per-identifier counter layout, the
//! check/increment protocol that must run atomically on the store, and
//! the script caching/fallback handshake. Wrappers around a specific
//! store (connection setup, auth, pooling) are external collaborators —
//! see [`store`] for the contract and the `ratelimiter-redis` crate for
//! the one concrete implementation this workspace ships.

pub mod algorithm;
pub mod config;
pub mod error;
pub mod keys;
pub mod limiter;
pub mod memory;
pub mod rules;
pub mod script_cache;
pub mod scripts;
pub mod store;

pub use config::{RateLimiterConfig, RuleSpec};
pub use error::RateLimitError;
pub use keys::KeyArg;
pub use limiter::{RateLimiter, ViolatedRule};
pub use memory::InMemoryStore;
pub use rules::{Rule, RuleSet};
pub use store::{StoreClient, StoreClientError};
