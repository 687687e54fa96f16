//! Session defaults.
//!
//! The crate loads no configuration files of its own; this struct exists
//! so an embedding application can deserialize cache settings from its
//! config and hand them to a session.

use serde::Deserialize;

const DEFAULT_PREFIX: &str = "cacher";
const DEFAULT_TTL_SECONDS: u64 = 0;

/// Defaults applied to a new cache session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacherConfig {
    /// Key prefix shared by every entry the session writes.
    pub prefix: String,
    /// Entry time-to-live in seconds. Zero disables expiration.
    pub ttl_seconds: u64,
}

impl Default for CacherConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }
}
