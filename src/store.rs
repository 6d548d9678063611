// Credential store
// Cookie-like key/value persistence with expiry semantics

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Key under which the serialized token is persisted
pub const TOKEN_COOKIE: &str = "rsAuthTokenItem";

/// Key under which a captured post-login redirect URL is persisted
pub const REDIRECT_COOKIE: &str = "rsRedirectUrl";

/// Key under which the impersonated principal id is persisted
pub const IMPERSONATING_COOKIE: &str = "rsImpersonatingEperson";

/// Cookie-like key/value store shared between the server-rendered request
/// and the subsequent client-side execution
///
/// Writes are last-write-wins; reads are synchronous and local. The store
/// is the only cross-context shared resource of the engine.
pub trait CredentialStore: Send + Sync {
    /// Get a value, or None if absent or past its expiry
    fn get(&self, key: &str) -> Option<String>;

    /// Set a value, optionally bounded by a time-to-live
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>);

    /// Remove a value
    fn remove(&self, key: &str);
}

struct StoredValue {
    value: String,
    /// Epoch seconds past which the entry is considered gone
    expires_at: Option<u64>,
}

/// In-memory cookie store with lazy expiry eviction
pub struct MemoryCookieStore {
    entries: Arc<DashMap<String, StoredValue>>,
}

impl MemoryCookieStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

impl Default for MemoryCookieStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryCookieStore {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl CredentialStore for MemoryCookieStore {
    fn get(&self, key: &str) -> Option<String> {
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) => match entry.expires_at {
                Some(expires_at) if Self::now_secs() >= expires_at => true,
                _ => return Some(entry.value.clone()),
            },
        };

        // Evict lazily so expired entries never resurface
        if expired {
            self.entries.remove(key);
        }
        None
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Self::now_secs() + ttl.as_secs());
        tracing::debug!(key = key, ttl = ?ttl, "Storing credential entry");
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at,
            },
        );
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}
