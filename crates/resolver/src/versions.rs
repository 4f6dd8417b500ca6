//! Cached version lists for `version` choices
//!
//! Remote version lists are the only time-varying input to resolution.
//! They are cached per (tool, source) with a time-to-live, so discovery and
//! resolution inside that window see the same list.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Default cache lifetime
pub const DEFAULT_TTL_SECS: i64 = 3600;

/// External source of available versions, newest first
pub trait VersionProvider: Send + Sync {
    /// List versions for a tool from a named source
    fn versions(&self, tool: &str, source: &str) -> std::result::Result<Vec<String>, String>;
}

/// A fetched version list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedVersions {
    pub versions: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

/// TTL cache in front of a [`VersionProvider`]
#[derive(Debug)]
pub struct VersionCache {
    ttl: Duration,
    entries: Mutex<BTreeMap<(String, String), CachedVersions>>,
}

impl Default for VersionCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TTL_SECS))
    }
}

impl VersionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Cached list if still fresh at `now`, otherwise fetch and store
    pub fn get_or_fetch(
        &self,
        tool: &str,
        source: &str,
        provider: &dyn VersionProvider,
        now: DateTime<Utc>,
    ) -> Result<CachedVersions> {
        let key = (tool.to_string(), source.to_string());
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(cached) = entries.get(&key)
            && now - cached.fetched_at < self.ttl
        {
            log::debug!("Version cache hit for {tool}/{source}");
            return Ok(cached.clone());
        }

        let versions = provider
            .versions(tool, source)
            .map_err(|message| Error::VersionSource {
                tool: tool.to_string(),
                source_name: source.to_string(),
                message,
            })?;
        log::debug!("Fetched {} versions for {tool}/{source}", versions.len());

        let fresh = CachedVersions {
            versions,
            fetched_at: now,
        };
        entries.insert(key, fresh.clone());
        Ok(fresh)
    }

    /// Drop every cached list
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    impl VersionProvider for Counting {
        fn versions(&self, _tool: &str, _source: &str) -> std::result::Result<Vec<String>, String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![format!("1.{n}.0")])
        }
    }

    #[test]
    fn test_cache_stable_within_ttl() {
        let cache = VersionCache::default();
        let provider = Counting {
            calls: AtomicUsize::new(0),
        };
        let t0 = Utc::now();
        let first = cache.get_or_fetch("node", "nodejs", &provider, t0).unwrap();
        let second = cache
            .get_or_fetch("node", "nodejs", &provider, t0 + Duration::seconds(60))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let third = cache
            .get_or_fetch("node", "nodejs", &provider, t0 + Duration::seconds(3600))
            .unwrap();
        assert_eq!(third.versions, vec!["1.1.0"]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_provider_error() {
        struct Offline;
        impl VersionProvider for Offline {
            fn versions(&self, _: &str, _: &str) -> std::result::Result<Vec<String>, String> {
                Err("network unreachable".into())
            }
        }
        let err = VersionCache::default()
            .get_or_fetch("node", "nodejs", &Offline, Utc::now())
            .unwrap_err();
        assert!(err.to_string().contains("network unreachable"));
    }
}
