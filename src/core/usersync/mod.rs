//! User-Sync Store: persistent `(fpid, bidder) -> (uid,
//! synced_at, updated_at, expires_at, last_used_at)`, written on two
//! paths (cookie-sync initiate, setuid-callback complete) and read on
//! one (request-time load).
//!
//! Backed by [`dashmap::DashMap`] rather than a single mutex: its
//! per-shard locking gives us "writes to the same `(fpid, bidder)`
//! tuple serialize" for free, while unrelated keys proceed
//! concurrently.

use crate::rtb::common::utils::epoch_timestamp;
use dashmap::DashMap;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SyncKey {
    fpid: String,
    bidder: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRecord {
    pub uid: Option<String>,
    pub synced_at: u64,
    pub updated_at: u64,
    pub expires_at: u64,
    pub last_used_at: u64,
}

pub struct UserSyncStore {
    rows: DashMap<SyncKey, SyncRecord>,
    sync_ttl: Duration,
}

impl UserSyncStore {
    pub fn new(sync_ttl: Duration) -> Self {
        Self {
            rows: DashMap::new(),
            sync_ttl,
        }
    }

    /// Called during cookie-sync. Idempotent on `(fpid, bidder)`: a
    /// pre-existing row (synced or pending) is left untouched so we
    /// never clobber an already-completed UID.
    pub fn initiate(&self, fpid: &str, bidder: &str) {
        let key = SyncKey {
            fpid: fpid.to_string(),
            bidder: bidder.to_string(),
        };

        self.rows.entry(key).or_insert_with(|| {
            let now = epoch_timestamp();
            SyncRecord {
                uid: None,
                synced_at: now,
                updated_at: now,
                expires_at: now + self.sync_ttl.as_secs(),
                last_used_at: now,
            }
        });
    }

    /// Setuid callback: writes `uid`, bumps `updated_at`, resets
    /// `expires_at`. If a different UID was already stored, it is
    /// replaced (rotation semantics), not appended.
    pub fn complete(&self, fpid: &str, bidder: &str, uid: String) {
        let key = SyncKey {
            fpid: fpid.to_string(),
            bidder: bidder.to_string(),
        };
        let now = epoch_timestamp();

        self.rows
            .entry(key)
            .and_modify(|row| {
                row.uid = Some(uid.clone());
                row.updated_at = now;
                row.expires_at = now + self.sync_ttl.as_secs();
                row.last_used_at = now;
            })
            .or_insert(SyncRecord {
                uid: Some(uid),
                synced_at: now,
                updated_at: now,
                expires_at: now + self.sync_ttl.as_secs(),
                last_used_at: now,
            });
    }

    /// Returns all non-null UIDs for `fpid` as `(bidder, uid)` pairs
    /// and bumps `last_used_at` on each returned row.
    pub fn load(&self, fpid: &str) -> Vec<(String, String)> {
        let now = epoch_timestamp();
        let mut out = Vec::new();

        for mut entry in self.rows.iter_mut() {
            if entry.key().fpid != fpid {
                continue;
            }
            if let Some(uid) = entry.value().uid.clone() {
                entry.value_mut().last_used_at = now;
                out.push((entry.key().bidder.clone(), uid));
            }
        }

        out
    }

    /// Deletes expired rows and rows stale per `stale_after`. Intended
    /// to be driven by a periodic background task.
    pub fn prune(&self, stale_after: Duration) -> usize {
        let now = epoch_timestamp();
        let stale_after = stale_after.as_secs();
        let before = self.rows.len();

        self.rows
            .retain(|_, row| row.expires_at > now && now.saturating_sub(row.last_used_at) < stale_after);

        let removed = before - self.rows.len();
        if removed > 0 {
            debug!(removed, "pruned expired/stale user-sync rows");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Spawns the periodic background pruning job. Runs until
/// the process exits; there is no explicit stop handle since the job
/// only ever deletes expired data and is safe to abandon at shutdown.
pub fn spawn_pruner(
    store: std::sync::Arc<UserSyncStore>,
    interval: Duration,
    stale_after: Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = store.prune(stale_after);
            if removed > 0 {
                info!(removed, "user-sync background prune completed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initiate_is_idempotent_and_keeps_uid_none() {
        let store = UserSyncStore::new(Duration::from_secs(90 * 24 * 60 * 60));
        store.initiate("fp1", "rubicon");
        store.initiate("fp1", "rubicon");
        assert_eq!(store.load("fp1").len(), 0);
    }

    #[test]
    fn complete_then_load_returns_pair() {
        let store = UserSyncStore::new(Duration::from_secs(90 * 24 * 60 * 60));
        store.initiate("fp1", "rubicon");
        store.complete("fp1", "rubicon", "uid-1".into());

        let loaded = store.load("fp1");
        assert_eq!(loaded, vec![("rubicon".to_string(), "uid-1".to_string())]);
    }

    #[test]
    fn second_complete_rotates_uid() {
        let store = UserSyncStore::new(Duration::from_secs(90 * 24 * 60 * 60));
        store.complete("fp1", "rubicon", "uid-1".into());
        store.complete("fp1", "rubicon", "uid-2".into());

        let loaded = store.load("fp1");
        assert_eq!(loaded, vec![("rubicon".to_string(), "uid-2".to_string())]);
    }

    #[test]
    fn prune_removes_expired_rows() {
        let store = UserSyncStore::new(Duration::from_secs(0));
        store.complete("fp1", "rubicon", "uid-1".into());
        std::thread::sleep(Duration::from_millis(1100));
        let removed = store.prune(Duration::from_secs(999_999));
        assert_eq!(removed, 1);
        assert!(store.is_empty());
    }
}
