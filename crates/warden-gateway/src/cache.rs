//! Read-through identity cache.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use warden_core::store::with_deadline;
use warden_core::{Identity, IdentityStore, StoreError, UserId};

/// How long a cached identity stays valid.
pub const IDENTITY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    identity: Identity,
    expires_at: Instant,
}

/// Identity lookups backed by an [`IdentityStore`].
///
/// When disabled, every lookup goes straight to the store. When enabled,
/// misses are fetched and cached for [`IDENTITY_TTL`]. Entries are whole
/// values replaced atomically per key, so racing misses may fetch twice
/// but never observe a partial record.
pub struct IdentityCache {
    store: Arc<dyn IdentityStore>,
    entries: DashMap<UserId, CacheEntry>,
    enabled: bool,
    max_entries: usize,
    ttl: Duration,
    store_timeout: Duration,
}

impl IdentityCache {
    /// Create a cache over `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn IdentityStore>,
        enabled: bool,
        max_entries: usize,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            entries: DashMap::new(),
            enabled,
            max_entries,
            ttl: IDENTITY_TTL,
            store_timeout,
        }
    }

    /// Whether lookups are cached.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fetch an identity.
    ///
    /// # Errors
    ///
    /// Returns the store's error on a miss, or [`StoreError::Timeout`] if
    /// the store does not answer within the configured deadline.
    pub async fn get(&self, id: UserId) -> Result<Identity, StoreError> {
        if !self.enabled {
            return self.fetch(id).await;
        }

        if let Some(identity) = self.lookup(id) {
            tracing::trace!(user_id = %id, "identity cache hit");
            return Ok(identity);
        }

        let identity = self.fetch(id).await?;
        self.populate(&identity);
        Ok(identity)
    }

    /// Cache an identity, replacing any existing entry.
    pub fn set(&self, identity: Identity) {
        if self.enabled {
            self.populate(&identity);
        }
    }

    /// Drop a cached identity.
    pub fn delete(&self, id: UserId) {
        self.entries.remove(&id);
    }

    /// Remove expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Number of cached entries, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, id: UserId) -> Option<Identity> {
        let entry = self.entries.get(&id)?;
        if entry.expires_at > Instant::now() {
            return Some(entry.identity.clone());
        }
        drop(entry);
        self.entries.remove_if(&id, |_, e| e.expires_at <= Instant::now());
        None
    }

    async fn fetch(&self, id: UserId) -> Result<Identity, StoreError> {
        with_deadline(self.store_timeout, self.store.get_by_id(id)).await
    }

    fn populate(&self, identity: &Identity) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&identity.id) {
            self.purge_expired();
            if self.entries.len() >= self.max_entries {
                tracing::warn!(
                    user_id = %identity.id,
                    max_entries = self.max_entries,
                    "identity cache full, not caching"
                );
                return;
            }
        }

        self.entries.insert(
            identity.id,
            CacheEntry {
                identity: identity.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

impl std::fmt::Debug for IdentityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCache")
            .field("enabled", &self.enabled)
            .field("entries", &self.entries.len())
            .field("max_entries", &self.max_entries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use warden_core::Role;

    /// In-memory identity store that counts lookups.
    #[derive(Default)]
    pub(crate) struct CountingStore {
        pub(crate) users: Mutex<HashMap<UserId, Identity>>,
        pub(crate) calls: AtomicUsize,
        pub(crate) delay: Option<Duration>,
        pub(crate) fail: Option<StoreError>,
    }

    impl CountingStore {
        pub(crate) fn with(identities: impl IntoIterator<Item = Identity>) -> Self {
            let store = Self::default();
            {
                let mut users = store.users.lock().unwrap();
                for identity in identities {
                    users.insert(identity.id, identity);
                }
            }
            store
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IdentityStore for CountingStore {
        async fn get_by_id(&self, id: UserId) -> Result<Identity, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(err) = &self.fail {
                return Err(err.clone());
            }
            self.users
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound)
        }

        async fn get_by_username(&self, username: &str) -> Result<Identity, StoreError> {
            self.users
                .lock()
                .unwrap()
                .values()
                .find(|u| u.username == username)
                .cloned()
                .ok_or(StoreError::NotFound)
        }

        async fn get_by_email(&self, email: &str) -> Result<Identity, StoreError> {
            self.users
                .lock()
                .unwrap()
                .values()
                .find(|u| u.email == email)
                .cloned()
                .ok_or(StoreError::NotFound)
        }
    }

    pub(crate) fn identity(id: u64, role: &str) -> Identity {
        let role = Role::defaults()
            .into_iter()
            .find(|r| r.name == role)
            .unwrap();
        Identity {
            id: UserId(id),
            username: format!("user{id}"),
            email: format!("user{id}@example.com"),
            active: true,
            role,
            created_at: Utc::now(),
        }
    }

    fn cache(store: Arc<CountingStore>, enabled: bool) -> IdentityCache {
        IdentityCache::new(store, enabled, 100, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_hit_after_miss() {
        let store = Arc::new(CountingStore::with([identity(1, "user")]));
        let cache = cache(store.clone(), true);

        let first = cache.get(UserId(1)).await.unwrap();
        let second = cache.get(UserId(1)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, identity_from(&store, 1));
        assert_eq!(store.calls(), 1);
        assert_eq!(cache.len(), 1);
    }

    fn identity_from(store: &CountingStore, id: u64) -> Identity {
        store.users.lock().unwrap()[&UserId(id)].clone()
    }

    #[tokio::test]
    async fn test_disabled_bypasses_cache() {
        let store = Arc::new(CountingStore::with([identity(1, "user")]));
        let cache = cache(store.clone(), false);

        for _ in 0..3 {
            let got = cache.get(UserId(1)).await.unwrap();
            assert_eq!(got, identity_from(&store, 1));
        }
        assert_eq!(store.calls(), 3);
        assert!(cache.is_empty());

        cache.set(identity(2, "admin"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let store = Arc::new(CountingStore::default());
        let cache = cache(store.clone(), true);

        assert_eq!(cache.get(UserId(9)).await, Err(StoreError::NotFound));
        assert_eq!(cache.get(UserId(9)).await, Err(StoreError::NotFound));
        assert_eq!(store.calls(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let store = Arc::new(CountingStore::with([identity(1, "user")]));
        let cache = cache(store.clone(), true);

        cache.get(UserId(1)).await.unwrap();
        tokio::time::advance(IDENTITY_TTL - Duration::from_secs(1)).await;
        cache.get(UserId(1)).await.unwrap();
        assert_eq!(store.calls(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        cache.get(UserId(1)).await.unwrap();
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = Arc::new(CountingStore::with([identity(1, "user"), identity(2, "user")]));
        let cache = cache(store, true);

        cache.get(UserId(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(3600)).await;
        cache.get(UserId(2)).await.unwrap();
        tokio::time::advance(IDENTITY_TTL - Duration::from_secs(1800)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_set_and_delete() {
        let store = Arc::new(CountingStore::with([identity(1, "user")]));
        let cache = cache(store.clone(), true);

        let mut promoted = identity(1, "moderator");
        promoted.username = "user1".to_string();
        cache.set(promoted.clone());
        assert_eq!(cache.get(UserId(1)).await.unwrap(), promoted);
        assert_eq!(store.calls(), 0);

        cache.delete(UserId(1));
        assert_eq!(cache.get(UserId(1)).await.unwrap().role.name, "user");
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn test_full_cache_still_serves_reads() {
        let store = Arc::new(CountingStore::with((1..=3).map(|i| identity(i, "user"))));
        let cache = IdentityCache::new(store.clone(), true, 2, Duration::from_secs(5));

        for i in 1..=3 {
            cache.get(UserId(i)).await.unwrap();
        }
        assert_eq!(cache.len(), 2);

        let third = cache.get(UserId(3)).await.unwrap();
        assert_eq!(third.id, UserId(3));
        assert_eq!(store.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_timeout() {
        let store = Arc::new(CountingStore {
            delay: Some(Duration::from_secs(30)),
            ..CountingStore::with([identity(1, "user")])
        });
        let cache = IdentityCache::new(store, true, 10, Duration::from_millis(100));

        assert_eq!(cache.get(UserId(1)).await, Err(StoreError::Timeout));
        assert!(cache.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_are_consistent() {
        let store = Arc::new(CountingStore {
            delay: Some(Duration::from_millis(10)),
            ..CountingStore::with([identity(1, "admin")])
        });
        let cache = Arc::new(cache(store.clone(), true));
        let expected = identity_from(&store, 1);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get(UserId(1)).await })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            assert_eq!(task.unwrap().unwrap(), expected);
        }
        assert!(store.calls() >= 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(UserId(1)).await.unwrap(), expected);
    }
}
