use std::{future::Future, hash::Hash, num::NonZeroUsize, sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use tokio::{sync::OnceCell, time::Instant};

use super::{cipher::CipherSet, clients::PlaybackContext};
use crate::common::{
    errors::Result,
    types::{PlayerScriptRef, SessionToken},
};

type Slot<T> = Arc<OnceCell<T>>;

/// Resolution state owned by one resolver.
///
/// Every slot is populated at most once until cleared. Concurrent first
/// demands for the same slot share a single in-flight derivation; a failed
/// derivation leaves the slot empty so the next caller tries again.
#[derive(Default)]
pub struct ResolutionCache {
    player_script: RwLock<Slot<PlayerScriptRef>>,
    session_token: RwLock<Slot<SessionToken>>,
    playback_contexts: DashMap<PlayerScriptRef, Slot<PlaybackContext>>,
    ciphers: DashMap<PlayerScriptRef, Slot<Arc<CipherSet>>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn player_script<F, Fut>(&self, derive: F) -> Result<PlayerScriptRef>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PlayerScriptRef>>,
    {
        let slot = self.player_script.read().clone();
        slot.get_or_try_init(derive).await.cloned()
    }

    pub async fn session_token<F, Fut>(&self, derive: F) -> Result<SessionToken>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SessionToken>>,
    {
        let slot = self.session_token.read().clone();
        slot.get_or_try_init(derive).await.cloned()
    }

    pub async fn playback_context<F, Fut>(
        &self,
        script: &PlayerScriptRef,
        derive: F,
    ) -> Result<PlaybackContext>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PlaybackContext>>,
    {
        let slot = keyed_slot(&self.playback_contexts, script);
        slot.get_or_try_init(derive).await.cloned()
    }

    pub async fn cipher<F, Fut>(
        &self,
        script: &PlayerScriptRef,
        derive: F,
    ) -> Result<Arc<CipherSet>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<CipherSet>>>,
    {
        let slot = keyed_slot(&self.ciphers, script);
        slot.get_or_try_init(derive).await.cloned()
    }

    pub fn cached_player_script(&self) -> Option<PlayerScriptRef> {
        self.player_script.read().get().cloned()
    }

    pub fn cached_session_token(&self) -> Option<SessionToken> {
        self.session_token.read().get().cloned()
    }

    pub fn has_playback_context(&self, script: &PlayerScriptRef) -> bool {
        self.playback_contexts
            .get(script)
            .is_some_and(|slot| slot.initialized())
    }

    /// Drops every slot. In-flight derivations finish into the detached slots.
    pub fn clear(&self) {
        *self.player_script.write() = Slot::default();
        *self.session_token.write() = Slot::default();
        self.playback_contexts.clear();
        self.ciphers.clear();
        tracing::debug!("resolution cache cleared");
    }
}

fn keyed_slot<K, T>(map: &DashMap<K, Slot<T>>, key: &K) -> Slot<T>
where
    K: Eq + Hash + Clone,
{
    // The map guard must not outlive this call: it is never held across an await.
    map.entry(key.clone()).or_default().value().clone()
}

/// Memoizes page bodies by URL.
#[async_trait]
pub trait PageCache: Send + Sync {
    async fn get_or_set(
        &self,
        key: &str,
        producer: BoxFuture<'_, Result<String>>,
    ) -> Result<String>;
}

/// Bounded least-recently-used page cache.
///
/// Concurrent callers for the same key share one fetch. A fetched body is
/// served for `ttl`, after which the next caller fetches it again.
pub struct LruPageCache {
    entries: Mutex<LruCache<String, PageEntry>>,
    ttl: Duration,
}

struct PageEntry {
    inserted: Instant,
    slot: Slot<String>,
}

impl PageEntry {
    fn new() -> Self {
        Self {
            inserted: Instant::now(),
            slot: Slot::default(),
        }
    }

    /// In-flight fetches never expire.
    fn is_expired(&self, ttl: Duration) -> bool {
        self.slot.initialized() && self.inserted.elapsed() >= ttl
    }
}

impl LruPageCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PageCache for LruPageCache {
    async fn get_or_set(
        &self,
        key: &str,
        producer: BoxFuture<'_, Result<String>>,
    ) -> Result<String> {
        let slot = {
            let mut entries = self.entries.lock();
            match entries.get(key) {
                Some(entry) if !entry.is_expired(self.ttl) => entry.slot.clone(),
                _ => {
                    let entry = PageEntry::new();
                    let slot = entry.slot.clone();
                    entries.put(key.to_string(), entry);
                    slot
                }
            }
        };

        slot.get_or_try_init(|| producer).await.cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    use futures::FutureExt;

    use super::*;
    use crate::common::errors::ResolveError;

    fn script(url: &str) -> PlayerScriptRef {
        PlayerScriptRef(url.to_string())
    }

    #[tokio::test]
    async fn test_concurrent_first_use_derives_once() {
        let cache = ResolutionCache::new();
        let derivations = AtomicU32::new(0);
        let counter = &derivations;
        let key = script("https://www.youtube.com/s/player/abc/base.js");

        let derive = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, ResolveError>(PlaybackContext {
                signature_timestamp: Some(19_999),
            })
        };

        let (a, b) = tokio::join!(
            cache.playback_context(&key, derive),
            cache.playback_context(&key, derive)
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(derivations.load(Ordering::SeqCst), 1);
        assert!(cache.has_playback_context(&key));
    }

    #[tokio::test]
    async fn test_failed_derivation_is_not_cached() {
        let cache = ResolutionCache::new();

        let err = cache
            .session_token(|| async { Err(ResolveError::not_found("watch.html", "visitor_data")) })
            .await;
        assert!(err.is_err());
        assert!(cache.cached_session_token().is_none());

        let token = cache
            .session_token(|| async { Ok(SessionToken("CgtWaXNpdG9y".into())) })
            .await
            .unwrap();
        assert_eq!(&*token, "CgtWaXNpdG9y");
        assert_eq!(cache.cached_session_token(), Some(token));
    }

    #[tokio::test]
    async fn test_clear_resets_every_slot() {
        let cache = ResolutionCache::new();
        let key = script("https://www.youtube.com/s/player/abc/base.js");

        cache.player_script(|| async { Ok(key.clone()) }).await.unwrap();
        cache
            .playback_context(&key, || async { Ok(PlaybackContext::default()) })
            .await
            .unwrap();
        assert_eq!(cache.cached_player_script(), Some(key.clone()));

        cache.clear();

        assert!(cache.cached_player_script().is_none());
        assert!(!cache.has_playback_context(&key));

        let replaced = cache
            .player_script(|| async { Ok(script("https://www.youtube.com/s/player/def/base.js")) })
            .await
            .unwrap();
        assert_eq!(&*replaced, "https://www.youtube.com/s/player/def/base.js");
    }

    #[tokio::test]
    async fn test_page_cache_shares_one_fetch() {
        let pages = LruPageCache::new(4, Duration::from_secs(10));
        let fetches = AtomicU32::new(0);
        let counter = &fetches;

        let fetch = move || {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, ResolveError>("<html></html>".to_string())
            }
            .boxed()
        };

        let (a, b) = tokio::join!(
            pages.get_or_set("https://www.youtube.com/watch?v=a", fetch()),
            pages.get_or_set("https://www.youtube.com/watch?v=a", fetch())
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(pages.len(), 1);
    }

    #[tokio::test]
    async fn test_page_cache_evicts_least_recent() {
        let pages = LruPageCache::new(1, Duration::from_secs(10));

        for url in ["https://a.test", "https://b.test"] {
            pages
                .get_or_set(url, async move { Ok::<_, ResolveError>(url.to_string()) }.boxed())
                .await
                .unwrap();
        }

        assert_eq!(pages.len(), 1);
        let body = pages
            .get_or_set(
                "https://a.test",
                async { Ok::<_, ResolveError>("refetched".to_string()) }.boxed(),
            )
            .await
            .unwrap();
        assert_eq!(body, "refetched");
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_cache_entries_expire() {
        let pages = LruPageCache::new(4, Duration::from_secs(1));
        let fetch =
            |body: &'static str| async move { Ok::<_, ResolveError>(body.to_string()) }.boxed();

        let first = pages.get_or_set("https://a.test", fetch("first")).await.unwrap();
        let cached = pages.get_or_set("https://a.test", fetch("second")).await.unwrap();
        assert_eq!(first, "first");
        assert_eq!(cached, "first");

        tokio::time::advance(Duration::from_secs(1)).await;

        let refetched = pages.get_or_set("https://a.test", fetch("third")).await.unwrap();
        assert_eq!(refetched, "third");
        assert_eq!(pages.len(), 1);
    }
}
