use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::authorizer::AuthResult;

/// TTL-keyed cache of authorizer decisions, keyed by
/// `uri + ":" + serialized_body`. Caches both successes and failures so
/// a flapping upstream cannot be hammered by repeated identical
/// requests within the TTL.
pub struct AuthCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, AuthResult)>>,
}

impl AuthCache {
    pub fn new(ttl: Duration) -> Self {
        AuthCache {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_insert_with<F, Fut>(&self, key: String, compute: F) -> AuthResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AuthResult>,
    {
        {
            let guard = self.entries.lock().await;
            if let Some((expires_at, result)) = guard.get(&key) {
                if *expires_at > Instant::now() {
                    return result.clone();
                }
            }
        }
        let result = compute().await;
        let mut guard = self.entries.lock().await;
        guard.insert(key, (Instant::now() + self.ttl, result.clone()));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OptionMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn repeated_key_within_ttl_computes_once() {
        let cache = AuthCache::new(Duration::from_secs(10));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let result = cache
                .get_or_insert_with("k".to_owned(), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    AuthResult::Allow(OptionMap::new())
                })
                .await;
            assert!(matches!(result, AuthResult::Allow(_)));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_key_computes_separately() {
        let cache = AuthCache::new(Duration::from_secs(10));
        let calls = Arc::new(AtomicUsize::new(0));

        for key in ["a", "b"] {
            let calls = calls.clone();
            cache
                .get_or_insert_with(key.to_owned(), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    AuthResult::Deny
                })
                .await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_entry_is_recomputed() {
        let cache = AuthCache::new(Duration::from_millis(10));
        let calls = Arc::new(AtomicUsize::new(0));

        let compute = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            AuthResult::Deny
        };

        cache
            .get_or_insert_with("k".to_owned(), {
                let calls = calls.clone();
                move || compute(calls)
            })
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        cache
            .get_or_insert_with("k".to_owned(), {
                let calls = calls.clone();
                move || compute(calls)
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
