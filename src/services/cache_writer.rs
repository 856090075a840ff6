use tokio::runtime::Handle;
use tracing::{error, info, Instrument, Span};

use crate::models::Prediction;
use crate::services::hashing::CacheKey;
use crate::services::valkey::CacheStore;

/// Spawns a detached cache write. Failures are logged and never retried.
fn spawn_write(runtime: &Handle, span: Span, store: CacheStore, key: CacheKey, value: Prediction) {
    runtime.spawn(
        async move {
            info!("Started background task to write to Valkey");
            match store.write(&key, &value).await {
                Ok(()) => info!("Successfully ended background task to write to Valkey"),
                Err(e) => error!(
                    error_code = e.error_code(),
                    error = %e,
                    "Background write to Valkey failed"
                ),
            }
        }
        .instrument(span),
    );
}

/// A cache write that starts when this value is dropped. Handlers keep it
/// alive inside the response body, so the write begins once the response
/// has been handed off, and it runs even if the client went away.
pub struct DeferredCacheWrite {
    pending: Option<PendingWrite>,
}

struct PendingWrite {
    runtime: Handle,
    span: Span,
    store: CacheStore,
    key: CacheKey,
    value: Prediction,
}

impl DeferredCacheWrite {
    /// Must be called from within the runtime; the request span at this
    /// point becomes the parent of the write's span.
    pub fn new(store: CacheStore, key: CacheKey, value: Prediction) -> Self {
        let span = tracing::info_span!("cache_write", key = %key);
        Self {
            pending: Some(PendingWrite {
                runtime: Handle::current(),
                span,
                store,
                key,
                value,
            }),
        }
    }
}

impl Drop for DeferredCacheWrite {
    fn drop(&mut self) {
        if let Some(write) = self.pending.take() {
            spawn_write(&write.runtime, write.span, write.store, write.key, write.value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppResult;
    use crate::models::{ApiVersion, LabelPrediction};
    use crate::services::hashing::calculate_hash;
    use crate::services::valkey::CacheConnector;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingConnector {
        sets: AtomicUsize,
    }

    #[async_trait]
    impl CacheConnector for CountingConnector {
        async fn is_alive(&self) -> AppResult<()> {
            Ok(())
        }

        async fn get(&self, _key: &str) -> AppResult<Option<String>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: String) -> AppResult<()> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) {}
    }

    fn parts(connector: Arc<CountingConnector>) -> (CacheStore, CacheKey, Prediction) {
        (
            CacheStore::new(connector),
            CacheKey::new(ApiVersion::V1, &calculate_hash(b"%PDF-1.4")),
            Prediction::Label(LabelPrediction { label: 1 }),
        )
    }

    #[test]
    fn write_survives_the_runtime_context_it_was_dropped_from() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let connector = Arc::new(CountingConnector::default());
        let (store, key, value) = parts(connector.clone());

        let deferred = runtime.block_on(async { DeferredCacheWrite::new(store, key, value) });
        drop(deferred);

        runtime.block_on(async {
            for _ in 0..100 {
                if connector.sets.load(Ordering::SeqCst) == 1 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("write dropped outside the runtime never ran");
        });
    }

    #[tokio::test]
    async fn deferred_write_waits_for_drop() {
        let connector = Arc::new(CountingConnector::default());
        let (store, key, value) = parts(connector.clone());

        let deferred = DeferredCacheWrite::new(store, key, value);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(connector.sets.load(Ordering::SeqCst), 0);

        drop(deferred);
        for _ in 0..100 {
            if connector.sets.load(Ordering::SeqCst) == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("deferred write never ran");
    }
}
