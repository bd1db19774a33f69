use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::{Result, SolverError};

use super::types::{EngineFactory, PageSegMode, RecognitionEngine, RecognitionResult};

type EngineSlot = Option<Box<dyn RecognitionEngine>>;

enum EngineBackend {
    PerAttempt,
    Shared { slot: Arc<Mutex<EngineSlot>> },
    Unavailable { reason: String },
}

/// Hands out recognition engines to pipeline attempts.
///
/// In per-attempt mode every lease owns a fresh engine that is released when
/// the lease drops. In shared mode a single engine lives behind a mutex, so
/// leases are serialized, and a lease whose recognition call failed tears the
/// engine down on drop, as does one unwound by a panic inside the engine;
/// the next lease recreates it.
pub struct EngineProvider {
    factory: Arc<dyn EngineFactory>,
    backend: EngineBackend,
}

impl EngineProvider {
    pub fn new(factory: Arc<dyn EngineFactory>, reuse_engine: bool) -> Self {
        let backend = match factory.create() {
            Ok(engine) if reuse_engine => {
                info!(engine = factory.name(), "Shared recognition engine initialized");
                EngineBackend::Shared {
                    slot: Arc::new(Mutex::new(Some(engine))),
                }
            }
            Ok(_startup) => {
                info!(engine = factory.name(), "Recognition engine available");
                EngineBackend::PerAttempt
            }
            Err(e) => {
                let reason = format!("{} unavailable: {e}", factory.name());
                warn!("{}", reason);
                EngineBackend::Unavailable { reason }
            }
        };

        Self { factory, backend }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self.backend, EngineBackend::Unavailable { .. })
    }

    pub fn engine_name(&self) -> &str {
        self.factory.name()
    }

    /// Acquire an engine for one attempt. Blocks while a shared engine is leased.
    ///
    /// Must be called from a blocking context (not directly on an async task).
    pub fn acquire(&self) -> Result<EngineLease<'_>> {
        match &self.backend {
            EngineBackend::PerAttempt => {
                let engine = self.factory.create()?;
                debug!(engine = self.factory.name(), "Acquired recognition engine");
                Ok(EngineLease {
                    slot: LeaseSlot::Owned(engine),
                    reset_on_drop: false,
                })
            }
            EngineBackend::Shared { slot } => {
                let mut guard = slot.blocking_lock();
                if guard.is_none() {
                    info!(engine = self.factory.name(), "Recreating shared recognition engine");
                    *guard = Some(self.factory.create()?);
                }
                Ok(EngineLease {
                    slot: LeaseSlot::Shared(guard),
                    reset_on_drop: false,
                })
            }
            EngineBackend::Unavailable { reason } => {
                Err(SolverError::EngineUnavailable(reason.clone()))
            }
        }
    }
}

impl Clone for EngineProvider {
    fn clone(&self) -> Self {
        let backend = match &self.backend {
            EngineBackend::PerAttempt => EngineBackend::PerAttempt,
            EngineBackend::Shared { slot } => EngineBackend::Shared {
                slot: Arc::clone(slot),
            },
            EngineBackend::Unavailable { reason } => EngineBackend::Unavailable {
                reason: reason.clone(),
            },
        };

        Self {
            factory: Arc::clone(&self.factory),
            backend,
        }
    }
}

enum LeaseSlot<'a> {
    Owned(Box<dyn RecognitionEngine>),
    Shared(MutexGuard<'a, EngineSlot>),
}

/// Exclusive use of one engine for the duration of an attempt.
pub struct EngineLease<'a> {
    slot: LeaseSlot<'a>,
    reset_on_drop: bool,
}

impl EngineLease<'_> {
    pub fn recognize(
        &mut self,
        image: &[u8],
        whitelist: &str,
        mode: PageSegMode,
    ) -> Result<RecognitionResult> {
        // stays set if the engine unwinds out of the call
        let reset = std::mem::replace(&mut self.reset_on_drop, true);
        let result = match &mut self.slot {
            LeaseSlot::Owned(engine) => engine.recognize(image, whitelist, mode),
            LeaseSlot::Shared(guard) => match guard.as_mut() {
                Some(engine) => engine.recognize(image, whitelist, mode),
                None => Err(SolverError::EngineUnavailable(
                    "shared engine was torn down".to_string(),
                )),
            },
        };

        self.reset_on_drop = reset || result.is_err();
        result
    }
}

impl Drop for EngineLease<'_> {
    fn drop(&mut self) {
        match &mut self.slot {
            LeaseSlot::Owned(_) => debug!("Released recognition engine"),
            LeaseSlot::Shared(guard) => {
                if self.reset_on_drop && guard.take().is_some() {
                    warn!("Tearing down shared recognition engine after a failed call");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        created: AtomicUsize,
        dropped: AtomicUsize,
    }

    struct CountingEngine {
        counters: Arc<Counters>,
        fail: bool,
        panic: bool,
    }

    impl RecognitionEngine for CountingEngine {
        fn recognize(&mut self, _: &[u8], _: &str, _: PageSegMode) -> Result<RecognitionResult> {
            if self.panic {
                panic!("engine crashed mid-call");
            }
            if self.fail {
                Err(SolverError::Recognition("engine exploded".to_string()))
            } else {
                Ok(RecognitionResult::default())
            }
        }
    }

    impl Drop for CountingEngine {
        fn drop(&mut self) {
            self.counters.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingFactory {
        counters: Arc<Counters>,
        fail_calls: bool,
        panic_calls: bool,
        unavailable: bool,
    }

    impl CountingFactory {
        fn new(fail_calls: bool) -> (Arc<Self>, Arc<Counters>) {
            let counters = Arc::new(Counters::default());
            let factory = Arc::new(Self {
                counters: Arc::clone(&counters),
                fail_calls,
                panic_calls: false,
                unavailable: false,
            });
            (factory, counters)
        }
    }

    impl EngineFactory for CountingFactory {
        fn create(&self) -> Result<Box<dyn RecognitionEngine>> {
            if self.unavailable {
                return Err(SolverError::EngineUnavailable("no tessdata".to_string()));
            }
            self.counters.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingEngine {
                counters: Arc::clone(&self.counters),
                fail: self.fail_calls,
                panic: self.panic_calls,
            }))
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn created(c: &Counters) -> usize {
        c.created.load(Ordering::SeqCst)
    }

    fn dropped(c: &Counters) -> usize {
        c.dropped.load(Ordering::SeqCst)
    }

    #[test]
    fn test_per_attempt_leases_release_exactly_once() {
        let (factory, counters) = CountingFactory::new(false);
        let provider = EngineProvider::new(factory, false);
        // availability check at startup
        assert_eq!((created(&counters), dropped(&counters)), (1, 1));

        for _ in 0..3 {
            let mut lease = provider.acquire().unwrap();
            lease.recognize(&[], "A", PageSegMode::SingleLine).unwrap();
        }
        assert_eq!((created(&counters), dropped(&counters)), (4, 4));
    }

    #[test]
    fn test_per_attempt_lease_released_on_failure() {
        let (factory, counters) = CountingFactory::new(true);
        let provider = EngineProvider::new(factory, false);

        {
            let mut lease = provider.acquire().unwrap();
            assert!(lease.recognize(&[], "A", PageSegMode::SingleLine).is_err());
        }
        assert_eq!(created(&counters), dropped(&counters));
    }

    #[test]
    fn test_shared_engine_is_reused() {
        let (factory, counters) = CountingFactory::new(false);
        let provider = EngineProvider::new(factory, true);

        for _ in 0..5 {
            let mut lease = provider.acquire().unwrap();
            lease.recognize(&[], "A", PageSegMode::SingleWord).unwrap();
        }
        assert_eq!((created(&counters), dropped(&counters)), (1, 0));
    }

    #[test]
    fn test_shared_engine_reset_after_failure() {
        let (factory, counters) = CountingFactory::new(true);
        let provider = EngineProvider::new(factory, true);

        {
            let mut lease = provider.acquire().unwrap();
            assert!(lease.recognize(&[], "A", PageSegMode::SingleWord).is_err());
        }
        assert_eq!((created(&counters), dropped(&counters)), (1, 1));

        let _lease = provider.acquire().unwrap();
        assert_eq!(created(&counters), 2);
    }

    #[test]
    fn test_shared_engine_reset_after_panic() {
        let counters = Arc::new(Counters::default());
        let factory = Arc::new(CountingFactory {
            counters: Arc::clone(&counters),
            fail_calls: false,
            panic_calls: true,
            unavailable: false,
        });
        let provider = EngineProvider::new(factory, true);

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut lease = provider.acquire().unwrap();
            let _ = lease.recognize(&[], "A", PageSegMode::SingleWord);
        }));
        assert!(unwound.is_err());
        assert_eq!((created(&counters), dropped(&counters)), (1, 1));

        let _lease = provider.acquire().unwrap();
        assert_eq!(created(&counters), 2);
    }

    #[test]
    fn test_successful_call_does_not_reset_shared_engine() {
        let (factory, counters) = CountingFactory::new(false);
        let provider = EngineProvider::new(factory, true);

        {
            let mut lease = provider.acquire().unwrap();
            lease.recognize(&[], "A", PageSegMode::SingleWord).unwrap();
            lease.recognize(&[], "A", PageSegMode::SingleChar).unwrap();
        }
        assert_eq!((created(&counters), dropped(&counters)), (1, 0));
    }

    #[test]
    fn test_unavailable_factory() {
        let counters = Arc::new(Counters::default());
        let factory = Arc::new(CountingFactory {
            counters,
            fail_calls: false,
            panic_calls: false,
            unavailable: true,
        });
        let provider = EngineProvider::new(factory, false);

        assert!(!provider.is_available());
        assert!(matches!(
            provider.acquire(),
            Err(SolverError::EngineUnavailable(_))
        ));
    }

    #[test]
    fn test_clone_shares_engine_slot() {
        let (factory, counters) = CountingFactory::new(false);
        let provider = EngineProvider::new(factory, true);
        let cloned = provider.clone();

        drop(provider.acquire().unwrap());
        drop(cloned.acquire().unwrap());
        assert_eq!(created(&counters), 1);
        assert!(cloned.is_available());
    }
}
