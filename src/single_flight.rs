use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};

type Inflight = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Per-key async lock map: at most one holder per key at a time.
///
/// Lock entries are removed when the last holder releases and nobody waits.
#[derive(Clone, Default)]
pub struct SingleFlight {
    inflight: Inflight,
}

/// Held while the owner works on `key`.
pub struct FlightGuard {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    inflight: Inflight,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> FlightGuard {
        let lock = {
            let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(
                inflight
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        FlightGuard {
            key: key.to_string(),
            guard: Some(lock.lock_owned().await),
            inflight: self.inflight.clone(),
        }
    }

    /// Number of keys with a holder or waiter.
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(guard) = self.guard.take() {
            // map entry + this guard; anything more is a waiter
            if Arc::strong_count(OwnedMutexGuard::mutex(&guard)) <= 2 {
                inflight.remove(&self.key);
            }
            drop(guard);
        }
    }
}
