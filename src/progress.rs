//! Bounded, non-blocking progress channel between adapter tasks and the
//! single stream subscriber.
//!
//! Sending never waits. When the queue is full the oldest queued non-terminal
//! event is evicted; if every queued event is terminal the incoming event is
//! dropped instead. The receiver sees end-of-stream once every sink is gone.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

use crate::models::ProgressEvent;

struct Shared {
    queue: Mutex<VecDeque<ProgressEvent>>,
    capacity: usize,
    notify: Notify,
    senders: AtomicUsize,
    dropped: AtomicU64,
    receiver_gone: AtomicBool,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, VecDeque<ProgressEvent>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Creates a channel holding at most `capacity` undelivered events.
pub fn progress_channel(capacity: usize) -> (ProgressSink, ProgressReceiver) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        capacity: capacity.max(1),
        notify: Notify::new(),
        senders: AtomicUsize::new(1),
        dropped: AtomicU64::new(0),
        receiver_gone: AtomicBool::new(false),
    });
    (
        ProgressSink {
            shared: shared.clone(),
        },
        ProgressReceiver { shared },
    )
}

/// Producer handle; clone one per task.
pub struct ProgressSink {
    shared: Arc<Shared>,
}

impl ProgressSink {
    /// Queues `event` without blocking. Returns false if it was not queued.
    pub fn send(&self, event: ProgressEvent) -> bool {
        if self.shared.receiver_gone.load(Ordering::Acquire) {
            return false;
        }

        {
            let mut queue = self.shared.queue();
            if queue.len() >= self.shared.capacity {
                match queue.iter().position(|e| !e.status.is_terminal()) {
                    Some(oldest) => {
                        if let Some(evicted) = queue.remove(oldest) {
                            tracing::debug!(
                                "Progress buffer full; evicted {:?} event for {}",
                                evicted.status,
                                evicted.source
                            );
                        }
                        self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    None => {
                        let total = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        tracing::debug!(
                            "Progress buffer full; dropped {:?} event for {} ({} so far)",
                            event.status,
                            event.source,
                            total
                        );
                        return false;
                    }
                }
            }
            queue.push_back(event);
        }

        self.shared.notify.notify_one();
        true
    }
}

impl Clone for ProgressSink {
    fn clone(&self) -> Self {
        self.shared.senders.fetch_add(1, Ordering::AcqRel);
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl Drop for ProgressSink {
    fn drop(&mut self) {
        if self.shared.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.notify.notify_one();
        }
    }
}

/// Consumer handle.
pub struct ProgressReceiver {
    shared: Arc<Shared>,
}

impl ProgressReceiver {
    /// Next event, or `None` once the queue is drained and every sink dropped.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            if let Some(event) = self.shared.queue().pop_front() {
                return Some(event);
            }
            if self.shared.senders.load(Ordering::Acquire) == 0 {
                // a sender may have pushed right before dropping
                return self.shared.queue().pop_front();
            }
            self.shared.notify.notified().await;
        }
    }

    /// Events lost to overflow so far.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for ProgressReceiver {
    fn drop(&mut self) {
        self.shared.receiver_gone.store(true, Ordering::Release);
    }
}
