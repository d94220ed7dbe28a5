//! Short-lived deduplication of identical in-flight reads.
//!
//! # Design
//! Each entry holds a `Shared` future: the first caller's attempt sequence,
//! cloneable so later callers with the same canonical key await the same
//! outcome instead of starting their own. The future removes its own entry
//! when it settles. Entries that never settle (every waiter dropped, or a
//! pathologically slow backend) are swept on the next access once they are
//! older than the dedup window.
//!
//! Lookup-or-insert happens under one lock, so two callers can never both
//! decide to create an entry for the same key. The lock is never held
//! across an `.await`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::types::Outcome;

pub type SharedOutcome = Shared<BoxFuture<'static, Outcome>>;

struct PendingEntry {
    /// Distinguishes this entry from a later one under the same key.
    generation: u64,
    created_at: Instant,
    outcome: SharedOutcome,
}

#[derive(Default)]
struct Entries {
    by_key: HashMap<String, PendingEntry>,
    next_generation: u64,
}

impl Entries {
    fn sweep(&mut self, now: Instant, window: Duration) {
        self.by_key.retain(|key, entry| {
            let live = now.duration_since(entry.created_at) < window;
            if !live {
                trace!(key = %key, "dropping stale in-flight entry");
            }
            live
        });
    }

    fn remove_if_current(&mut self, key: &str, generation: u64) {
        if self
            .by_key
            .get(key)
            .is_some_and(|entry| entry.generation == generation)
        {
            self.by_key.remove(key);
        }
    }
}

pub struct InFlightRegistry {
    window: Duration,
    entries: Arc<Mutex<Entries>>,
}

impl InFlightRegistry {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Arc::new(Mutex::new(Entries::default())),
        }
    }

    /// Join the live outcome for `key`, or start one with `factory`.
    ///
    /// `factory` runs under the registry lock and must only build the
    /// future, not poll it or touch the registry.
    pub fn get_or_create<F, Fut>(&self, key: &str, factory: F) -> SharedOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let mut entries = self.entries.lock();
        entries.sweep(Instant::now(), self.window);

        if let Some(entry) = entries.by_key.get(key) {
            trace!(key = %key, "joining in-flight request");
            return entry.outcome.clone();
        }

        let generation = entries.next_generation;
        entries.next_generation += 1;

        let registry: Weak<Mutex<Entries>> = Arc::downgrade(&self.entries);
        let owned_key = key.to_string();
        let work = factory();
        let outcome = async move {
            let outcome = work.await;
            if let Some(entries) = registry.upgrade() {
                entries.lock().remove_if_current(&owned_key, generation);
            }
            outcome
        }
        .boxed()
        .shared();

        entries.by_key.insert(
            key.to_string(),
            PendingEntry {
                generation,
                created_at: Instant::now(),
                outcome: outcome.clone(),
            },
        );
        outcome
    }

    /// Forget every pending entry. Callers already awaiting one keep their
    /// handle; new callers start fresh.
    pub fn clear(&self) {
        self.entries.lock().by_key.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
