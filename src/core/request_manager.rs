//! Deduplicated, time-bounded execution of keyed asynchronous operations.
//!
//! Every operation is tracked under a request key until it settles. A second
//! submission under a key that is still pending joins the first one and
//! observes the identical outcome instead of starting another call.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::error::RequestError;

pub type Outcome<T> = Result<T, RequestError>;

type SharedOutcome<T> = Shared<BoxFuture<'static, Outcome<T>>>;

struct PendingOperation<T: Clone> {
    generation: u64,
    outcome: SharedOutcome<T>,
    cancel: CancellationToken,
}

type PendingMap<T> = Arc<Mutex<HashMap<String, PendingOperation<T>>>>;

fn lock<T: Clone>(
    pending: &Mutex<HashMap<String, PendingOperation<T>>>,
) -> MutexGuard<'_, HashMap<String, PendingOperation<T>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the bookkeeping entry when the operation settles, whichever way
/// it settles. The generation check keeps a stale guard from evicting a
/// newer operation that reused the key after `cancel_all`.
struct PendingGuard<T: Clone> {
    pending: PendingMap<T>,
    key: String,
    generation: u64,
}

impl<T: Clone> Drop for PendingGuard<T> {
    fn drop(&mut self) {
        let mut pending = lock(&self.pending);
        if pending
            .get(&self.key)
            .is_some_and(|entry| entry.generation == self.generation)
        {
            pending.remove(&self.key);
            debug!(key = %self.key, "request settled");
        }
    }
}

pub struct RequestManager<T: Clone> {
    pending: PendingMap<T>,
    next_generation: Arc<AtomicU64>,
}

impl<T: Clone> Clone for RequestManager<T> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
            next_generation: Arc::clone(&self.next_generation),
        }
    }
}

impl<T> Default for RequestManager<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestManager<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Runs `operation` under `key`, or joins the operation already pending
    /// under that key.
    ///
    /// Registration happens immediately, before the returned future is
    /// polled, so a [`cancel_all`](Self::cancel_all) issued right after
    /// `submit` always reaches the operation. The operation receives a
    /// cancellation token that fires on timeout or on cancellation. It is
    /// driven on its own task, so it settles and releases its key even if
    /// every caller stops awaiting the outcome.
    pub fn submit<F, Fut>(
        &self,
        key: &str,
        timeout: Duration,
        operation: F,
    ) -> impl Future<Output = Outcome<T>> + Send + 'static
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        self.start(key, timeout, operation)
    }

    fn start<F, Fut>(&self, key: &str, timeout: Duration, operation: F) -> SharedOutcome<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        if let Some(existing) = lock(&self.pending).get(key) {
            debug!(key, "joining pending request");
            return existing.outcome.clone();
        }

        // The operation may call back into the manager, so it runs unlocked
        let cancel = CancellationToken::new();
        let work = operation(cancel.clone());

        let mut pending = lock(&self.pending);
        if let Some(existing) = pending.get(key) {
            debug!(key, "joining request registered while starting");
            cancel.cancel();
            return existing.outcome.clone();
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            key: key.to_string(),
            generation,
        };
        let token = cancel.clone();
        let key_owned = key.to_string();

        let outcome = async move {
            let _guard = guard;
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(RequestError::Cancelled),
                result = work => result,
                _ = tokio::time::sleep(timeout) => {
                    debug!(key = %key_owned, ?timeout, "request timed out");
                    token.cancel();
                    Err(RequestError::Timeout)
                }
            }
        }
        .boxed()
        .shared();

        pending.insert(
            key.to_string(),
            PendingOperation {
                generation,
                outcome: outcome.clone(),
                cancel,
            },
        );
        drop(pending);

        let driver = outcome.clone();
        tokio::spawn(async move {
            let _ = driver.await;
        });

        debug!(key, generation, "request started");
        outcome
    }

    pub fn is_pending(&self, key: &str) -> bool {
        lock(&self.pending).contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Cancels one pending operation. Callers awaiting it observe
    /// [`RequestError::Cancelled`].
    pub fn cancel(&self, key: &str) -> bool {
        match lock(&self.pending).remove(key) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every pending operation and clears all bookkeeping at once.
    ///
    /// Cancellation is request-level: each operation's token fires, so
    /// operations that observe their token abort their I/O.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = lock(&self.pending).drain().collect();
        let count = drained.len();
        for (key, entry) in drained {
            debug!(key, "cancelling request");
            entry.cancel.cancel();
        }
        count
    }
}
