//! Trailing-edge save debouncing.
//!
//! Every [`SaveDebouncer::schedule`] for a key replaces the job pending for that key and restarts
//! its timer. A job only runs once its key has been quiet for the whole delay, so a burst of
//! edits costs a single save.

use hashbrown::HashMap;
use std::{
    future::Future,
    hash::Hash,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

type Job = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

struct Pending {
    /// Which schedule call this is. A timer only fires its job if it's still the newest.
    generation: u64,
    timer: tokio::task::AbortHandle,
    job: Job,
}

pub struct SaveDebouncer<K> {
    delay: Duration,
    runtime: tokio::runtime::Handle,
    generation: AtomicU64,
    pending: Arc<parking_lot::Mutex<HashMap<K, Pending>>>,
}

impl<K> SaveDebouncer<K>
where
    K: Eq + Hash + Clone + Send + std::fmt::Debug + 'static,
{
    /// Timers run on `runtime`.
    #[must_use]
    pub fn new(delay: Duration, runtime: tokio::runtime::Handle) -> Self {
        Self {
            delay,
            runtime,
            generation: AtomicU64::new(0),
            pending: Arc::default(),
        }
    }
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
    /// Run `job` once `key` has been quiet for the delay, replacing whatever was pending for it.
    pub fn schedule<F, Fut>(&self, key: K, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let job: Job = Box::new(move || Box::pin(job()));

        // Held across the spawn, so the timer can't look for its entry before it exists.
        let mut pending = self.pending.lock();
        let timer = {
            let pending = Arc::clone(&self.pending);
            let key = key.clone();
            let delay = self.delay;
            self.runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                let job = {
                    let mut pending = pending.lock();
                    let newest = pending
                        .get(&key)
                        .is_some_and(|entry| entry.generation == generation);
                    if newest {
                        pending.remove(&key).map(|entry| entry.job)
                    } else {
                        None
                    }
                };
                if let Some(job) = job {
                    log::trace!("debounced save of {key:?} firing");
                    job().await;
                }
            })
        };
        if let Some(replaced) = pending.insert(
            key,
            Pending {
                generation,
                timer: timer.abort_handle(),
                job,
            },
        ) {
            replaced.timer.abort();
        }
    }
    /// Drop the pending job for `key`. Returns whether there was one.
    pub fn cancel(&self, key: &K) -> bool {
        match self.pending.lock().remove(key) {
            Some(entry) => {
                entry.timer.abort();
                true
            }
            None => false,
        }
    }
    /// Number of keys with a job waiting.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
    /// Run every pending job now, without waiting out the delay.
    pub async fn flush(&self) {
        let jobs: Vec<(K, Job)> = self
            .pending
            .lock()
            .drain()
            .map(|(key, entry)| {
                entry.timer.abort();
                (key, entry.job)
            })
            .collect();
        for (key, job) in jobs {
            log::trace!("flushing save of {key:?}");
            job().await;
        }
    }
}
