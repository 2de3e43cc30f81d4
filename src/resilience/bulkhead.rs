//! Concurrency limiter with a bounded, time-limited FIFO wait queue.

use crate::config::BulkheadConfig;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BulkheadError {
    #[error("Bulkhead '{name}' queue is full ({max_queue} waiting)")]
    QueueFull { name: String, max_queue: usize },

    #[error("Bulkhead '{name}' queue wait exceeded {}ms", .waited.as_millis())]
    QueueTimeout { name: String, waited: Duration },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkheadStats {
    pub active: usize,
    pub queued: usize,
    pub completed: u64,
    pub rejected: u64,
    pub timed_out: u64,
}

#[derive(Debug, Default)]
struct State {
    active: usize,
    waiting: VecDeque<u64>,
    next_ticket: u64,
    completed: u64,
    rejected: u64,
    timed_out: u64,
}

#[derive(Debug)]
pub struct Bulkhead {
    name: String,
    config: BulkheadConfig,
    state: Mutex<State>,
    available: Condvar,
}

/// Held while an admitted call runs; releases the slot on drop, panics
/// included.
struct Permit<'a> {
    bulkhead: &'a Bulkhead,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let mut state = self.bulkhead.state.lock();
        state.active -= 1;
        state.completed += 1;
        drop(state);
        self.bulkhead.available.notify_all();
    }
}

impl Bulkhead {
    pub fn new(name: impl Into<String>, config: BulkheadConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(State::default()),
            available: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `op` once a slot is free.
    ///
    /// Calls beyond `max_concurrent` wait in FIFO order; beyond `max_queue`
    /// waiting calls, or after `queue_timeout`, they fail without running.
    pub fn execute<T, F>(&self, op: F) -> Result<T, BulkheadError>
    where
        F: FnOnce() -> T,
    {
        let _permit = self.acquire()?;
        Ok(op())
    }

    fn acquire(&self) -> Result<Permit<'_>, BulkheadError> {
        let max_concurrent = self.config.max_concurrent.max(1);
        let mut state = self.state.lock();

        if state.active < max_concurrent && state.waiting.is_empty() {
            state.active += 1;
            return Ok(Permit { bulkhead: self });
        }

        if state.waiting.len() >= self.config.max_queue {
            state.rejected += 1;
            tracing::debug!(bulkhead = %self.name, "Bulkhead queue full, rejecting call");
            return Err(BulkheadError::QueueFull {
                name: self.name.clone(),
                max_queue: self.config.max_queue,
            });
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiting.push_back(ticket);

        let started = Instant::now();
        let deadline = started + self.config.queue_timeout();
        loop {
            if state.waiting.front() == Some(&ticket) && state.active < max_concurrent {
                state.waiting.pop_front();
                state.active += 1;
                drop(state);
                // The next waiter may be admissible too.
                self.available.notify_all();
                return Ok(Permit { bulkhead: self });
            }

            if self.available.wait_until(&mut state, deadline).timed_out()
                && !(state.waiting.front() == Some(&ticket) && state.active < max_concurrent)
            {
                state.waiting.retain(|t| *t != ticket);
                state.timed_out += 1;
                drop(state);
                self.available.notify_all();
                tracing::debug!(bulkhead = %self.name, "Bulkhead queue wait timed out");
                return Err(BulkheadError::QueueTimeout {
                    name: self.name.clone(),
                    waited: started.elapsed(),
                });
            }
        }
    }

    pub fn stats(&self) -> BulkheadStats {
        let state = self.state.lock();
        BulkheadStats {
            active: state.active,
            queued: state.waiting.len(),
            completed: state.completed,
            rejected: state.rejected,
            timed_out: state.timed_out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn bulkhead(max_concurrent: usize, max_queue: usize, timeout_ms: u64) -> Arc<Bulkhead> {
        Arc::new(Bulkhead::new(
            "scanner",
            BulkheadConfig {
                max_concurrent,
                max_queue,
                queue_timeout_ms: timeout_ms,
            },
        ))
    }

    #[test]
    fn test_concurrency_is_capped() {
        let bulkhead = bulkhead(2, 10, 5_000);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let (bulkhead, running, peak) = (bulkhead.clone(), running.clone(), peak.clone());
                thread::spawn(move || {
                    bulkhead
                        .execute(|| {
                            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            running.fetch_sub(1, Ordering::SeqCst);
                        })
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(bulkhead.stats().completed, 6);
    }

    #[test]
    fn test_queue_full_rejects() {
        let bulkhead = bulkhead(1, 0, 5_000);
        let (entered_tx, entered_rx) = channel::bounded(0);
        let (release_tx, release_rx) = channel::bounded::<()>(0);

        let holder = {
            let bulkhead = bulkhead.clone();
            thread::spawn(move || {
                bulkhead
                    .execute(|| {
                        entered_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                    })
                    .unwrap();
            })
        };
        entered_rx.recv().unwrap();

        let result = bulkhead.execute(|| ());
        assert!(matches!(result, Err(BulkheadError::QueueFull { max_queue: 0, .. })));

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert_eq!(bulkhead.stats().rejected, 1);
    }

    #[test]
    fn test_queue_timeout_skips_stale_work() {
        let bulkhead = bulkhead(1, 5, 30);
        let (entered_tx, entered_rx) = channel::bounded(0);
        let (release_tx, release_rx) = channel::bounded::<()>(0);

        let holder = {
            let bulkhead = bulkhead.clone();
            thread::spawn(move || {
                bulkhead
                    .execute(|| {
                        entered_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                    })
                    .unwrap();
            })
        };
        entered_rx.recv().unwrap();

        let ran = AtomicUsize::new(0);
        let result = bulkhead.execute(|| ran.fetch_add(1, Ordering::SeqCst));
        assert!(matches!(result, Err(BulkheadError::QueueTimeout { .. })));
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        let stats = bulkhead.stats();
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.queued, 0);
    }
}
