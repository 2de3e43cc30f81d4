//! Supervised pool of worker threads.
//!
//! A single supervisor thread owns all scheduling state: the FIFO queue,
//! the worker slots and the reply channels of in-flight tasks. Callers,
//! workers and the pool handle all talk to it through one channel, so
//! every task gets exactly one result no matter how its worker ends.
//!
//! A panic inside a worker is a crash. The worker reports it and exits;
//! the supervisor fails the in-flight task with
//! [`TaskError::WorkerCrashed`] and respawns the slot, delaying the
//! respawn once the slot used up its restart budget.

use super::executor::TaskExecutor;
use super::handle::{task_channel, Reply, TaskHandle};
use crate::config::SchedulerConfig;
use crate::core::{Task, TaskOutput};
use crate::errors::{Error, Result, TaskError};
use crate::events::{EventBus, PipelineEvent};
use crate::observability::{panic_message, truncate};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Point-in-time view of the pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Live worker threads
    pub workers: usize,
    pub idle: usize,
    pub queued: usize,
    pub in_flight: usize,
    /// Tasks that produced output
    pub completed: u64,
    /// Tasks that produced an error, crashes included
    pub failed: u64,
    pub crashed: u64,
    pub respawned: u64,
}

enum Message {
    Submit(Task, Reply),
    Finished {
        slot: usize,
        outcome: std::result::Result<TaskOutput, TaskError>,
    },
    Crashed {
        slot: usize,
        reason: String,
    },
    Shutdown,
}

pub struct WorkerPool {
    sender: Sender<Message>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<Mutex<PoolStats>>,
    size: usize,
}

impl WorkerPool {
    /// Start `config.max_workers` workers running tasks through `executor`.
    pub fn new(
        config: &SchedulerConfig,
        executor: Arc<dyn TaskExecutor>,
        events: EventBus,
    ) -> Result<Self> {
        if config.max_workers == 0 {
            return Err(Error::config("max_workers must be greater than 0"));
        }

        let (sender, receiver) = channel::unbounded();
        let stats = Arc::new(Mutex::new(PoolStats::default()));
        let mut supervisor = Supervisor {
            slots: (0..config.max_workers).map(|_| Slot::default()).collect(),
            queue: VecDeque::new(),
            pending_respawns: Vec::new(),
            receiver,
            sender: sender.clone(),
            executor,
            events,
            stats: Arc::clone(&stats),
            counters: Counters::default(),
            max_restarts: config.max_restarts,
            restart_window: config.restart_window(),
            restart_backoff: config.restart_backoff(),
        };
        for slot in 0..config.max_workers {
            supervisor.spawn_worker(slot)?;
        }
        supervisor.publish_stats();

        let handle = thread::Builder::new()
            .name("vigil-supervisor".to_string())
            .spawn(move || supervisor.run())?;

        tracing::debug!(workers = config.max_workers, "Worker pool started");
        Ok(Self {
            sender,
            supervisor: Mutex::new(Some(handle)),
            stats,
            size: config.max_workers,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue a task. Never blocks; the handle yields the result.
    ///
    /// After shutdown the handle resolves immediately to
    /// [`TaskError::PoolShutdown`].
    pub fn submit(&self, task: Task) -> TaskHandle {
        let (reply, handle) = task_channel(&task);
        if let Err(channel::SendError(Message::Submit(_, reply))) =
            self.sender.send(Message::Submit(task, reply))
        {
            reply.fail(None, TaskError::PoolShutdown);
        }
        handle
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.lock().clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.supervisor.lock().is_none()
    }

    /// Fail every queued and in-flight task with `PoolShutdown` and detach
    /// the workers. Idempotent.
    pub fn shutdown(&self) {
        let Some(handle) = self.supervisor.lock().take() else {
            return;
        };
        let _ = self.sender.send(Message::Shutdown);
        if handle.join().is_err() {
            tracing::error!("Worker pool supervisor panicked during shutdown");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("stats", &self.stats())
            .finish()
    }
}

#[derive(Default)]
struct Slot {
    /// Task channel of the live worker; `None` while the slot awaits respawn
    worker: Option<Sender<Task>>,
    in_flight: Option<Reply>,
    restarts: VecDeque<Instant>,
    total_restarts: u32,
}

impl Slot {
    fn is_idle(&self) -> bool {
        self.worker.is_some() && self.in_flight.is_none()
    }
}

#[derive(Default)]
struct Counters {
    completed: u64,
    failed: u64,
    crashed: u64,
    respawned: u64,
}

struct Supervisor {
    slots: Vec<Slot>,
    queue: VecDeque<(Task, Reply)>,
    pending_respawns: Vec<(usize, Instant)>,
    receiver: Receiver<Message>,
    sender: Sender<Message>,
    executor: Arc<dyn TaskExecutor>,
    events: EventBus,
    stats: Arc<Mutex<PoolStats>>,
    counters: Counters,
    max_restarts: u32,
    restart_window: Duration,
    restart_backoff: Duration,
}

impl Supervisor {
    fn run(mut self) {
        loop {
            let message = match self.next_respawn_at() {
                Some(at) => {
                    match self
                        .receiver
                        .recv_timeout(at.saturating_duration_since(Instant::now()))
                    {
                        Ok(message) => Some(message),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match self.receiver.recv() {
                    Ok(message) => Some(message),
                    Err(_) => break,
                },
            };

            match message {
                Some(Message::Submit(task, reply)) => self.enqueue(task, reply),
                Some(Message::Finished { slot, outcome }) => self.finish(slot, outcome),
                Some(Message::Crashed { slot, reason }) => self.crash(slot, reason),
                Some(Message::Shutdown) => break,
                None => {}
            }

            self.respawn_due();
            self.dispatch();
            self.publish_stats();
        }

        self.fail_everything();
    }

    fn enqueue(&mut self, task: Task, reply: Reply) {
        if !self.slots.iter().any(Slot::is_idle) {
            self.events.emit(PipelineEvent::QueueFull {
                queued: self.queue.len() + 1,
            });
        }
        self.queue.push_back((task, reply));
    }

    fn dispatch(&mut self) {
        while !self.queue.is_empty() {
            let Some(slot) = self.slots.iter().position(Slot::is_idle) else {
                return;
            };
            let Some((task, reply)) = self.queue.pop_front() else {
                return;
            };
            let Some(worker) = self.slots[slot].worker.as_ref() else {
                return;
            };

            match worker.send(task) {
                Ok(()) => self.slots[slot].in_flight = Some(reply),
                Err(channel::SendError(task)) => {
                    // Worker exited without reporting; put the task back and
                    // take the slot out of rotation until the crash arrives.
                    tracing::warn!(slot, "Worker channel closed unexpectedly");
                    self.slots[slot].worker = None;
                    self.queue.push_front((task, reply));
                }
            }
        }
    }

    fn finish(&mut self, slot: usize, outcome: std::result::Result<TaskOutput, TaskError>) {
        let Some(reply) = self.slots.get_mut(slot).and_then(|s| s.in_flight.take()) else {
            tracing::warn!(slot, "Result from a worker with no task in flight");
            return;
        };
        match &outcome {
            Ok(_) => self.counters.completed += 1,
            Err(_) => self.counters.failed += 1,
        }
        // Stats must already count the task when its caller wakes up.
        self.publish_stats();
        reply.send(Some(slot), outcome);
    }

    fn crash(&mut self, slot: usize, reason: String) {
        self.counters.crashed += 1;
        let Some(state) = self.slots.get_mut(slot) else {
            return;
        };
        state.worker = None;
        let task_id = state.in_flight.as_ref().map(|r| r.task_id);

        tracing::warn!(
            worker_id = slot,
            task_id = ?task_id,
            reason = %truncate(&reason, 200),
            "Worker crashed"
        );
        self.events.emit(PipelineEvent::WorkerCrashed {
            worker_id: slot,
            task_id,
            reason: reason.clone(),
        });

        let reply = state.in_flight.take();
        self.schedule_respawn(slot);
        if let Some(reply) = reply {
            self.counters.failed += 1;
            self.publish_stats();
            reply.fail(
                Some(slot),
                TaskError::WorkerCrashed {
                    worker_id: slot,
                    reason,
                },
            );
        }
    }

    fn schedule_respawn(&mut self, slot: usize) {
        let now = Instant::now();
        let window = self.restart_window;
        let state = &mut self.slots[slot];
        while state
            .restarts
            .front()
            .is_some_and(|at| now.duration_since(*at) > window)
        {
            state.restarts.pop_front();
        }

        let at = if (state.restarts.len() as u32) < self.max_restarts {
            now
        } else {
            tracing::warn!(
                worker_id = slot,
                backoff_ms = self.restart_backoff.as_millis() as u64,
                "Restart budget exhausted, delaying respawn"
            );
            now + self.restart_backoff
        };
        self.pending_respawns.push((slot, at));
    }

    fn next_respawn_at(&self) -> Option<Instant> {
        self.pending_respawns.iter().map(|(_, at)| *at).min()
    }

    fn respawn_due(&mut self) {
        let now = Instant::now();
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.pending_respawns.drain(..).partition(|(_, at)| *at <= now);
        self.pending_respawns = waiting;

        for (slot, _) in due {
            match self.spawn_worker(slot) {
                Ok(()) => {
                    let state = &mut self.slots[slot];
                    state.restarts.push_back(Instant::now());
                    state.total_restarts += 1;
                    self.counters.respawned += 1;
                    tracing::info!(worker_id = slot, restarts = state.total_restarts, "Worker respawned");
                    self.events.emit(PipelineEvent::WorkerRespawned {
                        worker_id: slot,
                        restarts: state.total_restarts,
                    });
                }
                Err(e) => {
                    tracing::error!(worker_id = slot, error = %e, "Failed to respawn worker");
                    self.pending_respawns
                        .push((slot, Instant::now() + self.restart_backoff));
                }
            }
        }
    }

    fn spawn_worker(&mut self, slot: usize) -> Result<()> {
        let (task_sender, task_receiver) = channel::bounded::<Task>(1);
        let reports = self.sender.clone();
        let executor = Arc::clone(&self.executor);

        thread::Builder::new()
            .name(format!("vigil-worker-{slot}"))
            .spawn(move || worker_loop(slot, task_receiver, reports, executor))?;

        self.slots[slot].worker = Some(task_sender);
        Ok(())
    }

    fn fail_everything(&mut self) {
        let queued = self.queue.len();
        let mut in_flight = 0;
        for (_, reply) in self.queue.drain(..) {
            reply.fail(None, TaskError::PoolShutdown);
        }
        for (slot, state) in self.slots.iter_mut().enumerate() {
            if let Some(reply) = state.in_flight.take() {
                in_flight += 1;
                reply.fail(Some(slot), TaskError::PoolShutdown);
            }
            // Dropping the sender lets the worker exit after its current task.
            state.worker = None;
        }
        self.counters.failed += (queued + in_flight) as u64;
        self.pending_respawns.clear();
        self.publish_stats();
        tracing::debug!(queued, in_flight, "Worker pool shut down");
    }

    fn publish_stats(&self) {
        let snapshot = PoolStats {
            workers: self.slots.iter().filter(|s| s.worker.is_some()).count(),
            idle: self.slots.iter().filter(|s| s.is_idle()).count(),
            queued: self.queue.len(),
            in_flight: self.slots.iter().filter(|s| s.in_flight.is_some()).count(),
            completed: self.counters.completed,
            failed: self.counters.failed,
            crashed: self.counters.crashed,
            respawned: self.counters.respawned,
        };
        *self.stats.lock() = snapshot;
    }
}

fn worker_loop(
    slot: usize,
    tasks: Receiver<Task>,
    reports: Sender<Message>,
    executor: Arc<dyn TaskExecutor>,
) {
    for task in tasks.iter() {
        let outcome = catch_unwind(AssertUnwindSafe(|| executor.execute(&task)));
        let message = match outcome {
            Ok(outcome) => Message::Finished { slot, outcome },
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                let _ = reports.send(Message::Crashed { slot, reason });
                return;
            }
        };
        if reports.send(message).is_err() {
            return;
        }
    }
}
