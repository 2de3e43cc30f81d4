//! Lifecycle events emitted by the pipeline.
//!
//! The core only emits; subscribers (notification, webhooks, progress UIs)
//! attach through [`EventBus::subscribe`] and receive events on their own
//! channel. A subscriber that drops its receiver is pruned on the next emit,
//! so a slow or vanished consumer never blocks a scan.

use crate::core::{Issue, TaskId};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    ScanStarted {
        files: usize,
        tasks: usize,
    },
    ScanProgress {
        completed: usize,
        total: usize,
    },
    ScanCompleted {
        issues: usize,
        suppressed: usize,
        failed_tasks: usize,
        duration: Duration,
    },
    AnalyzerStarted {
        analyzer_id: String,
        files: usize,
    },
    AnalyzerCompleted {
        analyzer_id: String,
        issues: usize,
        duration: Duration,
    },
    AnalyzerFailed {
        analyzer_id: String,
        error: String,
    },
    IssueFound(Box<Issue>),
    /// A task was queued while every worker was busy
    QueueFull {
        queued: usize,
    },
    WorkerCrashed {
        worker_id: usize,
        task_id: Option<TaskId>,
        reason: String,
    },
    WorkerRespawned {
        worker_id: usize,
        restarts: u32,
    },
}

impl PipelineEvent {
    /// Stable event name, e.g. `queue:full`
    pub fn name(&self) -> &'static str {
        match self {
            Self::ScanStarted { .. } => "scan:start",
            Self::ScanProgress { .. } => "scan:progress",
            Self::ScanCompleted { .. } => "scan:complete",
            Self::AnalyzerStarted { .. } => "analyzer:start",
            Self::AnalyzerCompleted { .. } => "analyzer:complete",
            Self::AnalyzerFailed { .. } => "analyzer:error",
            Self::IssueFound(_) => "issue:found",
            Self::QueueFull { .. } => "queue:full",
            Self::WorkerCrashed { .. } => "worker:crashed",
            Self::WorkerRespawned { .. } => "worker:respawned",
        }
    }
}

/// Fan-out of pipeline events to any number of subscribers.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<Sender<PipelineEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. Events emitted from now on are delivered
    /// to the returned receiver.
    ///
    /// The channel is unbounded: a receiver that is kept but never drained
    /// holds every event, one `IssueFound` per reported issue included. Use
    /// [`subscribe_with_capacity`](Self::subscribe_with_capacity) for
    /// consumers that may fall behind.
    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        let (tx, rx) = channel::unbounded();
        self.subscribers.write().push(tx);
        rx
    }

    /// Register a subscriber that buffers at most `capacity` events.
    /// Events arriving while the buffer is full are dropped for that
    /// subscriber only.
    pub fn subscribe_with_capacity(&self, capacity: usize) -> Receiver<PipelineEvent> {
        let (tx, rx) = channel::bounded(capacity.max(1));
        self.subscribers.write().push(tx);
        rx
    }

    pub fn emit(&self, event: PipelineEvent) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|subscriber| match subscriber.try_send(event.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_every_subscriber() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.emit(PipelineEvent::QueueFull { queued: 3 });

        assert_eq!(a.try_recv().unwrap(), PipelineEvent::QueueFull { queued: 3 });
        assert_eq!(b.try_recv().unwrap().name(), "queue:full");
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(PipelineEvent::ScanProgress {
            completed: 1,
            total: 2,
        });

        assert_eq!(bus.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }

    #[test]
    fn test_bounded_subscriber_drops_overflow() {
        let bus = EventBus::new();
        let slow = bus.subscribe_with_capacity(2);
        let fast = bus.subscribe();

        for queued in 0..5 {
            bus.emit(PipelineEvent::QueueFull { queued });
        }

        let kept: Vec<_> = slow.try_iter().collect();
        assert_eq!(
            kept,
            vec![
                PipelineEvent::QueueFull { queued: 0 },
                PipelineEvent::QueueFull { queued: 1 }
            ]
        );
        assert_eq!(fast.try_iter().count(), 5);
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(PipelineEvent::QueueFull { queued: 5 });
        assert_eq!(slow.try_recv().unwrap(), PipelineEvent::QueueFull { queued: 5 });
    }

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.emit(PipelineEvent::QueueFull { queued: 1 });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
