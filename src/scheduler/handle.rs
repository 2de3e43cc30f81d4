use crate::core::{Task, TaskId, TaskOutput, TaskResult};
use crate::errors::TaskError;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::{Duration, Instant};

/// Caller side of a submitted task.
///
/// Dropping a handle does not cancel the task; its result is discarded.
#[derive(Debug)]
pub struct TaskHandle {
    task_id: TaskId,
    analyzer_id: String,
    path: String,
    submitted_at: Instant,
    receiver: Receiver<TaskResult>,
}

/// Producer side of a task handle. Consumed by sending the one result.
#[derive(Debug)]
pub(crate) struct Reply {
    pub task_id: TaskId,
    pub analyzer_id: String,
    pub path: String,
    sender: Sender<TaskResult>,
}

impl Reply {
    pub fn send(self, worker_id: Option<usize>, outcome: Result<TaskOutput, TaskError>) {
        let result = TaskResult {
            task_id: self.task_id,
            worker_id,
            analyzer_id: self.analyzer_id,
            path: self.path,
            outcome,
        };
        // The caller may have dropped the handle already.
        let _ = self.sender.send(result);
    }

    pub fn fail(self, worker_id: Option<usize>, error: TaskError) {
        self.send(worker_id, Err(error));
    }
}

pub(crate) fn task_channel(task: &Task) -> (Reply, TaskHandle) {
    let (sender, receiver) = channel::bounded(1);
    let reply = Reply {
        task_id: task.id,
        analyzer_id: task.analyzer_id.clone(),
        path: task.file.path.clone(),
        sender,
    };
    let handle = TaskHandle {
        task_id: task.id,
        analyzer_id: task.analyzer_id.clone(),
        path: task.file.path.clone(),
        submitted_at: Instant::now(),
        receiver,
    };
    (reply, handle)
}

impl TaskHandle {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn analyzer_id(&self) -> &str {
        &self.analyzer_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait for the result.
    ///
    /// With a timeout, the deadline is counted from submission. Expiry
    /// yields [`TaskError::Timeout`] while the worker keeps running the task.
    pub fn wait(self, timeout: Option<Duration>) -> TaskResult {
        let received = match timeout {
            None => self.receiver.recv().map_err(|_| TaskError::PoolShutdown),
            Some(limit) => {
                let remaining = limit.saturating_sub(self.submitted_at.elapsed());
                match self.receiver.recv_timeout(remaining) {
                    Ok(result) => Ok(result),
                    Err(RecvTimeoutError::Timeout) => Err(TaskError::Timeout(limit)),
                    Err(RecvTimeoutError::Disconnected) => Err(TaskError::PoolShutdown),
                }
            }
        };

        received.unwrap_or_else(|error| TaskResult {
            task_id: self.task_id,
            worker_id: None,
            analyzer_id: self.analyzer_id,
            path: self.path,
            outcome: Err(error),
        })
    }

    /// Non-blocking poll; returns the handle back while the task is running.
    pub fn try_wait(self) -> Result<TaskResult, TaskHandle> {
        match self.receiver.try_recv() {
            Ok(result) => Ok(result),
            Err(TryRecvError::Empty) => Err(self),
            Err(TryRecvError::Disconnected) => Ok(TaskResult {
                task_id: self.task_id,
                worker_id: None,
                analyzer_id: self.analyzer_id,
                path: self.path,
                outcome: Err(TaskError::PoolShutdown),
            }),
        }
    }
}
