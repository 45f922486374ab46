//! Worker pool for CPU-bound batches.
//!
//! Requests are `{task_id, data}` envelopes pushed onto a FIFO queue
//! shared by at most [`MAX_WORKERS`] workers; replies come back on one
//! channel and are demultiplexed by `task_id`. Workers are pure functions
//! of their input and hold no references to live state. When the pool is
//! unavailable, execution falls back to the calling task.

pub mod container_value;
pub mod enhance_cost;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};

use toolasha_domain::ItemHrid;

pub use container_value::ContainerValueInput;
pub use enhance_cost::{CostEstimate, EnhanceCostInput};

pub const MAX_WORKERS: usize = 4;

#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub task_id: u64,
    pub data: TaskData,
}

#[derive(Debug, Clone)]
pub enum TaskData {
    ContainerValue(ContainerValueInput),
    EnhanceCost(EnhanceCostInput),
}

#[derive(Debug, Clone)]
pub struct TaskReply {
    pub task_id: u64,
    pub result: Result<TaskOutput, String>,
}

#[derive(Debug, Clone)]
pub enum TaskOutput {
    ContainerValue(HashMap<ItemHrid, f64>),
    EnhanceCost(CostEstimate),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker task failed: {0}")]
    Task(String),
}

/// Pure task body; runs on a worker or, as a fallback, inline.
pub fn run_task(data: TaskData) -> Result<TaskOutput, String> {
    match data {
        TaskData::ContainerValue(input) => Ok(TaskOutput::ContainerValue(
            container_value::expected_values(&input),
        )),
        TaskData::EnhanceCost(input) => enhance_cost::estimate(&input)
            .map(TaskOutput::EnhanceCost)
            .map_err(|e| e.to_string()),
    }
}

pub struct WorkerPool {
    queue_tx: mpsc::UnboundedSender<TaskRequest>,
    pending: Arc<DashMap<u64, oneshot::Sender<TaskReply>>>,
    next_id: AtomicU64,
    size: usize,
}

impl WorkerPool {
    /// `size` workers share one FIFO queue; excess requests wait in it.
    pub fn new(size: usize) -> Arc<Self> {
        let size = size.clamp(1, MAX_WORKERS);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel::<TaskRequest>();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<TaskReply>();
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let pending: Arc<DashMap<u64, oneshot::Sender<TaskReply>>> = Arc::new(DashMap::new());

        for worker_index in 0..size {
            let queue_rx = Arc::clone(&queue_rx);
            let reply_tx = reply_tx.clone();
            tokio::spawn(async move {
                loop {
                    let request = {
                        let mut rx = queue_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(request) = request else {
                        break;
                    };
                    let reply = TaskReply {
                        task_id: request.task_id,
                        result: run_task(request.data),
                    };
                    if reply_tx.send(reply).is_err() {
                        break;
                    }
                }
                tracing::debug!(worker_index, "worker stopped");
            });
        }

        // Reply demux: route by task_id to the waiting caller.
        let pending_demux = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(reply) = reply_rx.recv().await {
                if let Some((_, tx)) = pending_demux.remove(&reply.task_id) {
                    let _ = tx.send(reply);
                }
            }
        });

        Arc::new(Self {
            queue_tx,
            pending,
            next_id: AtomicU64::new(1),
            size,
        })
    }

    /// Pool sized to the machine, capped at [`MAX_WORKERS`].
    pub fn default_size() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(MAX_WORKERS)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run a task on the pool. Falls back to inline execution when the
    /// pool is gone.
    pub async fn execute(&self, data: TaskData) -> Result<TaskOutput, WorkerError> {
        let task_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(task_id, tx);

        let request = TaskRequest {
            task_id,
            data: data.clone(),
        };
        if self.queue_tx.send(request).is_err() {
            self.pending.remove(&task_id);
            tracing::warn!("worker queue closed; running task inline");
            return run_task(data).map_err(WorkerError::Task);
        }

        match rx.await {
            Ok(reply) => reply.result.map_err(WorkerError::Task),
            Err(_) => {
                tracing::warn!("worker reply dropped; running task inline");
                run_task(data).map_err(WorkerError::Task)
            }
        }
    }
}
