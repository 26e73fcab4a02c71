use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use backbone_core::error::{BackboneError, Result};
use backbone_provider::{ChatRequest, ProxyResponse};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{oneshot, Mutex, Notify};
use tracing::{debug, warn};

/// How a task signals completion back to its caller (spec.md §9 redesign
/// flag: "model as a single Task{completion: OneOf{Signal, Callback}}
/// variant; the worker never inspects the variant's choice beyond
/// delivering the result").
pub enum Completion {
    Blocking(oneshot::Sender<Result<ProxyResponse>>),
    Callback(Box<dyn FnOnce(Result<ProxyResponse>) + Send>),
}

impl Completion {
    fn deliver(self, result: Result<ProxyResponse>) {
        match self {
            Completion::Blocking(tx) => {
                // Receiver may have timed out and dropped — ignore the send error.
                let _ = tx.send(result);
            }
            Completion::Callback(cb) => cb(result),
        }
    }
}

pub struct Task {
    pub task_id: String,
    pub priority: i32,
    pub payload: ChatRequest,
    pub blocking: bool,
    pub created_at: DateTime<Utc>,
    pub completion: Completion,
}

/// Ordering key pushed onto the heap. Lower `priority` dequeues first; ties
/// broken by enqueue order (`seq`), giving FIFO-within-priority (spec.md
/// §4.2 "The queue is FIFO within a priority level; lower numeric priority
/// dequeues first").
struct HeapKey {
    priority: i32,
    seq: u64,
    task_id: String,
}

impl PartialEq for HeapKey {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for HeapKey {}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse priority (lower number = higher
        // priority) and reverse seq (earlier enqueued = dequeued first).
        other.priority.cmp(&self.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
}

pub struct TrackedTask {
    pub priority: i32,
    pub blocking: bool,
    pub created_at: DateTime<Utc>,
    pub state: TaskState,
    pub result: Option<std::result::Result<ProxyResponse, String>>,
}

/// One provider's priority queue plus the bounded worker pool draining it
/// (spec.md §4.2 C2). `enqueue_blocking`/`enqueue_fire_and_forget` split
/// spec.md's single polymorphic `enqueue(...) -> task_id | result` into two
/// methods, since Rust has no natural sum-typed return for that shape; see
/// DESIGN.md.
pub struct ProxyQueue {
    heap: Mutex<BinaryHeap<HeapKey>>,
    pending: DashMap<String, Task>,
    tracking: DashMap<String, TrackedTask>,
    notify: Notify,
    seq: AtomicU64,
    /// `None` means unbounded (spec.md §5 "no hard size cap by default").
    capacity: Option<usize>,
}

impl ProxyQueue {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            pending: DashMap::new(),
            tracking: DashMap::new(),
            notify: Notify::new(),
            seq: AtomicU64::new(0),
            capacity,
        }
    }

    pub fn queue_size(&self) -> usize {
        self.pending.len()
    }

    pub fn task_status(&self, task_id: &str) -> Option<TrackedTask> {
        self.tracking.get(task_id).map(|t| TrackedTask {
            priority: t.priority,
            blocking: t.blocking,
            created_at: t.created_at,
            state: t.state,
            result: match &t.result {
                Some(Ok(r)) => Some(Ok(r.clone())),
                Some(Err(e)) => Some(Err(e.clone())),
                None => None,
            },
        })
    }

    async fn push(&self, task: Task) -> Result<()> {
        if let Some(cap) = self.capacity {
            if self.pending.len() >= cap {
                return Err(BackboneError::QueueFull);
            }
        }

        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.tracking.insert(
            task.task_id.clone(),
            TrackedTask {
                priority: task.priority,
                blocking: task.blocking,
                created_at: task.created_at,
                state: TaskState::Pending,
                result: None,
            },
        );

        let key = HeapKey {
            priority: task.priority,
            seq,
            task_id: task.task_id.clone(),
        };
        self.pending.insert(task.task_id.clone(), task);
        self.heap.lock().await.push(key);
        self.notify.notify_one();
        Ok(())
    }

    /// Blocking enqueue: waits up to `timeout` for a worker to produce a
    /// result. On timeout the task is removed from tracking and a Timeout
    /// error surfaces (spec.md §4.2, §5).
    pub async fn enqueue_blocking(
        &self,
        task_id: String,
        payload: ChatRequest,
        priority: i32,
        timeout: Duration,
    ) -> Result<ProxyResponse> {
        let (tx, rx) = oneshot::channel();
        self.push(Task {
            task_id: task_id.clone(),
            priority,
            payload,
            blocking: true,
            created_at: Utc::now(),
            completion: Completion::Blocking(tx),
        })
        .await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                // Sender dropped without sending — treat as an internal failure.
                self.pending.remove(&task_id);
                self.tracking.remove(&task_id);
                Err(BackboneError::Internal("worker dropped task without a result".to_string()))
            }
            Err(_) => {
                warn!(task_id = %task_id, "blocking enqueue timed out");
                self.pending.remove(&task_id);
                self.tracking.remove(&task_id);
                Err(BackboneError::Timeout { ms: timeout.as_millis() as u64 })
            }
        }
    }

    /// Fire-and-forget enqueue: returns immediately with the task id; the
    /// callback runs once a worker finishes the task.
    pub async fn enqueue_fire_and_forget(
        &self,
        task_id: String,
        payload: ChatRequest,
        priority: i32,
        callback: Box<dyn FnOnce(Result<ProxyResponse>) + Send>,
    ) -> Result<String> {
        self.push(Task {
            task_id: task_id.clone(),
            priority,
            payload,
            blocking: false,
            created_at: Utc::now(),
            completion: Completion::Callback(callback),
        })
        .await?;
        Ok(task_id)
    }

    /// Pop the next task in priority/FIFO order. Waits on `notify` when empty.
    pub async fn pop(&self) -> Task {
        loop {
            {
                let mut heap = self.heap.lock().await;
                while let Some(key) = heap.pop() {
                    if let Some((_, task)) = self.pending.remove(&key.task_id) {
                        if let Some(mut tracked) = self.tracking.get_mut(&key.task_id) {
                            tracked.state = TaskState::Running;
                        }
                        debug!(task_id = %key.task_id, priority = key.priority, "task dequeued");
                        return task;
                    }
                    // Stale heap entry (already removed via timeout) — keep popping.
                }
            }
            self.notify.notified().await;
        }
    }

    /// Deliver a result and mark the task completed. Called from the
    /// worker's guaranteed-release block regardless of success or failure
    /// (spec.md §4.2: "the task is always removed from the tracking map in
    /// a guaranteed-release block").
    pub fn complete(&self, task_id: &str, completion: Completion, result: Result<ProxyResponse>) {
        if let Some(mut tracked) = self.tracking.get_mut(task_id) {
            tracked.state = TaskState::Completed;
            tracked.result = Some(match &result {
                Ok(r) => Ok(r.clone()),
                Err(e) => Err(e.to_string()),
            });
        }
        completion.deliver(result);
    }
}
