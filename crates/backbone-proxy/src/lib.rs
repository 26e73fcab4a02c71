pub mod pool;
pub mod queue;
pub mod worker;

pub use pool::{ProxyPool, DEDUP_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS};
pub use queue::{Completion, ProxyQueue, Task, TaskState, TrackedTask};
pub use worker::{run_worker, spawn_workers};
