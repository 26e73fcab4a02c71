use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use backbone_core::config::Config;
use backbone_core::error::{BackboneError, Result};
use backbone_provider::{ChatRequest, LlmProvider, ProviderTag, ProxyResponse};

use crate::queue::{ProxyQueue, TrackedTask};

/// Default blocking-call timeout and the longer window dedup jobs get
/// (spec.md §5: "60s default, 300s for dedup-class work").
pub const DEFAULT_TIMEOUT_SECS: u64 = backbone_core::config::DEFAULT_TIMEOUT_SECS;
pub const DEDUP_TIMEOUT_SECS: u64 = backbone_core::config::DEDUP_TIMEOUT_SECS;

/// One queue + worker pool per provider (spec.md §4.2: "each provider owns
/// its own priority queue and worker pool; saturating one provider never
/// blocks another").
pub struct ProxyPool {
    queues: HashMap<ProviderTag, Arc<ProxyQueue>>,
    default_timeout: Duration,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl ProxyPool {
    /// Builds one `ProxyQueue` + worker set per configured provider and
    /// spawns the workers. `providers` maps each tag to its adapter and the
    /// number of workers to run for it.
    pub fn start(
        config: &Config,
        providers: Vec<(ProviderTag, Arc<dyn LlmProvider>, usize, Option<usize>)>,
    ) -> Self {
        let mut queues = HashMap::new();
        let mut handles = Vec::new();

        for (tag, provider, worker_count, capacity) in providers {
            let queue = Arc::new(ProxyQueue::new(capacity));
            handles.extend(crate::worker::spawn_workers(queue.clone(), provider, worker_count));
            queues.insert(tag, queue);
        }

        Self {
            queues,
            default_timeout: Duration::from_secs(config.timeout_secs),
            handles,
        }
    }

    fn queue_for(&self, tag: ProviderTag) -> Result<&Arc<ProxyQueue>> {
        self.queues
            .get(&tag)
            .ok_or_else(|| BackboneError::UnknownProvider(tag.as_str().to_string()))
    }

    /// `dispatch(request)` blocking path (spec.md §4.1/§4.2): resolves the
    /// provider from the request, enqueues at `priority`, and waits up to
    /// `timeout` (defaulting to the pool's configured timeout).
    pub async fn dispatch(
        &self,
        task_id: String,
        request: ChatRequest,
        priority: i32,
        timeout: Option<Duration>,
    ) -> Result<ProxyResponse> {
        let tag = request.provider();
        let queue = self.queue_for(tag)?;
        queue
            .enqueue_blocking(task_id, request, priority, timeout.unwrap_or(self.default_timeout))
            .await
    }

    /// Fire-and-forget enqueue for background jobs (e.g. dedup passes)
    /// that don't need an inline response.
    pub async fn dispatch_background(
        &self,
        task_id: String,
        request: ChatRequest,
        priority: i32,
        callback: Box<dyn FnOnce(Result<ProxyResponse>) + Send>,
    ) -> Result<String> {
        let tag = request.provider();
        let queue = self.queue_for(tag)?;
        queue.enqueue_fire_and_forget(task_id, request, priority, callback).await
    }

    pub fn status(&self, tag: ProviderTag, task_id: &str) -> Option<TrackedTask> {
        self.queues.get(&tag)?.task_status(task_id)
    }

    pub fn queue_depth(&self, tag: ProviderTag) -> usize {
        self.queues.get(&tag).map(|q| q.queue_size()).unwrap_or(0)
    }

    pub async fn shutdown(self) {
        for h in self.handles {
            h.abort();
        }
    }
}
