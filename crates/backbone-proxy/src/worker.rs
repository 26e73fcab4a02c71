use std::sync::Arc;

use backbone_provider::LlmProvider;
use tracing::{error, info, warn};

use crate::queue::ProxyQueue;

/// Drains `queue`, dispatching each task through `provider` and delivering
/// the result via whichever `Completion` the task carries. Mirrors the
/// dispatch/guaranteed-release shape of
/// `original_source/services/proxy/app/queue/worker.py::queue_worker_main`:
/// pop, dispatch, deliver, and always drop the task from tracking — success
/// or failure never leaves a task stuck in the map.
pub async fn run_worker(worker_id: usize, queue: Arc<ProxyQueue>, provider: Arc<dyn LlmProvider>) {
    info!(worker_id, provider = provider.name(), "worker started");

    loop {
        let task = queue.pop().await;
        let task_id = task.task_id.clone();

        let result = provider.send(&task.payload).await.map_err(backbone_core::error::BackboneError::from);

        if let Err(e) = &result {
            warn!(worker_id, task_id = %task_id, error = %e, "task failed");
        }

        queue.complete(&task_id, task.completion, result);
    }
}

/// Spawns `worker_count` tokio tasks draining `queue` through `provider`.
/// Returns their join handles so callers can await shutdown or abort them.
pub fn spawn_workers(
    queue: Arc<ProxyQueue>,
    provider: Arc<dyn LlmProvider>,
    worker_count: usize,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..worker_count)
        .map(|id| {
            let queue = queue.clone();
            let provider = provider.clone();
            tokio::spawn(async move {
                run_worker(id, queue, provider).await;
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use backbone_provider::{ChatRequest, ProviderError, ProxyResponse};
    use chrono::Utc;
    use std::time::Duration;

    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn send(&self, request: &ChatRequest) -> Result<ProxyResponse, ProviderError> {
            Ok(ProxyResponse {
                text: format!("echo:{}", request.model),
                prompt_tokens: 1,
                completion_tokens: 1,
                tool_calls: None,
                stop_reason: "stop".to_string(),
                timestamp: Utc::now(),
            })
        }
    }

    struct FailProvider;

    #[async_trait]
    impl LlmProvider for FailProvider {
        fn name(&self) -> &str {
            "fail"
        }

        async fn send(&self, _request: &ChatRequest) -> Result<ProxyResponse, ProviderError> {
            Err(ProviderError::Connect("boom".to_string()))
        }
    }

    fn sample_request(model: &str) -> ChatRequest {
        ChatRequest {
            provider: None,
            model: model.to_string(),
            messages: vec![backbone_provider::ChatMessage::user("hi")],
            options: serde_json::json!({}),
            tools: None,
            tool_choice: None,
        }
    }

    #[tokio::test]
    async fn blocking_task_round_trips_through_worker() {
        let queue = Arc::new(ProxyQueue::new(None));
        let provider: Arc<dyn LlmProvider> = Arc::new(EchoProvider);
        let handles = spawn_workers(queue.clone(), provider, 1);

        let resp = queue
            .enqueue_blocking("t1".to_string(), sample_request("llama3"), 5, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(resp.text, "echo:llama3");
        assert_eq!(queue.queue_size(), 0);
        let status = queue.task_status("t1").expect("status retained after completion");
        assert_eq!(status.state, crate::queue::TaskState::Completed);

        for h in handles {
            h.abort();
        }
    }

    #[tokio::test]
    async fn failing_provider_still_releases_the_task() {
        let queue = Arc::new(ProxyQueue::new(None));
        let provider: Arc<dyn LlmProvider> = Arc::new(FailProvider);
        let handles = spawn_workers(queue.clone(), provider, 1);

        let result = queue
            .enqueue_blocking("t2".to_string(), sample_request("llama3"), 5, Duration::from_secs(1))
            .await;
        assert!(result.is_err());
        assert_eq!(queue.queue_size(), 0);

        for h in handles {
            h.abort();
        }
    }
}
