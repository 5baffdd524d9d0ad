use super::*;
use crate::ml::bridge::{PredictRequest, PredictResponse, TrainStatus, Variant};
use crate::ml::jobs::{JobState, MemoryJobRegistry};
use assertables::*;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 決められた順に状態を返すモック。尽きたら最後の状態を返し続ける
struct MockBridge {
    job_id: String,
    statuses: Mutex<VecDeque<Result<&'static str>>>,
    last: Mutex<&'static str>,
    status_calls: AtomicUsize,
    reload_calls: AtomicUsize,
    reload_fails: bool,
}

impl MockBridge {
    fn new(statuses: Vec<Result<&'static str>>) -> Self {
        Self {
            job_id: "job-1".to_string(),
            statuses: Mutex::new(statuses.into()),
            last: Mutex::new("RUNNING"),
            status_calls: AtomicUsize::new(0),
            reload_calls: AtomicUsize::new(0),
            reload_fails: false,
        }
    }

    fn reloads(&self) -> usize {
        self.reload_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PredictionBridge for MockBridge {
    async fn start_train(&self, _params: &TrainParams) -> Result<String> {
        Ok(self.job_id.clone())
    }

    async fn train_status(&self, job_id: &str) -> Result<TrainStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.statuses.lock().unwrap().pop_front();
        let state = match next {
            Some(Ok(state)) => {
                *self.last.lock().unwrap() = state;
                state
            }
            Some(Err(err)) => return Err(err),
            None => *self.last.lock().unwrap(),
        };
        Ok(TrainStatus {
            job_id: job_id.to_string(),
            state: state.to_string(),
            progress: None,
            message: (state == "FAILED").then(|| "diverged".to_string()),
            log: None,
        })
    }

    async fn reload_model(&self) -> Result<serde_json::Value> {
        self.reload_calls.fetch_add(1, Ordering::SeqCst);
        if self.reload_fails {
            return Err(Error::downstream(Some(500), "reload failed"));
        }
        Ok(serde_json::json!({ "message": "reloaded" }))
    }

    async fn predict(&self, _variant: Variant, _request: &PredictRequest) -> Result<PredictResponse> {
        unimplemented!()
    }

    async fn model_status(&self) -> Result<serde_json::Value> {
        unimplemented!()
    }
}

fn fast() -> PollSettings {
    PollSettings {
        timeout: Duration::from_secs(5),
        interval: Duration::from_millis(5),
    }
}

fn orchestrator(
    bridge: Arc<MockBridge>,
    settings: PollSettings,
) -> (Arc<TrainingOrchestrator>, Arc<MemoryJobRegistry>, CancellationToken) {
    let registry = Arc::new(MemoryJobRegistry::new());
    let shutdown = CancellationToken::new();
    let orchestrator = Arc::new(TrainingOrchestrator::new(
        bridge,
        registry.clone(),
        settings,
        shutdown.clone(),
    ));
    (orchestrator, registry, shutdown)
}

#[tokio::test]
async fn test_ready_reloads_exactly_once() {
    let bridge = Arc::new(MockBridge::new(vec![
        Ok("RUNNING"),
        Ok("RUNNING"),
        Ok("READY"),
    ]));
    let (orchestrator, registry, _) = orchestrator(bridge.clone(), fast());

    let result = orchestrator
        .start_and_reload(&TrainParams::default())
        .await
        .unwrap();

    assert_eq!(result.state, OrchestrationState::Ready);
    assert_eq!(result.job_id, "job-1");
    assert_eq!(result.message.as_deref(), Some("reloaded"));
    assert_eq!(bridge.reloads(), 1);
    assert_eq!(bridge.status_calls.load(Ordering::SeqCst), 3);

    let job = registry.get("job-1").unwrap();
    assert_eq!(job.state, JobState::Done);
    assert_eq!(job.progress, 100);
}

#[tokio::test]
async fn test_failed_short_circuits_without_reload() {
    let bridge = Arc::new(MockBridge::new(vec![Ok("RUNNING"), Ok("FAILED")]));
    let (orchestrator, registry, _) = orchestrator(bridge.clone(), fast());

    let result = orchestrator
        .start_and_reload(&TrainParams::default())
        .await
        .unwrap();

    assert_eq!(result.state, OrchestrationState::Failed);
    assert_eq!(result.detail.as_deref(), Some("diverged"));
    assert_eq!(bridge.reloads(), 0);
    assert_eq!(bridge.status_calls.load(Ordering::SeqCst), 2);

    let job = registry.get("job-1").unwrap();
    assert_eq!(job.state, JobState::Error);
    assert_eq!(job.message.as_deref(), Some("TRAIN_FAILED: diverged"));
}

#[tokio::test]
async fn test_timeout_without_reload() {
    let bridge = Arc::new(MockBridge::new(vec![]));
    let settings = PollSettings {
        timeout: Duration::from_millis(60),
        interval: Duration::from_millis(10),
    };
    let (orchestrator, registry, _) = orchestrator(bridge.clone(), settings);

    let started = std::time::Instant::now();
    let result = orchestrator
        .start_and_reload(&TrainParams::default())
        .await
        .unwrap();

    assert_eq!(result.state, OrchestrationState::Timeout);
    assert_eq!(bridge.reloads(), 0);
    assert_ge!(bridge.status_calls.load(Ordering::SeqCst), 2);
    assert_lt!(started.elapsed(), Duration::from_secs(2));
    assert_eq!(
        registry.get("job-1").unwrap().message.as_deref(),
        Some("TRAIN_TIMEOUT")
    );
}

#[tokio::test]
async fn test_status_errors_are_retried() {
    let bridge = Arc::new(MockBridge::new(vec![
        Err(Error::downstream(None, "connection reset")),
        Err(Error::downstream(Some(502), "bad gateway")),
        Ok("READY"),
    ]));
    let (orchestrator, _, _) = orchestrator(bridge.clone(), fast());

    let result = orchestrator
        .start_and_reload(&TrainParams::default())
        .await
        .unwrap();

    assert_eq!(result.state, OrchestrationState::Ready);
    assert_eq!(bridge.reloads(), 1);
}

#[tokio::test]
async fn test_reload_failure_is_downstream_error() {
    let mut mock = MockBridge::new(vec![Ok("READY")]);
    mock.reload_fails = true;
    let bridge = Arc::new(mock);
    let (orchestrator, registry, _) = orchestrator(bridge.clone(), fast());

    let err = orchestrator
        .start_and_reload(&TrainParams::default())
        .await
        .unwrap_err();

    assert!(err.is_downstream());
    assert_eq!(bridge.reloads(), 1);
    assert_eq!(registry.get("job-1").unwrap().state, JobState::Error);
}

#[tokio::test]
async fn test_cancel_interrupts_wait() {
    let bridge = Arc::new(MockBridge::new(vec![]));
    let settings = PollSettings {
        timeout: Duration::from_secs(30),
        interval: Duration::from_millis(10),
    };
    let (orchestrator, registry, _) = orchestrator(bridge.clone(), settings);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let result = orchestrator
        .start_and_reload_with(&TrainParams::default(), cancel)
        .await
        .unwrap();

    assert_eq!(result.state, OrchestrationState::Cancelled);
    assert_lt!(started.elapsed(), Duration::from_secs(5));
    assert_eq!(bridge.reloads(), 0);
    assert_eq!(
        registry.get("job-1").unwrap().message.as_deref(),
        Some("TRAIN_CANCELLED")
    );
}

#[tokio::test]
async fn test_shutdown_cancels_background_job() {
    let bridge = Arc::new(MockBridge::new(vec![]));
    let settings = PollSettings {
        timeout: Duration::from_secs(30),
        interval: Duration::from_millis(10),
    };
    let (orchestrator, registry, shutdown) = orchestrator(bridge.clone(), settings);

    let job_id = orchestrator
        .start_train(&TrainParams::default())
        .await
        .unwrap();
    assert_eq!(registry.get(&job_id).unwrap().state, JobState::Running);

    shutdown.cancel();
    let job = wait_terminal(&registry, &job_id).await;
    assert_eq!(job.state, JobState::Error);
    assert_eq!(job.message.as_deref(), Some("TRAIN_CANCELLED"));
}

#[tokio::test]
async fn test_background_job_records_done() {
    let bridge = Arc::new(MockBridge::new(vec![Ok("RUNNING"), Ok("READY")]));
    let (orchestrator, registry, _) = orchestrator(bridge.clone(), fast());

    let job_id = orchestrator
        .start_train(&TrainParams::default())
        .await
        .unwrap();

    let job = wait_terminal(&registry, &job_id).await;
    assert_eq!(job.state, JobState::Done);
    assert_eq!(job.message.as_deref(), Some("reloaded"));
    assert_eq!(bridge.reloads(), 1);
    assert_eq!(orchestrator.job(&job_id).unwrap(), job);
}

#[tokio::test]
async fn test_unknown_job() {
    let bridge = Arc::new(MockBridge::new(vec![]));
    let (orchestrator, _, _) = orchestrator(bridge, fast());

    let err = orchestrator.job("missing").unwrap_err();
    assert_eq!(err, Error::JobNotFound("missing".to_string()));
}

async fn wait_terminal(registry: &MemoryJobRegistry, job_id: &str) -> TrainingJob {
    for _ in 0..200 {
        if let Some(job) = registry.get(job_id)
            && job.state.is_terminal()
        {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}

#[test]
fn test_result_serialization() {
    let result = OrchestrationResult::new(OrchestrationState::Timeout, "job-9");
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json, serde_json::json!({ "state": "TIMEOUT", "jobId": "job-9" }));
}
