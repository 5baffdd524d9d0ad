use super::bridge::{PredictionBridge, TrainParams, UpstreamState};
use super::jobs::{JobRegistry, TrainingJob};
use crate::config;
use crate::errors::{Error, Result};
use crate::logging::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;

const DEFAULT_TRAIN_TIMEOUT: Duration = Duration::from_secs(180);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(800);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestrationState {
    Ready,
    Failed,
    Timeout,
    /// シャットダウンなどで待機が打ち切られた
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationResult {
    pub state: OrchestrationState,
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl OrchestrationResult {
    fn new(state: OrchestrationState, job_id: &str) -> Self {
        Self {
            state,
            job_id: job_id.to_string(),
            message: None,
            detail: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// 学習完了を待つ上限
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TRAIN_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollSettings {
    pub fn from_config() -> Self {
        Self {
            timeout: config::get_duration("ML_TRAIN_TIMEOUT", DEFAULT_TRAIN_TIMEOUT),
            interval: config::get_duration("ML_POLL_INTERVAL", DEFAULT_POLL_INTERVAL),
        }
    }
}

/// 学習開始 → 状態ポーリング → モデル再読込 の制御
///
/// 再読込は READY を確認した時に一度だけ行う。FAILED は即座に終了し、
/// 期限切れ・キャンセルは正常な結果として返す。
pub struct TrainingOrchestrator {
    bridge: Arc<dyn PredictionBridge>,
    registry: Arc<dyn JobRegistry>,
    settings: PollSettings,
    shutdown: CancellationToken,
}

impl TrainingOrchestrator {
    pub fn new(
        bridge: Arc<dyn PredictionBridge>,
        registry: Arc<dyn JobRegistry>,
        settings: PollSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            bridge,
            registry,
            settings,
            shutdown,
        }
    }

    pub fn bridge(&self) -> &Arc<dyn PredictionBridge> {
        &self.bridge
    }

    pub fn job(&self, job_id: &str) -> Result<TrainingJob> {
        self.registry
            .get(job_id)
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))
    }

    /// 学習完了（または期限）まで待ってから結果を返す
    pub async fn start_and_reload(&self, params: &TrainParams) -> Result<OrchestrationResult> {
        self.start_and_reload_with(params, self.shutdown.child_token())
            .await
    }

    pub async fn start_and_reload_with(
        &self,
        params: &TrainParams,
        cancel: CancellationToken,
    ) -> Result<OrchestrationResult> {
        let job_id = self.start(params).await?;
        self.run_job(&job_id, &cancel).await
    }

    /// 学習を開始してすぐにジョブ ID を返す。完了処理はバックグラウンドで行う
    pub async fn start_train(self: &Arc<Self>, params: &TrainParams) -> Result<String> {
        let job_id = self.start(params).await?;

        let this = Arc::clone(self);
        let cancel = self.shutdown.child_token();
        let id = job_id.clone();
        tokio::spawn(async move {
            // 結果は registry に記録済み
            let _ = this.run_job(&id, &cancel).await;
        });

        Ok(job_id)
    }

    async fn start(&self, params: &TrainParams) -> Result<String> {
        let log = DEFAULT.new(o!("function" => "TrainingOrchestrator::start"));

        let job_id = match self.bridge.start_train(params).await {
            Ok(job_id) => job_id,
            Err(err) => {
                error!(log, "failed to start training"; "error" => %err);
                return Err(err);
            }
        };
        self.registry.create(&job_id)?;
        info!(log, "training started";
            "job_id" => &job_id,
            "mode" => ?params.mode,
            "k" => ?params.k
        );
        Ok(job_id)
    }

    async fn run_job(&self, job_id: &str, cancel: &CancellationToken) -> Result<OrchestrationResult> {
        let result = self.await_ready(job_id, cancel).await;
        self.record(job_id, &result);
        result
    }

    async fn await_ready(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<OrchestrationResult> {
        let log = DEFAULT.new(o!(
            "function" => "TrainingOrchestrator::await_ready",
            "job_id" => job_id.to_owned(),
        ));
        let deadline = Instant::now() + self.settings.timeout;
        let mut attempt = 0u32;

        loop {
            if Instant::now() >= deadline {
                break;
            }
            attempt += 1;

            let polled = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(log, "training wait cancelled"; "attempt" => attempt);
                    return Ok(OrchestrationResult::new(OrchestrationState::Cancelled, job_id));
                }
                polled = timeout_at(deadline, self.bridge.train_status(job_id)) => polled,
            };

            match polled {
                Err(_) => break,
                Ok(Err(err)) => {
                    // 一時的な失敗とみなして期限まで続ける
                    warn!(log, "failed to get training status"; "attempt" => attempt, "error" => %err);
                }
                Ok(Ok(status)) => match status.upstream_state() {
                    UpstreamState::Ready => {
                        info!(log, "training ready, reloading model"; "attempt" => attempt);
                        let reloaded = self.bridge.reload_model().await.inspect_err(|err| {
                            error!(log, "failed to reload model"; "error" => %err);
                        })?;
                        let message = reloaded
                            .get("message")
                            .and_then(|m| m.as_str())
                            .map(str::to_string)
                            .or_else(|| status.detail().map(str::to_string))
                            .unwrap_or_else(|| "MODEL_RELOADED".to_string());
                        info!(log, "model reloaded"; "message" => &message);
                        return Ok(OrchestrationResult {
                            message: Some(message),
                            ..OrchestrationResult::new(OrchestrationState::Ready, job_id)
                        });
                    }
                    UpstreamState::Failed => {
                        warn!(log, "training failed"; "detail" => ?status.detail());
                        return Ok(OrchestrationResult {
                            detail: status.detail().map(str::to_string),
                            ..OrchestrationResult::new(OrchestrationState::Failed, job_id)
                        });
                    }
                    UpstreamState::Running => {
                        debug!(log, "training in progress";
                            "attempt" => attempt,
                            "state" => &status.state,
                            "progress" => ?status.progress
                        );
                    }
                },
            }

            let wake_at = (Instant::now() + self.settings.interval).min(deadline);
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(log, "training wait cancelled"; "attempt" => attempt);
                    return Ok(OrchestrationResult::new(OrchestrationState::Cancelled, job_id));
                }
                _ = sleep_until(wake_at) => {}
            }
        }

        warn!(log, "training did not finish before deadline";
            "timeout" => ?self.settings.timeout,
            "attempts" => attempt
        );
        Ok(OrchestrationResult::new(OrchestrationState::Timeout, job_id))
    }

    /// 終端状態を registry に反映する
    fn record(&self, job_id: &str, result: &Result<OrchestrationResult>) {
        let log = DEFAULT.new(o!(
            "function" => "TrainingOrchestrator::record",
            "job_id" => job_id.to_owned(),
        ));

        let recorded = match result {
            Ok(r) => match r.state {
                OrchestrationState::Ready => self.registry.complete(
                    job_id,
                    r.message.as_deref().unwrap_or("MODEL_RELOADED"),
                ),
                OrchestrationState::Failed => self.registry.fail(
                    job_id,
                    &format!("TRAIN_FAILED: {}", r.detail.as_deref().unwrap_or("unknown")),
                ),
                OrchestrationState::Timeout => self.registry.fail(job_id, "TRAIN_TIMEOUT"),
                OrchestrationState::Cancelled => self.registry.fail(job_id, "TRAIN_CANCELLED"),
            },
            Err(err) => self.registry.fail(job_id, &format!("RELOAD_FAILED: {err}")),
        };

        match recorded {
            Ok(job) => info!(log, "training job finished"; "state" => %job.state),
            Err(err) => warn!(log, "failed to record training job"; "error" => %err),
        }
    }
}

#[cfg(test)]
mod tests;
