use crate::errors::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Running,
    Done,
    Error,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Running)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Running => "RUNNING",
            JobState::Done => "DONE",
            JobState::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingJob {
    pub job_id: String,
    pub state: JobState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TrainingJob {
    fn running(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            state: JobState::Running,
            progress: 0,
            message: None,
            started_at: Some(Utc::now()),
            finished_at: None,
        }
    }
}

/// 学習ジョブの状態（プロセス内のみ。再起動で消える）
///
/// RUNNING から DONE / ERROR へ一度だけ遷移し、終端状態からは動かない。
pub trait JobRegistry: Send + Sync {
    /// RUNNING(0) で登録する。実行中の同じ ID はそのまま返す
    fn create(&self, job_id: &str) -> Result<TrainingJob>;

    fn complete(&self, job_id: &str, message: &str) -> Result<TrainingJob>;

    /// 未登録の ID でも ERROR として記録する
    fn fail(&self, job_id: &str, message: &str) -> Result<TrainingJob>;

    fn get(&self, job_id: &str) -> Option<TrainingJob>;
}

#[derive(Debug, Default)]
pub struct MemoryJobRegistry {
    jobs: RwLock<HashMap<String, TrainingJob>>,
}

impl MemoryJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn finish(
        &self,
        job_id: &str,
        state: JobState,
        message: &str,
        create_missing: bool,
    ) -> Result<TrainingJob> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if create_missing && !jobs.contains_key(job_id) {
            let mut job = TrainingJob::running(job_id);
            job.started_at = None;
            jobs.insert(job_id.to_string(), job);
        }
        let Some(job) = jobs.get_mut(job_id) else {
            return Err(Error::JobNotFound(job_id.to_string()));
        };
        if job.state.is_terminal() {
            return Err(Error::JobFinished {
                job_id: job_id.to_string(),
                state: job.state,
            });
        }

        job.state = state;
        if state == JobState::Done {
            job.progress = 100;
        }
        job.message = Some(message.to_string());
        job.finished_at = Some(Utc::now());
        Ok(job.clone())
    }
}

impl JobRegistry for MemoryJobRegistry {
    fn create(&self, job_id: &str) -> Result<TrainingJob> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = jobs.get(job_id) {
            if existing.state.is_terminal() {
                return Err(Error::JobFinished {
                    job_id: job_id.to_string(),
                    state: existing.state,
                });
            }
            return Ok(existing.clone());
        }
        let job = TrainingJob::running(job_id);
        jobs.insert(job_id.to_string(), job.clone());
        Ok(job)
    }

    fn complete(&self, job_id: &str, message: &str) -> Result<TrainingJob> {
        self.finish(job_id, JobState::Done, message, false)
    }

    fn fail(&self, job_id: &str, message: &str) -> Result<TrainingJob> {
        self.finish(job_id, JobState::Error, message, true)
    }

    fn get(&self, job_id: &str) -> Option<TrainingJob> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.get(job_id).cloned()
    }
}

#[cfg(test)]
mod tests;
