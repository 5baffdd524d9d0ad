use crate::ml::jobs::JobState;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// 呼び出し側の入力が不正（リトライしない）
    #[error("validation error: {0}")]
    Validation(String),

    /// 外部の学習・予測サービスの失敗
    ///
    /// HTTP 応答が得られなかった場合 `status` は `None`
    #[error("downstream error (status: {status:?}): {body}")]
    Downstream { status: Option<u16>, body: String },

    #[error("training job not found: {0}")]
    JobNotFound(String),

    #[error("training job {job_id} already finished as {state}")]
    JobFinished { job_id: String, state: JobState },

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn downstream(status: Option<u16>, body: impl Into<String>) -> Self {
        Error::Downstream {
            status,
            body: body.into(),
        }
    }

    pub fn is_downstream(&self) -> bool {
        matches!(self, Error::Downstream { .. })
    }
}

impl From<deadpool_diesel::postgres::PoolError> for Error {
    fn from(e: deadpool_diesel::postgres::PoolError) -> Error {
        Error::Internal(e.to_string())
    }
}

impl From<deadpool_diesel::InteractError> for Error {
    fn from(e: deadpool_diesel::InteractError) -> Error {
        Error::Internal(e.to_string())
    }
}

impl From<diesel::result::Error> for Error {
    fn from(e: diesel::result::Error) -> Error {
        Error::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Internal(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Error {
        Error::Downstream {
            status: e.status().map(|s| s.as_u16()),
            body: e.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Error {
        Error::Internal(e.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Error {
        Error::Internal(e.to_string())
    }
}
