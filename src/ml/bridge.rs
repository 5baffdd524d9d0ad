use crate::config;
use crate::errors::{Error, Result};
use crate::forecast::score::Recommendation;
use crate::logging::*;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 予測サービスのモデル種別
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    A,
    B,
    #[default]
    C,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Variant::A => "A",
            Variant::B => "B",
            Variant::C => "C",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Variant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Variant::A),
            "B" => Ok(Variant::B),
            "C" => Ok(Variant::C),
            other => Err(Error::Validation(format!("unknown variant: {other}"))),
        }
    }
}

impl Variant {
    pub fn from_config() -> Self {
        config::get("ML_DEFAULT_VARIANT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

/// 学習開始のパラメータ（そのままクエリに載せる）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct TrainStarted {
    #[serde(rename = "jobId", alias = "job_id")]
    job_id: String,
}

/// 上流の学習状態。READY / FAILED 以外はすべて実行中とみなす
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamState {
    Running,
    Ready,
    Failed,
}

impl UpstreamState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "READY" => UpstreamState::Ready,
            "FAILED" => UpstreamState::Failed,
            _ => UpstreamState::Running,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainStatus {
    #[serde(alias = "job_id", default)]
    pub job_id: String,
    #[serde(alias = "status")]
    pub state: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub log: Option<String>,
}

impl TrainStatus {
    pub fn upstream_state(&self) -> UpstreamState {
        UpstreamState::parse(&self.state)
    }

    pub fn detail(&self) -> Option<&str> {
        self.message.as_deref().or(self.log.as_deref())
    }
}

/// 予測の入力。キー名は予測サービス側と一致させる
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    #[serde(rename = "type")]
    pub building_type: Option<String>,
    pub region: Option<String>,
    pub energy_kwh: Option<f64>,
    pub eui_kwh_m2y: Option<f64>,
    #[serde(rename = "builtYear")]
    pub built_year: Option<i32>,
    #[serde(rename = "floorAreaM2")]
    pub floor_area_m2: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictResponse {
    pub saving_kwh_yr: Option<f64>,
    pub saving_cost_yr: Option<f64>,
    pub saving_pct: Option<f64>,
    pub payback_years: Option<f64>,
    pub label: Option<Recommendation>,
}

/// 外部の学習・予測サービス
#[async_trait]
pub trait PredictionBridge: Send + Sync {
    /// 学習を開始してジョブ ID を返す
    async fn start_train(&self, params: &TrainParams) -> Result<String>;

    async fn train_status(&self, job_id: &str) -> Result<TrainStatus>;

    async fn reload_model(&self) -> Result<serde_json::Value>;

    async fn predict(&self, variant: Variant, request: &PredictRequest) -> Result<PredictResponse>;

    async fn model_status(&self) -> Result<serde_json::Value>;
}

pub struct HttpPredictionBridge {
    client: Client,
    base_url: String,
}

impl HttpPredictionBridge {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config() -> Result<Self> {
        let base_url = config::get("ML_BASE_URL")?;
        let timeout = config::get_duration("ML_REQUEST_TIMEOUT", Duration::from_secs(30));
        Self::new(&base_url, timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// 2xx 以外は本文ごと Downstream に包む
async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let log = DEFAULT.new(o!("function" => "read_json"));
        warn!(log, "downstream returned error"; "call" => what, "status" => status.as_u16());
        return Err(Error::downstream(Some(status.as_u16()), body));
    }
    response.json::<T>().await.map_err(|e| {
        Error::downstream(
            Some(status.as_u16()),
            format!("invalid {what} response: {e}"),
        )
    })
}

#[async_trait]
impl PredictionBridge for HttpPredictionBridge {
    async fn start_train(&self, params: &TrainParams) -> Result<String> {
        let url = format!("{}/train", self.base_url);
        let response = self.client.post(&url).query(params).send().await?;
        let started: TrainStarted = read_json(response, "train").await?;
        if started.job_id.trim().is_empty() {
            return Err(Error::downstream(None, "train response has empty jobId"));
        }
        Ok(started.job_id)
    }

    async fn train_status(&self, job_id: &str) -> Result<TrainStatus> {
        let url = format!("{}/train/status/{}", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;
        read_json(response, "train status").await
    }

    async fn reload_model(&self) -> Result<serde_json::Value> {
        let url = format!("{}/admin/reload-model", self.base_url);
        let response = self.client.post(&url).send().await?;
        read_json(response, "reload").await
    }

    async fn predict(&self, variant: Variant, request: &PredictRequest) -> Result<PredictResponse> {
        let url = format!("{}/predict", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("variant", variant.to_string())])
            .json(request)
            .send()
            .await?;
        read_json(response, "predict").await
    }

    async fn model_status(&self) -> Result<serde_json::Value> {
        let url = format!("{}/model/status", self.base_url);
        let response = self.client.get(&url).send().await?;
        read_json(response, "model status").await
    }
}

#[cfg(test)]
mod tests;
