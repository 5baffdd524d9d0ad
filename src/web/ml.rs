use super::AppState;
use crate::errors::Result;
use crate::ml::bridge::{PredictRequest, PredictResponse, TrainParams, Variant};
use crate::ml::jobs::TrainingJob;
use crate::ml::orchestrator::OrchestrationResult;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TrainStarted {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    #[serde(rename = "jobId")]
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct PredictQuery {
    variant: Option<String>,
}

pub fn add_route(app: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    app.route("/api/forecast/ml/train", post(start_train))
        .route("/api/forecast/ml/train/status", get(train_status))
        .route("/api/forecast/ml/train-and-reload", post(train_and_reload))
        .route("/api/forecast/ml/predict", post(predict))
        .route("/api/forecast/ml/model/status", get(model_status))
}

async fn start_train(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrainParams>,
) -> Result<Json<TrainStarted>> {
    let job_id = state.orchestrator.start_train(&params).await?;
    Ok(Json(TrainStarted { job_id }))
}

async fn train_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<TrainingJob>> {
    Ok(Json(state.orchestrator.job(&query.job_id)?))
}

/// 学習完了まで応答を返さない。切断されるとポーリングも止まる
async fn train_and_reload(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrainParams>,
) -> Result<Json<OrchestrationResult>> {
    Ok(Json(state.orchestrator.start_and_reload(&params).await?))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PredictQuery>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>> {
    let variant = match query.variant.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.parse::<Variant>()?,
        _ => state.default_variant,
    };
    let response = state
        .orchestrator
        .bridge()
        .predict(variant, &request.normalized())
        .await?;
    Ok(Json(response))
}

async fn model_status(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
    Ok(Json(state.orchestrator.bridge().model_status().await?))
}
