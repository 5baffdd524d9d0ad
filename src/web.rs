mod forecast;
mod ml;

use crate::config;
use crate::errors::{Error, Result};
use crate::forecast::ForecastService;
use crate::logging::*;
use crate::ml::bridge::Variant;
use crate::ml::orchestrator::TrainingOrchestrator;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

pub struct AppState {
    pub forecast: ForecastService,
    pub orchestrator: Arc<TrainingOrchestrator>,
    pub default_variant: Variant,
}

pub async fn run(state: Arc<AppState>, shutdown: CancellationToken) -> Result<()> {
    let log = DEFAULT.new(o!("function" => "web::run"));
    let bind = config::get("WEB_BIND").unwrap_or_else(|_| config::config().web.bind.clone());

    let listener = TcpListener::bind(&bind)
        .await
        .map_err(|e| Error::Internal(format!("failed to bind {bind}: {e}")))?;
    info!(log, "listening"; "addr" => &bind);

    serve(listener, state, shutdown).await
}

pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| Error::Internal(format!("server error: {e}")))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    add_routes(
        Router::new(),
        &[basic_route, forecast::add_route, ml::add_route],
    )
    .with_state(state)
    .layer(cors)
}

fn add_routes<T>(app: Router<T>, funcs: &[fn(Router<T>) -> Router<T>]) -> Router<T> {
    let mut app = app;
    for func in funcs {
        app = func(app);
    }
    app
}

fn basic_route(app: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    app.route("/healthcheck", get(|| async { "OK" }))
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
            Error::Downstream { .. } => (StatusCode::BAD_GATEWAY, "DOWNSTREAM"),
            Error::JobNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::JobFinished { .. } => (StatusCode::CONFLICT, "JOB_FINISHED"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };

        let mut body = serde_json::json!({
            "error": code,
            "message": self.to_string(),
        });
        if let Error::Downstream {
            status: Some(upstream),
            ..
        } = &self
        {
            body["upstreamStatus"] = (*upstream).into();
        }
        (status, Json(body)).into_response()
    }
}
