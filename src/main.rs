use retrofit_forecast::config;
use retrofit_forecast::cron;
use retrofit_forecast::forecast::ForecastService;
use retrofit_forecast::forecast::cache::{CacheStore, MemoryCacheStore};
use retrofit_forecast::forecast::compute::ForecastComputer;
use retrofit_forecast::logging::*;
use retrofit_forecast::ml::bridge::{HttpPredictionBridge, Variant};
use retrofit_forecast::ml::jobs::MemoryJobRegistry;
use retrofit_forecast::ml::orchestrator::{PollSettings, TrainingOrchestrator};
use retrofit_forecast::persistence::api_cache::PgCacheStore;
use retrofit_forecast::web::{self, AppState};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let log = DEFAULT.new(o!("function" => "main"));
    info!(log, "Starting up");

    let shutdown = CancellationToken::new();

    let backend = config::get("CACHE_BACKEND").unwrap_or_default();
    let store: Arc<dyn CacheStore> = match backend.as_str() {
        "memory" => Arc::new(MemoryCacheStore::new()),
        _ => Arc::new(PgCacheStore::new()),
    };
    let ttl = config::get_duration("CACHE_TTL", Duration::from_secs(600));
    info!(log, "cache configured"; "backend" => &backend, "ttl" => ?ttl);

    let bridge = match HttpPredictionBridge::from_config() {
        Ok(bridge) => bridge,
        Err(err) => {
            crit!(log, "failed to create prediction bridge"; "error" => %err);
            return;
        }
    };
    let orchestrator = TrainingOrchestrator::new(
        Arc::new(bridge),
        Arc::new(MemoryJobRegistry::new()),
        PollSettings::from_config(),
        shutdown.clone(),
    );

    let state = Arc::new(AppState {
        forecast: ForecastService::new(store.clone(), ForecastComputer::from_config(), ttl),
        orchestrator: Arc::new(orchestrator),
        default_variant: Variant::from_config(),
    });

    tokio::spawn(cron::run(store, shutdown.clone()));

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    if let Err(err) = web::run(state, shutdown.clone()).await {
        crit!(log, "web server stopped"; "error" => %err);
    }
    shutdown.cancel();
    info!(log, "Shut down");
}
