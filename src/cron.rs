use crate::config;
use crate::errors::{Error, Result};
use crate::forecast::cache::CacheStore;
use crate::logging::*;
use chrono::Utc as TZ;
use cron::Schedule;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_EVICTION_CRON: &str = "0 */10 * * * *"; // デフォルト: 10分間隔

/// 期限切れキャッシュの掃除を定期実行する（shutdown まで戻らない）
pub async fn run(store: Arc<dyn CacheStore>, shutdown: CancellationToken) {
    let log = DEFAULT.new(o!("function" => "cron::run"));

    let schedule = match get_cron_schedule("CACHE_EVICTION_SCHEDULE", DEFAULT_EVICTION_CRON) {
        Ok(schedule) => schedule,
        Err(err) => {
            error!(log, "eviction sweep disabled"; "error" => %err);
            return;
        }
    };

    let sweep = move || {
        let store = store.clone();
        async move { evict_expired(store.as_ref()).await.map(|_| ()) }
    };
    cronjob(schedule, sweep, "evict_expired", shutdown).await;
}

/// 期限切れの行を削除して件数を返す
pub async fn evict_expired(store: &dyn CacheStore) -> Result<usize> {
    let log = DEFAULT.new(o!("function" => "evict_expired"));
    let now = TZ::now().naive_utc();

    let count = store.evict_expired(now).await?;
    if count > 0 {
        info!(log, "evicted expired cache entries"; "count" => count);
    } else {
        debug!(log, "no expired cache entries");
    }
    Ok(count)
}

/// 設定から cron スケジュールを取得する。パースできなければ既定値
fn get_cron_schedule(key: &str, default: &str) -> Result<Schedule> {
    let log = DEFAULT.new(o!("function" => "get_cron_schedule", "key" => key.to_owned()));
    let cron_conf = config::get(key).unwrap_or_else(|_| default.to_string());

    match cron_conf.parse() {
        Ok(s) => {
            info!(log, "cron schedule configured"; "schedule" => &cron_conf);
            Ok(s)
        }
        Err(e) => {
            error!(log, "failed to parse cron schedule, using default";
                   "error" => %e, "schedule" => &cron_conf, "default" => default);
            default
                .parse()
                .map_err(|e| Error::Internal(format!("invalid cron schedule {default}: {e}")))
        }
    }
}

async fn cronjob<F, Fut>(schedule: Schedule, func: F, name: &str, shutdown: CancellationToken)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let log = DEFAULT.new(o!("function" => "cronjob", "name" => name.to_owned()));
    info!(log, "starting cron job");

    for (iteration, next) in schedule.upcoming(TZ).enumerate() {
        let now = TZ::now();
        if next <= now {
            warn!(log, "execution time already passed, skipping";
                "next" => %next,
                "now" => %now,
                "iteration" => iteration
            );
            continue;
        }

        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        debug!(log, "waiting for next execution";
            "wait_ms" => wait.as_millis() as u64,
            "next" => %next
        );
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(log, "cron job stopped");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        match func().await {
            Ok(_) => debug!(log, "success"; "iteration" => iteration),
            Err(err) => error!(log, "failure"; "error" => %err, "iteration" => iteration),
        }
    }
}
