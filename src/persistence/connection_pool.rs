use crate::config;
use crate::errors::Result;
use deadpool_diesel::postgres::Pool;
use deadpool_diesel::{Manager, ManagerConfig, RecyclingMethod};
use once_cell::sync::Lazy;

pub type Client = deadpool_diesel::postgres::Connection;

static POOL: Lazy<Pool> = Lazy::new(|| {
    let max_size: usize = config::get_or("PG_POOL_SIZE", 16);
    let dsn = config::get("PG_DSN")
        .unwrap_or_else(|_| config::config().database.dsn.clone());
    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let mgr = Manager::from_config(dsn, deadpool_diesel::Runtime::Tokio1, mgr_config);
    // builder が失敗するのは max_size 等の設定ミスのみ
    Pool::builder(mgr)
        .max_size(max_size)
        .build()
        .unwrap_or_else(|e| panic!("failed to build connection pool: {e}"))
});

pub async fn get() -> Result<Client> {
    Ok(POOL.get().await?)
}
