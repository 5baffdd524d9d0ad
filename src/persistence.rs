pub mod api_cache;
pub mod connection_pool;
pub mod schema;
