pub mod config;
pub mod cron;
pub mod errors;
pub mod forecast;
pub mod logging;
pub mod ml;
pub mod persistence;
pub mod web;

pub use errors::{Error, Result};
