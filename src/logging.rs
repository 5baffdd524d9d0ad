use crate::config;
use once_cell::sync::Lazy;
pub use slog::*;

fn wrap<D>(drain: D) -> Fuse<slog_async::Async>
where
    D: Drain<Err = Never, Ok = ()> + Send + 'static,
{
    slog_async::Async::new(slog_envlogger::new(drain))
        .chan_size(2 << 12)
        .thread_name("slog-async".into())
        .build()
        .fuse()
}

pub static DEFAULT: Lazy<Logger> = Lazy::new(|| {
    let mk_term = || {
        slog_term::FullFormat::new(slog_term::TermDecorator::new().build())
            .build()
            .fuse()
    };

    let mk_json = || {
        slog_json::Json::new(std::io::stdout())
            .add_default_keys()
            .build()
            .fuse()
    };

    let format = config::get("RUST_LOG_FORMAT").unwrap_or_default();
    let drain = match format.as_str() {
        "term" | "text" => wrap(mk_term()),
        _ => wrap(mk_json()),
    };

    Logger::root(
        drain,
        o!(
            "service" => "retrofit-forecast",
            "version" => env!("CARGO_PKG_VERSION"),
            "commit" => option_env!("GIT_COMMIT_HASH").unwrap_or("unknown"),
        ),
    )
});
