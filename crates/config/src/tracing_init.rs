use tracing_subscriber::{fmt, EnvFilter};

/// Dependencies that are chatty at `info`/`debug` and drown connector logs.
const QUIET_DIRECTIVES: [&str; 3] = ["hyper=warn", "reqwest=warn", "sqlx=warn"];

/// Install the global `fmt` subscriber.
///
/// Filter precedence: `RUST_LOG`, then `LOG_LEVEL`, then `default_level`.
/// Calling it twice is harmless; the first subscriber stays installed.
pub fn init_tracing(default_level: &str) {
    let _ = fmt()
        .with_env_filter(build_filter(default_level))
        .with_target(true)
        .try_init();
}

fn build_filter(default_level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_env("RUST_LOG") {
        return filter;
    }
    let level = EnvFilter::try_from_env("LOG_LEVEL")
        .map(|f| f.to_string())
        .unwrap_or_else(|_| default_level.to_owned());

    let mut directives = vec![level];
    directives.extend(QUIET_DIRECTIVES.iter().map(|d| d.to_string()));
    EnvFilter::new(directives.join(","))
}
