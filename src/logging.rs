/// Environment variable holding the `EnvFilter` directives for the binary.
pub const LOG_ENV: &str = "NOTIFICATIONS_MIGRATOR_LOG";
pub const DEFAULT_FILTER: &str = "notifications_migrator=info,sqlx=warn";

/// Installs the JSON tracing subscriber used by the command-line tool.
///
/// Events go to stderr so stdout carries only progress markers and the
/// optional JSON summary. `log` records from dependencies are bridged into
/// tracing. Calling this twice is harmless.
pub fn init() {
    let _ = tracing_log::LogTracer::init();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(std::env::var(LOG_ENV).unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .json()
        .with_target(true)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .try_init();
}
