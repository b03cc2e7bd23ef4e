use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the process-wide tracing subscriber.
///
/// Format is selected via `DOCPIPE_LOG_FORMAT` (`json` or `text`, default
/// `text`); level via the standard `RUST_LOG` filter. Safe to call more
/// than once; subsequent calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("DOCPIPE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let subscriber = fmt().with_env_filter(filter);
    let result = if json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    // try_init returns Err if a subscriber is already set; ignore.
    let _ = result;
}
