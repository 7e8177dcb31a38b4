use std::io;

/// Install the global tracing subscriber. Logs go to stderr so stdout only
/// carries the JSON output.
pub fn setup_logging(verbose_level: u8) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        // Use RUST_LOG if set
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        // Map verbosity count to filters
        let filter_str = match verbose_level {
            0 => "warn,thinking_split=info,thinking=info",
            1 => "info,thinking_split=debug,thinking=debug",
            _ => "debug,thinking_split=trace,thinking=trace",
        };
        tracing_subscriber::EnvFilter::new(filter_str)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .with_writer(io::stderr)
        .init();
}
