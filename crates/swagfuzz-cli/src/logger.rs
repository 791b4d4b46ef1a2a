use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Filter directive from `SWAGFUZZ_LOG`, then `RUST_LOG`, else the verbosity default.
fn filter_directive(swagfuzz_log: Option<String>, rust_log: Option<String>, verbose: bool) -> String {
    swagfuzz_log.or(rust_log).unwrap_or_else(|| {
        if verbose { "debug" } else { "info" }.to_string()
    })
}

/// Install the stderr subscriber; stdout stays reserved for the report.
pub fn init_logging(verbose: bool) {
    let directive = filter_directive(
        std::env::var("SWAGFUZZ_LOG").ok(),
        std::env::var("RUST_LOG").ok(),
        verbose,
    );
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set global default subscriber: {err}");
    }
}
