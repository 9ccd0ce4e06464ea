use tracing_subscriber::EnvFilter;

/// Install the global subscriber for the binary. `RUST_LOG` wins over the
/// verbosity flag when it is set.
pub fn init(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sortquest={default_level}")));

    // A subscriber may already be installed (tests, embedding); ignore that.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
