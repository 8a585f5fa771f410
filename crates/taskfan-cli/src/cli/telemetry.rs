use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global log subscriber.
///
/// Output goes to stderr so that command output on stdout stays clean. The
/// filter defaults to `info` and can be overridden with `RUST_LOG`.
pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_names(true)
                .with_target(false),
        )
        .try_init()?;
    Ok(())
}
