use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Quiet by default so log lines don't interleave with the transcript.
pub const DEFAULT_FILTER: &str = "warn";

/// Install the stderr subscriber. `filter` wins over `RUST_LOG` when set.
pub fn init_logging(filter: Option<&str>) -> anyhow::Result<()> {
    let filter = filter
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_target(false),
        )
        .try_init()?;

    tracing::debug!(
        component = "logging",
        event = "logging.initialized",
        "Client logging initialized"
    );
    Ok(())
}
