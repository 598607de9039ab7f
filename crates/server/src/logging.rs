use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,tower_http=warn,hyper=warn";
const LOG_FILE_NAME: &str = "server.log";

pub struct LoggingHandle {
    pub run_id: String,
    pub guard: WorkerGuard,
}

/// Install the global subscriber. Writes to `<log_dir>/server.log` when a
/// directory is given, otherwise to stderr.
pub fn init_logging(log_dir: Option<&Path>) -> anyhow::Result<LoggingHandle> {
    let filter = std::env::var("CHATDOCK_SERVER_LOG_FILTER")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let (writer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            if std::env::var("CHATDOCK_TRUNCATE_SERVER_LOG_ON_START").as_deref() == Ok("1") {
                let _ = std::fs::OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(dir.join(LOG_FILE_NAME))?;
            }
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, LOG_FILE_NAME))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };
    let to_file = log_dir.is_some();
    let default_format = if to_file { "json" } else { "pretty" };
    let format = std::env::var("CHATDOCK_SERVER_LOG_FORMAT")
        .unwrap_or_else(|_| default_format.to_string());

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("pretty") {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(!to_file)
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .flatten_event(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init()?;
    }

    let run_id = std::env::var("CHATDOCK_SERVER_RUN_ID").unwrap_or_else(|_| {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("pid-{}-{}", std::process::id(), now)
    });

    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        run_id = %run_id,
        log_path = %log_dir
            .map(|dir| dir.join(LOG_FILE_NAME).display().to_string())
            .unwrap_or_else(|| "stderr".to_string()),
        format = %format,
        filter = %std::env::var("CHATDOCK_SERVER_LOG_FILTER")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
    );

    Ok(LoggingHandle { run_id, guard })
}
