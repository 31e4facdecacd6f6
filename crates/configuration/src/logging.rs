use crate::error::ConfigError;
use crate::settings::Config;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Dependencies whose debug output drowns out the engine's own.
const QUIET_TARGETS: &[&str] = &["sqlx=warn", "reqwest=warn", "hyper=warn", "hyper_util=warn"];

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the filter is built from `log_level`.
/// With `log_dir` configured, a second non-ANSI layer writes to a daily rolling
/// file. The returned guard must be held for the lifetime of the process or
/// buffered file output is lost.
pub fn init_tracing(config: &Config) -> Result<Option<WorkerGuard>, ConfigError> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        let directives = std::iter::once(config.log_level.as_str())
            .chain(QUIET_TARGETS.iter().copied())
            .collect::<Vec<_>>()
            .join(",");
        EnvFilter::try_new(directives)
    })
    .map_err(|e| ConfigError::Logging(e.to_string()))?;

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true));

    match &config.log_dir {
        Some(dir) => {
            let appender =
                tracing_appender::rolling::daily(dir, format!("{}.log", config.module_name));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()
                .map_err(|e| ConfigError::Logging(e.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            registry
                .try_init()
                .map_err(|e| ConfigError::Logging(e.to_string()))?;
            Ok(None)
        }
    }
}
