//! Tracing setup. Reads [`crate::config::LoggingConfig`] and installs a
//! global subscriber; callers invoke this once from `main` before doing
//! anything else.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::LoggingConfig;
use crate::error::Error;

/// Installs the global `tracing` subscriber. `RUST_LOG` overrides
/// `logging.level` when set; otherwise the configured level applies to
/// the whole crate and its dependencies default to `warn`. When
/// `logging.directory` is set, events also go to a daily-rolling file
/// there in addition to stdout; the returned guard must be held for the
/// life of the process or buffered lines on that writer are lost.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>, Error> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}", config.level)));
    let registry = Registry::default().with(filter);
    let install_err = |e: Box<dyn std::error::Error + Send + Sync>| Error::Fatal(format!("failed to install tracing subscriber: {e}"));

    match (config.format == "json", config.directory.as_deref()) {
        (true, None) => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
            .map(|()| None)
            .map_err(|e| install_err(e.into())),
        (false, None) => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .map(|()| None)
            .map_err(|e| install_err(e.into())),
        (true, Some(dir)) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "marmot-server.log"));
            registry
                .with(tracing_subscriber::fmt::layer().json().with_target(true).with_ansi(false).with_writer(non_blocking))
                .try_init()
                .map(|()| Some(guard))
                .map_err(|e| install_err(e.into()))
        }
        (false, Some(dir)) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "marmot-server.log"));
            registry
                .with(tracing_subscriber::fmt::layer().with_target(true).with_ansi(false).with_writer(non_blocking))
                .try_init()
                .map(|()| Some(guard))
                .map_err(|e| install_err(e.into()))
        }
    }
}
