//! ---
//! rcc_section: "03-persistence-logging"
//! rcc_subsection: "module"
//! rcc_type: "source"
//! rcc_scope: "code"
//! rcc_description: "Tracing subscriber setup for the controller daemon and its console."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "RCC_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static JSON_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Available stdout log formats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    StructuredJson,
    #[default]
    Pretty,
}

/// Install the global subscriber for `service_name`.
///
/// The filter comes from `RCC_LOG`, then `RUST_LOG`, then `info`. Pretty output
/// is written synchronously so it stays ordered with the console's own
/// `println!` traffic; JSON output goes through a non-blocking writer. The
/// daily rolling JSON file is optional (`logging.file`).
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    let filter = resolve_filter(
        std::env::var(LOG_ENV).ok(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
    );

    let stdout_layer = match config.format {
        LogFormat::StructuredJson => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            let _ = JSON_GUARD.set(guard);
            fmt::layer()
                .with_target(false)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .json()
                .with_writer(writer)
                .boxed()
        }
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(std::io::stdout)
            .boxed(),
    };

    let file_layer = if config.file {
        std::fs::create_dir_all(&config.directory)?;
        let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
        let appender = daily(&config.directory, format!("{prefix}.log"));
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        Some(
            fmt::layer()
                .with_target(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .json()
                .with_writer(writer)
                .boxed(),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .ok();

    info!(
        service = %service_name,
        format = ?config.format,
        log_file = config.file,
        log_dir = %config.directory.display(),
        "tracing initialised"
    );
    Ok(())
}

/// Pick the first usable directive. A malformed `RCC_LOG` is reported on stderr
/// and falls back to `info` rather than to `RUST_LOG`.
fn resolve_filter(rcc_log: Option<String>, rust_log: Option<String>) -> EnvFilter {
    match (rcc_log, rust_log) {
        (Some(directive), _) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive `{directive}` ({err}); defaulting to {DEFAULT_DIRECTIVE}");
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        (None, Some(directive)) => {
            EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
        }
        (None, None) => EnvFilter::new(DEFAULT_DIRECTIVE),
    }
}
