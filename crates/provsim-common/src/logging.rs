//! ---
//! ps_section: "01-core-functionality"
//! ps_subsection: "logging"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Tracing subscriber setup for provsim services."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::{Context, Result};
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

const LOG_ENV: &str = "PROVSIM_LOG";
const FALLBACK_ENV: &str = "RUST_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

static GUARDS: OnceCell<[WorkerGuard; 2]> = OnceCell::new();

/// Stdout rendering for the daemon. The rolling file is always JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// First non-blank directive among `PROVSIM_LOG` and `RUST_LOG`, else `info`.
pub fn filter_directive(primary: Option<&str>, fallback: Option<&str>) -> String {
    [primary, fallback]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|directive| !directive.is_empty())
        .unwrap_or(DEFAULT_DIRECTIVE)
        .to_owned()
}

/// Path prefix of the daily log file.
pub fn log_file_stem(service_name: &str, config: &LoggingConfig) -> PathBuf {
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
    config.directory.join(format!("{prefix}.log"))
}

/// Install the global subscriber: an env filter, a stdout layer in the
/// configured format, and a daily rolling JSON file under
/// `config.directory`. A subscriber installed earlier in the process is left
/// in place.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!("unable to create log directory {}", config.directory.display())
    })?;

    let primary = std::env::var(LOG_ENV).ok();
    let fallback = std::env::var(FALLBACK_ENV).ok();
    let directive = filter_directive(primary.as_deref(), fallback.as_deref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("invalid log directive '{directive}' ({err}); using {DEFAULT_DIRECTIVE}");
        EnvFilter::new(DEFAULT_DIRECTIVE)
    });

    let stem = log_file_stem(service_name, config);
    let file_name = stem
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{service_name}.log"));
    let (file_writer, file_guard) = tracing_appender::non_blocking(daily(&config.directory, file_name));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = GUARDS.set([file_guard, stdout_guard]);

    let stdout_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .json()
            .with_current_span(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_thread_names(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };
    let file_layer = fmt::layer()
        .json()
        .with_thread_names(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(file_writer)
        .boxed();

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    info!(
        service = %service_name,
        directive = %directive,
        log_file = %stem.display(),
        format = ?config.format,
        installed,
        "tracing initialised"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provsim_log_wins_over_rust_log() {
        assert_eq!(filter_directive(Some("debug"), Some("warn")), "debug");
        assert_eq!(filter_directive(None, Some("warn")), "warn");
        assert_eq!(filter_directive(Some("  "), Some("warn")), "warn");
        assert_eq!(filter_directive(None, None), "info");
    }

    #[test]
    fn file_prefix_defaults_to_service_name() {
        let mut config = LoggingConfig {
            directory: PathBuf::from("/var/log/provsim"),
            ..LoggingConfig::default()
        };
        assert_eq!(
            log_file_stem("provsimd", &config),
            PathBuf::from("/var/log/provsim/provsimd.log")
        );
        config.file_prefix = Some("site-a".into());
        assert_eq!(
            log_file_stem("provsimd", &config),
            PathBuf::from("/var/log/provsim/site-a.log")
        );
    }
}
