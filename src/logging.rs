//! Tracing subscriber for the ledger
//!
//! Transfer events carry `transfer_id`, `from`, `to` and `amount` fields, so the
//! JSON output flattens them onto the top-level object where log shippers can
//! index them directly.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Map the `rotation` config value to an appender policy. Unknown values keep
/// a single file.
fn rotation_policy(name: &str) -> Rotation {
    match name.to_ascii_lowercase().as_str() {
        "minutely" => Rotation::MINUTELY,
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        _ => Rotation::NEVER,
    }
}

/// Directives used when `RUST_LOG` is unset. sqlx logs every statement at
/// info, which would bury the transfer events.
fn default_directives(level: &str) -> String {
    format!("{},sqlx=warn,minledger={}", level, level)
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(default_directives(level)).unwrap_or_else(|e| {
            eprintln!("invalid log_level {:?} ({}), falling back to info", level, e);
            EnvFilter::new(default_directives("info"))
        })
    })
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let appender = RollingFileAppender::new(
        rotation_policy(&config.rotation),
        &config.log_dir,
        &config.log_file,
    );
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let registry = tracing_subscriber::registry().with(build_filter(&config.log_level));

    if config.use_json {
        let ledger_layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_target(true)
            .with_writer(writer);
        registry.with(ledger_layer).init();
    } else {
        let ledger_layer = fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(writer);
        let console_layer = fmt::layer().compact().with_target(false);
        registry.with(ledger_layer).with(console_layer).init();
    }

    guard
}
