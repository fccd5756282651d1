//! Log output of both binaries. Each writes its own daily rolling files under `<root>/logs`,
//! so `cli.<date>` and `daemon.<date>` never interleave.

use std::{path::Path, sync::LazyLock};

use anyhow::{anyhow, Result};
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::{
    fmt::{format::FmtSpan, writer::MakeWriterExt},
    EnvFilter,
};

pub const CLI_PREFIX: &str = "cli";
pub const DAEMON_PREFIX: &str = "daemon";

/// One file per day, a week of history.
const KEPT_LOG_FILES: usize = 7;
const DEFAULT_LEVEL: &str = "debug";

/// Installs the global subscriber for one binary. An explicit `log_level` wins over `RUST_LOG`.
/// `show_std` mirrors the log to stdout.
pub fn enable_logging(
    prefix: &str,
    logs_dir: &Path,
    log_level: Option<LevelFilter>,
    show_std: bool,
) -> Result<()> {
    let appender = tracing_appender::rolling::Builder::new()
        .rotation(Rotation::DAILY)
        .max_log_files(KEPT_LOG_FILES)
        .filename_prefix(prefix)
        .build(logs_dir)
        .map_err(|e| anyhow!("Cannot write codetally logs to {logs_dir:?}: {e}"))?;

    let stdout = std::io::stdout.with_filter(move |_| show_std);
    let directive = crate_directive(log_level, std::env::var("RUST_LOG").ok());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directive))
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(show_std)
        .with_writer(stdout.and(appender))
        .pretty()
        .try_init()
        .map_err(|e| anyhow!("Logging for the codetally {prefix} is already set up: {e}"))
}

/// Only this crate logs; git2 and reqwest stay quiet whatever level is asked for.
fn crate_directive(log_level: Option<LevelFilter>, from_env: Option<String>) -> String {
    let level = log_level
        .map(|v| v.to_string().to_lowercase())
        .or(from_env.filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_LEVEL.into());
    format!("{}={level}", env!("CARGO_PKG_NAME").replace('-', "_"))
}

pub static TEST_LOGGING: LazyLock<()> = LazyLock::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_test_writer()
        .pretty()
        .try_init();
});

#[cfg(test)]
mod tests {
    use tracing::level_filters::LevelFilter;

    use super::crate_directive;

    #[test]
    fn explicit_level_wins_over_environment() {
        assert_eq!(
            crate_directive(Some(LevelFilter::TRACE), Some("warn".into())),
            "codetally=trace"
        );
        assert_eq!(crate_directive(None, Some("warn".into())), "codetally=warn");
    }

    #[test]
    fn blank_environment_falls_back_to_debug() {
        assert_eq!(crate_directive(None, Some(" ".into())), "codetally=debug");
        assert_eq!(crate_directive(None, None), "codetally=debug");
    }
}
