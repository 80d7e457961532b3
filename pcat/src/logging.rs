//! Process-wide log output with elapsed-time and rank prefixes.

use std::fmt;
use std::time::Instant;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

use pcat_result::{Error, Result};

/// Prefixes each record with seconds since install and the rank.
#[derive(Debug, Clone)]
struct RankTimer {
    start: Instant,
    rank: usize,
}

impl FormatTime for RankTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let elapsed = self.start.elapsed().as_secs_f64();
        write!(w, "[ {:09.2} ] {:>3}:", elapsed, self.rank)
    }
}

/// Map a user-facing level name to a filter directive.
fn level_directive(level: &str) -> Result<&'static str> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warning" | "warn" => Ok("warn"),
        _ => Err(Error::InvalidArgumentError(format!(
            "unknown log level '{level}'; expected one of info, debug, warning, trace"
        ))),
    }
}

/// Install the global subscriber at `level`, tagging every line with `rank`.
///
/// Only the first install in a process takes effect; later calls return
/// [`Error::Internal`].
pub fn setup_logging(level: &str, rank: usize) -> Result<()> {
    let directive = level_directive(level)?;
    let filter = EnvFilter::try_new(directive)
        .map_err(|e| Error::InvalidArgumentError(format!("invalid log filter: {e}")))?;

    tracing_subscriber::fmt()
        .with_timer(RankTimer {
            start: Instant::now(),
            rank,
        })
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| Error::Internal(format!("logging already installed: {e}")))?;

    tracing::debug!(rank, level = directive, "logging installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(level_directive("INFO").unwrap(), "info");
        assert_eq!(level_directive("Warning").unwrap(), "warn");
        assert_eq!(level_directive("warn").unwrap(), "warn");
        assert_eq!(level_directive("trace").unwrap(), "trace");
    }

    #[test]
    fn timer_prints_elapsed_and_rank() {
        let timer = RankTimer {
            start: Instant::now(),
            rank: 7,
        };
        let mut out = String::new();
        timer.format_time(&mut Writer::new(&mut out)).unwrap();
        assert!(out.starts_with("[ 000000.0"), "{out}");
        assert!(out.ends_with("]   7:"), "{out}");
    }
}
