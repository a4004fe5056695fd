//! Two named loggers in the spirit of the source's dual-logger design: an
//! internal/diagnostic logger and a user-facing execution logger, both
//! built on `tracing` rather than ad hoc `println!` (§4.13).

use once_cell::sync::Lazy;
use regex::Regex;
use tracing_subscriber::{fmt, EnvFilter};

/// Target used for crate-internal diagnostics (backend calls, retries,
/// event-bus drops).
pub const INTERNAL_TARGET: &str = "optics::internal";

/// Target used for user-facing, keyword-level narration. Anything logged
/// under this target is also suitable for mirroring into the report's
/// `log` children (§4.8).
pub const EXECUTION_TARGET: &str = "optics::execution";

static SENSITIVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^@:").unwrap());

/// Redacts a single value whose whole form marks it sensitive (`@:<token>`,
/// §4.8). Shared by execution-log narration and the report writer so a
/// sensitive argument never reaches either surface. Non-matching values
/// pass through untouched.
pub fn redact(value: &str) -> String {
    if SENSITIVE_RE.is_match(value) {
        "****".to_string()
    } else {
        value.to_string()
    }
}

/// Installs a global `tracing` subscriber. Call once at process startup
/// (§9 Design Notes: global state confined to startup). `log_level` is the
/// configured level name (`"INFO"`, `"DEBUG"`, ...); an unparsable value
/// falls back to `info`.
pub fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level)
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_are_distinct() {
        assert_ne!(INTERNAL_TARGET, EXECUTION_TARGET);
    }

    #[test]
    fn redacts_sensitive_token_only() {
        assert_eq!(redact("@:secret123"), "****");
        assert_eq!(redact("plain_value"), "plain_value");
    }
}
