//! Utilities: logging setup (dynamic level) and settings / credentials.
//!
//! Key items:
//!   init_logging / derive_level
//!   config::{Settings, Overrides, Credentials}

pub mod config;

use tracing::Level;

/// Map `-v` / `-q` to a tracing level.
///
/// The default is WARN: stdout carries the report and stderr should only
/// show diagnostics unless asked.
pub fn derive_level(verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global stderr subscriber. A second call is a no-op.
pub fn init_logging(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(level == Level::TRACE)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_wins_over_verbose() {
        assert_eq!(derive_level(2, true), Level::ERROR);
    }

    #[test]
    fn verbosity_steps() {
        assert_eq!(derive_level(0, false), Level::WARN);
        assert_eq!(derive_level(1, false), Level::DEBUG);
        assert_eq!(derive_level(5, false), Level::TRACE);
    }
}
