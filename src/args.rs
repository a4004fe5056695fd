//! Command line arguments for the `optics` binary (§4.14).

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Runs a suite of test cases end to end: loads suite files and config,
/// builds a session, drives it to completion, and prints a summary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "optics",
    version,
    help_template = "USAGE: optics [OPTIONS] <SUITE_FILES>...\n\n{all-args}\n\n{after-help}",
    after_help = "Suite files may be CSV or YAML; their role (test cases, modules, or \n\
        elements) is detected from content, not from the file extension."
)]
pub struct Arguments {
    /// Suite files to load (test cases, modules, elements; any mix of CSV
    /// and YAML).
    #[arg(value_name = "SUITE_FILES", required = true)]
    pub suite_files: Vec<PathBuf>,

    /// Project-level config file (YAML), layered over the global and
    /// built-in defaults.
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory execution output (screenshots, JUnit XML, logs) is
    /// written under.
    #[arg(long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Resolve element/test-case parameters and walk the tree, but never
    /// invoke a keyword's callable.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Specifies whether or not to color the output.
    #[arg(
        long = "color",
        value_enum,
        value_name = "auto|always|never",
        default_value = "auto"
    )]
    pub color: ColorSetting,

    /// Logging verbosity (passed straight through to the `tracing`
    /// `EnvFilter`, e.g. `info`, `debug`, `optics=trace`).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Arguments {
    pub fn from_args() -> Self {
        Parser::parse()
    }
}

/// Possible values for the `--color` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum ColorSetting {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorSetting {
    pub fn should_colorize(self) -> bool {
        match self {
            ColorSetting::Always => true,
            ColorSetting::Never => false,
            ColorSetting::Auto => supports_color::on(supports_color::Stream::Stdout).is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Arguments::command().debug_assert();
    }
}
