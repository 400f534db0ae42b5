//! Log setup: `RUST_LOG` wins, otherwise the level follows `-v`/`-q`.

use crate::error::{CliError, CliResult};
use tracing_subscriber::EnvFilter;

/// How logs are filtered and formatted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogOptions {
    /// `-v` count
    pub verbose: u8,
    /// Errors only
    pub quiet: bool,
    /// JSON lines instead of text
    pub json: bool,
}

impl LogOptions {
    /// Level applied to this workspace's crates
    #[must_use]
    pub const fn level(self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// Filter directives used when `RUST_LOG` is unset
    #[must_use]
    pub fn directives(self) -> String {
        let level = self.level();
        format!("warn,probar_coverage={level},probar_coverage_cli={level}")
    }
}

/// Install the global subscriber, writing to stderr
pub fn init_logging(options: LogOptions) -> CliResult<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(options.directives()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = if options.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| CliError::Logging {
        message: e.to_string(),
    })
}
