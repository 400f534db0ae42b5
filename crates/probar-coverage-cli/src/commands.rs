//! CLI argument definitions using clap

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// probar-coverage: collect JS and CSS coverage from a live page over CDP
#[derive(Parser, Debug)]
#[command(name = "probar-coverage")]
#[command(author, version, about, long_about = None)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Page WebSocket debugger URL (see http://127.0.0.1:9222/json)
    #[arg(long, env = "PROBAR_COVERAGE_WS_URL")]
    pub ws_url: String,

    /// YAML settings file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Seconds to collect before stopping (overrides the settings file)
    #[arg(short, long)]
    pub duration: Option<u64>,

    /// Skip script coverage
    #[arg(long)]
    pub no_js: bool,

    /// Skip stylesheet coverage
    #[arg(long)]
    pub no_css: bool,

    /// Report scripts without a URL as debugger://VM<id>
    #[arg(long)]
    pub report_anonymous: bool,

    /// Attach raw per-function coverage to script entries
    #[arg(long)]
    pub include_raw: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "summary")]
    pub format: OutputFormatArg,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Color output (auto, always, never)
    #[arg(long, value_enum, default_value = "auto")]
    pub color: ColorArg,
}

/// Report output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormatArg {
    /// Human-readable per-resource summary
    #[default]
    Summary,
    /// Entries as JSON
    Json,
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorArg {
    /// Whether stdout output should be colored
    #[must_use]
    pub fn should_color(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::io::IsTerminal::is_terminal(&std::io::stdout()),
        }
    }
}
