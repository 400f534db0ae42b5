//! probar-coverage: collect JS/CSS coverage from a live page
//!
//! ## Usage
//!
//! ```bash
//! chromium --remote-debugging-port=9222 &
//! probar-coverage --ws-url ws://127.0.0.1:9222/devtools/page/<id>
//! probar-coverage --ws-url ... --duration 30 --no-css --format json
//! probar-coverage --ws-url ... --config coverage.yaml -vv
//! ```

use clap::Parser;
use console::style;
use probar_coverage_cli::{
    init_logging, render, resolve_settings, run_against, Cli, CliError, CliResult, LogOptions,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    init_logging(LogOptions {
        verbose: cli.verbose,
        quiet: cli.quiet,
        json: cli.log_json,
    })?;
    let settings = resolve_settings(&cli)?;

    if !cli.quiet {
        eprintln!(
            "{} coverage for {}s (Ctrl-C to stop early)",
            style("Collecting").cyan(),
            settings.duration_secs
        );
    }

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::runtime(format!("Failed to create runtime: {e}")))?;
    let report = rt.block_on(run_against(&cli.ws_url, &settings))?;

    print!("{}", render(&report, cli.format, cli.color.should_color())?);
    Ok(())
}
