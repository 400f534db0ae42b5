//! Report rendering

use crate::commands::OutputFormatArg;
use crate::error::{CliError, CliResult};
use crate::runner::RunReport;
use console::style;
use probar_coverage::CoverageReport;

/// Render a run in the requested format
pub fn render(report: &RunReport, format: OutputFormatArg, use_color: bool) -> CliResult<String> {
    match format {
        OutputFormatArg::Summary => Ok(render_summary(report, use_color)),
        OutputFormatArg::Json => serde_json::to_string_pretty(report)
            .map(|mut json| {
                json.push('\n');
                json
            })
            .map_err(|e| CliError::report_generation(e.to_string())),
    }
}

fn render_summary(report: &RunReport, use_color: bool) -> String {
    let mut out = String::new();
    for (title, kind) in [("JS", &report.js), ("CSS", &report.css)] {
        if let Some(kind) = kind {
            out.push_str(&section(title, kind, use_color));
        }
    }
    out
}

fn section(title: &str, report: &CoverageReport, use_color: bool) -> String {
    let percent = report.coverage_percent();
    let mut out = if use_color {
        format!(
            "{} {}",
            style(title).bold().force_styling(true),
            paint_percent(percent)
        )
    } else {
        format!("{title} {percent:.1}%")
    };
    out.push_str(&format!(
        " ({} resources, {}/{} bytes)\n",
        report.entries.len(),
        report.covered_bytes(),
        report.total_bytes()
    ));
    // First summary line repeats the totals above.
    for line in report.summary().lines().skip(1) {
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn paint_percent(percent: f64) -> String {
    let text = format!("{percent:.1}%");
    let styled = if percent >= 80.0 {
        style(text).green()
    } else if percent >= 50.0 {
        style(text).yellow()
    } else {
        style(text).red()
    };
    styled.force_styling(true).to_string()
}
