//! One collection run: resolve settings, start trackers, wait, stop.

use crate::commands::Cli;
use crate::error::{CliError, CliResult};
use probar_coverage::{
    methods, CoverageReport, CoverageSettings, PageCoverage, ProtocolCommand, ProtocolSession,
    WebSocketSession,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Reports from one run, one per collected kind
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    /// Script coverage, when collected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub js: Option<CoverageReport>,
    /// Stylesheet coverage, when collected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css: Option<CoverageReport>,
}

/// Load the settings file (if any) and apply flag overrides
pub fn resolve_settings(cli: &Cli) -> CliResult<CoverageSettings> {
    let mut settings = match &cli.config {
        Some(path) => CoverageSettings::load(path)?,
        None => CoverageSettings::default(),
    };
    if let Some(duration) = cli.duration {
        settings.duration_secs = duration;
    }
    if cli.no_js {
        settings.collect_js = false;
    }
    if cli.no_css {
        settings.collect_css = false;
    }
    if cli.report_anonymous {
        settings.js.report_anonymous_scripts = true;
    }
    if cli.include_raw {
        settings.js.include_raw_script_coverage = true;
    }
    settings.validate()?;
    if settings.duration_secs == 0 {
        return Err(CliError::config("duration must be at least one second"));
    }
    Ok(settings)
}

/// Start the selected trackers, wait for `until`, then stop them.
///
/// If stylesheet coverage fails to start, script coverage is stopped
/// before the error is returned.
pub async fn collect(
    session: Arc<dyn ProtocolSession>,
    settings: &CoverageSettings,
    until: impl Future<Output = ()>,
) -> CliResult<RunReport> {
    let mut coverage = PageCoverage::new(session);

    if settings.collect_js {
        coverage.start_js_coverage(settings.js.clone()).await?;
    }
    if settings.collect_css {
        if let Err(e) = coverage.start_css_coverage(settings.css.clone()).await {
            if coverage.js().is_enabled() {
                if let Err(stop_err) = coverage.stop_js_coverage().await {
                    warn!("failed to stop JS coverage: {stop_err}");
                }
            }
            return Err(e.into());
        }
    }

    until.await;

    // Both trackers are stopped before the first failure is reported.
    let js = if settings.collect_js {
        Some(coverage.stop_js_coverage().await)
    } else {
        None
    };
    let css = if settings.collect_css {
        Some(coverage.stop_css_coverage().await)
    } else {
        None
    };
    Ok(RunReport {
        js: js.transpose()?.map(CoverageReport::new),
        css: css.transpose()?.map(CoverageReport::new),
    })
}

/// Resolves after `duration` or on Ctrl-C, whichever comes first
pub async fn wait_for_stop(duration: Duration) {
    tokio::select! {
        () = tokio::time::sleep(duration) => {}
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("interrupted, stopping coverage"),
                Err(e) => warn!("cannot listen for Ctrl-C: {e}"),
            }
        }
    }
}

/// Connect to `ws_url` and collect coverage for the configured duration
pub async fn run_against(ws_url: &str, settings: &CoverageSettings) -> CliResult<RunReport> {
    let session = Arc::new(WebSocketSession::connect(ws_url).await?);
    // Context-reset events are only sent once the Runtime domain is on.
    session
        .send_command(ProtocolCommand::new(methods::RUNTIME_ENABLE))
        .await?;

    let duration = Duration::from_secs(settings.duration_secs);
    let report = collect(session.clone(), settings, wait_for_stop(duration)).await;
    session.close();
    report
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::Parser;
    use probar_coverage::{CoverageError, MockSession};
    use serde_json::json;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["probar-coverage", "--ws-url", "ws://127.0.0.1:9222/devtools/page/1"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    mod settings_tests {
        use super::*;

        #[test]
        fn test_defaults_without_config() {
            let settings = resolve_settings(&cli(&[])).unwrap();
            assert_eq!(settings, CoverageSettings::default());
        }

        #[test]
        fn test_flags_override_file() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "duration_secs: 12\njs:\n  use_block_coverage: false").unwrap();
            let path = file.path().to_str().unwrap().to_string();

            let settings = resolve_settings(&cli(&[
                "--config",
                path.as_str(),
                "--duration",
                "3",
                "--no-css",
                "--include-raw",
            ]))
            .unwrap();
            assert_eq!(settings.duration_secs, 3);
            assert!(!settings.collect_css);
            assert!(settings.js.include_raw_script_coverage);
            assert!(!settings.js.use_block_coverage);
        }

        #[test]
        fn test_nothing_to_collect_rejected() {
            let err = resolve_settings(&cli(&["--no-js", "--no-css"])).unwrap_err();
            assert!(matches!(err, CliError::Coverage(CoverageError::Config { .. })));
        }

        #[test]
        fn test_zero_duration_rejected() {
            let err = resolve_settings(&cli(&["--duration", "0"])).unwrap_err();
            assert!(matches!(err, CliError::Config { .. }));
        }

        #[test]
        fn test_missing_config_file() {
            let err = resolve_settings(&cli(&["--config", "/nonexistent/coverage.yaml"])).unwrap_err();
            assert!(err.to_string().contains("cannot read"));
        }
    }

    mod collect_tests {
        use super::*;

        #[tokio::test]
        async fn test_collects_both_kinds() {
            let mock = Arc::new(MockSession::new());
            mock.add_script_source("1", "run()");
            mock.respond(
                methods::PROFILER_TAKE_PRECISE_COVERAGE,
                json!({"result": [{
                    "scriptId": "1",
                    "functions": [{"ranges": [{"startOffset": 0, "endOffset": 5, "count": 1}]}]
                }]}),
            );

            let emitter = mock.clone();
            let until = async move {
                emitter.emit_script_parsed("1", "app.js");
                assert!(emitter.wait_for_calls(methods::DEBUGGER_GET_SCRIPT_SOURCE, 1).await);
                tokio::time::sleep(Duration::from_millis(10)).await;
            };
            let report = collect(mock.clone(), &CoverageSettings::default(), until)
                .await
                .unwrap();

            let js = report.js.unwrap();
            assert_eq!(js.entries.len(), 1);
            assert!((js.coverage_percent() - 100.0).abs() < 0.01);
            assert!(report.css.unwrap().entries.is_empty());
        }

        #[tokio::test]
        async fn test_skipped_kind_absent() {
            let mock = Arc::new(MockSession::new());
            let settings = CoverageSettings {
                collect_css: false,
                ..CoverageSettings::default()
            };
            let report = collect(mock.clone(), &settings, async {}).await.unwrap();
            assert!(report.js.is_some());
            assert!(report.css.is_none());
            assert!(!mock.was_called(methods::CSS_ENABLE));
        }

        #[tokio::test]
        async fn test_css_start_failure_stops_js() {
            let mock = Arc::new(MockSession::new());
            mock.fail(methods::CSS_ENABLE, "CSS agent unavailable");

            let err = collect(mock.clone(), &CoverageSettings::default(), async {})
                .await
                .unwrap_err();
            assert!(err.to_string().contains("CSS agent unavailable"));
            assert!(mock.was_called(methods::PROFILER_DISABLE));
            assert_eq!(mock.listener_count(methods::EVENT_SCRIPT_PARSED), 0);
        }

        #[tokio::test]
        async fn test_js_stop_failure_still_stops_css() {
            let mock = Arc::new(MockSession::new());
            mock.fail(methods::PROFILER_TAKE_PRECISE_COVERAGE, "target crashed");

            let err = collect(mock.clone(), &CoverageSettings::default(), async {})
                .await
                .unwrap_err();
            assert!(err.to_string().contains("target crashed"));
            assert!(mock.was_called(methods::CSS_STOP_RULE_USAGE_TRACKING));
            assert!(mock.was_called(methods::CSS_DISABLE));
            assert_eq!(mock.listener_count(methods::EVENT_STYLE_SHEET_ADDED), 0);
        }
    }
}
