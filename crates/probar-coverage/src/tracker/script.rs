//! Script (JS) coverage via the Profiler and Debugger domains.

use super::{CoverageKind, PendingResource};
use crate::cdp_coverage::{decode, PreciseCoverageSnapshot, UsageMap};
use crate::config::JsCoverageOptions;
use crate::protocol::{methods, ProtocolCommand};
use crate::resource::ResourceId;
use crate::result::CoverageResult;
use serde::Deserialize;
use serde_json::{json, Value};

/// URL scheme marking scripts injected by the automation harness itself
pub const INJECTED_SCRIPT_SCHEME: &str = "probar:";

const ANONYMOUS_SCRIPT_SCHEME: &str = "debugger://";

/// Whether `url` belongs to a harness-injected script
#[must_use]
pub fn is_injected_script_url(url: &str) -> bool {
    url.starts_with(INJECTED_SCRIPT_SCHEME)
}

/// URL reported for a script the target gave no URL
#[must_use]
pub fn anonymous_script_url(id: &ResourceId) -> String {
    format!("{ANONYMOUS_SCRIPT_SCHEME}VM{id}")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptParsed {
    script_id: String,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptSource {
    script_source: String,
}

/// Script coverage strategy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptKind {
    /// Options for this session
    pub options: JsCoverageOptions,
}

impl ScriptKind {
    /// Strategy with the given options
    #[must_use]
    pub const fn new(options: JsCoverageOptions) -> Self {
        Self { options }
    }
}

impl CoverageKind for ScriptKind {
    const LABEL: &'static str = "JS";
    const REGISTRATION_EVENT: &'static str = methods::EVENT_SCRIPT_PARSED;

    fn reset_on_navigation(&self) -> bool {
        self.options.reset_on_navigation
    }

    fn enable_commands(&self) -> Vec<ProtocolCommand> {
        vec![
            ProtocolCommand::new(methods::PROFILER_ENABLE),
            ProtocolCommand::with_params(
                methods::PROFILER_START_PRECISE_COVERAGE,
                json!({
                    "callCount": self.options.include_raw_script_coverage,
                    "detailed": self.options.use_block_coverage,
                }),
            ),
            ProtocolCommand::new(methods::DEBUGGER_ENABLE),
            ProtocolCommand::with_params(methods::DEBUGGER_SET_SKIP_ALL_PAUSES, json!({"skip": true})),
        ]
    }

    fn collect_command(&self) -> ProtocolCommand {
        ProtocolCommand::new(methods::PROFILER_TAKE_PRECISE_COVERAGE)
    }

    fn disable_commands(&self) -> Vec<ProtocolCommand> {
        vec![
            ProtocolCommand::new(methods::PROFILER_STOP_PRECISE_COVERAGE),
            ProtocolCommand::new(methods::PROFILER_DISABLE),
            ProtocolCommand::new(methods::DEBUGGER_DISABLE),
        ]
    }

    fn admit(&self, params: &Value) -> CoverageResult<Option<PendingResource>> {
        let parsed: ScriptParsed = decode(methods::EVENT_SCRIPT_PARSED, params.clone())?;
        if is_injected_script_url(&parsed.url) {
            return Ok(None);
        }
        let id = ResourceId::new(parsed.script_id);
        let url = if parsed.url.is_empty() {
            if !self.options.report_anonymous_scripts {
                return Ok(None);
            }
            anonymous_script_url(&id)
        } else {
            parsed.url
        };
        Ok(Some(PendingResource { id, url }))
    }

    fn fetch_command(&self, id: &ResourceId) -> ProtocolCommand {
        ProtocolCommand::with_params(methods::DEBUGGER_GET_SCRIPT_SOURCE, json!({"scriptId": id}))
    }

    fn source_text(&self, response: Value) -> CoverageResult<String> {
        let source: ScriptSource = decode(methods::DEBUGGER_GET_SCRIPT_SOURCE, response)?;
        Ok(source.script_source)
    }

    fn extract_usage(&self, snapshot: Value) -> CoverageResult<UsageMap> {
        let snapshot: PreciseCoverageSnapshot =
            decode(methods::PROFILER_TAKE_PRECISE_COVERAGE, snapshot)?;
        Ok(snapshot.into_usage(self.options.include_raw_script_coverage))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn kind(options: JsCoverageOptions) -> ScriptKind {
        ScriptKind::new(options)
    }

    mod admit_tests {
        use super::*;

        #[test]
        fn test_named_script_admitted() {
            let pending = kind(JsCoverageOptions::default())
                .admit(&json!({"scriptId": "7", "url": "http://x/a.js"}))
                .unwrap()
                .unwrap();
            assert_eq!(pending.id, ResourceId::from("7"));
            assert_eq!(pending.url, "http://x/a.js");
        }

        #[test]
        fn test_injected_script_skipped() {
            let admitted = kind(JsCoverageOptions::default().with_report_anonymous_scripts(true))
                .admit(&json!({"scriptId": "1", "url": "probar:evaluate"}))
                .unwrap();
            assert!(admitted.is_none());
        }

        #[test]
        fn test_anonymous_script_needs_opt_in() {
            let params = json!({"scriptId": "31", "url": ""});
            assert!(kind(JsCoverageOptions::default())
                .admit(&params)
                .unwrap()
                .is_none());

            let pending = kind(JsCoverageOptions::default().with_report_anonymous_scripts(true))
                .admit(&params)
                .unwrap()
                .unwrap();
            assert_eq!(pending.url, "debugger://VM31");
        }

        #[test]
        fn test_missing_url_treated_as_anonymous() {
            let admitted = kind(JsCoverageOptions::default())
                .admit(&json!({"scriptId": "2"}))
                .unwrap();
            assert!(admitted.is_none());
        }

        #[test]
        fn test_missing_id_is_invalid_payload() {
            let err = kind(JsCoverageOptions::default())
                .admit(&json!({"url": "a.js"}))
                .unwrap_err();
            assert!(err.to_string().contains(methods::EVENT_SCRIPT_PARSED));
        }
    }

    mod command_tests {
        use super::*;

        #[test]
        fn test_precise_coverage_params_follow_options() {
            let commands = kind(
                JsCoverageOptions::default()
                    .with_include_raw_script_coverage(true)
                    .with_block_coverage(false),
            )
            .enable_commands();
            let start = commands
                .iter()
                .find(|c| c.method == methods::PROFILER_START_PRECISE_COVERAGE)
                .unwrap();
            assert_eq!(start.params, json!({"callCount": true, "detailed": false}));
        }

        #[test]
        fn test_fetch_uses_script_id() {
            let command = ScriptKind::default().fetch_command(&ResourceId::from("9"));
            assert_eq!(command.method, methods::DEBUGGER_GET_SCRIPT_SOURCE);
            assert_eq!(command.params, json!({"scriptId": "9"}));
        }

        #[test]
        fn test_source_text_reads_script_source() {
            let text = ScriptKind::default()
                .source_text(json!({"scriptSource": "let a = 1;"}))
                .unwrap();
            assert_eq!(text, "let a = 1;");
        }

        #[test]
        fn test_disable_batch() {
            let sent: Vec<_> = ScriptKind::default()
                .disable_commands()
                .iter()
                .map(|c| c.method)
                .collect();
            assert_eq!(
                sent,
                vec![
                    methods::PROFILER_STOP_PRECISE_COVERAGE,
                    methods::PROFILER_DISABLE,
                    methods::DEBUGGER_DISABLE
                ]
            );
        }
    }

    #[test]
    fn test_raw_kept_only_when_requested() {
        let snapshot = json!({"result": [{
            "scriptId": "5",
            "functions": [{"ranges": [{"startOffset": 0, "endOffset": 4, "count": 2}]}]
        }]});
        let usage = ScriptKind::default().extract_usage(snapshot.clone()).unwrap();
        assert!(usage[&ResourceId::from("5")].raw.is_none());

        let usage = kind(JsCoverageOptions::default().with_include_raw_script_coverage(true))
            .extract_usage(snapshot)
            .unwrap();
        assert!(usage[&ResourceId::from("5")].raw.is_some());
    }
}
