//! Stylesheet (CSS) coverage via rule-usage tracking.

use super::{CoverageKind, PendingResource};
use crate::cdp_coverage::{decode, RuleUsageSnapshot, UsageMap};
use crate::config::CssCoverageOptions;
use crate::protocol::{methods, ProtocolCommand};
use crate::resource::ResourceId;
use crate::result::CoverageResult;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct StyleSheetAdded {
    header: StyleSheetHeader,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StyleSheetHeader {
    style_sheet_id: String,
    #[serde(rename = "sourceURL", default)]
    source_url: String,
}

#[derive(Debug, Deserialize)]
struct StyleSheetText {
    text: String,
}

/// Stylesheet coverage strategy.
///
/// Inline and constructed stylesheets carry no URL and are never reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleSheetKind {
    /// Options for this session
    pub options: CssCoverageOptions,
}

impl StyleSheetKind {
    /// Strategy with the given options
    #[must_use]
    pub const fn new(options: CssCoverageOptions) -> Self {
        Self { options }
    }
}

impl CoverageKind for StyleSheetKind {
    const LABEL: &'static str = "CSS";
    const REGISTRATION_EVENT: &'static str = methods::EVENT_STYLE_SHEET_ADDED;

    fn reset_on_navigation(&self) -> bool {
        self.options.reset_on_navigation
    }

    fn enable_commands(&self) -> Vec<ProtocolCommand> {
        vec![
            ProtocolCommand::new(methods::DOM_ENABLE),
            ProtocolCommand::new(methods::CSS_ENABLE),
            ProtocolCommand::new(methods::CSS_START_RULE_USAGE_TRACKING),
        ]
    }

    fn collect_command(&self) -> ProtocolCommand {
        ProtocolCommand::new(methods::CSS_STOP_RULE_USAGE_TRACKING)
    }

    fn disable_commands(&self) -> Vec<ProtocolCommand> {
        vec![
            ProtocolCommand::new(methods::CSS_DISABLE),
            ProtocolCommand::new(methods::DOM_DISABLE),
        ]
    }

    fn admit(&self, params: &Value) -> CoverageResult<Option<PendingResource>> {
        let added: StyleSheetAdded = decode(methods::EVENT_STYLE_SHEET_ADDED, params.clone())?;
        let header = added.header;
        if header.source_url.is_empty() {
            return Ok(None);
        }
        Ok(Some(PendingResource {
            id: ResourceId::new(header.style_sheet_id),
            url: header.source_url,
        }))
    }

    fn fetch_command(&self, id: &ResourceId) -> ProtocolCommand {
        ProtocolCommand::with_params(methods::CSS_GET_STYLE_SHEET_TEXT, json!({"styleSheetId": id}))
    }

    fn source_text(&self, response: Value) -> CoverageResult<String> {
        let sheet: StyleSheetText = decode(methods::CSS_GET_STYLE_SHEET_TEXT, response)?;
        Ok(sheet.text)
    }

    fn extract_usage(&self, snapshot: Value) -> CoverageResult<UsageMap> {
        let snapshot: RuleUsageSnapshot = decode(methods::CSS_STOP_RULE_USAGE_TRACKING, snapshot)?;
        Ok(snapshot.into_usage())
    }
}
