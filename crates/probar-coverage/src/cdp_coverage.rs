//! Raw usage payloads returned by the CDP Profiler and CSS domains.
//!
//! `Profiler.takePreciseCoverage` reports per-function ranges for every
//! script; `CSS.stopRuleUsageTracking` reports one entry per rule. Both are
//! flattened into [`UsageRange`]s keyed by resource id before merging.

use crate::merge::UsageRange;
use crate::resource::ResourceId;
use crate::result::{CoverageError, CoverageResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A range of bytes/characters in a script with its execution count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageRange {
    /// Start offset
    pub start_offset: u32,
    /// End offset
    pub end_offset: u32,
    /// Number of times this range was executed
    pub count: u32,
}

impl From<&CoverageRange> for UsageRange {
    fn from(range: &CoverageRange) -> Self {
        Self::new(range.start_offset, range.end_offset, range.count)
    }
}

/// Coverage data for a single function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCoverage {
    /// Function name (empty for anonymous functions)
    #[serde(default)]
    pub function_name: String,
    /// Ranges within this function; the first one spans the whole function
    pub ranges: Vec<CoverageRange>,
    /// Whether ranges are block-granular
    #[serde(default)]
    pub is_block_coverage: bool,
}

impl FunctionCoverage {
    /// Check if the function was executed at least once
    #[must_use]
    pub fn was_executed(&self) -> bool {
        self.ranges.first().is_some_and(|r| r.count > 0)
    }
}

/// Raw coverage data for a single script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptCoverage {
    /// Script ID from CDP
    pub script_id: String,
    /// Script URL
    #[serde(default)]
    pub url: String,
    /// Functions in this script
    pub functions: Vec<FunctionCoverage>,
}

impl ScriptCoverage {
    /// Count functions that were executed
    #[must_use]
    pub fn functions_executed(&self) -> usize {
        self.functions.iter().filter(|f| f.was_executed()).count()
    }

    /// Every function's ranges, flattened in report order
    #[must_use]
    pub fn usage_ranges(&self) -> Vec<UsageRange> {
        self.functions
            .iter()
            .flat_map(|f| f.ranges.iter().map(UsageRange::from))
            .collect()
    }
}

/// Response of `Profiler.takePreciseCoverage`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreciseCoverageSnapshot {
    /// Coverage data per script
    #[serde(default)]
    pub result: Vec<ScriptCoverage>,
    /// Monotonic timestamp of the snapshot (seconds)
    #[serde(default)]
    pub timestamp: f64,
}

/// One CSS rule's usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUsage {
    /// Stylesheet the rule belongs to
    pub style_sheet_id: String,
    /// Rule start offset
    pub start_offset: f64,
    /// Rule end offset
    pub end_offset: f64,
    /// Whether the rule matched anything
    pub used: bool,
}

impl From<&RuleUsage> for UsageRange {
    fn from(rule: &RuleUsage) -> Self {
        Self::new(
            rule.start_offset as u32,
            rule.end_offset as u32,
            u32::from(rule.used),
        )
    }
}

/// Response of `CSS.stopRuleUsageTracking`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUsageSnapshot {
    /// Usage of every tracked rule
    #[serde(default)]
    pub rule_usage: Vec<RuleUsage>,
}

/// Usage collected for one resource at stop time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceUsage {
    /// Flattened usage ranges
    pub ranges: Vec<UsageRange>,
    /// Raw per-function payload, when requested
    pub raw: Option<ScriptCoverage>,
}

/// Usage for every resource in a snapshot
pub type UsageMap = HashMap<ResourceId, ResourceUsage>;

/// Decode a command response into its typed form
pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    context: &str,
    value: serde_json::Value,
) -> CoverageResult<T> {
    serde_json::from_value(value).map_err(|e| CoverageError::invalid_payload(context, e))
}

impl PreciseCoverageSnapshot {
    /// Group flattened ranges by script, optionally keeping the raw payload
    #[must_use]
    pub fn into_usage(self, keep_raw: bool) -> UsageMap {
        let mut usage = UsageMap::new();
        for script in self.result {
            let entry: &mut ResourceUsage = usage
                .entry(ResourceId::new(script.script_id.clone()))
                .or_default();
            entry.ranges.extend(script.usage_ranges());
            if keep_raw {
                entry.raw = Some(script);
            }
        }
        usage
    }
}

impl RuleUsageSnapshot {
    /// Group rule usage by stylesheet
    #[must_use]
    pub fn into_usage(self) -> UsageMap {
        let mut usage = UsageMap::new();
        for rule in &self.rule_usage {
            usage
                .entry(ResourceId::new(rule.style_sheet_id.clone()))
                .or_default()
                .ranges
                .push(UsageRange::from(rule));
        }
        usage
    }
}

// ============================================================================
// Tests
// ============================================================================
