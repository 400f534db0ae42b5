//! Resources under coverage and the entries produced for them.

use crate::cdp_coverage::ScriptCoverage;
use crate::merge::DisjointRange;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Target-assigned identifier of a script or stylesheet
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Wrap a raw protocol id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw protocol id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ResourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A registered resource whose source has been fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Target-assigned id
    pub id: ResourceId,
    /// Resource URL (synthesized for anonymous scripts)
    pub url: String,
    /// Full source text
    pub source_text: String,
}

/// Coverage result for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageEntry {
    /// Resource URL
    pub url: String,
    /// Resource source text
    pub text: String,
    /// Covered ranges: sorted, disjoint, never contiguous
    pub ranges: Vec<DisjointRange>,
    /// Raw per-function usage, when requested for scripts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_script_coverage: Option<ScriptCoverage>,
}

impl CoverageEntry {
    /// Covered length, in the UTF-16 code units the target's offsets count
    #[must_use]
    pub fn covered_bytes(&self) -> u64 {
        self.ranges.iter().map(|r| u64::from(r.len())).sum()
    }

    /// Length of the source text in UTF-16 code units
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.text.encode_utf16().count() as u64
    }

    /// Covered share of the text in percent (100 for empty text)
    #[must_use]
    pub fn coverage_percent(&self) -> f64 {
        let total = self.total_bytes();
        if total == 0 {
            return 100.0;
        }
        (self.covered_bytes().min(total) as f64 / total as f64) * 100.0
    }

    /// The covered slices of the text.
    ///
    /// Ranges past the end, or splitting a surrogate pair, are skipped.
    #[must_use]
    pub fn covered_text(&self) -> Vec<&str> {
        self.ranges
            .iter()
            .filter_map(|r| {
                let start = utf16_to_byte_index(&self.text, r.start)?;
                let end = utf16_to_byte_index(&self.text, r.end)?;
                self.text.get(start..end)
            })
            .collect()
    }
}

/// Byte index of the char starting at UTF-16 offset `offset`
fn utf16_to_byte_index(text: &str, offset: u32) -> Option<usize> {
    let target = offset as usize;
    let mut units = 0;
    for (index, ch) in text.char_indices() {
        if units == target {
            return Some(index);
        }
        if units > target {
            return None;
        }
        units += ch.len_utf16();
    }
    (units == target).then_some(text.len())
}

/// Coverage entries from one stop, with aggregate views
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// Entries in collection order
    pub entries: Vec<CoverageEntry>,
}

impl CoverageReport {
    /// Create a report from stop results
    #[must_use]
    pub fn new(entries: Vec<CoverageEntry>) -> Self {
        Self { entries }
    }

    /// Append entries from another stop
    pub fn extend(&mut self, entries: Vec<CoverageEntry>) {
        self.entries.extend(entries);
    }

    /// Total covered bytes across entries
    #[must_use]
    pub fn covered_bytes(&self) -> u64 {
        self.entries.iter().map(CoverageEntry::covered_bytes).sum()
    }

    /// Total source bytes across entries
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(CoverageEntry::total_bytes).sum()
    }

    /// Overall coverage percentage
    #[must_use]
    pub fn coverage_percent(&self) -> f64 {
        let total = self.total_bytes();
        if total == 0 {
            return 100.0;
        }
        (self.covered_bytes() as f64 / total as f64) * 100.0
    }

    /// Keep only entries whose URL contains `pattern`
    #[must_use]
    pub fn filter_by_url(&self, pattern: &str) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|e| e.url.contains(pattern))
                .cloned()
                .collect(),
        }
    }

    /// Generate a summary string
    #[must_use]
    pub fn summary(&self) -> String {
        let mut s = format!(
            "Coverage: {:.1}% ({}/{} bytes)\n",
            self.coverage_percent(),
            self.covered_bytes(),
            self.total_bytes()
        );
        for entry in &self.entries {
            s.push_str(&format!(
                "  {} - {:.1}% ({}/{})",
                entry.url,
                entry.coverage_percent(),
                entry.covered_bytes(),
                entry.total_bytes()
            ));
            if let Some(raw) = &entry.raw_script_coverage {
                s.push_str(&format!(
                    ", {}/{} functions",
                    raw.functions_executed(),
                    raw.functions.len()
                ));
            }
            s.push('\n');
        }
        s
    }
}

// ============================================================================
// Tests
// ============================================================================
