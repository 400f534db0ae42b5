//! Disjoint range merging.
//!
//! Targets report usage as possibly nested, overlapping ranges with a hit
//! count each (V8 block coverage nests a zero-count block inside its
//! executed function, for instance). Reporting needs the flat list of
//! covered territory instead, and it must match what other DevTools-based
//! tooling produces byte for byte, so the sweep below follows a fixed
//! tie-break order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A usage range as reported by the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRange {
    /// Start offset (inclusive)
    pub start: u32,
    /// End offset (exclusive)
    pub end: u32,
    /// Number of times the range was hit
    pub hit_count: u32,
}

impl UsageRange {
    /// Create a usage range
    #[must_use]
    pub const fn new(start: u32, end: u32, hit_count: u32) -> Self {
        Self {
            start,
            end,
            hit_count,
        }
    }

    /// Length of the range, zero for inverted input
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Whether the range spans nothing
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A maximal covered region in merged output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisjointRange {
    /// Start offset (inclusive)
    pub start: u32,
    /// End offset (exclusive)
    pub end: u32,
}

impl DisjointRange {
    /// Create a disjoint range
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Length of the range
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Whether the range spans nothing
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `offset` falls inside the range
    #[must_use]
    pub const fn contains(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }
}

impl From<DisjointRange> for UsageRange {
    fn from(range: DisjointRange) -> Self {
        Self::new(range.start, range.end, 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Boundary {
    // Declaration order is the sort order at equal offsets.
    Close,
    Open,
}

#[derive(Debug, Clone, Copy)]
struct Point {
    offset: u32,
    boundary: Boundary,
    length: u32,
    hit_count: u32,
}

fn compare_points(a: &Point, b: &Point) -> Ordering {
    a.offset
        .cmp(&b.offset)
        .then_with(|| a.boundary.cmp(&b.boundary))
        .then_with(|| match a.boundary {
            // Outer ranges open first and close last.
            Boundary::Open => b.length.cmp(&a.length),
            Boundary::Close => a.length.cmp(&b.length),
        })
}

/// Reduce nested usage ranges to sorted, disjoint covered ranges.
///
/// A position ends up covered when the innermost range containing it has a
/// positive hit count. Adjacent covered territory is always joined, and
/// zero-length results are dropped.
#[must_use]
pub fn convert_to_disjoint_ranges(ranges: &[UsageRange]) -> Vec<DisjointRange> {
    let mut points = Vec::with_capacity(ranges.len() * 2);
    for range in ranges {
        let length = range.len();
        points.push(Point {
            offset: range.start,
            boundary: Boundary::Open,
            length,
            hit_count: range.hit_count,
        });
        points.push(Point {
            offset: range.end,
            boundary: Boundary::Close,
            length,
            hit_count: range.hit_count,
        });
    }
    points.sort_by(compare_points);

    let mut hit_counts: Vec<u32> = Vec::new();
    let mut results: Vec<DisjointRange> = Vec::new();
    let mut last_offset = 0;

    for point in &points {
        if last_offset < point.offset && hit_counts.last().is_some_and(|&count| count > 0) {
            match results.last_mut() {
                Some(last) if last.end == last_offset => last.end = point.offset,
                _ => results.push(DisjointRange::new(last_offset, point.offset)),
            }
        }
        last_offset = point.offset;
        match point.boundary {
            Boundary::Open => hit_counts.push(point.hit_count),
            Boundary::Close => {
                hit_counts.pop();
            }
        }
    }

    results.retain(|range| range.end > range.start);
    results
}

/// Merge already-disjoint ranges again, e.g. when combining two runs.
#[must_use]
pub fn merge_disjoint(ranges: &[DisjointRange]) -> Vec<DisjointRange> {
    let usage: Vec<UsageRange> = ranges.iter().copied().map(UsageRange::from).collect();
    convert_to_disjoint_ranges(&usage)
}

// ============================================================================
// Tests
// ============================================================================
