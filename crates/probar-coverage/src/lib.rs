//! Probar Coverage: session-scoped JS/CSS coverage over the Chrome DevTools Protocol
//!
//! Attaches to an instrumented page, caches the source of every script and
//! stylesheet the page registers, and on stop reduces the target's nested
//! usage ranges into sorted, disjoint covered ranges per resource.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌──────────────────────────┐    ┌─────────────────┐
//! │ PageCoverage │───►│ ResourceCoverageTracker  │───►│ ProtocolSession │
//! │  (js / css)  │    │  <ScriptKind|StyleSheet> │    │ WebSocket│Mock  │
//! └──────────────┘    └────────────┬─────────────┘    └─────────────────┘
//!                                  │ stop()
//!                                  ▼
//!                     ┌──────────────────────────┐
//!                     │ convert_to_disjoint_ranges│
//!                     └──────────────────────────┘
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

/// Raw Profiler/CSS usage payloads
pub mod cdp_coverage;
mod config;
mod facade;
/// Sweep-line range merging
pub mod merge;
mod mock;
/// Protocol session seam and event routing
pub mod protocol;
mod resource;
mod result;
/// Per-kind coverage trackers
pub mod tracker;
#[cfg(feature = "websocket")]
mod transport;

pub use cdp_coverage::{
    CoverageRange, FunctionCoverage, PreciseCoverageSnapshot, ResourceUsage, RuleUsage,
    RuleUsageSnapshot, ScriptCoverage, UsageMap,
};
pub use config::{CoverageSettings, CssCoverageOptions, JsCoverageOptions};
pub use facade::PageCoverage;
pub use merge::{convert_to_disjoint_ranges, merge_disjoint, DisjointRange, UsageRange};
pub use mock::{MockGate, MockSession};
pub use protocol::{
    methods, EventRouter, EventSink, EventSubscription, ProtocolCommand, ProtocolEvent,
    ProtocolSession,
};
pub use resource::{CoverageEntry, CoverageReport, ResourceId, ResourceRecord};
pub use result::{CoverageError, CoverageResult};
pub use tracker::{
    anonymous_script_url, is_injected_script_url, CoverageKind, PendingResource,
    ResourceCoverageTracker, ScriptKind, StyleSheetKind, INJECTED_SCRIPT_SCHEME,
};
#[cfg(feature = "websocket")]
pub use transport::WebSocketSession;

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        CoverageEntry, CoverageError, CoverageReport, CoverageResult, CssCoverageOptions,
        DisjointRange, JsCoverageOptions, PageCoverage, ProtocolSession,
    };
    #[cfg(feature = "websocket")]
    pub use super::WebSocketSession;
}
