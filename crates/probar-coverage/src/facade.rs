//! PageCoverage - script and stylesheet coverage for one page.

use crate::config::{CssCoverageOptions, JsCoverageOptions};
use crate::protocol::ProtocolSession;
use crate::resource::CoverageEntry;
use crate::result::CoverageResult;
use crate::tracker::{ResourceCoverageTracker, ScriptKind, StyleSheetKind};
use std::sync::Arc;

/// JS and CSS coverage sharing one protocol session.
///
/// The two trackers are independent: either can run alone, and stopping
/// one never touches the other.
///
/// ```no_run
/// # use probar_coverage::{JsCoverageOptions, PageCoverage, ProtocolSession};
/// # use std::sync::Arc;
/// # async fn run(session: Arc<dyn ProtocolSession>) -> probar_coverage::CoverageResult<()> {
/// let mut coverage = PageCoverage::new(session);
/// coverage.start_js_coverage(JsCoverageOptions::default()).await?;
/// // ... drive the page ...
/// for entry in coverage.stop_js_coverage().await? {
///     println!("{}: {} ranges", entry.url, entry.ranges.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PageCoverage {
    js: ResourceCoverageTracker<ScriptKind>,
    css: ResourceCoverageTracker<StyleSheetKind>,
}

impl PageCoverage {
    /// Create coverage trackers on `session`
    #[must_use]
    pub fn new(session: Arc<dyn ProtocolSession>) -> Self {
        Self {
            js: ResourceCoverageTracker::new(Arc::clone(&session)),
            css: ResourceCoverageTracker::new(session),
        }
    }

    /// Start script coverage
    pub async fn start_js_coverage(&mut self, options: JsCoverageOptions) -> CoverageResult<()> {
        self.js.start(ScriptKind::new(options)).await
    }

    /// Stop script coverage and return its entries
    pub async fn stop_js_coverage(&mut self) -> CoverageResult<Vec<CoverageEntry>> {
        self.js.stop().await
    }

    /// Start stylesheet coverage
    pub async fn start_css_coverage(&mut self, options: CssCoverageOptions) -> CoverageResult<()> {
        self.css.start(StyleSheetKind::new(options)).await
    }

    /// Stop stylesheet coverage and return its entries
    pub async fn stop_css_coverage(&mut self) -> CoverageResult<Vec<CoverageEntry>> {
        self.css.stop().await
    }

    /// The script tracker
    #[must_use]
    pub const fn js(&self) -> &ResourceCoverageTracker<ScriptKind> {
        &self.js
    }

    /// The stylesheet tracker
    #[must_use]
    pub const fn css(&self) -> &ResourceCoverageTracker<StyleSheetKind> {
        &self.css
    }
}
