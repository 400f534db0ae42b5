//! Coverage options and on-disk settings.

use crate::result::{CoverageError, CoverageResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options for script (JS) coverage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsCoverageOptions {
    /// Clear collected scripts when the page's execution contexts reset
    pub reset_on_navigation: bool,
    /// Include scripts without a URL under a synthesized `debugger://VM<id>` URL
    pub report_anonymous_scripts: bool,
    /// Attach the raw per-function payload (also requests call counts)
    pub include_raw_script_coverage: bool,
    /// Request block-level rather than function-level granularity
    pub use_block_coverage: bool,
}

impl Default for JsCoverageOptions {
    fn default() -> Self {
        Self {
            reset_on_navigation: true,
            report_anonymous_scripts: false,
            include_raw_script_coverage: false,
            use_block_coverage: true,
        }
    }
}

impl JsCoverageOptions {
    /// Create options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear collected scripts on navigation
    #[must_use]
    pub const fn with_reset_on_navigation(mut self, enabled: bool) -> Self {
        self.reset_on_navigation = enabled;
        self
    }

    /// Report anonymous scripts
    #[must_use]
    pub const fn with_report_anonymous_scripts(mut self, enabled: bool) -> Self {
        self.report_anonymous_scripts = enabled;
        self
    }

    /// Attach raw per-function usage
    #[must_use]
    pub const fn with_include_raw_script_coverage(mut self, enabled: bool) -> Self {
        self.include_raw_script_coverage = enabled;
        self
    }

    /// Use block coverage
    #[must_use]
    pub const fn with_block_coverage(mut self, enabled: bool) -> Self {
        self.use_block_coverage = enabled;
        self
    }
}

/// Options for stylesheet (CSS) coverage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CssCoverageOptions {
    /// Clear collected stylesheets when the page's execution contexts reset
    pub reset_on_navigation: bool,
}

impl Default for CssCoverageOptions {
    fn default() -> Self {
        Self {
            reset_on_navigation: true,
        }
    }
}

impl CssCoverageOptions {
    /// Create options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear collected stylesheets on navigation
    #[must_use]
    pub const fn with_reset_on_navigation(mut self, enabled: bool) -> Self {
        self.reset_on_navigation = enabled;
        self
    }
}

/// A collection run as read from a YAML settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageSettings {
    /// Collect script coverage
    pub collect_js: bool,
    /// Collect stylesheet coverage
    pub collect_css: bool,
    /// Script options
    pub js: JsCoverageOptions,
    /// Stylesheet options
    pub css: CssCoverageOptions,
    /// How long to collect before stopping (seconds)
    pub duration_secs: u64,
}

impl Default for CoverageSettings {
    fn default() -> Self {
        Self {
            collect_js: true,
            collect_css: true,
            js: JsCoverageOptions::default(),
            css: CssCoverageOptions::default(),
            duration_secs: 5,
        }
    }
}

impl CoverageSettings {
    /// Parse settings from YAML; omitted keys keep their defaults
    pub fn from_yaml_str(yaml: &str) -> CoverageResult<Self> {
        let settings: Self = serde_yaml_ng::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a YAML file
    pub fn load(path: &Path) -> CoverageResult<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| CoverageError::Config {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Reject settings that would collect nothing
    pub fn validate(&self) -> CoverageResult<()> {
        if !self.collect_js && !self.collect_css {
            return Err(CoverageError::Config {
                message: "neither collect_js nor collect_css is enabled".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod options_tests {
        use super::*;

        #[test]
        fn test_js_defaults() {
            let options = JsCoverageOptions::default();
            assert!(options.reset_on_navigation);
            assert!(!options.report_anonymous_scripts);
            assert!(!options.include_raw_script_coverage);
            assert!(options.use_block_coverage);
        }

        #[test]
        fn test_js_builder() {
            let options = JsCoverageOptions::new()
                .with_reset_on_navigation(false)
                .with_report_anonymous_scripts(true)
                .with_include_raw_script_coverage(true)
                .with_block_coverage(false);
            assert!(!options.reset_on_navigation);
            assert!(options.report_anonymous_scripts);
            assert!(options.include_raw_script_coverage);
            assert!(!options.use_block_coverage);
        }

        #[test]
        fn test_css_defaults_and_builder() {
            assert!(CssCoverageOptions::new().reset_on_navigation);
            assert!(
                !CssCoverageOptions::new()
                    .with_reset_on_navigation(false)
                    .reset_on_navigation
            );
        }
    }

    mod settings_tests {
        use super::*;

        #[test]
        fn test_partial_yaml_keeps_defaults() {
            let settings = CoverageSettings::from_yaml_str(
                "collect_css: false\njs:\n  report_anonymous_scripts: true\n",
            )
            .unwrap();
            assert!(settings.collect_js);
            assert!(!settings.collect_css);
            assert!(settings.js.report_anonymous_scripts);
            assert!(settings.js.use_block_coverage);
            assert_eq!(settings.duration_secs, 5);
        }

        #[test]
        fn test_empty_collection_rejected() {
            let err = CoverageSettings::from_yaml_str("collect_js: false\ncollect_css: false\n")
                .unwrap_err();
            assert!(matches!(err, CoverageError::Config { .. }));
        }

        #[test]
        fn test_malformed_yaml_is_yaml_error() {
            let err = CoverageSettings::from_yaml_str("js: [1, 2").unwrap_err();
            assert!(matches!(err, CoverageError::Yaml(_)));
        }

        #[test]
        fn test_missing_file_is_config_error() {
            let err = CoverageSettings::load(Path::new("/nonexistent/coverage.yaml")).unwrap_err();
            assert!(err.to_string().contains("cannot read"));
        }
    }
}
