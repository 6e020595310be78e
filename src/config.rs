use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use url::Url;

use crate::errors::ConfigError;

/// One heuristic scoring rule: a lowercase token matched against link
/// text and URL paths, and the weight it contributes when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenWeight {
    pub token: String,
    pub weight: i32,
}

/// Configuration for one exploration session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// URL to start exploring from
    pub start_url: String,

    /// Free-text goal description; annotates the report only, never
    /// influences planning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,

    /// Maximum traversal depth from the start URL (1-10)
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Maximum number of distinct pages to visit (1-100)
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Wall-clock deadline for the whole session, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Per-navigation page-load timeout, in milliseconds; exceeding it is
    /// a per-page error, not a session timeout
    #[serde(default = "default_page_load_timeout_ms")]
    pub page_load_timeout_ms: u64,

    /// Domain allow-list; empty means unrestricted
    #[serde(default)]
    pub allowed_domains: Vec<String>,

    /// Whether to produce a report at session end
    #[serde(default = "default_true")]
    pub generate_report: bool,

    /// Whether to capture a screenshot after each successful navigation
    #[serde(default)]
    pub take_screenshots: bool,

    /// Disabling the memory skips dedup and allows revisits
    #[serde(default = "default_true")]
    pub memory_enabled: bool,

    /// Raise log verbosity (logging only)
    #[serde(default)]
    pub verbose: bool,

    /// URL for the WebDriver instance
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Directory for the file-backed memory store and screenshots; when
    /// unset the session runs on the in-memory store only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Steady guardrail rate limit, in actions per second
    #[serde(default = "default_rate_per_sec")]
    pub rate_per_sec: f64,

    /// Guardrail burst capacity (actions allowed instantaneously)
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Extra guardrail block patterns, appended to the built-in set
    #[serde(default)]
    pub block_patterns: Vec<String>,

    /// How many recently executed actions loop detection remembers
    #[serde(default = "default_loop_window")]
    pub loop_window: usize,

    /// Repeats of the same action tolerated within the window before it
    /// is denied as a loop
    #[serde(default = "default_loop_max_repeats")]
    pub loop_max_repeats: usize,

    /// Extra scoring rules, applied on top of the built-in table
    #[serde(default)]
    pub score_weights: Vec<TokenWeight>,
}

fn default_max_depth() -> u32 {
    3
}

fn default_max_pages() -> u32 {
    25
}

fn default_timeout_ms() -> u64 {
    120_000
}

fn default_page_load_timeout_ms() -> u64 {
    20_000
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_rate_per_sec() -> f64 {
    2.0
}

fn default_burst() -> u32 {
    5
}

fn default_loop_window() -> usize {
    20
}

fn default_loop_max_repeats() -> usize {
    2
}

fn default_true() -> bool {
    true
}

impl SessionConfig {
    /// Create a configuration with default values for everything but the
    /// start URL
    pub fn new(start_url: &str) -> Self {
        Self {
            start_url: start_url.to_string(),
            goal: None,
            max_depth: default_max_depth(),
            max_pages: default_max_pages(),
            timeout_ms: default_timeout_ms(),
            page_load_timeout_ms: default_page_load_timeout_ms(),
            allowed_domains: Vec::new(),
            generate_report: true,
            take_screenshots: false,
            memory_enabled: true,
            verbose: false,
            webdriver_url: default_webdriver_url(),
            data_dir: None,
            rate_per_sec: default_rate_per_sec(),
            burst: default_burst(),
            block_patterns: Vec::new(),
            loop_window: default_loop_window(),
            loop_max_repeats: default_loop_max_repeats(),
            score_weights: Vec::new(),
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Check ranges and parseability before a session starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.start_url).is_err() {
            return Err(ConfigError::InvalidStartUrl(self.start_url.clone()));
        }

        if !(1..=10).contains(&self.max_depth) {
            return Err(ConfigError::OutOfRange {
                field: "max_depth",
                min: 1,
                max: 10,
                value: self.max_depth,
            });
        }

        if !(1..=100).contains(&self.max_pages) {
            return Err(ConfigError::OutOfRange {
                field: "max_pages",
                min: 1,
                max: 100,
                value: self.max_pages,
            });
        }

        // Screenshots land in the data dir; without one they would be
        // silently dropped
        if self.take_screenshots && self.data_dir.is_none() {
            return Err(ConfigError::ScreenshotsWithoutDataDir);
        }

        for pattern in &self.block_patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    source: e,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::new("https://example.com");
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.max_pages, 25);
        assert!(config.memory_enabled);
        assert!(config.generate_report);
        assert_eq!(config.loop_window, 20);
        assert_eq!(config.loop_max_repeats, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"start_url": "https://example.com", "max_depth": 5}"#)
                .unwrap();
        assert_eq!(config.max_depth, 5);
        assert_eq!(config.max_pages, 25);
        assert_eq!(config.webdriver_url, "http://localhost:4444");
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = SessionConfig::new("not a url");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidStartUrl(_))
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = SessionConfig::new("https://example.com");
        config.max_depth = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "max_depth",
                ..
            })
        ));

        let mut config = SessionConfig::new("https://example.com");
        config.max_pages = 500;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "max_pages",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_pairs_screenshots_with_data_dir() {
        let mut config = SessionConfig::new("https://example.com");
        config.take_screenshots = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ScreenshotsWithoutDataDir)
        ));

        config.data_dir = Some("/tmp/scout".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let mut config = SessionConfig::new("https://example.com");
        config.block_patterns.push("(".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }
}
