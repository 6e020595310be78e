use thiserror::Error;

/// Errors raised by a browser driver while executing a single operation.
///
/// Navigation failures and page-load timeouts are per-page events: the
/// orchestrator records them and moves on. `Fatal` means the driver itself
/// is unusable (browser process gone, session irrecoverable) and aborts
/// the session.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Navigating to or interacting with a page failed
    #[error("navigation failed for {url}: {reason}")]
    Navigation { url: String, reason: String },

    /// The page did not finish loading within the configured timeout
    #[error("page load timed out after {0} ms")]
    Timeout(u64),

    /// The driver is no longer usable and the session must abort
    #[error("browser driver unusable: {0}")]
    Fatal(String),
}

impl DriverError {
    /// Whether this error should terminate the whole session
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::Fatal(_))
    }
}

/// Errors from the memory store's persistence layer.
///
/// A write failure never corrupts previously recorded entries; the
/// in-memory view stays consistent and the session may continue on it.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("memory store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode page record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Configuration validation failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("start_url is not a valid URL: {0}")]
    InvalidStartUrl(String),

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: u32,
        max: u32,
        value: u32,
    },

    #[error("invalid block pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("take_screenshots requires data_dir to be set")]
    ScreenshotsWithoutDataDir,

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level error for running a session end to end
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
