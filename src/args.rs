use clap::Parser;
use page_scout::SessionConfig;
use page_scout::errors::ConfigError;

#[derive(Parser, Debug)]
#[command(name = "page-scout")]
#[command(about = "Goal-directed autonomous website exploration through a single browser tab")]
#[command(version)]
pub struct Args {
    /// URL to start exploring from
    pub start_url: String,

    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    pub config: Option<String>,

    /// Free-text goal description, recorded in the report
    #[arg(short, long)]
    pub goal: Option<String>,

    /// Maximum traversal depth from the start URL (1-10)
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Maximum number of distinct pages to visit (1-100)
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Session deadline in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Restrict traversal to a domain and its subdomains (repeatable)
    #[arg(long = "allow-domain")]
    pub allowed_domains: Vec<String>,

    /// WebDriver server URL
    #[arg(long)]
    pub webdriver_url: Option<String>,

    /// Directory for the persistent memory store and screenshots
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Capture a screenshot after each visited page (requires --data-dir)
    #[arg(long)]
    pub screenshots: bool,

    /// Skip report output at session end
    #[arg(long)]
    pub no_report: bool,

    /// Disable visited-page dedup (pages may be visited repeatedly)
    #[arg(long)]
    pub no_memory: bool,

    /// Write the JSON report to this file instead of printing text
    #[arg(short, long)]
    pub output: Option<String>,

    /// Raise log verbosity
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Build the session configuration: config file first (when given),
    /// then flag overrides on top.
    pub fn into_config(self) -> Result<SessionConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_file(path)?,
            None => SessionConfig::new(&self.start_url),
        };

        config.start_url = self.start_url;
        if self.goal.is_some() {
            config.goal = self.goal;
        }
        if let Some(depth) = self.max_depth {
            config.max_depth = depth;
        }
        if let Some(pages) = self.max_pages {
            config.max_pages = pages;
        }
        if let Some(ms) = self.timeout_ms {
            config.timeout_ms = ms;
        }
        if !self.allowed_domains.is_empty() {
            config.allowed_domains = self.allowed_domains;
        }
        // Precedence: flag, then environment, then config file
        match self.webdriver_url {
            Some(url) => config.webdriver_url = url,
            None => {
                if let Ok(url) = std::env::var("WEBDRIVER_URL") {
                    if !url.is_empty() {
                        config.webdriver_url = url;
                    }
                }
            }
        }
        if self.data_dir.is_some() {
            config.data_dir = self.data_dir;
        }
        if self.screenshots {
            config.take_screenshots = true;
        }
        if self.no_report {
            config.generate_report = false;
        }
        if self.no_memory {
            config.memory_enabled = false;
        }
        if self.verbose {
            config.verbose = true;
        }

        Ok(config)
    }
}
