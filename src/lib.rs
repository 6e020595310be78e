pub mod config;
pub mod driver;
pub mod errors;
pub mod filter;
pub mod frontier;
pub mod guardrail;
pub mod memory;
pub mod report;
pub mod session;
pub mod snapshot;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::SessionConfig;
pub use errors::SessionError;
pub use report::CrawlReport;
pub use session::{CrawlSession, SessionStatus};

use crate::driver::WebDriverSession;
use crate::memory::{FileMemoryStore, InMemoryStore, MemoryStore};
use crate::session::Orchestrator;

/// Run a full exploration session against a live WebDriver server and
/// return the report.
///
/// Memory is file-backed when `data_dir` is set, in-process otherwise.
/// Driver faults mid-session end the run with an `Aborted` status rather
/// than an error, so a partial report is still produced; this function
/// only fails on invalid configuration, an unreachable WebDriver server,
/// or an unusable data directory.
pub async fn explore(config: SessionConfig) -> Result<CrawlReport, SessionError> {
    config.validate()?;

    let mut driver = WebDriverSession::connect(&config.webdriver_url).await?;

    let mut memory: Box<dyn MemoryStore> = match &config.data_dir {
        Some(dir) => Box::new(FileMemoryStore::open(dir, config.memory_enabled)?),
        None => Box::new(InMemoryStore::new(config.memory_enabled)),
    };

    let orchestrator = Orchestrator::new(config, &mut driver, memory.as_mut())?;
    let (session, action_log) = orchestrator.run().await;

    Ok(report::generate(&session, memory.as_ref(), &action_log))
}
