use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use url::Url;

use crate::config::SessionConfig;
use crate::driver::BrowserDriver;
use crate::errors::{DriverError, SessionError};
use crate::filter::{DomainFilter, canonicalize};
use crate::frontier::{ActionTarget, FrontierEntry, FrontierPlanner, ScoreTable};
use crate::guardrail::{GuardrailEngine, GuardrailRule};
use crate::memory::{MemoryStore, PageState};
use crate::snapshot::Extractor;
use crate::utils::screenshot_filename;

/// Lifecycle of an exploration session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    /// Created, first navigation not yet issued
    Idle,
    Running,
    /// Normal termination: frontier exhausted or a configured limit hit
    Completed,
    /// Unrecoverable driver or storage fault
    Aborted,
    /// Wall-clock deadline elapsed
    TimedOut,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Aborted => "aborted",
            SessionStatus::TimedOut => "timed-out",
        };
        f.write_str(s)
    }
}

/// Monotonically non-decreasing session counters
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SessionCounters {
    pub pages_visited: u32,
    pub errors: u32,
    pub actions_blocked: u32,
}

/// One exploration run. Mutated only by the orchestrator; immutable once
/// the status is terminal.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSession {
    pub id: String,
    pub start_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub status: SessionStatus,
    pub counters: SessionCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

/// One entry of the session's audit log. Every visit, denial and error
/// is attributable here; nothing is silently dropped.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ActionRecord {
    Visited {
        url: String,
        fingerprint: String,
        depth: u32,
    },
    Revisited {
        url: String,
        fingerprint: String,
    },
    NavigationFailed {
        target: String,
        reason: String,
    },
    Blocked {
        target: String,
        rule: GuardrailRule,
        reason: String,
    },
    StorageFailed {
        url: String,
        reason: String,
    },
}

/// The control loop. Owns the only handle to the browser driver for the
/// duration of the session and is the only component that mutates the
/// `CrawlSession`.
pub struct Orchestrator<'a, D: BrowserDriver> {
    config: SessionConfig,
    driver: &'a mut D,
    memory: &'a mut dyn MemoryStore,
    planner: FrontierPlanner,
    guardrails: GuardrailEngine,
    extractor: Extractor,
    session: CrawlSession,
    log: Vec<ActionRecord>,
    current_url: Option<String>,
}

impl<'a, D: BrowserDriver> Orchestrator<'a, D> {
    pub fn new(
        config: SessionConfig,
        driver: &'a mut D,
        memory: &'a mut dyn MemoryStore,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        let planner = FrontierPlanner::new(
            DomainFilter::new(&config.allowed_domains),
            ScoreTable::with_overrides(&config.score_weights),
            config.max_depth,
        )
        .with_revisits(!config.memory_enabled);
        let guardrails = GuardrailEngine::from_config(&config)?;

        let now = Utc::now();
        let session = CrawlSession {
            id: format!("scout-{}", now.format("%Y%m%d%H%M%S")),
            start_url: config.start_url.clone(),
            goal: config.goal.clone(),
            status: SessionStatus::Idle,
            counters: SessionCounters::default(),
            started_at: None,
            ended_at: None,
        };

        Ok(Self {
            config,
            driver,
            memory,
            planner,
            guardrails,
            extractor: Extractor::new(),
            session,
            log: Vec::new(),
            current_url: None,
        })
    }

    /// Drive the session to a terminal state and return it together with
    /// the action log. Driver faults and deadlines end the loop; they are
    /// reflected in the status, not returned as errors, so a partial
    /// report can always be produced.
    pub async fn run(mut self) -> (CrawlSession, Vec<ActionRecord>) {
        self.session.status = SessionStatus::Running;
        self.session.started_at = Some(Utc::now());
        let deadline = Instant::now() + Duration::from_millis(self.config.timeout_ms);

        let seed = match Url::parse(&self.config.start_url) {
            Ok(url) => canonicalize(&url).to_string(),
            // Validated in new(); keep the raw string as a fallback
            Err(_) => self.config.start_url.clone(),
        };
        ::log::info!("session {} starting at {}", self.session.id, seed);
        self.planner.seed(&seed);

        let outcome = loop {
            if Instant::now() >= deadline {
                ::log::info!("session deadline reached");
                break SessionStatus::TimedOut;
            }
            if self.session.counters.pages_visited >= self.config.max_pages {
                ::log::info!("page limit reached ({})", self.config.max_pages);
                break SessionStatus::Completed;
            }

            let Some(entry) = self.next_approved() else {
                ::log::info!("frontier exhausted");
                break SessionStatus::Completed;
            };

            let description = entry.target.describe();
            match self.execute(entry).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    ::log::error!("fatal driver error during {}: {}", description, e);
                    self.session.counters.errors += 1;
                    self.log.push(ActionRecord::NavigationFailed {
                        target: description,
                        reason: e.to_string(),
                    });
                    break SessionStatus::Aborted;
                }
                Err(e) => {
                    ::log::warn!("{} failed: {}", description, e);
                    self.session.counters.errors += 1;
                    self.log.push(ActionRecord::NavigationFailed {
                        target: description,
                        reason: e.to_string(),
                    });
                }
            }
        };

        if let Err(e) = self.driver.close().await {
            ::log::warn!("failed to close browser session: {}", e);
        }

        self.session.status = outcome;
        self.session.ended_at = Some(Utc::now());
        ::log::info!(
            "session {} {}: {} pages, {} errors, {} blocked",
            self.session.id,
            self.session.status,
            self.session.counters.pages_visited,
            self.session.counters.errors,
            self.session.counters.actions_blocked
        );

        (self.session, self.log)
    }

    /// Pull candidates from the planner until one passes the guardrails.
    /// Denied candidates are recorded and dropped, never retried.
    fn next_approved(&mut self) -> Option<FrontierEntry> {
        loop {
            let candidate = self.planner.next()?;
            let verdict = self.guardrails.evaluate(&candidate);
            if verdict.allowed {
                return Some(candidate);
            }

            let rule = verdict.rule.unwrap_or(GuardrailRule::BlockedPattern);
            self.session.counters.actions_blocked += 1;
            ::log::info!(
                "guardrail blocked {} [{}]: {}",
                candidate.target.describe(),
                rule,
                verdict.reason
            );
            self.log.push(ActionRecord::Blocked {
                target: candidate.target.describe(),
                rule,
                reason: verdict.reason,
            });
        }
    }

    /// Execute one approved entry: drive the browser, normalize the
    /// capture, record it, and expand the frontier if it was novel
    async fn execute(&mut self, entry: FrontierEntry) -> Result<(), DriverError> {
        self.guardrails.record_executed(&entry);
        let page_load = Duration::from_millis(self.config.page_load_timeout_ms);

        let result = match &entry.target {
            ActionTarget::Navigate { url, .. } => {
                timeout(page_load, self.driver.navigate(url)).await
            }
            ActionTarget::Click {
                page_url, locator, ..
            } => {
                // The tab must be on the page the element was found on
                if self.current_url.as_deref() != Some(page_url.as_str()) {
                    match timeout(page_load, self.driver.navigate(page_url)).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => return Err(e),
                        Err(_) => {
                            return Err(DriverError::Timeout(self.config.page_load_timeout_ms));
                        }
                    }
                }
                timeout(page_load, self.driver.click(locator)).await
            }
        };

        let snapshot = match result {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(DriverError::Timeout(self.config.page_load_timeout_ms)),
        };

        let normalized = self.extractor.normalize(&snapshot);
        self.current_url = Some(normalized.url.clone());

        let mut state = PageState::from_snapshot(&normalized, entry.depth);
        if self.config.take_screenshots {
            self.capture_screenshot(&mut state).await?;
        }

        match self.memory.record(state) {
            Ok((stored, true)) => {
                self.session.counters.pages_visited += 1;
                ::log::info!(
                    "visited {} (depth {}, {} links, {} elements)",
                    stored.url,
                    stored.depth,
                    stored.links.len(),
                    stored.elements.len()
                );
                self.log.push(ActionRecord::Visited {
                    url: stored.url.clone(),
                    fingerprint: stored.fingerprint.clone(),
                    depth: stored.depth,
                });
                self.planner.enqueue(&stored, &*self.memory);
            }
            Ok((stored, false)) => {
                ::log::debug!("revisited known page {}", stored.url);
                self.log.push(ActionRecord::Revisited {
                    url: stored.url,
                    fingerprint: stored.fingerprint,
                });
            }
            Err(e) => {
                // The in-memory view keeps the record; continue from it
                self.session.counters.errors += 1;
                ::log::warn!("storage write failed for {}: {}", normalized.url, e);
                self.log.push(ActionRecord::StorageFailed {
                    url: normalized.url.clone(),
                    reason: e.to_string(),
                });
                if let Some(stored) = self.memory.lookup(&normalized.fingerprint).cloned() {
                    self.session.counters.pages_visited += 1;
                    self.log.push(ActionRecord::Visited {
                        url: stored.url.clone(),
                        fingerprint: stored.fingerprint.clone(),
                        depth: stored.depth,
                    });
                    self.planner.enqueue(&stored, &*self.memory);
                }
            }
        }

        Ok(())
    }

    /// Screenshot failures are logged and never interrupt the loop,
    /// except when the driver itself died
    async fn capture_screenshot(&mut self, state: &mut PageState) -> Result<(), DriverError> {
        let Some(dir) = self.memory.screenshot_dir() else {
            ::log::debug!("no screenshot directory configured, skipping capture");
            return Ok(());
        };

        let bytes = match self.driver.screenshot().await {
            Ok(bytes) => bytes,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                ::log::warn!("screenshot failed for {}: {}", state.url, e);
                return Ok(());
            }
        };

        let path = dir.join(screenshot_filename(&state.url, &state.fingerprint));
        let write = std::fs::create_dir_all(&dir).and_then(|_| std::fs::write(&path, &bytes));
        match write {
            Ok(()) => state.screenshot_path = Some(path.to_string_lossy().into_owned()),
            Err(e) => ::log::warn!("failed to write screenshot {}: {}", path.display(), e),
        }

        Ok(())
    }
}
