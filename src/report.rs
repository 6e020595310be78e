use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::guardrail::GuardrailRule;
use crate::memory::MemoryStore;
use crate::session::{ActionRecord, CrawlSession, SessionStatus};

/// Summary of one visited page, in visitation order
#[derive(Debug, Clone, Serialize)]
pub struct PageSummary {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub depth: u32,
    pub fingerprint: String,
    pub outbound_links: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
}

/// One directed edge of the link graph; both endpoints were visited
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkEdge {
    pub from: String,
    pub to: String,
}

/// One action the guardrails refused
#[derive(Debug, Clone, Serialize)]
pub struct BlockedAction {
    pub target: String,
    pub rule: GuardrailRule,
    pub reason: String,
}

/// A per-page failure that did not end the session
#[derive(Debug, Clone, Serialize)]
pub struct ReportError {
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportStats {
    pub pages_visited: u32,
    pub errors: u32,
    pub actions_blocked: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// The session's durable output artifact, immutable once generated.
/// Renderings are pure transformations of this structure.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub session_id: String,
    pub start_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub pages: Vec<PageSummary>,
    pub link_graph: Vec<LinkEdge>,
    pub blocked_actions: Vec<BlockedAction>,
    pub page_errors: Vec<ReportError>,
    pub stats: ReportStats,
}

/// Build the report from the session, the memory store and the action
/// log. Runs once, after termination; partial sessions (aborted or timed
/// out) report whatever was recorded before the fault.
pub fn generate(
    session: &CrawlSession,
    memory: &dyn MemoryStore,
    action_log: &[ActionRecord],
) -> CrawlReport {
    let visited = memory.visited();

    let pages: Vec<PageSummary> = visited
        .iter()
        .map(|p| PageSummary {
            url: p.url.clone(),
            title: p.title.clone(),
            depth: p.depth,
            fingerprint: p.fingerprint.clone(),
            outbound_links: p.links.len(),
            screenshot_path: p.screenshot_path.clone(),
        })
        .collect();

    // Edges only between pages both present in the store
    let visited_urls: HashSet<&str> = visited.iter().map(|p| p.url.as_str()).collect();
    let mut seen_edges = HashSet::new();
    let mut link_graph = Vec::new();
    for page in visited {
        for link in &page.links {
            if link.url != page.url
                && visited_urls.contains(link.url.as_str())
                && seen_edges.insert((page.url.clone(), link.url.clone()))
            {
                link_graph.push(LinkEdge {
                    from: page.url.clone(),
                    to: link.url.clone(),
                });
            }
        }
    }

    let mut blocked_actions = Vec::new();
    let mut page_errors = Vec::new();
    for record in action_log {
        match record {
            ActionRecord::Blocked {
                target,
                rule,
                reason,
            } => blocked_actions.push(BlockedAction {
                target: target.clone(),
                rule: *rule,
                reason: reason.clone(),
            }),
            ActionRecord::NavigationFailed { target, reason } => page_errors.push(ReportError {
                target: target.clone(),
                reason: reason.clone(),
            }),
            ActionRecord::StorageFailed { url, reason } => page_errors.push(ReportError {
                target: url.clone(),
                reason: reason.clone(),
            }),
            _ => {}
        }
    }

    let duration_ms = match (session.started_at, session.ended_at) {
        (Some(start), Some(end)) => (end - start).num_milliseconds().try_into().ok(),
        _ => None,
    };

    CrawlReport {
        session_id: session.id.clone(),
        start_url: session.start_url.clone(),
        goal: session.goal.clone(),
        status: session.status,
        started_at: session.started_at,
        ended_at: session.ended_at,
        pages,
        link_graph,
        blocked_actions,
        page_errors,
        stats: ReportStats {
            pages_visited: session.counters.pages_visited,
            errors: session.counters.errors,
            actions_blocked: session.counters.actions_blocked,
            duration_ms,
        },
    }
}

impl CrawlReport {
    /// Machine-readable rendering
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable rendering
    pub fn to_text(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!("Exploration report - {}\n", self.session_id));
        out.push_str(&format!("Start URL: {}\n", self.start_url));
        if let Some(goal) = &self.goal {
            out.push_str(&format!("Goal: {}\n", goal));
        }
        out.push_str(&format!("Status: {}\n", self.status));
        if let Some(ms) = self.stats.duration_ms {
            out.push_str(&format!("Duration: {:.1}s\n", ms as f64 / 1000.0));
        }
        out.push('\n');

        out.push_str(&format!("Pages visited ({}):\n", self.pages.len()));
        for page in &self.pages {
            let title = page.title.as_deref().unwrap_or("(untitled)");
            out.push_str(&format!(
                "  {}[{}] {} - {}\n",
                "  ".repeat(page.depth as usize),
                page.depth,
                page.url,
                title
            ));
        }

        if !self.link_graph.is_empty() {
            out.push_str(&format!("\nLink graph ({} edges):\n", self.link_graph.len()));
            for edge in &self.link_graph {
                out.push_str(&format!("  {} -> {}\n", edge.from, edge.to));
            }
        }

        if !self.blocked_actions.is_empty() {
            out.push_str(&format!(
                "\nBlocked actions ({}):\n",
                self.blocked_actions.len()
            ));
            for blocked in &self.blocked_actions {
                out.push_str(&format!(
                    "  [{}] {} - {}\n",
                    blocked.rule, blocked.target, blocked.reason
                ));
            }
        }

        if !self.page_errors.is_empty() {
            out.push_str(&format!("\nPage errors ({}):\n", self.page_errors.len()));
            for error in &self.page_errors {
                out.push_str(&format!("  {} - {}\n", error.target, error.reason));
            }
        }

        out.push_str(&format!(
            "\nTotals: {} pages, {} errors, {} blocked actions\n",
            self.stats.pages_visited, self.stats.errors, self.stats.actions_blocked
        ));

        out
    }
}
