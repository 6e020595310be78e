use std::collections::{BTreeMap, HashSet};
use url::Url;

use crate::config::TokenWeight;
use crate::filter::DomainFilter;
use crate::memory::{MemoryStore, PageState};
use crate::snapshot::ElementKind;

/// What executing a frontier entry means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionTarget {
    /// Navigate the tab to a URL; `label` is the anchor text that
    /// discovered it (empty for the seed)
    Navigate { url: String, label: String },
    /// Click an element on the page it was discovered on
    Click {
        page_url: String,
        locator: String,
        label: String,
    },
}

impl ActionTarget {
    /// Human-readable description, used in logs and the report
    pub fn describe(&self) -> String {
        match self {
            ActionTarget::Navigate { url, .. } => format!("navigate {url}"),
            ActionTarget::Click {
                page_url, label, ..
            } => format!("click {label:?} on {page_url}"),
        }
    }

    /// The label the guardrails inspect
    pub fn label(&self) -> &str {
        match self {
            ActionTarget::Navigate { label, .. } => label,
            ActionTarget::Click { label, .. } => label,
        }
    }

    /// The URL the guardrail block patterns are matched against
    pub fn url(&self) -> &str {
        match self {
            ActionTarget::Navigate { url, .. } => url,
            ActionTarget::Click { page_url, .. } => page_url,
        }
    }
}

/// One candidate action not yet executed
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub target: ActionTarget,
    /// Depth the action executes at (producing page depth + 1)
    pub depth: u32,
    /// Heuristic priority; higher is explored first within a depth
    pub score: i32,
    /// Discovery order, the deterministic tie-break
    pub seq: u64,
}

/// Data-driven heuristic scoring: each token present in a candidate's
/// label or URL path contributes its weight. Weights are data, not code.
#[derive(Debug, Clone)]
pub struct ScoreTable {
    weights: Vec<TokenWeight>,
}

impl ScoreTable {
    /// Illustrative defaults: content-ish destinations up, account
    /// mutation and navigation-hostile destinations strongly down
    pub fn builtin() -> Self {
        let weight = |token: &str, weight: i32| TokenWeight {
            token: token.to_string(),
            weight,
        };
        Self {
            weights: vec![
                weight("article", 5),
                weight("detail", 5),
                weight("docs", 4),
                weight("doc", 3),
                weight("guide", 4),
                weight("about", 3),
                weight("news", 3),
                weight("blog", 3),
                weight("page", 2),
                weight("next", 2),
                weight("more", 1),
                weight("login", -50),
                weight("logout", -50),
                weight("signin", -50),
                weight("sign-in", -50),
                weight("signup", -40),
                weight("register", -40),
                weight("admin", -50),
                weight("delete", -60),
                weight("unsubscribe", -60),
                weight("cart", -30),
                weight("checkout", -40),
            ],
        }
    }

    /// Builtin table extended by user-supplied rules; a user rule for an
    /// existing token replaces the builtin weight
    pub fn with_overrides(extra: &[TokenWeight]) -> Self {
        let mut table = Self::builtin();
        for rule in extra {
            let token = rule.token.to_ascii_lowercase();
            match table.weights.iter_mut().find(|w| w.token == token) {
                Some(existing) => existing.weight = rule.weight,
                None => table.weights.push(TokenWeight {
                    token,
                    weight: rule.weight,
                }),
            }
        }
        table
    }

    /// Deterministic score over label and URL text
    pub fn score(&self, label: &str, url: &str) -> i32 {
        let haystack = format!("{} {}", label.to_ascii_lowercase(), url.to_ascii_lowercase());
        self.weights
            .iter()
            .filter(|w| haystack.contains(w.token.as_str()))
            .map(|w| w.weight)
            .sum()
    }
}

/// Breadth-first frontier with per-depth heuristic ranking.
///
/// A depth level is fully drained, in priority order, before the next
/// level begins. Given identical recorded pages and configuration the
/// planner yields an identical sequence, which keeps exploration
/// reproducible and auditable.
pub struct FrontierPlanner {
    levels: BTreeMap<u32, Vec<FrontierEntry>>,
    queued: HashSet<String>,
    filter: DomainFilter,
    table: ScoreTable,
    max_depth: u32,
    next_seq: u64,
    allow_revisits: bool,
}

impl FrontierPlanner {
    pub fn new(filter: DomainFilter, table: ScoreTable, max_depth: u32) -> Self {
        Self {
            levels: BTreeMap::new(),
            queued: HashSet::new(),
            filter,
            table,
            max_depth,
            next_seq: 0,
            allow_revisits: false,
        }
    }

    /// With revisits allowed (memory disabled) candidates are enqueued
    /// even when already visited or queued; only the guardrail loop
    /// window bounds the walk then
    pub fn with_revisits(mut self, allow: bool) -> Self {
        self.allow_revisits = allow;
        self
    }

    /// Seed the frontier with the start URL at depth zero
    pub fn seed(&mut self, start_url: &str) {
        let entry = FrontierEntry {
            target: ActionTarget::Navigate {
                url: start_url.to_string(),
                label: String::new(),
            },
            depth: 0,
            score: 0,
            seq: self.take_seq(),
        };
        self.queued.insert(start_url.to_string());
        self.levels.entry(0).or_default().push(entry);
    }

    /// Enqueue the unseen links and clickable elements a recorded page
    /// exposes, at the page's depth plus one. The domain allow-list
    /// applies here, before scoring; filtered candidates never surface
    /// from `next()`.
    pub fn enqueue(&mut self, page: &PageState, memory: &dyn MemoryStore) {
        let depth = page.depth + 1;
        if depth > self.max_depth {
            ::log::debug!("not expanding {}: max depth reached", page.url);
            return;
        }

        for link in &page.links {
            let Ok(parsed) = Url::parse(&link.url) else {
                continue;
            };
            if !self.filter.permits(&parsed) {
                ::log::debug!("allow-list rejected: {}", link.url);
                continue;
            }
            if !self.allow_revisits
                && (memory.contains_url(&link.url) || !self.queued.insert(link.url.clone()))
            {
                continue;
            }

            let score = self.table.score(&link.text, &link.url);
            let seq = self.take_seq();
            self.levels.entry(depth).or_default().push(FrontierEntry {
                target: ActionTarget::Navigate {
                    url: link.url.clone(),
                    label: link.text.clone(),
                },
                depth,
                score,
                seq,
            });
        }

        for element in &page.elements {
            // Only buttons are worth clicking blindly; inputs need text
            if element.kind != ElementKind::Button {
                continue;
            }
            let key = format!("{}::{}", page.url, element.locator);
            if !self.allow_revisits && !self.queued.insert(key) {
                continue;
            }

            let score = self.table.score(&element.label, &page.url);
            let seq = self.take_seq();
            self.levels.entry(depth).or_default().push(FrontierEntry {
                target: ActionTarget::Click {
                    page_url: page.url.clone(),
                    locator: element.locator.clone(),
                    label: element.label.clone(),
                },
                depth,
                score,
                seq,
            });
        }
    }

    /// Dequeue the highest-scoring entry from the lowest non-exhausted
    /// depth; ties go to the earliest discovered
    pub fn next(&mut self) -> Option<FrontierEntry> {
        let (&depth, entries) = self.levels.iter_mut().find(|(_, v)| !v.is_empty())?;

        let mut best = 0;
        for (idx, entry) in entries.iter().enumerate() {
            if entry.score > entries[best].score
                || (entry.score == entries[best].score && entry.seq < entries[best].seq)
            {
                best = idx;
            }
        }

        let entry = entries.remove(best);
        if entries.is_empty() {
            self.levels.remove(&depth);
        }
        Some(entry)
    }

    pub fn is_empty(&self) -> bool {
        self.levels.values().all(|v| v.is_empty())
    }

    /// Number of pending entries, for logging
    pub fn len(&self) -> usize {
        self.levels.values().map(|v| v.len()).sum()
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}
