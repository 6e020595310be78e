use regex::Regex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use crate::config::SessionConfig;
use crate::errors::ConfigError;
use crate::frontier::{ActionTarget, FrontierEntry};

/// Built-in URL block patterns: authentication pages, social and email
/// destinations, and direct file downloads. Applied independently of the
/// planner's allow-list.
const BUILTIN_BLOCK_PATTERNS: [&str; 4] = [
    r"(?i)/(log|sign)[-_]?(in|out|up)\b",
    r"(?i)/(auth|oauth|register|password[-_]?reset)\b",
    r"(?i)//([a-z0-9-]+\.)?(facebook|twitter|x|instagram|linkedin|tiktok|mail|gmail|outlook)\.com",
    r"(?i)\.(zip|exe|dmg|iso|tar\.gz|pkg|msi)(\?|$)",
];

/// Labels that indicate irreversible mutation when clicked
const DESTRUCTIVE_TOKENS: [&str; 8] = [
    "delete",
    "remove",
    "unsubscribe",
    "deactivate",
    "destroy",
    "cancel account",
    "confirm purchase",
    "place order",
];

/// Labels or input types that indicate sensitive input fields
const SENSITIVE_TOKENS: [&str; 7] = [
    "password",
    "passphrase",
    "credit card",
    "card number",
    "cvv",
    "ssn",
    "social security",
];

/// Identifier of the rule a denial came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GuardrailRule {
    RateLimit,
    BlockedPattern,
    DestructiveAction,
    SensitiveInput,
    LoopDetected,
}

impl fmt::Display for GuardrailRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GuardrailRule::RateLimit => "rate-limit",
            GuardrailRule::BlockedPattern => "blocked-pattern",
            GuardrailRule::DestructiveAction => "destructive-action",
            GuardrailRule::SensitiveInput => "sensitive-input",
            GuardrailRule::LoopDetected => "loop-detected",
        };
        f.write_str(s)
    }
}

/// The outcome of evaluating one proposed action
#[derive(Debug, Clone)]
pub struct GuardrailVerdict {
    pub allowed: bool,
    pub rule: Option<GuardrailRule>,
    pub reason: String,
}

impl GuardrailVerdict {
    fn allow() -> Self {
        Self {
            allowed: true,
            rule: None,
            reason: String::new(),
        }
    }

    fn deny(rule: GuardrailRule, reason: String) -> Self {
        Self {
            allowed: false,
            rule: Some(rule),
            reason,
        }
    }
}

/// Token bucket: `burst` immediate actions, refilled at `rate` per second.
/// Querying never mutates state; tokens are only deducted on approved
/// consumption.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_per_sec: f64, now: Instant) -> Self {
        Self {
            tokens: capacity as f64,
            capacity: capacity as f64,
            refill_per_sec,
            last: now,
        }
    }

    fn available_at(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        (self.tokens + elapsed * self.refill_per_sec).min(self.capacity)
    }

    fn has_token(&self, now: Instant) -> bool {
        self.available_at(now) >= 1.0
    }

    fn consume(&mut self, now: Instant) {
        self.tokens = self.available_at(now) - 1.0;
        self.last = now;
    }
}

/// The last line of defense before an action executes. Evaluates one
/// frontier entry at a time, unaware of how the planner ranked it.
pub struct GuardrailEngine {
    bucket: TokenBucket,
    block_patterns: Vec<Regex>,
    history: VecDeque<String>,
    history_window: usize,
    max_repeats: usize,
}

impl GuardrailEngine {
    pub fn from_config(config: &SessionConfig) -> Result<Self, ConfigError> {
        let mut block_patterns = Vec::new();
        for pattern in BUILTIN_BLOCK_PATTERNS {
            block_patterns.push(Regex::new(pattern).expect("static pattern"));
        }
        for pattern in &config.block_patterns {
            block_patterns.push(Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                source: e,
            })?);
        }

        Ok(Self {
            bucket: TokenBucket::new(config.burst, config.rate_per_sec, Instant::now()),
            block_patterns,
            history: VecDeque::new(),
            history_window: config.loop_window,
            max_repeats: config.loop_max_repeats,
        })
    }

    /// Evaluate a proposed action. Checks run in a fixed order and the
    /// first failure short-circuits: rate limit, block patterns,
    /// destructive/sensitive labels, loop detection. A token is consumed
    /// only when the action is approved.
    pub fn evaluate(&mut self, entry: &FrontierEntry) -> GuardrailVerdict {
        self.evaluate_at(entry, Instant::now())
    }

    /// As `evaluate`, with an explicit clock for deterministic tests
    pub fn evaluate_at(&mut self, entry: &FrontierEntry, now: Instant) -> GuardrailVerdict {
        if !self.bucket.has_token(now) {
            return GuardrailVerdict::deny(
                GuardrailRule::RateLimit,
                "action rate limit exceeded".to_string(),
            );
        }

        let url = entry.target.url();
        for pattern in &self.block_patterns {
            if pattern.is_match(url) {
                return GuardrailVerdict::deny(
                    GuardrailRule::BlockedPattern,
                    format!("URL matches block pattern {}", pattern.as_str()),
                );
            }
        }

        if let Some(verdict) = self.check_labels(entry) {
            return verdict;
        }

        let key = history_key(&entry.target);
        let repeats = self.history.iter().filter(|k| **k == key).count();
        if repeats >= self.max_repeats {
            return GuardrailVerdict::deny(
                GuardrailRule::LoopDetected,
                format!("action repeated {repeats} times within recent history"),
            );
        }

        self.bucket.consume(now);
        GuardrailVerdict::allow()
    }

    fn check_labels(&self, entry: &FrontierEntry) -> Option<GuardrailVerdict> {
        let label = entry.target.label().to_ascii_lowercase();

        if let Some(token) = DESTRUCTIVE_TOKENS.iter().find(|t| label.contains(**t)) {
            return Some(GuardrailVerdict::deny(
                GuardrailRule::DestructiveAction,
                format!("label suggests irreversible mutation ({token})"),
            ));
        }

        // Typing into sensitive fields is never proposed, but a click on
        // a sensitive input is refused too
        if let ActionTarget::Click { .. } = entry.target {
            if SENSITIVE_TOKENS.iter().any(|t| label.contains(*t)) {
                return Some(GuardrailVerdict::deny(
                    GuardrailRule::SensitiveInput,
                    "element expects sensitive input".to_string(),
                ));
            }
        }

        None
    }

    /// Record an executed action into the bounded loop-detection window
    pub fn record_executed(&mut self, entry: &FrontierEntry) {
        self.history.push_back(history_key(&entry.target));
        while self.history.len() > self.history_window {
            self.history.pop_front();
        }
    }
}

fn history_key(target: &ActionTarget) -> String {
    match target {
        ActionTarget::Navigate { url, .. } => format!("nav:{url}"),
        ActionTarget::Click {
            page_url, locator, ..
        } => format!("click:{page_url}:{locator}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use std::time::Duration;

    fn nav_entry(url: &str, label: &str) -> FrontierEntry {
        FrontierEntry {
            target: ActionTarget::Navigate {
                url: url.to_string(),
                label: label.to_string(),
            },
            depth: 1,
            score: 0,
            seq: 0,
        }
    }

    fn click_entry(page_url: &str, locator: &str, label: &str) -> FrontierEntry {
        FrontierEntry {
            target: ActionTarget::Click {
                page_url: page_url.to_string(),
                locator: locator.to_string(),
                label: label.to_string(),
            },
            depth: 1,
            score: 0,
            seq: 0,
        }
    }

    fn engine(rate: f64, burst: u32) -> GuardrailEngine {
        let mut config = SessionConfig::new("https://example.com");
        config.rate_per_sec = rate;
        config.burst = burst;
        GuardrailEngine::from_config(&config).unwrap()
    }

    #[test]
    fn test_rate_limit_burst_and_spacing() {
        let mut engine = engine(2.0, 3);
        let t0 = Instant::now();
        let entry = nav_entry("https://example.com/a", "a");

        // Burst: exactly `burst` actions succeed instantaneously
        for _ in 0..3 {
            assert!(engine.evaluate_at(&entry, t0).allowed);
        }
        let denied = engine.evaluate_at(&entry, t0);
        assert!(!denied.allowed);
        assert_eq!(denied.rule, Some(GuardrailRule::RateLimit));

        // A quarter second at 2/sec is not enough for a whole token
        let quarter = t0 + Duration::from_millis(250);
        assert!(!engine.evaluate_at(&entry, quarter).allowed);

        // Half a second refills exactly one
        let half = t0 + Duration::from_millis(500);
        assert!(engine.evaluate_at(&entry, half).allowed);
        assert!(!engine.evaluate_at(&entry, half).allowed);
    }

    #[test]
    fn test_denied_rate_check_does_not_consume() {
        let mut engine = engine(1.0, 1);
        let t0 = Instant::now();
        let entry = nav_entry("https://example.com/a", "a");

        assert!(engine.evaluate_at(&entry, t0).allowed);
        // Repeated denied queries must not push the refill time back
        for ms in [100, 200, 300] {
            assert!(!engine.evaluate_at(&entry, t0 + Duration::from_millis(ms)).allowed);
        }
        assert!(engine.evaluate_at(&entry, t0 + Duration::from_secs(1)).allowed);
    }

    #[test]
    fn test_block_patterns() {
        let mut engine = engine(100.0, 100);

        for url in [
            "https://example.com/login",
            "https://example.com/account/sign-in",
            "https://example.com/auth/callback",
            "https://www.facebook.com/page",
            "https://example.com/files/setup.exe",
        ] {
            let verdict = engine.evaluate(&nav_entry(url, "link"));
            assert!(!verdict.allowed, "{url} should be blocked");
            assert_eq!(verdict.rule, Some(GuardrailRule::BlockedPattern));
        }

        assert!(engine.evaluate(&nav_entry("https://example.com/blog", "Blog")).allowed);
    }

    #[test]
    fn test_custom_block_pattern() {
        let mut config = SessionConfig::new("https://example.com");
        config.block_patterns.push(r"/private/".to_string());
        let mut engine = GuardrailEngine::from_config(&config).unwrap();

        let verdict = engine.evaluate(&nav_entry("https://example.com/private/x", "x"));
        assert_eq!(verdict.rule, Some(GuardrailRule::BlockedPattern));
    }

    #[test]
    fn test_destructive_labels_denied() {
        let mut engine = engine(100.0, 100);

        let verdict = engine.evaluate(&nav_entry("https://example.com/acct", "Delete account"));
        assert!(!verdict.allowed);
        assert_eq!(verdict.rule, Some(GuardrailRule::DestructiveAction));

        let verdict = engine.evaluate(&click_entry(
            "https://example.com/list",
            "(//button)[1]",
            "Unsubscribe",
        ));
        assert_eq!(verdict.rule, Some(GuardrailRule::DestructiveAction));
    }

    #[test]
    fn test_sensitive_input_click_denied() {
        let mut engine = engine(100.0, 100);
        let verdict = engine.evaluate(&click_entry(
            "https://example.com/form",
            "(//input)[1]",
            "Credit card number",
        ));
        assert!(!verdict.allowed);
        assert_eq!(verdict.rule, Some(GuardrailRule::SensitiveInput));
    }

    #[test]
    fn test_loop_detection() {
        let mut engine = engine(100.0, 100);
        let entry = nav_entry("https://example.com/a", "a");

        assert!(engine.evaluate(&entry).allowed);
        engine.record_executed(&entry);
        assert!(engine.evaluate(&entry).allowed);
        engine.record_executed(&entry);

        // Third execution of the same action within the window is a loop
        let verdict = engine.evaluate(&entry);
        assert!(!verdict.allowed);
        assert_eq!(verdict.rule, Some(GuardrailRule::LoopDetected));

        // A different action remains fine
        assert!(engine.evaluate(&nav_entry("https://example.com/b", "b")).allowed);
    }

    #[test]
    fn test_loop_threshold_is_configurable() {
        let mut config = SessionConfig::new("https://example.com");
        config.rate_per_sec = 100.0;
        config.burst = 100;
        config.loop_max_repeats = 1;
        let mut engine = GuardrailEngine::from_config(&config).unwrap();
        let entry = nav_entry("https://example.com/a", "a");

        assert!(engine.evaluate(&entry).allowed);
        engine.record_executed(&entry);

        let verdict = engine.evaluate(&entry);
        assert!(!verdict.allowed);
        assert_eq!(verdict.rule, Some(GuardrailRule::LoopDetected));
    }
}
