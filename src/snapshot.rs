use regex::Regex;
use scraper::{Html, Node, Selector};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use url::Url;

use crate::filter::canonicalize;

/// Raw capture of a page as returned by a browser driver
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    /// URL the browser actually landed on (post-redirect)
    pub url: String,
    /// Raw page source
    pub html: String,
}

/// An outbound link with its anchor text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRef {
    pub url: String,
    #[serde(default)]
    pub text: String,
}

/// What kind of interactive element a reference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Button,
    Input,
}

/// A labeled interactive element, addressable through the driver by its
/// XPath locator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageElement {
    /// Document-order XPath locator, e.g. `(//button)[2]`
    pub locator: String,
    /// Human-readable label (text content, aria-label, placeholder...)
    pub label: String,
    pub kind: ElementKind,
    /// The `type` attribute for inputs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
}

/// The normalized, deduplication-ready view of one observed page
#[derive(Debug, Clone)]
pub struct NormalizedSnapshot {
    /// Canonical URL (fragment and volatile query params removed)
    pub url: String,
    pub title: Option<String>,
    /// SHA-256 over the normalized structural skeleton, hex encoded
    pub fingerprint: String,
    pub links: Vec<LinkRef>,
    pub elements: Vec<PageElement>,
}

/// Turns raw page snapshots into normalized ones.
///
/// Fingerprints are computed over a tag-and-text skeleton of the page
/// body with volatile runs scrubbed, so cosmetic differences such as
/// rendered timestamps, session tokens or ad slot identifiers do not
/// defeat deduplication.
pub struct Extractor {
    digit_runs: Regex,
    hex_runs: Regex,
    iso_dates: Regex,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    pub fn new() -> Self {
        Self {
            // Four or more digits covers years, unix times and counters
            digit_runs: Regex::new(r"\d{4,}").expect("static pattern"),
            // Long hex runs are session tokens and cache-buster ids
            hex_runs: Regex::new(r"\b[0-9a-fA-F]{16,}\b").expect("static pattern"),
            iso_dates: Regex::new(r"\d{4}-\d{2}-\d{2}([T ]\d{2}:\d{2}(:\d{2})?)?")
                .expect("static pattern"),
        }
    }

    /// Normalize a raw snapshot: canonical URL, title, fingerprint, and
    /// extracted links and interactive elements
    pub fn normalize(&self, snapshot: &PageSnapshot) -> NormalizedSnapshot {
        let doc = Html::parse_document(&snapshot.html);

        let base = Url::parse(&snapshot.url).ok();
        let canonical_url = base
            .as_ref()
            .map(|u| canonicalize(u).to_string())
            .unwrap_or_else(|| snapshot.url.clone());

        let title = extract_title(&doc);
        let skeleton = self.skeleton(&doc);
        let fingerprint = fingerprint_of(&skeleton);
        let links = extract_links(&doc, base.as_ref());
        let elements = extract_elements(&doc);

        ::log::debug!(
            "normalized {} -> fingerprint {}.., {} links, {} elements",
            canonical_url,
            &fingerprint[..8.min(fingerprint.len())],
            links.len(),
            elements.len()
        );

        NormalizedSnapshot {
            url: canonical_url,
            title,
            fingerprint,
            links,
            elements,
        }
    }

    /// Build the structural skeleton the fingerprint is computed over:
    /// element names and scrubbed text in document order, body only
    fn skeleton(&self, doc: &Html) -> String {
        let body_selector = Selector::parse("body").unwrap();
        let mut out = String::new();

        let bodies: Vec<_> = doc.select(&body_selector).collect();
        if bodies.is_empty() {
            self.walk(doc.root_element(), &mut out);
        } else {
            for body in bodies {
                self.walk(body, &mut out);
            }
        }

        out
    }

    fn walk(&self, root: scraper::ElementRef, out: &mut String) {
        for node in root.descendants() {
            match node.value() {
                Node::Element(el) => {
                    if matches!(el.name(), "script" | "style" | "noscript") {
                        continue;
                    }
                    out.push('<');
                    out.push_str(el.name());
                    out.push('>');
                }
                Node::Text(text) => {
                    let inside_skipped = node
                        .parent()
                        .and_then(scraper::ElementRef::wrap)
                        .map(|p| matches!(p.value().name(), "script" | "style" | "noscript"))
                        .unwrap_or(false);
                    if inside_skipped {
                        continue;
                    }

                    let scrubbed = self.scrub(text);
                    if !scrubbed.is_empty() {
                        out.push_str(&scrubbed);
                        out.push('|');
                    }
                }
                _ => {}
            }
        }
    }

    /// Replace volatile runs with a placeholder and collapse whitespace
    fn scrub(&self, text: &str) -> String {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let no_dates = self.iso_dates.replace_all(&collapsed, "#");
        let no_hex = self.hex_runs.replace_all(&no_dates, "#");
        self.digit_runs.replace_all(&no_hex, "#").into_owned()
    }
}

/// Hex-encoded SHA-256 of the skeleton
fn fingerprint_of(skeleton: &str) -> String {
    let digest = Sha256::digest(skeleton.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn extract_title(doc: &Html) -> Option<String> {
    let selector = Selector::parse("title").unwrap();
    doc.select(&selector)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Extract outbound links as absolute canonical URLs with their anchor
/// text, http(s) only, deduplicated in document order
fn extract_links(doc: &Html, base: Option<&Url>) -> Vec<LinkRef> {
    let selector = Selector::parse("a[href]").unwrap();
    let mut seen: HashSet<String> = HashSet::new();
    let mut links = Vec::new();

    for anchor in doc.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };

        let resolved = match base {
            Some(base) => base.join(href),
            None => Url::parse(href),
        };
        let Ok(resolved) = resolved else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }

        let canonical = canonicalize(&resolved).to_string();
        if !seen.insert(canonical.clone()) {
            continue;
        }

        let text = anchor
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        links.push(LinkRef {
            url: canonical,
            text,
        });
    }

    links
}

/// Extract labeled interactive elements with document-order XPath locators
fn extract_elements(doc: &Html) -> Vec<PageElement> {
    let mut elements = Vec::new();

    collect_elements(doc, "button", "//button", ElementKind::Button, &mut elements);
    collect_elements(doc, "input", "//input", ElementKind::Input, &mut elements);
    collect_elements(
        doc,
        "textarea",
        "//textarea",
        ElementKind::Input,
        &mut elements,
    );

    elements
}

fn collect_elements(
    doc: &Html,
    css: &str,
    xpath_base: &str,
    kind: ElementKind,
    out: &mut Vec<PageElement>,
) {
    let selector = Selector::parse(css).unwrap();

    for (index, el) in doc.select(&selector).enumerate() {
        let input_type = el.value().attr("type").map(|t| t.to_ascii_lowercase());

        // Submit inputs act as buttons
        let kind = if kind == ElementKind::Input && input_type.as_deref() == Some("submit") {
            ElementKind::Button
        } else {
            kind
        };

        let label = element_label(&el);
        if label.is_empty() && kind == ElementKind::Button {
            // An unlabeled button is not worth proposing as an action
            continue;
        }

        out.push(PageElement {
            locator: format!("({})[{}]", xpath_base, index + 1),
            label,
            kind,
            input_type,
        });
    }
}

/// Best available human-readable label for an element
fn element_label(el: &scraper::ElementRef) -> String {
    let text = el
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if !text.is_empty() {
        return text;
    }

    for attr in ["aria-label", "value", "placeholder", "name", "id"] {
        if let Some(value) = el.value().attr(attr) {
            let value = value.trim();
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }

    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(url: &str, html: &str) -> PageSnapshot {
        PageSnapshot {
            url: url.to_string(),
            html: html.to_string(),
        }
    }

    #[test]
    fn test_fingerprint_ignores_volatile_content() {
        let extractor = Extractor::new();

        let a = extractor.normalize(&snap(
            "https://example.com/",
            "<html><body><h1>News</h1><p>Updated 2024-05-01 10:32</p></body></html>",
        ));
        let b = extractor.normalize(&snap(
            "https://example.com/",
            "<html><body><h1>News</h1><p>Updated 2025-11-23 18:05</p></body></html>",
        ));

        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_fingerprint_distinguishes_structure() {
        let extractor = Extractor::new();

        let a = extractor.normalize(&snap(
            "https://example.com/",
            "<html><body><h1>Home</h1></body></html>",
        ));
        let b = extractor.normalize(&snap(
            "https://example.com/about",
            "<html><body><h1>About us</h1></body></html>",
        ));

        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_fingerprint_ignores_session_tokens() {
        let extractor = Extractor::new();

        let a = extractor.normalize(&snap(
            "https://example.com/",
            "<html><body><p>token: 6f3a9b2c4d5e6f7a8b9c0d1e2f3a4b5c</p></body></html>",
        ));
        let b = extractor.normalize(&snap(
            "https://example.com/",
            "<html><body><p>token: 0123456789abcdef0123456789abcdef</p></body></html>",
        ));

        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_link_extraction_resolves_and_dedups() {
        let extractor = Extractor::new();
        let page = extractor.normalize(&snap(
            "https://example.com/dir/",
            r##"<html><body>
                <a href="/about">About</a>
                <a href="team.html">Team</a>
                <a href="/about#history">About history</a>
                <a href="mailto:x@example.com">Mail</a>
                <a href="https://other.com/b">Other</a>
            </body></html>"##,
        ));

        let urls: Vec<&str> = page.links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/about",
                "https://example.com/dir/team.html",
                "https://other.com/b",
            ]
        );
        assert_eq!(page.links[0].text, "About");
    }

    #[test]
    fn test_element_extraction() {
        let extractor = Extractor::new();
        let page = extractor.normalize(&snap(
            "https://example.com/",
            r#"<html><body>
                <button>Save draft</button>
                <input type="password" name="pw">
                <input type="submit" value="Send">
            </body></html>"#,
        ));

        assert_eq!(page.elements.len(), 3);
        assert_eq!(page.elements[0].label, "Save draft");
        assert_eq!(page.elements[0].kind, ElementKind::Button);
        assert_eq!(page.elements[0].locator, "(//button)[1]");

        let password = &page.elements[1];
        assert_eq!(password.kind, ElementKind::Input);
        assert_eq!(password.input_type.as_deref(), Some("password"));

        // type=submit counts as a button
        assert_eq!(page.elements[2].kind, ElementKind::Button);
        assert_eq!(page.elements[2].label, "Send");
    }

    #[test]
    fn test_title_and_canonical_url() {
        let extractor = Extractor::new();
        let page = extractor.normalize(&snap(
            "https://example.com/page?sid=99#top",
            "<html><head><title> Docs </title></head><body></body></html>",
        ));

        assert_eq!(page.title.as_deref(), Some("Docs"));
        assert_eq!(page.url, "https://example.com/page");
    }
}
