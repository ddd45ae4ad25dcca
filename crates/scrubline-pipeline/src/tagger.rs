//! Taggers: labeled span detection over normalized text.
//!
//! A tagger scans text and returns labeled byte-offset spans of sensitive
//! content. Taggers are interchangeable and selected by identifier string
//! so configs can swap detection strategies without code changes.

use std::sync::LazyLock;

use regex::Regex;

/// A labeled character span over normalized text (byte offsets).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanMatch {
    pub label: String,
    pub start: usize,
    pub end: usize,
}

impl SpanMatch {
    pub fn new(label: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            label: label.into(),
            start,
            end,
        }
    }
}

/// Error from a tagger on one document. Never fatal to the run.
#[derive(Debug)]
pub struct TagError {
    pub message: String,
}

impl TagError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TagError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tagging failed: {}", self.message)
    }
}

impl std::error::Error for TagError {}

/// Span detection capability, selected by identifier.
///
/// Must be safe to call repeatedly, once per document, in any order.
pub trait Tagger: Send + Sync {
    fn id(&self) -> &'static str;

    fn tag(&self, text: &str) -> Result<Vec<SpanMatch>, TagError>;
}

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email regex")
});

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    // US-style numbers: optional +1, optional area parens, common separators
    Regex::new(r"(\+?1[-.\s]?)?(\(\d{3}\)|\d{3})[-.\s]\d{3}[-.\s]\d{4}\b").expect("phone regex")
});

static IPV4_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("ipv4 regex")
});

fn find_all(re: &Regex, label: &str, text: &str, out: &mut Vec<SpanMatch>) {
    for m in re.find_iter(text) {
        out.push(SpanMatch::new(label, m.start(), m.end()));
    }
}

/// General-purpose PII tagger: emails, phone numbers, IPv4 addresses.
///
/// The default for masking configs that don't name a tagger.
pub struct PiiRegexTagger;

impl Tagger for PiiRegexTagger {
    fn id(&self) -> &'static str {
        "pii_regex"
    }

    fn tag(&self, text: &str) -> Result<Vec<SpanMatch>, TagError> {
        let mut spans = Vec::new();
        find_all(&EMAIL_RE, "email", text, &mut spans);
        find_all(&PHONE_RE, "phone_number", text, &mut spans);
        find_all(&IPV4_RE, "ip_address", text, &mut spans);
        Ok(spans)
    }
}

/// Email-only tagger, for corpora where phone/IP false positives matter.
pub struct EmailTagger;

impl Tagger for EmailTagger {
    fn id(&self) -> &'static str {
        "email_only"
    }

    fn tag(&self, text: &str) -> Result<Vec<SpanMatch>, TagError> {
        let mut spans = Vec::new();
        find_all(&EMAIL_RE, "email", text, &mut spans);
        Ok(spans)
    }
}

/// Identifiers of all registered taggers.
pub fn tagger_ids() -> &'static [&'static str] {
    &["pii_regex", "email_only"]
}

/// Look up a tagger by identifier. `None` for unknown ids; callers turn
/// that into a startup configuration error, not a per-row one.
pub fn tagger_by_id(id: &str) -> Option<Box<dyn Tagger>> {
    match id {
        "pii_regex" => Some(Box::new(PiiRegexTagger)),
        "email_only" => Some(Box::new(EmailTagger)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(spans: &[SpanMatch]) -> Vec<&str> {
        spans.iter().map(|s| s.label.as_str()).collect()
    }

    #[test]
    fn finds_email() {
        let spans = PiiRegexTagger.tag("contact john@example.com today").unwrap();
        assert_eq!(labels(&spans), vec!["email"]);
        assert_eq!(&"contact john@example.com today"[spans[0].start..spans[0].end], "john@example.com");
    }

    #[test]
    fn finds_phone() {
        let spans = PiiRegexTagger.tag("call (206) 555-0199 now").unwrap();
        assert!(labels(&spans).contains(&"phone_number"));
    }

    #[test]
    fn finds_ipv4() {
        let spans = PiiRegexTagger.tag("server at 192.168.0.1 down").unwrap();
        assert_eq!(labels(&spans), vec!["ip_address"]);
    }

    #[test]
    fn clean_text_no_spans() {
        let spans = PiiRegexTagger.tag("nothing sensitive here").unwrap();
        assert!(spans.is_empty());
    }

    #[test]
    fn multiple_matches_all_reported() {
        let spans = PiiRegexTagger
            .tag("a@b.com and c@d.org from 10.0.0.1")
            .unwrap();
        assert_eq!(labels(&spans), vec!["email", "email", "ip_address"]);
    }

    #[test]
    fn email_only_ignores_ip() {
        let spans = EmailTagger.tag("a@b.com from 10.0.0.1").unwrap();
        assert_eq!(labels(&spans), vec!["email"]);
    }

    #[test]
    fn registry_known_ids() {
        for id in tagger_ids() {
            let tagger = tagger_by_id(id).expect("registered tagger");
            assert_eq!(tagger.id(), *id);
        }
    }

    #[test]
    fn registry_unknown_id() {
        assert!(tagger_by_id("no_such_tagger").is_none());
    }
}
