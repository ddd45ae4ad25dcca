//! Span masking: overlap resolution and token substitution.

use std::collections::BTreeMap;

use crate::tagger::{SpanMatch, TagError, Tagger};

/// Masked text plus per-label counts of accepted spans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskedResult {
    pub text: String,
    pub span_counts: BTreeMap<String, usize>,
}

impl MaskedResult {
    /// Pass-through result when masking is disabled.
    pub fn passthrough(text: String) -> Self {
        Self {
            text,
            span_counts: BTreeMap::new(),
        }
    }

    pub fn total_spans(&self) -> usize {
        self.span_counts.values().sum()
    }
}

/// Resolve raw tagger output into non-overlapping accepted spans.
///
/// Invalid spans (empty, out of bounds, or not on char boundaries) are
/// dropped. The rest are sorted by start ascending then end descending,
/// then walked greedily left to right: a span starting inside the extent
/// already consumed is skipped. Deterministic and left-biased, with the
/// longer span winning a start-offset tie.
pub fn resolve_spans(text: &str, mut spans: Vec<SpanMatch>) -> Vec<SpanMatch> {
    spans.retain(|s| {
        s.start < s.end
            && s.end <= text.len()
            && text.is_char_boundary(s.start)
            && text.is_char_boundary(s.end)
    });
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut accepted: Vec<SpanMatch> = Vec::with_capacity(spans.len());
    let mut consumed = 0usize;
    for s in spans {
        if s.start >= consumed {
            consumed = s.end;
            accepted.push(s);
        }
    }
    accepted
}

/// Replace each accepted span with the mask token.
///
/// The result is unmasked gaps and mask tokens concatenated in original
/// order; output length may differ from input.
pub fn mask_text(text: &str, accepted: &[SpanMatch], mask_token: &str) -> MaskedResult {
    if accepted.is_empty() {
        return MaskedResult::passthrough(text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut span_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut cursor = 0usize;
    for s in accepted {
        out.push_str(&text[cursor..s.start]);
        out.push_str(mask_token);
        cursor = s.end;
        *span_counts.entry(s.label.clone()).or_default() += 1;
    }
    out.push_str(&text[cursor..]);

    MaskedResult {
        text: out,
        span_counts,
    }
}

/// Full masking pass: tag, resolve overlaps, substitute.
pub fn mask(text: &str, tagger: &dyn Tagger, mask_token: &str) -> Result<MaskedResult, TagError> {
    let spans = tagger.tag(text)?;
    let accepted = resolve_spans(text, spans);
    Ok(mask_text(text, &accepted, mask_token))
}
