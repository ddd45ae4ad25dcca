//! Text normalization: NFC + whitespace collapsing.

use unicode_normalization::UnicodeNormalization;

/// Normalize raw text into canonical form.
///
/// Applies Unicode NFC, drops NUL bytes (they break downstream JSONL
/// tooling), collapses every whitespace run to a single ASCII space, and
/// trims the ends. Pure and idempotent.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for c in raw.nfc() {
        if c == '\0' {
            continue;
        }
        if c.is_whitespace() {
            // Leading whitespace produces no pending separator
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
    }
    out
}
