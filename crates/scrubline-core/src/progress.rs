//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: one indicatif bar per dataset worker, tracking rows (or
//! compressed bytes for remote sources while the row total is unknown).
//! Non-TTY mode: hidden bars; logs are the only progress indicator.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Per-dataset bar while total bytes are known (remote sources)
fn bytes_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:<18.cyan} {bar:28.green/dim} {binary_bytes:>8}/{binary_total_bytes:8} {wide_msg:.dim}")
        .expect("invalid template")
        .progress_chars("=>-")
}

/// Per-dataset spinner counting rows (local sources, unknown totals)
fn rows_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {prefix:<18.cyan} {human_pos:>10} rows {wide_msg:.dim}")
        .expect("invalid template")
}

/// Longest prefix of `name` that fits the bar's prefix column, cut on a
/// char boundary so non-ASCII names can't split a codepoint.
fn prefix_of(name: &str) -> &str {
    const MAX: usize = 18;
    if name.len() <= MAX {
        return name;
    }
    let mut cut = MAX;
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    &name[..cut]
}

/// Switch a dataset bar from row counting to a bytes bar.
///
/// Call once the remote source reports a content length.
pub fn upgrade_to_bytes(pb: &ProgressBar, total: u64) {
    pb.set_position(0);
    pb.set_length(total);
    pb.set_style(bytes_style());
}

/// Central progress context managing multi-progress bars.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY automatically.
    pub fn new() -> Self {
        let is_tty = std::io::stderr().is_terminal();
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Per-dataset progress bar, starting as a row-counting spinner.
    ///
    /// Non-TTY: hidden (no-op).
    pub fn dataset_bar(&self, name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }

        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(rows_style());
        // Truncate long names to keep bars aligned
        pb.set_prefix(prefix_of(name).to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Print a line above managed progress bars (avoids interference).
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.is_tty {
            let _ = self.multi.println(msg);
        } else {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Get reference to `MultiProgress` for the log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for `ProgressContext`.
pub type SharedProgress = Arc<ProgressContext>;

/// Format number with thousand separators.
pub fn fmt_num(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_num_small() {
        assert_eq!(fmt_num(0), "0");
        assert_eq!(fmt_num(42), "42");
        assert_eq!(fmt_num(999), "999");
    }

    #[test]
    fn prefix_truncates_on_char_boundary() {
        assert_eq!(prefix_of("short"), "short");
        assert_eq!(prefix_of("exactly-eighteen-b"), "exactly-eighteen-b");
        // 1 + 9 two-byte chars = 19 bytes; byte 18 splits the last char
        assert_eq!(prefix_of("aééééééééé"), "aéééééééé");
    }

    #[test]
    fn fmt_num_thousands() {
        assert_eq!(fmt_num(1_000), "1,000");
        assert_eq!(fmt_num(12_345), "12,345");
        assert_eq!(fmt_num(1_234_567), "1,234,567");
    }
}
