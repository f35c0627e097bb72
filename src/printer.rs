//! Single-line progress output with two severities
//!
//! `print_elide` keeps one updateable status line; `print_full` scrolls a
//! permanent line above it. Errors and summaries go through `print_full`.

use crossterm::terminal;
use indicatif::{ProgressBar, ProgressStyle};

pub const ERROR_PREFIX: &str = "ferry: error: ";

pub trait ProgressSink {
    /// Replace the current status line.
    fn print_elide(&self, line: &str);
    /// Emit a permanent line.
    fn print_full(&self, line: &str);
}

/// Print an error through the permanent channel with the standard prefix.
pub fn error_line(sink: &dyn ProgressSink, message: &str) {
    sink.print_full(&format!("{}{}", ERROR_PREFIX, message));
}

pub struct ConsoleSink {
    bar: ProgressBar,
}

impl ConsoleSink {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Self { bar }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleSink {
    fn print_elide(&self, line: &str) {
        let width = terminal::size().map(|(w, _)| w as usize).unwrap_or(80);
        let line = line.trim_end_matches('\n');
        let msg: String = if line.chars().count() > width {
            line.chars().take(width.saturating_sub(3)).chain("...".chars()).collect()
        } else {
            line.to_string()
        };
        self.bar.set_message(msg);
    }

    fn print_full(&self, line: &str) {
        self.bar.println(line.trim_end_matches('\n'));
    }
}

impl Drop for ConsoleSink {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

pub(crate) fn plural(n: u32) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
