//! Status lines and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Format for `clreduce config`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// JSON document
    #[default]
    Json,
    /// YAML document
    Yaml,
}

/// Writes status lines to stderr, with an optional progress bar
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar over `total` test cases
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet || !self.term.is_term() {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Increment progress
    pub fn increment(&self, delta: u64) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(delta);
        }
    }

    /// Update progress message
    pub fn set_message(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(message.to_string());
        }
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    fn line(&self, message: &str) {
        match self.progress_bar {
            Some(ref pb) => pb.println(message),
            None => {
                let _ = self.term.write_line(message);
            }
        }
    }

    fn prefixed(&self, symbol: &str, plain: &str, paint: fn(&str) -> String, message: &str) {
        let prefix = if self.use_color {
            paint(symbol)
        } else {
            plain.to_string()
        };
        self.line(&format!("{prefix} {message}"));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.prefixed("✓", "OK", |s: &str| style(s).green().bold().to_string(), message);
    }

    /// Print a failure message, even in quiet mode
    pub fn failure(&self, message: &str) {
        self.prefixed("✗", "FAIL", |s: &str| style(s).red().bold().to_string(), message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.prefixed("⚠", "WARN", |s: &str| style(s).yellow().bold().to_string(), message);
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.prefixed("ℹ", "INFO", |s: &str| style(s).blue().bold().to_string(), message);
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }

        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };

        self.line("");
        self.line(&styled);
    }

    /// Print the batch summary and runtime
    pub fn summary(&self, interesting: usize, rejected: usize, errors: usize, duration: Duration) {
        if self.quiet && errors == 0 {
            return;
        }

        let total = interesting + rejected + errors;
        let secs = duration.as_secs_f64();

        self.line("");
        if self.use_color {
            let good = Style::new().green().bold();
            let bad = Style::new().red().bold();
            let errors_text = if errors > 0 {
                bad.apply_to(errors).to_string()
            } else {
                errors.to_string()
            };
            self.line(&format!(
                "{total} test cases in {secs:.2}s ({} interesting, {rejected} not interesting, {errors_text} errors)",
                good.apply_to(interesting),
            ));
        } else {
            self.line(&format!(
                "{total} test cases in {secs:.2}s ({interesting} interesting, {rejected} not interesting, {errors} errors)"
            ));
        }
        self.line(&format!("Runtime: {} seconds", duration.as_secs()));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_reporter_has_no_progress() {
        let mut reporter = ProgressReporter::new(false, true);
        reporter.start_progress(10, "checking");
        assert!(reporter.progress_bar.is_none());
        reporter.increment(1);
        reporter.finish();
    }

    #[test]
    fn test_messages_do_not_panic_without_color() {
        let reporter = ProgressReporter::new(false, false);
        reporter.success("CLProg_0.cl");
        reporter.failure("CLProg_1.cl");
        reporter.warning("skipped");
        reporter.info("starting");
        reporter.header("Check");
        reporter.summary(1, 1, 0, Duration::from_millis(1500));
    }

    #[test]
    fn test_default_format_is_json() {
        assert_eq!(OutputFormat::default(), OutputFormat::Json);
    }
}
