//! Hashing progress display
//!
//! A single bar per folder showing how many paths have been digested so far.
//! indicatif hides the bar automatically when stderr is not a terminal.

use indicatif::{ProgressBar, ProgressStyle};

pub struct HashProgress {
    bar: ProgressBar,
}

impl HashProgress {
    pub fn new(label: &str, total: u64) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix}: △ calculated shas for {pos} / {len} files")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_prefix(label.to_string());
        Self { bar }
    }

    /// Record that `processed` of the total paths have been handed to the tool
    pub fn set_processed(&self, processed: u64) {
        self.bar.set_position(processed);
    }

    pub fn finish(&self) {
        self.bar.finish();
    }
}
