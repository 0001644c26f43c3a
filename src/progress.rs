use serde::Serialize;

/// Percentage of files processed in one batch. A fresh tracker per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressTracker {
    processed: usize,
    total: usize,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self { processed: 0, total }
    }

    /// Counts one more processed file and returns the new percentage.
    /// Saturates at `total`.
    pub fn advance(&mut self) -> u8 {
        if self.processed < self.total {
            self.processed += 1;
        }
        self.percent()
    }

    /// `floor(processed / total * 100)`; an empty batch is complete.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (self.processed * 100 / self.total) as u8
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_done(&self) -> bool {
        self.processed == self.total
    }
}
