//! Replay host state tracking
//!
//! Counts what the host has delivered so the final summary and the
//! abend message can say how far the replay got.

/// Delivery counters for one replay run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostState {
    /// Input lines read, blank ones included
    pub lines_read: u64,
    /// Sequence number of the last event handed to the handler
    pub sequence: u64,
    pub delivered: u64,
    pub failed: u64,
    /// Transactions without operations, never shown to the handler
    pub skipped: u64,
    pub metadata_changes: u64,
}

impl HostState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the sequence number for the next event
    pub fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    pub fn record_delivered(&mut self) {
        self.delivered += 1;
    }

    pub fn record_failed(&mut self) {
        self.failed += 1;
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn record_metadata_change(&mut self) {
        self.metadata_changes += 1;
    }
}

impl std::fmt::Display for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "lines={} delivered={} failed={} skipped={} metadata_changes={}",
            self.lines_read, self.delivered, self.failed, self.skipped, self.metadata_changes
        )
    }
}
