use crate::transform::RecordOutput;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the dispatcher and every worker
#[derive(Default)]
pub struct ImportStats {
    pub lines_read: AtomicU64,
    pub records_processed: AtomicU64,
    pub records_filtered: AtomicU64,
    pub records_skipped: AtomicU64,
    pub node_rows: AtomicU64,
    pub edge_rows: AtomicU64,
    pub qualifier_rows: AtomicU64,
    pub missing_fields: AtomicU64,
    pub unexpected_claim_types: AtomicU64,
    pub batches_sent: AtomicU64,
}

/// Point-in-time copy of [`ImportStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub lines_read: u64,
    pub records_processed: u64,
    pub records_filtered: u64,
    pub records_skipped: u64,
    pub node_rows: u64,
    pub edge_rows: u64,
    pub qualifier_rows: u64,
    pub missing_fields: u64,
    pub unexpected_claim_types: u64,
    pub batches_sent: u64,
}

impl ImportStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_lines(&self, count: u64) {
        self.lines_read.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_records(&self) {
        self.records_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_batches(&self) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds the row and policy counts of a flushed batch
    pub fn add_output(&self, out: &RecordOutput) {
        self.node_rows
            .fetch_add(out.nodes.len() as u64, Ordering::Relaxed);
        let edges = out.edges.len() + out.descriptions.len() + out.sitelinks.len();
        self.edge_rows.fetch_add(edges as u64, Ordering::Relaxed);
        self.qualifier_rows
            .fetch_add(out.qualifiers.len() as u64, Ordering::Relaxed);
        self.records_filtered
            .fetch_add(out.filtered, Ordering::Relaxed);
        self.records_skipped.fetch_add(out.skipped, Ordering::Relaxed);
        self.missing_fields
            .fetch_add(out.missing_fields, Ordering::Relaxed);
        self.unexpected_claim_types
            .fetch_add(out.unexpected_claim_types, Ordering::Relaxed);
    }

    pub fn lines(&self) -> u64 {
        self.lines_read.load(Ordering::Relaxed)
    }

    pub fn records(&self) -> u64 {
        self.records_processed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lines_read: self.lines(),
            records_processed: self.records(),
            records_filtered: self.records_filtered.load(Ordering::Relaxed),
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
            node_rows: self.node_rows.load(Ordering::Relaxed),
            edge_rows: self.edge_rows.load(Ordering::Relaxed),
            qualifier_rows: self.qualifier_rows.load(Ordering::Relaxed),
            missing_fields: self.missing_fields.load(Ordering::Relaxed),
            unexpected_claim_types: self.unexpected_claim_types.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
        }
    }
}
