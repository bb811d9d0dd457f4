//! Per-order reordering buffer (spec §5): "Within one order, ExecutionReports are
//! applied in strictly increasing sequence; out-of-order arrivals are reordered using a
//! small per-order buffer (bounded to 16 pending) with a 2 s flush timeout (after which
//! buffered reports are applied in sequence order and a warning is emitted)."

use crate::order::{ExecutionReport, OrderId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// Bound on held reports per order (spec §5).
const MAX_PENDING: usize = 16;

/// How long a gap may sit unresolved before the held reports are force-applied anyway
/// (spec §5).
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
struct Pending {
    reports: Vec<ExecutionReport>,
    held_since: DateTime<Utc>,
}

/// Out-of-sequence execution reports awaiting a contiguous predecessor, keyed by the
/// order they belong to. Not itself responsible for applying reports — the Router
/// drains ready/expired entries and runs them through `apply_report`.
#[derive(Debug, Default)]
pub struct ReorderBuffer {
    pending: HashMap<OrderId, Pending>,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers an out-of-sequence `report`. Beyond [`MAX_PENDING`] held reports for one
    /// order, the oldest (lowest-seq) is dropped to make room, with a warning.
    pub fn hold(&mut self, order_id: OrderId, report: ExecutionReport, now: DateTime<Utc>) {
        let entry = self.pending.entry(order_id).or_insert_with(|| Pending {
            reports: Vec::new(),
            held_since: now,
        });
        if entry.reports.iter().any(|held| held.seq == report.seq) {
            return; // already holding this exact sequence number
        }
        if entry.reports.len() >= MAX_PENDING {
            tracing::warn!(%order_id, capacity = MAX_PENDING, "reorder buffer full, dropping oldest held execution report");
            entry.reports.remove(0);
        }
        entry.reports.push(report);
        entry.reports.sort_by_key(|r| r.seq);
    }

    /// Removes and returns every held report for `order_id` that continues
    /// contiguously from `last_applied_seq`, in sequence order.
    pub fn take_contiguous(&mut self, order_id: OrderId, mut last_applied_seq: u64) -> Vec<ExecutionReport> {
        let Some(entry) = self.pending.get_mut(&order_id) else {
            return Vec::new();
        };

        let mut ready = Vec::new();
        while let Some(pos) = entry.reports.iter().position(|r| r.seq == last_applied_seq + 1) {
            let report = entry.reports.remove(pos);
            last_applied_seq = report.seq;
            ready.push(report);
        }

        if entry.reports.is_empty() {
            self.pending.remove(&order_id);
        }
        ready
    }

    /// Removes and returns the held reports (in sequence order) of every order whose
    /// oldest buffered report has aged past [`FLUSH_TIMEOUT`], for the caller to apply
    /// despite the unresolved gap (spec §5).
    pub fn take_expired(&mut self, now: DateTime<Utc>) -> Vec<(OrderId, Vec<ExecutionReport>)> {
        let expired: Vec<OrderId> = self
            .pending
            .iter()
            .filter(|(_, entry)| {
                (now - entry.held_since)
                    .to_std()
                    .map(|age| age >= FLUSH_TIMEOUT)
                    .unwrap_or(false)
            })
            .map(|(order_id, _)| *order_id)
            .collect();

        expired
            .into_iter()
            .map(|order_id| {
                let entry = self.pending.remove(&order_id).expect("order_id observed in pending above");
                tracing::warn!(
                    %order_id,
                    pending = entry.reports.len(),
                    "reorder buffer flush timeout elapsed, applying held execution reports out of sequence"
                );
                (order_id, entry.reports)
            })
            .collect()
    }

    #[cfg(test)]
    fn pending_count(&self, order_id: OrderId) -> usize {
        self.pending.get(&order_id).map_or(0, |entry| entry.reports.len())
    }
}
