//! Presentation selector – which rows to show, in what order.
//!
//! Rows sort by blocklist membership, then severity rank, then CPU
//! descending.  Interesting rows (see [`ProcessRecord::is_interesting`]) are
//! always shown; quiet rows only fill the table up to `top_n`.

use std::cmp::Ordering;

use smartmon_types::{PERSISTENT_SPIKE_POLLS, ProcessRecord};

fn display_order(a: &ProcessRecord, b: &ProcessRecord) -> Ordering {
    let group = |r: &ProcessRecord| if r.blocklisted { 0u8 } else { 1 };
    group(a)
        .cmp(&group(b))
        .then_with(|| a.severity.rank().cmp(&b.severity.rank()))
        .then_with(|| b.cpu_percent.total_cmp(&a.cpu_percent))
}

/// Select and order the rows to display.
///
/// With `show_all` every record is returned.  Otherwise the result holds
/// `max(top_n, interesting)` rows, bounded by the number of records.
pub fn select(records: &[ProcessRecord], top_n: usize, show_all: bool) -> Vec<ProcessRecord> {
    let mut sorted: Vec<&ProcessRecord> = records.iter().collect();
    sorted.sort_by(|a, b| display_order(a, b));

    if show_all {
        return sorted.into_iter().cloned().collect();
    }

    let mut interesting_left = sorted.iter().filter(|r| r.is_interesting()).count();
    let mut rows = Vec::with_capacity(top_n.max(interesting_left).min(records.len()));
    for record in sorted {
        if rows.len() >= top_n && interesting_left == 0 {
            break;
        }
        if record.is_interesting() {
            interesting_left -= 1;
            rows.push(record.clone());
        } else if rows.len() < top_n {
            rows.push(record.clone());
        }
    }
    rows
}

/// Counts shown in the advisory panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdvisorySummary {
    pub cpu_spikes: usize,
    pub mem_spikes: usize,
    pub io_spikes: usize,
    pub blocklisted: usize,
    /// Records non-`NORMAL` for at least [`PERSISTENT_SPIKE_POLLS`] polls.
    pub persistent: usize,
}

pub fn advisory(records: &[ProcessRecord]) -> AdvisorySummary {
    records.iter().fold(AdvisorySummary::default(), |mut acc, r| {
        acc.cpu_spikes += usize::from(r.spikes.cpu);
        acc.mem_spikes += usize::from(r.spikes.mem);
        acc.io_spikes += usize::from(r.spikes.io);
        acc.blocklisted += usize::from(r.blocklisted);
        acc.persistent += usize::from(r.consecutive_spikes >= PERSISTENT_SPIKE_POLLS);
        acc
    })
}
