//! Splitting an agent run into index ranges.
//!
//! The service runs each `Agent.Run` request as its own job, so a run over
//! `total_records` inputs can be spread across up to `max_threads` jobs by
//! sending one request per contiguous index range. Indexes are 1-based and
//! inclusive. Chunks use ceiling division, so the last chunk may be shorter
//! and fewer than `max_threads` chunks may come out.

/// How a run is sent: one plain request, or one request per range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchPlan {
    Single,
    Chunked(Vec<IndexRange>),
}

/// A contiguous, inclusive range of input indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub start: u64,
    pub end: u64,
}

impl IndexRange {
    /// Value of `AgentParameter.INDEX`: `"start-end"`, or the bare index when
    /// the range holds one element.
    pub fn to_param(self) -> String {
        if self.start == self.end {
            self.start.to_string()
        } else {
            format!("{}-{}", self.start, self.end)
        }
    }

    pub fn size(self) -> u64 {
        self.end - self.start + 1
    }
}

/// Decide how to send a run. A missing or zero total, a missing or zero
/// thread limit, or a total below the limit gives `Single`.
pub fn plan(total_records: Option<u64>, max_threads: Option<u32>) -> DispatchPlan {
    let (total, threads) = match (total_records, max_threads) {
        (Some(total), Some(threads)) if total > 0 && threads > 0 => (total, u64::from(threads)),
        _ => return DispatchPlan::Single,
    };
    if total < threads {
        return DispatchPlan::Single;
    }

    let chunk = total.div_ceil(threads);
    let ranges = (0..total.div_ceil(chunk))
        .map(|i| {
            let start = i * chunk + 1;
            IndexRange {
                start,
                end: (start + chunk - 1).min(total),
            }
        })
        .collect();
    DispatchPlan::Chunked(ranges)
}
