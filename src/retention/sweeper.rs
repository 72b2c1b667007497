//! Bucket planning for down-sampled fact retention.
//!
//! Time before the cutoff is divided into buckets of one granularity each,
//! anchored at the cutoff and stepping backwards:
//!
//! ```text
//!   ... (p2 - g, p2] (p1 - g, p1] (cutoff - g, cutoff]  | newer facts (untouched)
//! ```
//!
//! Within every (host, module) group the newest fact in each bucket is kept
//! and the rest are deleted. A zero granularity deletes every candidate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::duration::RelativeDuration;
use crate::models::FactStamp;

/// Outcome of planning a sweep over a set of candidates.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepPlan {
    /// Facts to delete by module, each list grouped by host, newest first
    pub delete: BTreeMap<String, Vec<Uuid>>,
    /// Number of candidates kept as bucket representatives
    pub kept: u64,
    /// Number of distinct (host, module) groups seen
    pub groups: u64,
}

impl SweepPlan {
    pub fn delete_count(&self) -> u64 {
        self.delete.values().map(|ids| ids.len() as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.delete.values().all(Vec::is_empty)
    }

    /// Every fact to delete, module by module.
    pub fn ids(&self) -> impl Iterator<Item = &Uuid> {
        self.delete.values().flatten()
    }
}

/// Lazily computed bucket edges, shared by every group in one sweep.
///
/// `edge(0)` is the cutoff and `edge(k + 1)` is `edge(k)` minus the
/// granularity. Bucket `k` is `(edge(k + 1), edge(k)]`. An edge that cannot
/// be represented leaves its bucket unbounded below.
struct BucketEdges {
    granularity: RelativeDuration,
    edges: Vec<DateTime<Utc>>,
    exhausted: bool,
}

impl BucketEdges {
    fn new(cutoff: DateTime<Utc>, granularity: RelativeDuration) -> Self {
        Self {
            granularity,
            edges: vec![cutoff],
            exhausted: false,
        }
    }

    fn edge(&mut self, k: usize) -> Option<DateTime<Utc>> {
        while self.edges.len() <= k && !self.exhausted {
            let last = *self.edges.last()?;
            match self.granularity.subtract_from(last) {
                Some(next) if next < last => self.edges.push(next),
                _ => self.exhausted = true,
            }
        }
        self.edges.get(k).copied()
    }
}

/// Walk position within one (host, module) group.
struct BucketCursor {
    bucket: usize,
    kept: bool,
}

impl BucketCursor {
    fn new() -> Self {
        Self {
            bucket: 0,
            kept: false,
        }
    }

    /// Move to the bucket containing `timestamp`, then report whether the
    /// fact is the first one seen there.
    fn admit(&mut self, timestamp: DateTime<Utc>, edges: &mut BucketEdges) -> bool {
        while let Some(lower) = edges.edge(self.bucket + 1)
            && timestamp <= lower
        {
            self.bucket += 1;
            self.kept = false;
        }

        let first = !self.kept;
        self.kept = true;
        first
    }
}

/// Decide which candidates to delete.
///
/// `candidates` may arrive in any order; facts stamped after `cutoff` are
/// ignored and never affect bucket state.
pub fn plan_sweep(
    mut candidates: Vec<FactStamp>,
    cutoff: DateTime<Utc>,
    granularity: &RelativeDuration,
) -> SweepPlan {
    candidates.retain(|c| c.timestamp <= cutoff);
    candidates.sort_by(|a, b| {
        a.host_id
            .cmp(&b.host_id)
            .then_with(|| a.module.cmp(&b.module))
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| b.id.cmp(&a.id))
    });

    let mut plan = SweepPlan::default();
    let mut edges = BucketEdges::new(cutoff, *granularity);

    for group in candidates.chunk_by(|a, b| a.same_group(b)) {
        plan.groups += 1;
        let mut cursor = BucketCursor::new();

        for stamp in group {
            if !granularity.is_zero() && cursor.admit(stamp.timestamp, &mut edges) {
                plan.kept += 1;
                continue;
            }
            plan.delete
                .entry(stamp.module.clone())
                .or_default()
                .push(stamp.id);
        }
    }

    plan
}
