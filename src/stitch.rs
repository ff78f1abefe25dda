//! Label compatibility across a window junction.
//!
//! Two windows of the same backbone label the same neighbor slots. A cluster
//! of the current window continues a cluster of the previous one when enough
//! reads carry both labels.

use crate::label::{distinct_clusters, Label};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

/// Co-occurrences needed for compatibility, capped by this fraction of the
/// label's size.
pub const MIN_SHARED_READS: f64 = 5.0;
pub const MIN_SHARED_FRACTION: f64 = 0.7;

/// Current-window cluster → compatible previous-window clusters.
pub type Stitches = BTreeMap<u32, BTreeSet<u32>>;

fn threshold(size: usize) -> f64 {
    MIN_SHARED_READS.min(MIN_SHARED_FRACTION * size as f64)
}

/// Compatibility between the clusters of `current` and `previous`, which must
/// label the same slots.
///
/// Only slots labelled with a cluster on both sides count. A pair is
/// compatible when its count reaches the threshold of either label, each
/// label's size being its number of such slots. Every current cluster that
/// co-occurs with anything is a key, possibly with an empty set.
pub fn stitch(current: &[Label], previous: &[Label]) -> Stitches {
    debug_assert_eq!(current.len(), previous.len());

    let mut pair_counts: FxHashMap<(u32, u32), usize> = FxHashMap::default();
    let mut size_current: FxHashMap<u32, usize> = FxHashMap::default();
    let mut size_previous: FxHashMap<u32, usize> = FxHashMap::default();

    for (cur, prev) in current.iter().zip(previous) {
        if let (Some(c), Some(p)) = (cur.cluster(), prev.cluster()) {
            *pair_counts.entry((c, p)).or_default() += 1;
            *size_current.entry(c).or_default() += 1;
            *size_previous.entry(p).or_default() += 1;
        }
    }

    let mut stitches = Stitches::new();
    for &c in size_current.keys() {
        stitches.insert(c, BTreeSet::new());
    }
    for (&(c, p), &count) in &pair_counts {
        let count = count as f64;
        if count >= threshold(size_current[&c]) || count >= threshold(size_previous[&p]) {
            stitches.entry(c).or_default().insert(p);
        }
    }
    stitches
}

/// [`stitch`] completed so that no lineage is lost at the junction: every
/// current cluster without a partner is joined to all previous clusters, and
/// every previous cluster nobody reached is joined to all current clusters.
pub fn junction_stitches(current: &[Label], previous: &[Label]) -> Stitches {
    let raw = stitch(current, previous);
    let previous_clusters = distinct_clusters(previous);
    let current_clusters = distinct_clusters(current);

    let reached: BTreeSet<u32> = raw.values().flatten().copied().collect();
    let orphans: Vec<u32> = previous_clusters
        .iter()
        .copied()
        .filter(|p| !reached.contains(p))
        .collect();

    let mut stitches = Stitches::new();
    for c in current_clusters {
        let mut set = raw.get(&c).cloned().unwrap_or_default();
        if set.is_empty() {
            set.extend(previous_clusters.iter().copied());
        } else {
            set.extend(orphans.iter().copied());
        }
        stitches.insert(c, set);
    }
    stitches
}
