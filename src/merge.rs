//! Merging of windows whose junction is a plain renumbering of clusters.

use crate::label::{distinct_clusters, Label};
use crate::partition::{Partitions, Window};
use crate::stitch::junction_stitches;
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

/// If the junction between `earlier` and `later` maps each cluster of `later`
/// onto exactly one cluster of `earlier` and back, return that renumbering
/// (later → earlier).
pub fn trivial_relabeling(later: &[Label], earlier: &[Label]) -> Option<FxHashMap<u32, u32>> {
    let earlier_clusters = distinct_clusters(earlier);
    let later_clusters = distinct_clusters(later);
    if earlier_clusters.len() != later_clusters.len() {
        return None;
    }

    let stitches = junction_stitches(later, earlier);
    let mut conversion = FxHashMap::default();
    let mut seen = FxHashSet::default();
    for (&l, partners) in &stitches {
        if partners.len() != 1 {
            return None;
        }
        let e = *partners.iter().next()?;
        if !seen.insert(e) {
            return None;
        }
        conversion.insert(l, e);
    }
    (seen.len() == earlier_clusters.len()).then_some(conversion)
}

/// Merge adjacent windows until no junction is trivial anymore.
pub fn merge_windows(windows: &[Window]) -> Vec<Window> {
    let mut current: Vec<Window> = windows.to_vec();
    loop {
        let merged = merge_pass(&current);
        if merged.len() == current.len() {
            return merged;
        }
        current = merged;
    }
}

fn merge_pass(windows: &[Window]) -> Vec<Window> {
    let mut out = Vec::with_capacity(windows.len());
    let mut iter = windows.iter();
    let Some(first) = iter.next() else {
        return out;
    };

    let mut acc = first.clone();
    for next in iter {
        match trivial_relabeling(&next.labels, &acc.labels) {
            Some(conversion) => {
                acc.end = next.end;
                for (slot, label) in acc.labels.iter_mut().enumerate() {
                    if label.is_cluster() {
                        continue;
                    }
                    if let Some(c) = next.labels[slot].cluster() {
                        // every later cluster is a key of a trivial junction
                        if let Some(&e) = conversion.get(&c) {
                            *label = Label::Cluster(e);
                        }
                    }
                }
            }
            None => {
                out.push(std::mem::replace(&mut acc, next.clone()));
            }
        }
    }
    out.push(acc);
    out
}

/// Apply [`merge_windows`] to every backbone.
pub fn merge_partitions(partitions: &mut Partitions) {
    let mut before = 0;
    let mut after = 0;
    for windows in partitions.values_mut() {
        before += windows.len();
        *windows = merge_windows(windows);
        after += windows.len();
    }
    debug!("Merged {} windows into {}", before, after);
}
