use crate::label::Label;
use rustc_hash::FxHashMap;

/// How sub-contig depths relate to the depth of the contig they come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthPolicy {
    /// Each read counts once, scaled by the window length ratio.
    #[default]
    ReadCount,
    /// Cluster depths are rescaled to sum to the original depth, when known.
    PreserveTotal,
}

/// Depth of each label over the inclusive window `[start, end]`.
pub fn recompute_depths(
    start: usize,
    end: usize,
    labels: &[Label],
    original_depth: f64,
    policy: DepthPolicy,
) -> FxHashMap<Label, f64> {
    let span = end.saturating_sub(start) as f64;
    let per_read = span / (span + 1.0);

    let mut depths: FxHashMap<Label, f64> = FxHashMap::default();
    for &label in labels {
        *depths.entry(label).or_default() += per_read;
    }

    if policy == DepthPolicy::PreserveTotal && original_depth >= 0.0 {
        let total: f64 = depths
            .iter()
            .filter(|(label, _)| label.is_cluster())
            .map(|(_, depth)| depth)
            .sum();
        if total > 0.0 {
            for (label, depth) in depths.iter_mut() {
                if label.is_cluster() {
                    *depth *= original_depth / total;
                }
            }
        }
    }
    depths
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(raw: &[i64]) -> Vec<Label> {
        raw.iter().map(|&r| Label::from_raw(r).unwrap()).collect()
    }

    #[test]
    fn test_read_count_depths() {
        let depths = recompute_depths(0, 9, &labels(&[0, 0, 1, -1]), 30.0, DepthPolicy::ReadCount);
        assert!((depths[&Label::Cluster(0)] - 1.8).abs() < 1e-9);
        assert!((depths[&Label::Cluster(1)] - 0.9).abs() < 1e-9);
        assert!((depths[&Label::Absent] - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_preserve_total_rescales_clusters() {
        let depths = recompute_depths(0, 99, &labels(&[0, 0, 0, 1, -1]), 40.0, DepthPolicy::PreserveTotal);
        let c0 = depths[&Label::Cluster(0)];
        let c1 = depths[&Label::Cluster(1)];
        assert!((c0 + c1 - 40.0).abs() < 1e-9);
        assert!((c0 - 30.0).abs() < 1e-9);
        // non-cluster labels are left alone
        assert!((depths[&Label::Absent] - 0.99).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_original_depth_is_not_rescaled() {
        let read_count = recompute_depths(10, 20, &labels(&[0, 1]), -1.0, DepthPolicy::ReadCount);
        let preserved = recompute_depths(10, 20, &labels(&[0, 1]), -1.0, DepthPolicy::PreserveTotal);
        assert_eq!(read_count, preserved);
    }

    #[test]
    fn test_single_base_window() {
        let depths = recompute_depths(5, 5, &labels(&[0, 0]), 2.0, DepthPolicy::ReadCount);
        assert_eq!(depths[&Label::Cluster(0)], 0.0);
    }
}
