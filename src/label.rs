use std::fmt;
use std::num::TryFromIntError;

/// Strain-cluster assignment of one neighbor read inside one window.
///
/// The split file encodes these as integers: `-2` for a read that was not
/// recorded in the window, `-1` for a read that does not cover it (or was
/// excluded), and any non-negative value for a cluster id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Label {
    #[default]
    Unknown,
    Absent,
    Cluster(u32),
}

impl Label {
    /// Fails for cluster ids that do not fit in a `u32`.
    pub fn from_raw(value: i64) -> Result<Self, TryFromIntError> {
        match value {
            v if v >= 0 => u32::try_from(v).map(Label::Cluster),
            -1 => Ok(Label::Absent),
            _ => Ok(Label::Unknown),
        }
    }

    pub fn to_raw(self) -> i64 {
        match self {
            Label::Unknown => -2,
            Label::Absent => -1,
            Label::Cluster(c) => c as i64,
        }
    }

    pub fn cluster(self) -> Option<u32> {
        match self {
            Label::Cluster(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_cluster(self) -> bool {
        matches!(self, Label::Cluster(_))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_raw())
    }
}

/// Distinct clusters of a label vector, in ascending order.
pub fn distinct_clusters(labels: &[Label]) -> Vec<u32> {
    let mut clusters: Vec<u32> = labels.iter().filter_map(|l| l.cluster()).collect();
    clusters.sort_unstable();
    clusters.dedup();
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_conversion() {
        assert_eq!(Label::from_raw(-2).unwrap(), Label::Unknown);
        assert_eq!(Label::from_raw(-7).unwrap(), Label::Unknown);
        assert_eq!(Label::from_raw(-1).unwrap(), Label::Absent);
        assert_eq!(Label::from_raw(3).unwrap(), Label::Cluster(3));
        assert_eq!(Label::from_raw(u32::MAX as i64).unwrap(), Label::Cluster(u32::MAX));
        assert!(Label::from_raw(u32::MAX as i64 + 1).is_err());
        assert_eq!(Label::Absent.to_string(), "-1");
        assert_eq!(Label::Cluster(12).to_string(), "12");
    }

    #[test]
    fn test_distinct_clusters() {
        let labels = vec![
            Label::Cluster(2),
            Label::Absent,
            Label::Cluster(0),
            Label::Unknown,
            Label::Cluster(2),
        ];
        assert_eq!(distinct_clusters(&labels), vec![0, 2]);
        assert!(distinct_clusters(&[Label::Absent, Label::Unknown]).is_empty());
    }
}
