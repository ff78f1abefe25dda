pub mod external;
pub mod spoa;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Part of a neighbor read overlapping a padded window, in backbone
/// orientation.
#[derive(Debug, Clone, PartialEq)]
pub struct ClippedRead {
    pub name: String,
    pub sequence: Vec<u8>,
    /// CIGAR of the clipped alignment against the padded draft.
    pub cigar: String,
    /// 1-based position of the alignment on the padded draft.
    pub start: usize,
}

/// Everything a polisher gets for one window and one cluster.
#[derive(Debug)]
pub struct PolishRequest<'a> {
    /// Backbone substring of the window with its padding.
    pub draft: &'a [u8],
    /// Start of the window on the backbone.
    pub window_start: usize,
    pub reads: &'a [ClippedRead],
    pub technology: &'a str,
    /// Identifies the calling worker in logs and scratch directory names.
    pub tag: &'a str,
}

/// A consensus engine. An empty result means the window could not be
/// polished.
pub trait Consensus: Send + Sync {
    fn polish(&self, request: &PolishRequest) -> Vec<u8>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polisher {
    #[default]
    Racon,
    Medaka,
    Spoa,
}

impl FromStr for Polisher {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "racon" => Ok(Polisher::Racon),
            "medaka" => Ok(Polisher::Medaka),
            "spoa" => Ok(Polisher::Spoa),
            other => Err(format!(
                "Unknown polisher '{}' (expected racon, medaka or spoa)",
                other
            )),
        }
    }
}

impl fmt::Display for Polisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Polisher::Racon => "racon",
            Polisher::Medaka => "medaka",
            Polisher::Spoa => "spoa",
        };
        write!(f, "{}", name)
    }
}

/// Executables of the external tools.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub minimap2: String,
    pub racon: String,
    pub medaka: String,
    pub samtools: String,
    pub python: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        ToolPaths {
            minimap2: "minimap2".to_string(),
            racon: "racon".to_string(),
            medaka: "medaka_consensus".to_string(),
            samtools: "samtools".to_string(),
            python: "python3".to_string(),
        }
    }
}

/// Build the consensus engine for `polisher`. External tools work in
/// temporary directories under `scratch_dir`, which must exist.
pub fn build_consensus(polisher: Polisher, tools: &ToolPaths, scratch_dir: PathBuf) -> Box<dyn Consensus> {
    match polisher {
        Polisher::Spoa => Box::new(spoa::SpoaConsensus::default()),
        Polisher::Racon => Box::new(external::RaconConsensus::new(tools.clone(), scratch_dir)),
        Polisher::Medaka => Box::new(external::MedakaConsensus::new(tools.clone(), scratch_dir)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polisher_from_str() {
        assert_eq!("racon".parse::<Polisher>().unwrap(), Polisher::Racon);
        assert_eq!("Medaka".parse::<Polisher>().unwrap(), Polisher::Medaka);
        assert_eq!("spoa".parse::<Polisher>().unwrap(), Polisher::Spoa);
        assert!("wtdbg2".parse::<Polisher>().is_err());
        assert_eq!(Polisher::Spoa.to_string(), "spoa");
    }
}
