use super::{Consensus, PolishRequest};
use log::debug;
use spoa_rs::{AlignmentEngine, AlignmentType as SpoaAlignmentType, Graph as SpoaGraph};

/// Partial-order consensus of the draft and the clipped reads.
pub struct SpoaConsensus {
    /// (match, mismatch, gap_open1, gap_ext1, gap_open2, gap_ext2)
    pub scoring_params: (u8, u8, u8, u8, u8, u8),
}

impl Default for SpoaConsensus {
    fn default() -> Self {
        SpoaConsensus {
            scoring_params: (5, 4, 6, 2, 24, 1),
        }
    }
}

/// Most supported base of each MSA column; columns where gaps outnumber the
/// best base are dropped. Ties go to the first row (the draft).
pub fn majority_consensus(msa: &[String]) -> Vec<u8> {
    let rows: Vec<&[u8]> = msa.iter().map(|s| s.as_bytes()).collect();
    let ncols = rows.iter().map(|r| r.len()).min().unwrap_or(0);

    let mut consensus = Vec::with_capacity(ncols);
    for col in 0..ncols {
        let mut counts = [0usize; 256];
        for row in &rows {
            counts[row[col] as usize] += 1;
        }
        let gaps = counts[b'-' as usize];
        counts[b'-' as usize] = 0;

        let first = rows[0][col];
        let mut best = first;
        for base in [b'A', b'C', b'G', b'T', b'N'] {
            if counts[base as usize] > counts[best as usize] {
                best = base;
            }
        }
        if best == b'-' || counts[best as usize] == 0 || gaps > counts[best as usize] {
            continue;
        }
        consensus.push(best);
    }
    consensus
}

impl Consensus for SpoaConsensus {
    fn polish(&self, request: &PolishRequest) -> Vec<u8> {
        if request.reads.is_empty() || request.draft.is_empty() {
            return Vec::new();
        }

        let (match_score, mismatch, gap_open1, gap_extend1, gap_open2, gap_extend2) = self.scoring_params;
        let mut graph = SpoaGraph::new();
        let mut engine = AlignmentEngine::new_convex(
            SpoaAlignmentType::kSW,
            match_score as i8,
            -(mismatch as i8),
            -(gap_open1 as i8),
            -(gap_extend1 as i8),
            -(gap_open2 as i8),
            -(gap_extend2 as i8),
        );

        let draft = String::from_utf8_lossy(request.draft).into_owned();
        let sequences = std::iter::once(draft).chain(
            request
                .reads
                .iter()
                .filter(|r| !r.sequence.is_empty())
                .map(|r| String::from_utf8_lossy(&r.sequence).into_owned()),
        );
        for sequence in sequences {
            let weights = vec![1u32; sequence.len()];
            let (_, alignment) = engine.align(&sequence, &graph);
            graph.add_alignment_with_weights(alignment, &sequence, &weights);
        }

        let msa = graph.generate_msa();
        let consensus = majority_consensus(&msa);
        debug!(
            "[{}] spoa consensus of {} reads at {}: {} bp from a {} bp draft",
            request.tag,
            request.reads.len(),
            request.window_start,
            consensus.len(),
            request.draft.len()
        );
        consensus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_majority_consensus() {
        let msa = vec![
            "ACG-TA".to_string(),
            "ACGGTA".to_string(),
            "ACCGT-".to_string(),
            "ACCGTA".to_string(),
        ];
        // column 2 is a G/C tie, kept as the draft's G; column 3 has one gap
        // against three G.
        assert_eq!(majority_consensus(&msa), b"ACGGTA".to_vec());
    }

    #[test]
    fn test_gap_majority_drops_column() {
        let msa = vec!["AC-T".to_string(), "AC-T".to_string(), "ACGT".to_string()];
        assert_eq!(majority_consensus(&msa), b"ACT".to_vec());
    }

    #[test]
    fn test_empty_msa() {
        assert!(majority_consensus(&[]).is_empty());
    }
}
