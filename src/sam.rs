//! Alignment input
//!
//! Turns read-to-backbone alignments (SAM or BAM) into [`Overlap`]s of the
//! graph arena. Also home of the [`ParseErr`] shared by the text parsers.

use crate::cigar::{backbone_length, cigar_to_string, leading_clip, push_op, read_length, CigarOp};
use crate::graph::{Graph, Overlap, ReadId};
use log::{debug, info};
use rust_htslib::bam::{self, Read as _};
use std::io::Error as IoError;
use std::num::{ParseFloatError, ParseIntError, TryFromIntError};

#[derive(Debug)]
pub enum ParseErr {
    NotEnoughFields,
    IoError(IoError),
    InvalidField(ParseIntError),
    InvalidFloat(ParseFloatError),
    OutOfRange(TryFromIntError),
    InvalidCigarFormat,
    UnsupportedCigarOperation(char),
    InvalidFormat(String),
}

impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseErr::NotEnoughFields => write!(f, "Not enough fields in record"),
            ParseErr::IoError(e) => write!(f, "IO error: {}", e),
            ParseErr::InvalidField(e) => write!(f, "Invalid field: {}", e),
            ParseErr::InvalidFloat(e) => write!(f, "Invalid field: {}", e),
            ParseErr::OutOfRange(e) => write!(f, "Value out of range: {}", e),
            ParseErr::InvalidCigarFormat => write!(f, "Invalid CIGAR format"),
            ParseErr::UnsupportedCigarOperation(op) => {
                write!(f, "Unsupported CIGAR operation '{}'", op)
            }
            ParseErr::InvalidFormat(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ParseErr {}

impl From<ParseIntError> for ParseErr {
    fn from(e: ParseIntError) -> Self {
        ParseErr::InvalidField(e)
    }
}

impl From<ParseFloatError> for ParseErr {
    fn from(e: ParseFloatError) -> Self {
        ParseErr::InvalidFloat(e)
    }
}

impl From<TryFromIntError> for ParseErr {
    fn from(e: TryFromIntError) -> Self {
        ParseErr::OutOfRange(e)
    }
}

impl From<ParseErr> for IoError {
    fn from(e: ParseErr) -> Self {
        match e {
            ParseErr::IoError(e) => e,
            other => IoError::new(std::io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}

/// Typed CIGAR of an htslib record. `N` becomes a deletion and `P` is
/// dropped, as in [`crate::cigar::parse_cigar`].
fn record_cigar(record: &bam::Record) -> Result<Vec<CigarOp>, ParseErr> {
    let mut ops: Vec<CigarOp> = Vec::new();
    for op in record.cigar().iter() {
        let kind = match op.char() {
            'N' => 'D',
            'P' => continue,
            c => c,
        };
        push_op(&mut ops, CigarOp::try_new(op.len() as usize, kind)?)?;
    }
    Ok(ops)
}

/// Overlap of one alignment, with read coordinates on the forward read.
fn alignment_overlap(graph: &Graph, read: ReadId, backbone: ReadId, record: &bam::Record, ops: &[CigarOp]) -> Overlap {
    let forward = !record.is_reverse();
    let read_len = match graph.reads[read].length {
        0 => read_length(ops),
        len => len,
    };
    let clip = leading_clip(ops);
    let trailing_clip: usize = ops
        .iter()
        .rev()
        .take_while(|op| op.is_clip())
        .map(|op| op.len())
        .sum();
    let aligned = read_length(ops).saturating_sub(clip).saturating_sub(trailing_clip);
    let (start_rc, end_rc) = (clip, (clip + aligned).min(read_len));
    let (position_1_1, position_1_2) = if forward {
        (start_rc, end_rc)
    } else {
        (read_len.saturating_sub(end_rc), read_len.saturating_sub(start_rc))
    };
    let position = record.pos() as usize;

    Overlap {
        sequence1: read,
        sequence2: backbone,
        position_1_1,
        position_1_2,
        position_2_1: position,
        position_2_2: position + backbone_length(ops),
        strand: forward,
        cigar: cigar_to_string(ops),
    }
}

/// Read a SAM or BAM file and register every usable alignment as an overlap
/// between a read (`sequence1`) and a backbone (`sequence2`).
///
/// Unmapped and secondary records are skipped, as are alignments naming
/// unknown reads or targets that are not backbones. Returns the number of
/// overlaps created.
pub fn parse_sam_file(path: &str, graph: &mut Graph) -> std::io::Result<usize> {
    let mut reader = bam::Reader::from_path(path)
        .map_err(|e| IoError::other(format!("Failed to open SAM file '{}': {}", path, e)))?;
    let targets: Vec<Option<ReadId>> = reader
        .header()
        .target_names()
        .iter()
        .map(|name| {
            graph
                .read_id(&String::from_utf8_lossy(name))
                .filter(|&id| graph.is_backbone(id))
        })
        .collect();

    let mut created = 0;
    let mut skipped = 0;
    for (record_number, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            IoError::new(
                std::io::ErrorKind::InvalidData,
                format!("Failed to parse SAM from {}: record {}: {}", path, record_number + 1, e),
            )
        })?;
        if record.is_unmapped() || record.is_secondary() || record.tid() < 0 || record.pos() < 0 {
            continue;
        }
        let ops = record_cigar(&record).map_err(|e| {
            IoError::new(
                std::io::ErrorKind::InvalidData,
                format!("Failed to parse SAM from {}: record {}: {}", path, record_number + 1, e),
            )
        })?;
        if ops.is_empty() {
            continue;
        }

        let backbone = targets.get(record.tid() as usize).copied().flatten();
        let read = graph.read_id(&String::from_utf8_lossy(record.qname()));
        let (Some(read), Some(backbone)) = (read, backbone) else {
            skipped += 1;
            continue;
        };
        if read == backbone {
            skipped += 1;
            continue;
        }

        let overlap = alignment_overlap(graph, read, backbone, &record, &ops);
        graph.add_overlap(overlap);
        created += 1;
    }

    if skipped > 0 {
        debug!(
            "Skipped {} alignments on unknown reads or non-backbone targets",
            skipped
        );
    }
    info!("Parsed {} read-to-contig alignments from {}", created, path);
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Read;
    use tempfile::TempDir;

    fn graph_with_reads() -> Graph {
        let mut graph = Graph::new();
        graph.add_read(Read::resident("read1", b"ACGTACGTAC".to_vec()));
        graph.add_backbone(Read::resident("ctg", vec![b'A'; 100]));
        graph.add_backbone(Read::resident("other", vec![b'C'; 100]));
        graph
    }

    fn write_sam(dir: &TempDir, body: &str) -> String {
        let path = dir.path().join("reads.sam");
        let text = format!("@HD\tVN:1.6\n@SQ\tSN:ctg\tLN:100\n@SQ\tSN:other\tLN:100\n@SQ\tSN:unknown\tLN:100\n{}", body);
        std::fs::write(&path, text).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_parse_sam_creates_overlaps() {
        let dir = TempDir::new().unwrap();
        let mut graph = graph_with_reads();
        let path = write_sam(
            &dir,
            "read1\t0\tctg\t21\t60\t2S8M\t*\t0\t0\tACGTACGTAC\t*\n\
             read1\t16\tctg\t51\t60\t3S7M\t*\t0\t0\tACGTACGTAC\t*\n\
             ghost\t0\tctg\t1\t60\t10M\t*\t0\t0\tACGTACGTAC\t*\n\
             read1\t0\tunknown\t1\t60\t10M\t*\t0\t0\tACGTACGTAC\t*\n",
        );
        let created = parse_sam_file(&path, &mut graph).unwrap();
        assert_eq!(created, 2);

        let fwd = &graph.overlaps[0];
        assert_eq!((fwd.position_1_1, fwd.position_1_2), (2, 10));
        assert_eq!((fwd.position_2_1, fwd.position_2_2), (20, 28));
        assert_eq!(fwd.cigar, "2S8M");
        assert!(fwd.strand);

        // reverse alignment: clip of 3 on the reverse-complemented read
        let rev = &graph.overlaps[1];
        assert_eq!((rev.position_1_1, rev.position_1_2), (0, 7));
        assert_eq!((rev.position_2_1, rev.position_2_2), (50, 57));
        assert!(!rev.strand);

        let ctg = graph.read_id("ctg").unwrap();
        assert_eq!(graph.reads[ctg].neighbors, vec![0, 1]);
    }

    #[test]
    fn test_parse_sam_skips_unusable_records() {
        let dir = TempDir::new().unwrap();
        let mut graph = graph_with_reads();
        let path = write_sam(
            &dir,
            "read1\t4\t*\t0\t0\t*\t*\t0\t0\tACGTACGTAC\t*\n\
             read1\t256\tctg\t5\t0\t10M\t*\t0\t0\t*\t*\n\
             read1\t0\tother\t1\t60\t4M2N6M\t*\t0\t0\tACGTACGTAC\t*\n",
        );
        assert_eq!(parse_sam_file(&path, &mut graph).unwrap(), 1);
        // N is a skip on the backbone
        assert_eq!(graph.overlaps[0].cigar, "4M2D6M");
        assert_eq!(graph.overlaps[0].position_2_2, 12);
    }

    #[test]
    fn test_missing_sam_file_is_an_error() {
        let mut graph = graph_with_reads();
        assert!(parse_sam_file("/nonexistent/reads.sam", &mut graph).is_err());
    }
}
