use crate::sam::ParseErr;
use std::ops::Range;

/// One CIGAR operation packed into a single word: the three most significant
/// bits hold the kind, the rest the length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    val: u32,
}

const LEN_BITS: u32 = 29;
const LEN_MASK: u32 = (1 << LEN_BITS) - 1;

impl CigarOp {
    /// An operation of a kind and length already known to be valid.
    fn new(len: usize, op: char) -> Self {
        let code = match op {
            '=' => 0,
            'X' => 1,
            'I' => 2,
            'D' => 3,
            'M' => 4,
            'S' => 5,
            'H' => 6,
            _ => panic!("Invalid CIGAR operation: {op}"),
        };
        Self {
            val: (code << LEN_BITS) | (len as u32 & LEN_MASK),
        }
    }

    /// An operation read from input: the kind must be one of `=XIDMSH` and the
    /// length must fit in the packed word.
    pub fn try_new(len: usize, op: char) -> Result<Self, ParseErr> {
        if !matches!(op, '=' | 'X' | 'I' | 'D' | 'M' | 'S' | 'H') {
            return Err(ParseErr::UnsupportedCigarOperation(op));
        }
        let packed = u32::try_from(len)?;
        if packed > LEN_MASK {
            return Err(ParseErr::InvalidCigarFormat);
        }
        Ok(CigarOp::new(len, op))
    }

    pub fn op(&self) -> char {
        match self.val >> LEN_BITS {
            0 => '=',
            1 => 'X',
            2 => 'I',
            3 => 'D',
            4 => 'M',
            5 => 'S',
            6 => 'H',
            code => panic!("Invalid CIGAR operation code: {code}"),
        }
    }

    pub fn len(&self) -> usize {
        (self.val & LEN_MASK) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_clip(&self) -> bool {
        matches!(self.op(), 'S' | 'H')
    }

    /// Bases consumed on the read per unit of length (clips included: the
    /// reads file holds the full read).
    pub fn read_step(&self) -> usize {
        match self.op() {
            '=' | 'X' | 'M' | 'I' | 'S' | 'H' => 1,
            _ => 0,
        }
    }

    /// Bases consumed on the backbone per unit of length.
    pub fn backbone_step(&self) -> usize {
        match self.op() {
            '=' | 'X' | 'M' | 'D' => 1,
            _ => 0,
        }
    }

    fn with_len(&self, len: usize) -> Self {
        CigarOp::new(len, self.op())
    }
}

/// Parse a CIGAR string. `N` is read as a deletion and `P` is dropped, since
/// neither carries read sequence.
pub fn parse_cigar(cigar: &str) -> Result<Vec<CigarOp>, ParseErr> {
    let mut ops = Vec::new();
    let mut len: usize = 0;
    let mut has_len = false;

    for c in cigar.chars() {
        if let Some(d) = c.to_digit(10) {
            len = len
                .checked_mul(10)
                .and_then(|l| l.checked_add(d as usize))
                .ok_or(ParseErr::InvalidCigarFormat)?;
            has_len = true;
            continue;
        }
        if !has_len {
            return Err(ParseErr::InvalidCigarFormat);
        }
        match c {
            '=' | 'X' | 'I' | 'D' | 'M' | 'S' | 'H' => push_op(&mut ops, CigarOp::try_new(len, c)?)?,
            'N' => push_op(&mut ops, CigarOp::try_new(len, 'D')?)?,
            'P' => {}
            _ => return Err(ParseErr::UnsupportedCigarOperation(c)),
        }
        len = 0;
        has_len = false;
    }
    if has_len {
        return Err(ParseErr::InvalidCigarFormat);
    }

    Ok(ops)
}

pub fn cigar_to_string(ops: &[CigarOp]) -> String {
    ops.iter().map(|op| format!("{}{}", op.len(), op.op())).collect()
}

/// Append an operation, fusing it with the previous one when they share a kind.
pub(crate) fn push_op(ops: &mut Vec<CigarOp>, op: CigarOp) -> Result<(), ParseErr> {
    if op.is_empty() {
        return Ok(());
    }
    if let Some(last) = ops.last_mut() {
        if last.op() == op.op() {
            *last = CigarOp::try_new(last.len() + op.len(), op.op())?;
            return Ok(());
        }
    }
    ops.push(op);
    Ok(())
}

/// Length of the read implied by the CIGAR, hard clips included.
pub fn read_length(ops: &[CigarOp]) -> usize {
    ops.iter().map(|op| op.len() * op.read_step()).sum()
}

/// Backbone span of the alignment.
pub fn backbone_length(ops: &[CigarOp]) -> usize {
    ops.iter().map(|op| op.len() * op.backbone_step()).sum()
}

/// Bases clipped at the start of the read.
pub fn leading_clip(ops: &[CigarOp]) -> usize {
    ops.iter()
        .take_while(|op| op.is_clip())
        .map(|op| op.len())
        .sum()
}

/// The part of one read alignment that falls inside a backbone range.
#[derive(Debug, Clone, PartialEq)]
pub struct ClippedAlignment {
    /// Offsets on the (oriented) read.
    pub read_range: Range<usize>,
    /// Operations restricted to the range, re-encoded.
    pub cigar: Vec<CigarOp>,
    /// 1-based start of the clipped alignment, relative to the range start.
    pub start: usize,
}

/// Walk `ops` with three cursors (read, operation, backbone) and keep the
/// part of the alignment whose backbone cursor lies in `range`.
///
/// `backbone_start` is where the alignment starts on the backbone. Returns
/// `None` when the range is empty or inverted on the read, which happens when
/// the whole range falls inside a deletion or outside the alignment.
pub fn clip_to_range(
    ops: &[CigarOp],
    backbone_start: usize,
    range: &Range<usize>,
) -> Option<ClippedAlignment> {
    let mut read_pos = 0usize;
    let mut backbone_pos = backbone_start;
    let mut start: Option<(usize, usize, usize, usize)> = None; // (op, offset, read, backbone)
    let mut end: Option<(usize, usize, usize)> = None; // (op, offset, read)
    let mut last_aligned: (usize, usize, usize) = (0, 0, 0);

    for (idx, op) in ops.iter().enumerate() {
        let n = op.len();
        if op.is_clip() {
            if start.is_none() {
                read_pos += n;
            }
            continue;
        }
        let dr = op.read_step();
        let db = op.backbone_step();

        if start.is_none() {
            let k = if db == 0 {
                (backbone_pos >= range.start).then_some(0)
            } else {
                let k = range.start.saturating_sub(backbone_pos);
                (k < n).then_some(k)
            };
            if let Some(k) = k {
                start = Some((idx, k, read_pos + dr * k, backbone_pos + db * k));
            }
        }

        let k_end = if db == 0 {
            (backbone_pos >= range.end).then_some(0)
        } else {
            let k = range.end.saturating_sub(backbone_pos);
            (k < n).then_some(k)
        };
        if let Some(k) = k_end {
            end = Some((idx, k, read_pos + dr * k));
            break;
        }

        read_pos += dr * n;
        backbone_pos += db * n;
        last_aligned = (idx, n, read_pos);
    }

    let (op_s, off_s, read_s, backbone_s) = start?;
    let (op_e, off_e, read_e) = end.unwrap_or(last_aligned);
    if read_s >= read_e {
        return None;
    }

    let mut clipped = Vec::new();
    for (idx, op) in ops.iter().enumerate().take(op_e + 1).skip(op_s) {
        if op.is_clip() {
            continue;
        }
        let from = if idx == op_s { off_s } else { 0 };
        let to = if idx == op_e { off_e } else { op.len() };
        if to > from {
            push_op(&mut clipped, op.with_len(to - from)).ok()?;
        }
    }

    let mut start_on_range = backbone_s - range.start;
    // An alignment cannot open or close on a deletion; insertions at the
    // edges become soft clips.
    while let Some(first) = clipped.first().copied() {
        match first.op() {
            'D' => {
                start_on_range += first.len();
                clipped.remove(0);
            }
            'I' => {
                clipped[0] = CigarOp::new(first.len(), 'S');
                break;
            }
            _ => break,
        }
    }
    while let Some(last) = clipped.last().copied() {
        match last.op() {
            'D' => {
                clipped.pop();
            }
            'I' => {
                let at = clipped.len() - 1;
                clipped[at] = CigarOp::new(last.len(), 'S');
                break;
            }
            _ => break,
        }
    }
    if clipped.iter().all(|op| op.is_clip()) {
        return None;
    }

    Some(ClippedAlignment {
        read_range: read_s..read_e,
        cigar: clipped,
        start: start_on_range + 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let ops = parse_cigar("5S10M2I3D7=1X4H").unwrap();
        assert_eq!(ops.len(), 7);
        assert_eq!(ops[0], CigarOp::new(5, 'S'));
        assert_eq!(ops[3].op(), 'D');
        assert_eq!(ops[3].len(), 3);
        assert_eq!(cigar_to_string(&ops), "5S10M2I3D7=1X4H");
        assert_eq!(read_length(&ops), 5 + 10 + 2 + 7 + 1 + 4);
        assert_eq!(backbone_length(&ops), 10 + 3 + 7 + 1);
        assert_eq!(leading_clip(&ops), 5);
    }

    #[test]
    fn test_parse_fuses_and_rejects() {
        assert_eq!(cigar_to_string(&parse_cigar("3M2N4D").unwrap()), "3M6D");
        assert!(matches!(
            parse_cigar("3M4Q"),
            Err(ParseErr::UnsupportedCigarOperation('Q'))
        ));
        assert!(matches!(parse_cigar("M"), Err(ParseErr::InvalidCigarFormat)));
        assert!(matches!(parse_cigar("12"), Err(ParseErr::InvalidCigarFormat)));
    }

    #[test]
    fn test_clip_inside_match() {
        // Read aligned at backbone 100 with a 200M block.
        let ops = parse_cigar("200M").unwrap();
        let clip = clip_to_range(&ops, 100, &(150..250)).unwrap();
        assert_eq!(clip.read_range, 50..150);
        assert_eq!(cigar_to_string(&clip.cigar), "100M");
        assert_eq!(clip.start, 1);
    }

    #[test]
    fn test_clip_read_starting_inside_range() {
        let ops = parse_cigar("10S50M").unwrap();
        let clip = clip_to_range(&ops, 120, &(100..300)).unwrap();
        // soft clip skipped, alignment ends before the range does
        assert_eq!(clip.read_range, 10..60);
        assert_eq!(cigar_to_string(&clip.cigar), "50M");
        assert_eq!(clip.start, 21);
    }

    #[test]
    fn test_clip_with_indels() {
        // backbone: 0..10 M, 10..15 D, 15..25 M ; read: 0..10, 10..13 I, 13..23
        let ops = parse_cigar("10M5D3I10M").unwrap();
        let clip = clip_to_range(&ops, 0, &(5..20)).unwrap();
        assert_eq!(clip.read_range, 5..18);
        assert_eq!(cigar_to_string(&clip.cigar), "5M5D3I5M");
        assert_eq!(clip.start, 1);
    }

    #[test]
    fn test_clip_inside_deletion_is_dropped() {
        let ops = parse_cigar("10M50D10M").unwrap();
        assert!(clip_to_range(&ops, 0, &(20..40)).is_none());
    }

    #[test]
    fn test_clip_outside_alignment_is_dropped() {
        let ops = parse_cigar("100M").unwrap();
        assert!(clip_to_range(&ops, 0, &(200..300)).is_none());
        assert!(clip_to_range(&ops, 500, &(200..300)).is_none());
    }

    #[test]
    fn test_clip_edges_never_start_with_deletion() {
        // Range starts exactly on the deletion.
        let ops = parse_cigar("10M5D10M").unwrap();
        let clip = clip_to_range(&ops, 0, &(10..25)).unwrap();
        assert_eq!(cigar_to_string(&clip.cigar), "10M");
        assert_eq!(clip.start, 6);
        assert_eq!(clip.read_range, 10..20);
    }

    #[test]
    fn test_oversized_lengths_are_rejected() {
        assert!(matches!(parse_cigar("536870912M"), Err(ParseErr::InvalidCigarFormat)));
        assert!(matches!(parse_cigar("99999999999999999999999M"), Err(ParseErr::InvalidCigarFormat)));
        assert!(matches!(parse_cigar("300000000M300000000M"), Err(ParseErr::InvalidCigarFormat)));
        assert!(matches!(CigarOp::try_new(1usize << 33, 'M'), Err(ParseErr::OutOfRange(_))));
        assert_eq!(parse_cigar("536870911M").unwrap()[0].len(), 536870911);
        assert!(matches!(CigarOp::try_new(3, 'N'), Err(ParseErr::UnsupportedCigarOperation('N'))));
    }
}
