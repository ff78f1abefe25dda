//! Location of window boundaries inside a polished sequence.
//!
//! A window is polished together with some padding on both sides; the
//! padding has to be cut off the result again. The draft is aligned
//! semi-globally (the draft end to end, free gaps at both ends of the
//! polished sequence) and the boundaries are read off the alignment path.
//! Only the flanks are aligned: the interior of the window does not move the
//! boundaries.

use std::ops::Range;

/// Bases of the window aligned beyond each padding.
pub const FLANK: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A base of each sequence (match or substitution).
    Both,
    /// A draft base missing from the polished sequence.
    QueryOnly,
    /// A polished base missing from the draft.
    TargetOnly,
}

/// Unit-cost semi-global alignment of `query` (global) within `target`
/// (free leading and trailing gaps). Returns the start of the alignment on
/// the target and the path.
pub fn semi_global(query: &[u8], target: &[u8]) -> (usize, Vec<Step>) {
    let m = query.len();
    let n = target.len();
    let width = n + 1;

    // cost[i * width + j]: best cost of query[..i] ending at target[..j]
    let mut cost = vec![0u32; (m + 1) * width];
    let mut traceback = vec![0u8; (m + 1) * width];
    for i in 1..=m {
        cost[i * width] = i as u32;
        traceback[i * width] = b'U';
    }

    for i in 1..=m {
        for j in 1..=n {
            let diag = cost[(i - 1) * width + j - 1] + u32::from(query[i - 1] != target[j - 1]);
            let up = cost[(i - 1) * width + j] + 1;
            let left = cost[i * width + j - 1] + 1;

            let (best, dir) = if diag <= up && diag <= left {
                (diag, b'D')
            } else if up <= left {
                (up, b'U')
            } else {
                (left, b'L')
            };
            cost[i * width + j] = best;
            traceback[i * width + j] = dir;
        }
    }

    let mut j = (0..=n).min_by_key(|&j| cost[m * width + j]).unwrap_or(0);
    let mut i = m;
    let mut steps = Vec::with_capacity(m + n);
    while i > 0 {
        match traceback[i * width + j] {
            b'D' => {
                steps.push(Step::Both);
                i -= 1;
                j -= 1;
            }
            b'U' => {
                steps.push(Step::QueryOnly);
                i -= 1;
            }
            _ => {
                steps.push(Step::TargetOnly);
                j -= 1;
            }
        }
    }
    steps.reverse();
    (j, steps)
}

/// Target position reached once the first `q` query bases are consumed.
fn target_after(start: usize, steps: &[Step], q: usize) -> Option<usize> {
    if q == 0 {
        return Some(start);
    }
    let (mut qi, mut tj) = (0usize, start);
    for step in steps {
        match step {
            Step::Both => {
                qi += 1;
                tj += 1;
            }
            Step::QueryOnly => qi += 1,
            Step::TargetOnly => tj += 1,
        }
        if qi == q {
            return Some(tj);
        }
    }
    None
}

fn target_span(query_len: usize, target_len: usize) -> usize {
    (query_len + query_len / 4 + 50).min(target_len)
}

/// Range of `polished` corresponding to `draft` without its first
/// `overhang_left` and last `overhang_right` bases.
///
/// Returns `None` when the boundaries cannot be placed or cross.
pub fn project_boundaries(
    draft: &[u8],
    polished: &[u8],
    overhang_left: usize,
    overhang_right: usize,
) -> Option<Range<usize>> {
    if overhang_left + overhang_right >= draft.len() || polished.is_empty() {
        return None;
    }

    let start = if overhang_left == 0 {
        0
    } else {
        let q_len = (overhang_left + FLANK).min(draft.len());
        let t_len = target_span(q_len, polished.len());
        let (t_start, steps) = semi_global(&draft[..q_len], &polished[..t_len]);
        target_after(t_start, &steps, overhang_left)?
    };

    let end = if overhang_right == 0 {
        polished.len()
    } else {
        let q_len = (overhang_right + FLANK).min(draft.len());
        let t_len = target_span(q_len, polished.len());
        let q_offset = draft.len() - q_len;
        let t_offset = polished.len() - t_len;
        let (t_start, steps) = semi_global(&draft[q_offset..], &polished[t_offset..]);
        t_offset + target_after(t_start, &steps, q_len - overhang_right)?
    };

    (start < end).then_some(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_dna(len: usize, seed: u64) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                b"ACGT"[(state >> 62) as usize]
            })
            .collect()
    }

    #[test]
    fn test_semi_global_finds_embedded_query() {
        let target = make_dna(200, 1);
        let query = target[50..120].to_vec();
        let (start, steps) = semi_global(&query, &target);
        assert_eq!(start, 50);
        assert!(steps.iter().all(|s| *s == Step::Both));
        assert_eq!(steps.len(), 70);
    }

    #[test]
    fn test_identical_sequences() {
        let draft = make_dna(2000, 7);
        let range = project_boundaries(&draft, &draft, 150, 150).unwrap();
        assert_eq!(range, 150..1850);
    }

    #[test]
    fn test_polished_with_edits_inside_window() {
        let left = make_dna(150, 11);
        let window = make_dna(1000, 12);
        let right = make_dna(150, 13);
        let draft = [left.clone(), window.clone(), right.clone()].concat();

        // polished window: 3 bases inserted near the start, 2 deleted near the end
        let mut polished_window = window.clone();
        polished_window.splice(20..20, b"TTT".iter().copied());
        polished_window.drain(950..952);
        let polished = [left.clone(), polished_window.clone(), right.clone()].concat();

        let range = project_boundaries(&draft, &polished, 150, 150).unwrap();
        assert_eq!(range, 150..150 + polished_window.len());
        assert_eq!(&polished[range], polished_window.as_slice());
    }

    #[test]
    fn test_zero_overhangs_use_sequence_ends() {
        let draft = make_dna(800, 21);
        let mut polished = draft.clone();
        polished.insert(400, b'A');
        let range = project_boundaries(&draft, &polished, 0, 0).unwrap();
        assert_eq!(range, 0..polished.len());
    }

    #[test]
    fn test_window_swallowed_by_padding() {
        let draft = make_dna(200, 3);
        assert!(project_boundaries(&draft, &draft, 100, 100).is_none());
        assert!(project_boundaries(&draft, &[], 10, 10).is_none());
    }
}
