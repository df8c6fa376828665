//! Global pairwise alignment with affine gap penalties (Gotoh)
//!
//! Scores are kept in half units so the 0.5 gap extension stays integral.
//! Three states are tracked per cell: `Diag` (a and b both consume a base),
//! `Up` (a consumes, gap in b) and `Left` (b consumes, gap in a). Only two
//! score rows per state are kept; the full matrix holds one packed traceback
//! byte per cell.

use thiserror::Error;

/// Gap character in aligned rows
pub const GAP: u8 = b'-';

/// Default DP cell budget (roughly an 8 kb x 8 kb alignment)
pub const DEFAULT_MAX_CELLS: usize = 64_000_000;

const NEG_INF: i32 = i32::MIN / 2;

/// Alignment could not be computed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlignmentError {
    #[error("Alignment score overflowed")]
    Overflow,

    #[error("Alignment needs {cells} cells, limit is {limit}")]
    TooLarge { cells: usize, limit: usize },
}

/// Substitution and gap scores in half units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scoring {
    pub match_score: i32,
    pub mismatch: i32,
    /// Score of a gap of length one
    pub gap_open: i32,
    /// Score of each further gap position
    pub gap_extend: i32,
}

impl Scoring {
    /// Half units per reported score point
    pub const SCALE: f64 = 2.0;

    fn substitution(&self, a: u8, b: u8) -> i32 {
        if a.eq_ignore_ascii_case(&b) {
            self.match_score
        } else {
            self.mismatch
        }
    }
}

impl Default for Scoring {
    /// match +2, mismatch -1, gap open -2, gap extend -0.5
    fn default() -> Self {
        Self {
            match_score: 4,
            mismatch: -2,
            gap_open: -4,
            gap_extend: -1,
        }
    }
}

/// Optimal global alignment of two sequences
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub score: f64,
    pub aligned_a: Vec<u8>,
    pub aligned_b: Vec<u8>,
}

impl Alignment {
    /// Number of alignment columns
    pub fn len(&self) -> usize {
        self.aligned_a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aligned_a.is_empty()
    }

    /// Iterate over (a, b) column pairs
    pub fn columns(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.aligned_a
            .iter()
            .copied()
            .zip(self.aligned_b.iter().copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TracebackDir {
    Diag = 0,
    Up = 1,
    Left = 2,
}

impl TracebackDir {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            1 => TracebackDir::Up,
            2 => TracebackDir::Left,
            _ => TracebackDir::Diag,
        }
    }
}

// Traceback byte layout: bits 0-1 predecessor of the Diag state,
// bits 2-3 of the Up state, bits 4-5 of the Left state.
const UP_SHIFT: u8 = 2;
const LEFT_SHIFT: u8 = 4;

#[derive(Clone)]
struct ScoreRow {
    diag: Vec<i32>,
    up: Vec<i32>,
    left: Vec<i32>,
}

impl ScoreRow {
    fn new(cols: usize) -> Self {
        Self {
            diag: vec![NEG_INF; cols],
            up: vec![NEG_INF; cols],
            left: vec![NEG_INF; cols],
        }
    }
}

/// Add a delta to a score, keeping the unreachable sentinel in place
fn shift(score: i32, delta: i32) -> Result<i32, AlignmentError> {
    if score <= NEG_INF {
        return Ok(NEG_INF);
    }
    score.checked_add(delta).ok_or(AlignmentError::Overflow)
}

/// Best of the three states, preferring Diag then Up then Left on ties
fn pick(diag: i32, up: i32, left: i32) -> (i32, TracebackDir) {
    let mut best = (diag, TracebackDir::Diag);
    if up > best.0 {
        best = (up, TracebackDir::Up);
    }
    if left > best.0 {
        best = (left, TracebackDir::Left);
    }
    best
}

/// Globally align `a` against `b`
///
/// End gaps are scored like interior gaps. Comparison ignores ASCII case;
/// aligned rows keep the input bytes as given.
pub fn align_global(
    a: &[u8],
    b: &[u8],
    scoring: &Scoring,
    max_cells: usize,
) -> Result<Alignment, AlignmentError> {
    let rows = a.len() + 1;
    let cols = b.len() + 1;
    let cells = rows.checked_mul(cols).unwrap_or(usize::MAX);
    if cells > max_cells {
        return Err(AlignmentError::TooLarge {
            cells,
            limit: max_cells,
        });
    }

    let mut trace = vec![0u8; cells];
    let mut prev = ScoreRow::new(cols);
    let mut cur = ScoreRow::new(cols);

    for i in 0..rows {
        for j in 0..cols {
            if i == 0 && j == 0 {
                cur.diag[0] = 0;
                cur.up[0] = NEG_INF;
                cur.left[0] = NEG_INF;
                continue;
            }

            let mut bits = 0u8;

            let diag = if i > 0 && j > 0 {
                let (best, from) = pick(prev.diag[j - 1], prev.up[j - 1], prev.left[j - 1]);
                bits |= from as u8;
                shift(best, scoring.substitution(a[i - 1], b[j - 1]))?
            } else {
                NEG_INF
            };

            let up = if i > 0 {
                let (best, from) = pick(
                    shift(prev.diag[j], scoring.gap_open)?,
                    shift(prev.up[j], scoring.gap_extend)?,
                    shift(prev.left[j], scoring.gap_open)?,
                );
                bits |= (from as u8) << UP_SHIFT;
                best
            } else {
                NEG_INF
            };

            let left = if j > 0 {
                let (best, from) = pick(
                    shift(cur.diag[j - 1], scoring.gap_open)?,
                    shift(cur.up[j - 1], scoring.gap_open)?,
                    shift(cur.left[j - 1], scoring.gap_extend)?,
                );
                bits |= (from as u8) << LEFT_SHIFT;
                best
            } else {
                NEG_INF
            };

            cur.diag[j] = diag;
            cur.up[j] = up;
            cur.left[j] = left;
            trace[i * cols + j] = bits;
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    // After the final swap `prev` holds the last row
    let last = cols - 1;
    let (best, mut state) = pick(prev.diag[last], prev.up[last], prev.left[last]);

    let mut aligned_a = Vec::with_capacity(rows + cols);
    let mut aligned_b = Vec::with_capacity(rows + cols);
    let (mut i, mut j) = (a.len(), b.len());

    while i > 0 || j > 0 {
        if i == 0 {
            state = TracebackDir::Left;
        } else if j == 0 {
            state = TracebackDir::Up;
        }

        let bits = trace[i * cols + j];
        match state {
            TracebackDir::Diag => {
                aligned_a.push(a[i - 1]);
                aligned_b.push(b[j - 1]);
                state = TracebackDir::from_bits(bits);
                i -= 1;
                j -= 1;
            }
            TracebackDir::Up => {
                aligned_a.push(a[i - 1]);
                aligned_b.push(GAP);
                state = TracebackDir::from_bits(bits >> UP_SHIFT);
                i -= 1;
            }
            TracebackDir::Left => {
                aligned_a.push(GAP);
                aligned_b.push(b[j - 1]);
                state = TracebackDir::from_bits(bits >> LEFT_SHIFT);
                j -= 1;
            }
        }
    }

    aligned_a.reverse();
    aligned_b.reverse();

    Ok(Alignment {
        score: f64::from(best) / Scoring::SCALE,
        aligned_a,
        aligned_b,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn align(a: &str, b: &str) -> Alignment {
        align_global(
            a.as_bytes(),
            b.as_bytes(),
            &Scoring::default(),
            DEFAULT_MAX_CELLS,
        )
        .unwrap()
    }

    fn ungapped(row: &[u8]) -> Vec<u8> {
        row.iter().copied().filter(|&c| c != GAP).collect()
    }

    #[test]
    fn test_identical_sequences() {
        let aln = align("ACGT", "ACGT");
        assert_eq!(aln.score, 8.0);
        assert_eq!(aln.aligned_a, b"ACGT".to_vec());
        assert_eq!(aln.aligned_b, b"ACGT".to_vec());
    }

    #[test]
    fn test_single_mismatch() {
        let aln = align("ACGT", "AGGT");
        assert_eq!(aln.score, 5.0);
        assert_eq!(aln.len(), 4);
    }

    #[test]
    fn test_single_gap() {
        let aln = align("ACGTACGT", "ACGACGT");
        assert_eq!(aln.score, 12.0);
        assert_eq!(aln.aligned_a.len(), aln.aligned_b.len());
        assert_eq!(aln.aligned_b.iter().filter(|&&c| c == GAP).count(), 1);
        assert_eq!(ungapped(&aln.aligned_a), b"ACGTACGT".to_vec());
        assert_eq!(ungapped(&aln.aligned_b), b"ACGACGT".to_vec());
    }

    #[test]
    fn test_affine_gap_is_one_run() {
        let aln = align("AAAAAAAA", "AAAA");
        // 4 matches (+8), one gap of 4 (-2 - 3 * 0.5)
        assert_eq!(aln.score, 4.5);

        let gap_positions: Vec<usize> = aln
            .aligned_b
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == GAP)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(gap_positions.len(), 4);
        assert_eq!(gap_positions[3] - gap_positions[0], 3);
    }

    #[test]
    fn test_empty_inputs() {
        let aln = align("", "");
        assert_eq!(aln.score, 0.0);
        assert!(aln.is_empty());

        let aln = align("", "ACG");
        assert_eq!(aln.score, -3.0);
        assert_eq!(aln.aligned_a, b"---".to_vec());
        assert_eq!(aln.aligned_b, b"ACG".to_vec());
    }

    #[test]
    fn test_case_insensitive_scoring() {
        let aln = align("acgt", "ACGT");
        assert_eq!(aln.score, 8.0);
        assert_eq!(aln.aligned_a, b"acgt".to_vec());
    }

    #[test]
    fn test_too_large() {
        let err = align_global(b"ACGT", b"ACGT", &Scoring::default(), 10).unwrap_err();
        assert_eq!(
            err,
            AlignmentError::TooLarge {
                cells: 25,
                limit: 10
            }
        );
    }

    #[test]
    fn test_overflow_reported() {
        let scoring = Scoring {
            match_score: 1 << 30,
            ..Scoring::default()
        };
        let err = align_global(b"AAA", b"AAA", &scoring, DEFAULT_MAX_CELLS).unwrap_err();
        assert_eq!(err, AlignmentError::Overflow);
    }
}
