//! Forward/reverse pair labelling check
//!
//! A correctly labelled F/R pair should look alike only after one read is
//! reverse complemented. If the two reads instead agree best as-is, the
//! orientation labels were probably swapped at upload.

use crate::sequence::reverse_complement;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use virseq_common::{Orientation, ReadGroup};

/// Number of leading bases compared
pub const SAMPLE_WINDOW: usize = 100;

/// Complement agreement needed for a confident F/R pair
const MIN_COMPLEMENT_SCORE: f64 = 0.7;

/// How much better the complement must score than the direct comparison
const COMPLEMENT_MARGIN: f64 = 1.5;

/// Advisory outcome for a two-read F/R group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapAssessment {
    pub read_ids: (String, String),
    pub complementarity_score: f64,
    pub direct_score: f64,
    pub likely_swapped: bool,
    pub advisory: String,
}

/// Raw agreement scores between two sequences
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairScores {
    pub complement: f64,
    pub direct: f64,
    pub is_correct_pair: bool,
}

/// Score two reads directly and as reverse complements over the sample window
///
/// Scores are match counts divided by the window size, not by the compared
/// length, so short reads score low on both measures.
pub fn score_pair(seq1: &str, seq2: &str) -> PairScores {
    let seq1 = seq1.to_ascii_uppercase();
    let seq2 = seq2.to_ascii_uppercase();
    let seq2_rc = reverse_complement(&seq2);

    let matches = |other: &str| {
        seq1.bytes()
            .take(SAMPLE_WINDOW)
            .zip(other.bytes().take(SAMPLE_WINDOW))
            .filter(|(a, b)| a == b)
            .count()
    };

    let direct = matches(&seq2) as f64 / SAMPLE_WINDOW as f64;
    let complement = matches(&seq2_rc) as f64 / SAMPLE_WINDOW as f64;
    let is_correct_pair =
        complement > MIN_COMPLEMENT_SCORE && complement > direct * COMPLEMENT_MARGIN;

    PairScores {
        complement,
        direct,
        is_correct_pair,
    }
}

/// Check a group for swapped F/R labels
///
/// Only groups of exactly two reads labelled {Forward, Reverse} are assessed.
/// Ambiguous results (neither a clear pair nor a clear swap) yield `None`.
pub fn assess_group(group: &ReadGroup) -> Option<SwapAssessment> {
    let [first, second] = group.reads.as_slice() else {
        return None;
    };

    let labelled_pair = matches!(
        (first.orientation, second.orientation),
        (Orientation::Forward, Orientation::Reverse) | (Orientation::Reverse, Orientation::Forward)
    );
    if !labelled_pair {
        return None;
    }

    let scores = score_pair(&first.sequence, &second.sequence);
    let read_ids = (first.source_id.clone(), second.source_id.clone());

    if !scores.is_correct_pair && scores.direct > scores.complement {
        let advisory = format!(
            "LIKELY SWAPPED! Forward and Reverse sequences match directly ({:.1}%) instead of as complements ({:.1}%). Check labeling!",
            scores.direct * 100.0,
            scores.complement * 100.0
        );
        warn!(group = %group.key, "{}", advisory);
        Some(SwapAssessment {
            read_ids,
            complementarity_score: scores.complement,
            direct_score: scores.direct,
            likely_swapped: true,
            advisory,
        })
    } else if scores.is_correct_pair {
        let advisory = format!(
            "Correct F/R pair (complementarity: {:.1}%)",
            scores.complement * 100.0
        );
        info!(group = %group.key, "{}", advisory);
        Some(SwapAssessment {
            read_ids,
            complementarity_score: scores.complement,
            direct_score: scores.direct,
            likely_swapped: false,
            advisory,
        })
    } else {
        None
    }
}
