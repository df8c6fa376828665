//! Consensus assembly for one read group
//!
//! Reads are quality trimmed, the longest survivor becomes the reference, and
//! every other read is aligned against the running consensus in whichever
//! orientation scores better. Aligned columns are resolved base by base with
//! quality as the tie breaker. The merged sequence is then primer trimmed and
//! stripped of everything that is not A/C/G/T.

use crate::alignment::{align_global, Alignment, Scoring, DEFAULT_MAX_CELLS, GAP};
use crate::error::{AssemblyError, AssemblyResult};
use crate::primer_trim::{PatternTrimmer, TrimSettings, VirusType};
use crate::quality::{trim_by_quality, DEFAULT_QUALITY_THRESHOLD};
use crate::sequence::{reverse_complement, strip_non_acgt};
use chrono::Utc;
use tracing::{debug, info, warn};
use virseq_common::config::AssemblyConfig;
use virseq_common::{ConsensusRecord, ManualEdits, Read, ReadGroup};

/// Score of one orientation candidate against the running consensus
///
/// `Degraded` carries a plain positions-matched count used when alignment
/// failed. It is compared against aligned scores as-is even though the two
/// are on different scales.
#[derive(Debug, Clone, PartialEq)]
pub enum OrientationScore {
    Aligned(Alignment),
    Degraded(f64),
}

impl OrientationScore {
    pub fn value(&self) -> f64 {
        match self {
            OrientationScore::Aligned(alignment) => alignment.score,
            OrientationScore::Degraded(score) => *score,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, OrientationScore::Degraded(_))
    }
}

/// A read prepared in one orientation
struct Candidate {
    sequence: Vec<u8>,
    quality: Vec<u8>,
}

impl Candidate {
    fn forward(read: &Read) -> Self {
        Self {
            sequence: read.sequence.as_bytes().to_vec(),
            quality: read.quality.clone(),
        }
    }

    /// Reverse complement; quality is only reversed
    fn reverse(read: &Read) -> Self {
        Self {
            sequence: reverse_complement(&read.sequence).into_bytes(),
            quality: read.quality.iter().rev().copied().collect(),
        }
    }
}

/// Builds one `ConsensusRecord` per read group
#[derive(Debug, Clone)]
pub struct ConsensusBuilder {
    quality_threshold: u8,
    scoring: Scoring,
    max_cells: usize,
    trimmer: PatternTrimmer,
}

impl ConsensusBuilder {
    pub fn new(trimmer: PatternTrimmer) -> Self {
        Self {
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            scoring: Scoring::default(),
            max_cells: DEFAULT_MAX_CELLS,
            trimmer,
        }
    }

    pub fn from_config(config: &AssemblyConfig) -> Self {
        let virus_type = config
            .virus_type
            .parse::<VirusType>()
            .unwrap_or_else(|never| match never {});
        let trimmer = PatternTrimmer::new(TrimSettings::from(&config.trimming), virus_type);

        Self::new(trimmer)
            .with_quality_threshold(config.quality_threshold)
            .with_max_alignment_cells(config.max_alignment_cells)
    }

    pub fn with_quality_threshold(mut self, threshold: u8) -> Self {
        self.quality_threshold = threshold;
        self
    }

    pub fn with_max_alignment_cells(mut self, max_cells: usize) -> Self {
        self.max_cells = max_cells;
        self
    }

    pub fn with_scoring(mut self, scoring: Scoring) -> Self {
        self.scoring = scoring;
        self
    }

    /// Assemble a group into a trimmed consensus
    ///
    /// Manual edits replace the matching read's sequence (uniform quality 40)
    /// before anything else happens.
    pub fn build(&self, group: &ReadGroup, edits: &ManualEdits) -> AssemblyResult<ConsensusRecord> {
        if group.is_empty() {
            return Err(AssemblyError::EmptyGroup(group.key.clone()));
        }

        let reads: Vec<Read> = group
            .reads
            .iter()
            .map(|read| match edits.get(&read.source_id) {
                Some(edited) => {
                    debug!(read = %read.source_id, "Using manually edited sequence");
                    read.with_manual_edit(edited)
                }
                None => read.clone(),
            })
            .collect();

        // A lone read reports its full length; merged groups the merged length
        let (merged, original_length) = if let [single] = reads.as_slice() {
            let trimmed = trim_by_quality(single, self.quality_threshold);
            if trimmed.is_empty() {
                return Err(self.no_usable_reads(group));
            }
            (trimmed.sequence, single.len())
        } else {
            let merged = self.merge_reads(group, &reads)?;
            let merged = String::from_utf8_lossy(&merged).into_owned();
            let length = merged.len();
            (merged, length)
        };

        let outcome = self.trimmer.trim(&merged);
        let sequence = strip_non_acgt(&outcome.sequence);

        info!(
            group = %group.key,
            reads = reads.len(),
            merged_length = original_length,
            final_length = sequence.len(),
            primer_trimmed = outcome.was_trimmed(),
            "Consensus assembled"
        );

        Ok(ConsensusRecord {
            group_key: group.key.clone(),
            trimmed_length: sequence.len(),
            sequence,
            original_length,
            source_read_ids: group.read_ids(),
            file_count: group.len(),
            assembled_at: Utc::now(),
        })
    }

    fn no_usable_reads(&self, group: &ReadGroup) -> AssemblyError {
        AssemblyError::NoUsableReads {
            group: group.key.clone(),
            threshold: self.quality_threshold,
        }
    }

    fn merge_reads(&self, group: &ReadGroup, reads: &[Read]) -> AssemblyResult<Vec<u8>> {
        let survivors: Vec<Read> = reads
            .iter()
            .map(|read| trim_by_quality(read, self.quality_threshold))
            .filter(|read| {
                if read.is_empty() {
                    debug!(read = %read.source_id, "Read trimmed to nothing, dropped");
                }
                !read.is_empty()
            })
            .collect();

        if survivors.is_empty() {
            return Err(self.no_usable_reads(group));
        }

        // Longest survivor, first one wins ties
        let mut reference_idx = 0;
        for (idx, read) in survivors.iter().enumerate() {
            if read.len() > survivors[reference_idx].len() {
                reference_idx = idx;
            }
        }

        let reference = &survivors[reference_idx];
        debug!(
            group = %group.key,
            reference = %reference.source_id,
            length = reference.len(),
            "Selected reference read"
        );

        let mut consensus = reference.sequence.as_bytes().to_vec();
        let mut consensus_quality = reference.quality.clone();

        for (idx, read) in survivors.iter().enumerate() {
            if idx == reference_idx {
                continue;
            }

            let forward = Candidate::forward(read);
            let reverse = Candidate::reverse(read);
            let forward_score = self.score_orientation(&consensus, &forward.sequence);
            let reverse_score = self.score_orientation(&consensus, &reverse.sequence);

            let (chosen, score, label) = if reverse_score.value() > forward_score.value() {
                (reverse, reverse_score, "reverse")
            } else {
                (forward, forward_score, "forward")
            };

            debug!(
                read = %read.source_id,
                orientation = label,
                score = score.value(),
                "Chose orientation"
            );

            match score {
                OrientationScore::Aligned(alignment) => {
                    let (sequence, quality) =
                        merge_alignment(&alignment, &consensus_quality, &chosen.quality);
                    consensus = sequence;
                    consensus_quality = quality;
                }
                OrientationScore::Degraded(_) => {
                    warn!(
                        read = %read.source_id,
                        orientation = label,
                        "Alignment unavailable, appending read to consensus"
                    );
                    consensus.extend_from_slice(&chosen.sequence);
                    consensus_quality.extend_from_slice(&chosen.quality);
                }
            }
        }

        Ok(consensus)
    }

    fn score_orientation(&self, consensus: &[u8], candidate: &[u8]) -> OrientationScore {
        match align_global(consensus, candidate, &self.scoring, self.max_cells) {
            Ok(alignment) => OrientationScore::Aligned(alignment),
            Err(e) => {
                warn!(error = %e, "Alignment failed, using positions-matched score");
                OrientationScore::Degraded(matched_positions(consensus, candidate) as f64)
            }
        }
    }
}

/// Count equal bytes over the zipped prefix of two sequences
fn matched_positions(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).filter(|(x, y)| x == y).count()
}

/// Upper-case; anything outside A/C/G/T/gap becomes N
fn normalize(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        upper @ (b'A' | b'C' | b'G' | b'T' | GAP) => upper,
        _ => b'N',
    }
}

fn is_called(base: u8) -> bool {
    base != GAP && base != b'N'
}

/// Resolve alignment columns into a merged sequence and quality track
///
/// Consensus and candidate positions advance independently, only on
/// non-gap columns. Missing quality values read as 0.
fn merge_alignment(
    alignment: &Alignment,
    consensus_quality: &[u8],
    candidate_quality: &[u8],
) -> (Vec<u8>, Vec<u8>) {
    let mut sequence = Vec::with_capacity(alignment.len());
    let mut quality = Vec::with_capacity(alignment.len());
    let mut ref_pos = 0;
    let mut cand_pos = 0;

    for (ref_raw, cand_raw) in alignment.columns() {
        let r = normalize(ref_raw);
        let c = normalize(cand_raw);

        let ref_q = if r != GAP {
            consensus_quality.get(ref_pos).copied().unwrap_or(0)
        } else {
            0
        };
        let cand_q = if c != GAP {
            candidate_quality.get(cand_pos).copied().unwrap_or(0)
        } else {
            0
        };

        let chosen = match (r, c) {
            (GAP, c) if is_called(c) => Some((c, cand_q)),
            (r, GAP) if is_called(r) => Some((r, ref_q)),
            (b'N', c) if is_called(c) => Some((c, cand_q)),
            (r, b'N') if is_called(r) => Some((r, ref_q)),
            (r, c) if r == c && is_called(r) => Some((r, ref_q.max(cand_q))),
            (r, c) if is_called(r) && is_called(c) => {
                if cand_q > ref_q {
                    Some((c, cand_q))
                } else {
                    Some((r, ref_q))
                }
            }
            // Both gap or N
            _ => None,
        };

        if let Some((base, q)) = chosen {
            sequence.push(base);
            quality.push(q);
        }

        if r != GAP {
            ref_pos += 1;
        }
        if c != GAP {
            cand_pos += 1;
        }
    }

    (sequence, quality)
}

#[cfg(test)]
mod tests {
    use super::*;
    use virseq_common::Orientation;

    const SEQ: &str = "ATGGCATTACGGATCCAAGTTTGACCATGAACGTTAGGCTAACGGTACCTTGAAGCTTACAGGATTCAAGCCTGATCGATAAGCTTGGCACCATAGCAGT";

    fn builder() -> ConsensusBuilder {
        ConsensusBuilder::new(PatternTrimmer::disabled())
    }

    fn read(id: &str, seq: &str, qual: Vec<u8>) -> Read {
        Read::new(id, seq, qual, Orientation::Unknown)
    }

    fn group(reads: Vec<Read>) -> ReadGroup {
        ReadGroup::new("S1-Hanta", reads)
    }

    fn no_edits() -> ManualEdits {
        ManualEdits::new()
    }

    #[test]
    fn test_single_read_equals_quality_trim() {
        let r = read("a", "AACGTTT", vec![5, 10, 30, 40, 25, 19, 2]);
        let record = builder().build(&group(vec![r.clone()]), &no_edits()).unwrap();

        assert_eq!(record.sequence, trim_by_quality(&r, 20).sequence);
        assert_eq!(record.sequence, "CGT");
        assert_eq!(record.original_length, 7);
        assert_eq!(record.trimmed_length, 3);
        assert_eq!(record.file_count, 1);
    }

    #[test]
    fn test_empty_group_is_input_error() {
        let err = builder().build(&group(vec![]), &no_edits()).unwrap_err();
        assert_eq!(err, AssemblyError::EmptyGroup("S1-Hanta".to_string()));
    }

    #[test]
    fn test_all_reads_fail_trim() {
        let g = group(vec![
            read("a", "ACGT", vec![1, 1, 1, 1]),
            read("b", "ACGT", vec![2, 2, 2, 2]),
        ]);
        let err = builder().build(&g, &no_edits()).unwrap_err();
        assert!(matches!(err, AssemblyError::NoUsableReads { threshold: 20, .. }));

        let single = group(vec![read("a", "ACGT", vec![1, 1, 1, 1])]);
        assert!(builder().build(&single, &no_edits()).is_err());
    }

    #[test]
    fn test_reverse_complement_read_merges_cleanly() {
        let rc = reverse_complement(SEQ);
        let g = group(vec![read("a", SEQ, vec![30; 100]), read("b", &rc, vec![30; 100])]);

        let record = builder().build(&g, &no_edits()).unwrap();
        assert_eq!(record.sequence, SEQ);
        assert_eq!(record.source_read_ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_mismatch_resolved_by_quality() {
        let mut variant = SEQ.as_bytes().to_vec();
        variant[10] = if variant[10] == b'T' { b'A' } else { b'T' };
        let variant = String::from_utf8(variant).unwrap();

        let mut ref_q = vec![30; 100];
        ref_q[10] = 25;
        let mut cand_q = vec![30; 100];
        cand_q[10] = 35;

        let g = group(vec![read("a", SEQ, ref_q.clone()), read("b", &variant, cand_q)]);
        let record = builder().build(&g, &no_edits()).unwrap();
        assert_eq!(record.sequence, variant);

        // Tie on quality keeps the reference base
        let mut tied_q = vec![30; 100];
        tied_q[10] = 25;
        let g = group(vec![read("a", SEQ, ref_q), read("b", &variant, tied_q)]);
        let record = builder().build(&g, &no_edits()).unwrap();
        assert_eq!(record.sequence, SEQ);
    }

    #[test]
    fn test_ambiguous_reference_base_filled_from_candidate() {
        let mut with_n = SEQ.as_bytes().to_vec();
        with_n[5] = b'N';
        let with_n = String::from_utf8(with_n).unwrap();

        let g = group(vec![read("a", &with_n, vec![30; 100]), read("b", SEQ, vec![30; 100])]);
        let record = builder().build(&g, &no_edits()).unwrap();
        assert_eq!(record.sequence, SEQ);
    }

    #[test]
    fn test_reference_is_longest_read() {
        let short = &SEQ[..60];
        let g = group(vec![read("a", short, vec![]), read("b", SEQ, vec![])]);
        let record = builder().build(&g, &no_edits()).unwrap();
        assert_eq!(record.sequence, SEQ);
        assert_eq!(record.original_length, 100);
    }

    #[test]
    fn test_degraded_alignment_appends_read() {
        let prefix = &SEQ[..50];
        let g = group(vec![read("a", SEQ, vec![30; 100]), read("b", prefix, vec![30; 50])]);

        let record = builder()
            .with_max_alignment_cells(1)
            .build(&g, &no_edits())
            .unwrap();
        assert_eq!(record.sequence, format!("{}{}", SEQ, prefix));
        assert_eq!(record.original_length, 150);
    }

    #[test]
    fn test_orientation_score_kinds() {
        let limited = builder().with_max_alignment_cells(1);
        let degraded = limited.score_orientation(b"ACGT", b"ACGA");
        assert!(degraded.is_degraded());
        assert_eq!(degraded.value(), 3.0);

        let aligned = builder().score_orientation(b"ACGT", b"ACGT");
        assert!(!aligned.is_degraded());
        assert_eq!(aligned.value(), 8.0);
    }

    #[test]
    fn test_custom_scoring_changes_orientation_score() {
        let scoring = Scoring {
            match_score: 2,
            ..Scoring::default()
        };
        let score = builder()
            .with_scoring(scoring)
            .score_orientation(b"ACGT", b"ACGT");
        assert_eq!(score.value(), 4.0);
    }

    #[test]
    fn test_manual_edit_overrides_read() {
        let g = group(vec![read("a", "ACGT", vec![1, 1, 1, 1])]);
        let mut edits = ManualEdits::new();
        edits.insert("a".to_string(), "ACGTTGCA".to_string());

        let record = builder().build(&g, &edits).unwrap();
        assert_eq!(record.sequence, "ACGTTGCA");
        assert_eq!(record.original_length, 8);
    }

    #[test]
    fn test_ambiguity_codes_deleted_from_output() {
        let g = group(vec![read("a", "ACNGTR", vec![30; 6])]);
        let record = builder().build(&g, &no_edits()).unwrap();
        assert_eq!(record.sequence, "ACGT");
        assert_eq!(record.original_length, 6);
        assert_eq!(record.trimmed_length, 4);
    }

    #[test]
    fn test_primer_trim_applied_after_merge() {
        let settings = TrimSettings {
            enabled: true,
            ..TrimSettings::default()
        };
        let hanta = ConsensusBuilder::new(PatternTrimmer::new(settings, VirusType::Hanta));
        let g = group(vec![read("a", "GGTGGTCACCAAACATCATTCGG", vec![30; 23])]);

        let record = hanta.build(&g, &no_edits()).unwrap();
        assert_eq!(record.sequence, "TGGTCACCAAACATCATTC");
        assert_eq!(record.original_length, 23);
        assert_eq!(record.trimmed_length, 19);
    }

    #[test]
    fn test_trimmed_length_never_exceeds_original() {
        let rc = reverse_complement(SEQ);
        let groups = vec![
            group(vec![read("a", "ACNNGT", vec![])]),
            group(vec![read("a", SEQ, vec![30; 100]), read("b", &rc, vec![])]),
            group(vec![read("a", &SEQ[..30], vec![]), read("b", &SEQ[70..], vec![])]),
        ];
        for g in groups {
            let record = builder().build(&g, &no_edits()).unwrap();
            assert!(record.trimmed_length <= record.original_length);
            assert_eq!(record.trimmed_length, record.sequence.len());
        }
    }

    #[test]
    fn test_merge_ladder_columns() {
        let alignment = Alignment {
            score: 0.0,
            aligned_a: b"A-NCGr-".to_vec(),
            aligned_b: b"-CTNGT-".to_vec(),
        };
        let (sequence, quality) =
            merge_alignment(&alignment, &[10, 11, 12, 13, 14], &[20, 21, 22, 23, 5]);
        // A|- ref, -|C cand, N|T cand, C|N ref, G|G max, R->N|T cand, -|- skipped
        assert_eq!(sequence, b"ACTCGT".to_vec());
        assert_eq!(quality, vec![10, 20, 21, 12, 23, 5]);
    }
}
