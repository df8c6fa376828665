//! Read preprocessing: quality end-trimming and orientation resolution

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};
use virseq_common::{Orientation, Read, ReadGroup};

/// Default Phred threshold for end trimming
pub const DEFAULT_QUALITY_THRESHOLD: u8 = 20;

/// Trim low-quality ends from a read
///
/// Keeps the inclusive span between the first and last base whose quality
/// reaches `threshold`. A read without usable quality data (empty array, or
/// one whose length disagrees with the sequence) is returned unchanged. When
/// no base reaches the threshold the result is an empty read.
pub fn trim_by_quality(read: &Read, threshold: u8) -> Read {
    if read.quality.is_empty() || read.quality.len() != read.sequence.len() {
        return read.clone();
    }

    let first = read.quality.iter().position(|&q| q >= threshold);
    let last = read.quality.iter().rposition(|&q| q >= threshold);

    let (start, end) = match (first, last) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            debug!(
                read = %read.source_id,
                threshold,
                "No base reaches quality threshold"
            );
            return Read {
                sequence: String::new(),
                quality: Vec::new(),
                ..read.clone()
            };
        }
    };

    match read.sequence.get(start..=end) {
        Some(sequence) => Read {
            sequence: sequence.to_string(),
            quality: read.quality[start..=end].to_vec(),
            ..read.clone()
        },
        // Non-ASCII sequence text; byte offsets do not line up with bases
        None => read.clone(),
    }
}

/// Orientation chosen for a read plus any disagreement between sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrientationResolution {
    pub orientation: Orientation,
    pub mismatch_warning: Option<String>,
}

/// Combine the filename-derived and metadata-derived orientation hints
///
/// Metadata wins over the filename. Disagreement is an advisory only.
pub fn resolve_orientation(
    filename_hint: Option<Orientation>,
    metadata_hint: Option<Orientation>,
) -> OrientationResolution {
    let filename_hint = filename_hint.filter(|o| o.is_known());
    let metadata_hint = metadata_hint.filter(|o| o.is_known());

    let mismatch_warning = match (filename_hint, metadata_hint) {
        (Some(from_name), Some(from_data)) if from_name != from_data => {
            let warning = format!(
                "Filename suggests {} but data shows {}",
                from_name, from_data
            );
            warn!("{}", warning);
            Some(warning)
        }
        _ => None,
    };

    OrientationResolution {
        orientation: metadata_hint
            .or(filename_hint)
            .unwrap_or(Orientation::Unknown),
        mismatch_warning,
    }
}

/// Technician's review label for a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityLabel {
    Excellent,
    Good,
    Acceptable,
    #[serde(rename = "Needs Work", alias = "NeedsWork")]
    NeedsWork,
    Poor,
    Unknown,
}

impl QualityLabel {
    pub fn is_passing(self) -> bool {
        matches!(
            self,
            QualityLabel::Excellent | QualityLabel::Good | QualityLabel::Acceptable
        )
    }
}

/// Drop reads that failed review
///
/// With no labels at all the group is returned as-is. Otherwise only passing
/// reads are kept (unlabelled reads count as failing); `None` means nothing
/// in the group passed and the whole group should be skipped.
pub fn filter_by_quality_labels(
    group: &ReadGroup,
    labels: &HashMap<String, QualityLabel>,
) -> Option<ReadGroup> {
    if labels.is_empty() {
        return Some(group.clone());
    }

    let passing: Vec<Read> = group
        .reads
        .iter()
        .filter(|r| {
            labels
                .get(&r.source_id)
                .copied()
                .unwrap_or(QualityLabel::Unknown)
                .is_passing()
        })
        .cloned()
        .collect();

    if passing.is_empty() {
        return None;
    }

    if passing.len() < group.reads.len() {
        debug!(
            group = %group.key,
            kept = passing.len(),
            total = group.reads.len(),
            "Filtering reads by review label"
        );
    }

    Some(ReadGroup::new(group.key.clone(), passing))
}
