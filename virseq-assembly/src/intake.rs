//! Read intake: decoded reads in, ordered read groups out

use crate::naming::{filename_orientation, group_key};
use crate::quality::{resolve_orientation, QualityLabel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};
use virseq_common::config::NamingConfig;
use virseq_common::{ManualEdits, Orientation, Read, ReadGroup, Result};

/// One decoded trace as handed over by the read source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRead {
    /// Original file name; doubles as the read's source id
    pub filename: String,
    pub sequence: String,
    #[serde(default)]
    pub quality: Vec<u8>,
    /// Orientation label from instrument metadata ("Forward", "R", ...)
    #[serde(default)]
    pub orientation: Option<String>,
    /// Explicit group key; skips file-name parsing when present
    #[serde(default)]
    pub group: Option<String>,
}

/// Input document for an assembly session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntakeFile {
    pub reads: Vec<RawRead>,
    #[serde(default)]
    pub edits: ManualEdits,
    #[serde(default)]
    pub quality_labels: HashMap<String, QualityLabel>,
}

impl IntakeFile {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

/// Grouped reads plus direction-mismatch advisories
#[derive(Debug, Clone, Default)]
pub struct IntakeReport {
    pub groups: Vec<ReadGroup>,
    pub advisories: Vec<String>,
}

/// Resolve group key and orientation per read and gather groups
///
/// Groups keep first-seen order, reads keep input order within a group.
pub fn group_reads(raw_reads: &[RawRead], config: &NamingConfig) -> IntakeReport {
    let mut report = IntakeReport::default();
    let mut index: HashMap<String, usize> = HashMap::new();

    for raw in raw_reads {
        let key = raw
            .group
            .clone()
            .filter(|g| !g.trim().is_empty())
            .unwrap_or_else(|| group_key(&raw.filename, config));

        let resolution = resolve_orientation(
            filename_orientation(&raw.filename, config),
            raw.orientation.as_deref().map(Orientation::from_label),
        );
        if let Some(warning) = resolution.mismatch_warning {
            report.advisories.push(format!("{}: {}", raw.filename, warning));
        }

        debug!(
            file = %raw.filename,
            group = %key,
            orientation = %resolution.orientation,
            "Read assigned"
        );

        let read = Read::new(
            raw.filename.clone(),
            raw.sequence.clone(),
            raw.quality.clone(),
            resolution.orientation,
        );

        match index.get(&key) {
            Some(&slot) => report.groups[slot].reads.push(read),
            None => {
                index.insert(key.clone(), report.groups.len());
                report.groups.push(ReadGroup::new(key, vec![read]));
            }
        }
    }

    info!(
        reads = raw_reads.len(),
        groups = report.groups.len(),
        advisories = report.advisories.len(),
        "Reads grouped"
    );
    report
}
