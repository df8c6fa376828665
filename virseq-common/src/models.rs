//! Data model shared by assembly and search
//!
//! Reads arrive already decoded into base/quality arrays. Everything here is
//! plain data so the persistence side can serialize it as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Quality assigned to every base of a manually edited sequence
pub const EDITED_BASE_QUALITY: u8 = 40;

/// Strand direction a read was sequenced from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Forward,
    Reverse,
    #[default]
    Unknown,
}

impl Orientation {
    /// Parse a loose orientation label ("Forward", "F", "fwd", "R", ...)
    ///
    /// Unrecognized labels map to `Unknown` rather than failing.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "forward" | "f" | "fwd" => Orientation::Forward,
            "reverse" | "r" | "rev" => Orientation::Reverse,
            _ => Orientation::Unknown,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, Orientation::Unknown)
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Orientation::Forward => "Forward",
            Orientation::Reverse => "Reverse",
            Orientation::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

impl FromStr for Orientation {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_label(s))
    }
}

/// One sequencing trace: called bases plus per-base quality
///
/// Reads are never mutated in place; trimming and edit overrides produce new
/// values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Read {
    pub source_id: String,
    pub sequence: String,
    #[serde(default)]
    pub quality: Vec<u8>,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub is_manually_edited: bool,
}

impl Read {
    pub fn new(
        source_id: impl Into<String>,
        sequence: impl Into<String>,
        quality: Vec<u8>,
        orientation: Orientation,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            sequence: sequence.into(),
            quality,
            orientation,
            is_manually_edited: false,
        }
    }

    /// Override view for a manually edited sequence (uniform quality 40)
    pub fn with_manual_edit(&self, edited_sequence: &str) -> Self {
        Self {
            source_id: self.source_id.clone(),
            sequence: edited_sequence.to_string(),
            quality: vec![EDITED_BASE_QUALITY; edited_sequence.len()],
            orientation: self.orientation,
            is_manually_edited: true,
        }
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// Replacement sequences keyed by read source id
pub type ManualEdits = HashMap<String, String>;

/// Reads sharing one sample+target identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadGroup {
    pub key: String,
    pub reads: Vec<Read>,
}

impl ReadGroup {
    pub fn new(key: impl Into<String>, reads: Vec<Read>) -> Self {
        Self {
            key: key.into(),
            reads,
        }
    }

    pub fn read_ids(&self) -> Vec<String> {
        self.reads.iter().map(|r| r.source_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.reads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }
}

/// Finished consensus for one read group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusRecord {
    pub group_key: String,
    pub sequence: String,
    /// Merged length before primer trimming
    pub original_length: usize,
    pub trimmed_length: usize,
    pub source_read_ids: Vec<String>,
    pub file_count: usize,
    pub assembled_at: DateTime<Utc>,
}

impl ConsensusRecord {
    /// Name used when submitting this consensus for search
    pub fn name(&self) -> &str {
        &self.group_key
    }
}

/// Outcome category of one consensus search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Success,
    NoHits,
    Failed,
    Cancelled,
}

impl fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SearchStatus::Success => "success",
            SearchStatus::NoHits => "no_hits",
            SearchStatus::Failed => "failed",
            SearchStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// One ranked homology hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub rank: usize,
    pub accession: String,
    pub title: String,
    pub organism: String,
    pub query_coverage_pct: f64,
    pub identity_pct: f64,
    pub evalue: f64,
    pub bit_score: f64,
    pub identities: u32,
    pub align_length: u32,
    pub query_from: u32,
    pub query_to: u32,
    pub hit_from: u32,
    pub hit_to: u32,
    pub gaps: u32,
}

/// Search outcome for one consensus, keyed by consensus name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub name: String,
    pub query_length: usize,
    pub total_hits: usize,
    pub hits: Vec<SearchHit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub status: SearchStatus,
    pub searched_at: DateTime<Utc>,
}

impl SearchResult {
    /// Result carrying hits; status is `no_hits` when the list is empty
    pub fn with_hits(name: impl Into<String>, query_length: usize, hits: Vec<SearchHit>) -> Self {
        let status = if hits.is_empty() {
            SearchStatus::NoHits
        } else {
            SearchStatus::Success
        };
        Self {
            name: name.into(),
            query_length,
            total_hits: hits.len(),
            hits,
            error_message: None,
            status,
            searched_at: Utc::now(),
        }
    }

    pub fn failed(name: impl Into<String>, query_length: usize, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query_length,
            total_hits: 0,
            hits: Vec::new(),
            error_message: Some(message.into()),
            status: SearchStatus::Failed,
            searched_at: Utc::now(),
        }
    }

    pub fn cancelled(name: impl Into<String>, query_length: usize) -> Self {
        Self {
            name: name.into(),
            query_length,
            total_hits: 0,
            hits: Vec::new(),
            error_message: Some("Search cancelled by user".to_string()),
            status: SearchStatus::Cancelled,
            searched_at: Utc::now(),
        }
    }
}
