//! Primer-bounded trimming of merged consensus sequences
//!
//! The region of interest lies between a start primer and an end primer.
//! Primers may carry IUPAC ambiguity codes and are matched case-insensitively.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};
use virseq_common::config::TrimmingConfig;

/// Virus family selecting a builtin primer pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VirusType {
    Hanta,
    Corona,
    Paramyxo,
    Flavi,
    /// Anything without builtin primers
    Other(String),
}

impl VirusType {
    /// Builtin (start, end) primers, if any
    pub fn builtin_primers(&self) -> Option<(&'static str, &'static str)> {
        match self {
            VirusType::Hanta => Some(("TGGTCACC", "CATCATTC")),
            VirusType::Corona => Some(("AAGTGTGA", "ATGATTCT")),
            VirusType::Paramyxo => Some(("GGAATAAT", "ATGACCT")),
            VirusType::Flavi => Some(("AGAAGTTG", "CTCTCCAT")),
            VirusType::Other(_) => None,
        }
    }
}

impl FromStr for VirusType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let virus = match s.trim().to_ascii_lowercase().as_str() {
            "hanta" => VirusType::Hanta,
            "corona" => VirusType::Corona,
            "paramyxo" => VirusType::Paramyxo,
            "flavi" => VirusType::Flavi,
            _ => VirusType::Other(s.trim().to_string()),
        };
        Ok(virus)
    }
}

impl fmt::Display for VirusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VirusType::Hanta => f.write_str("Hanta"),
            VirusType::Corona => f.write_str("Corona"),
            VirusType::Paramyxo => f.write_str("Paramyxo"),
            VirusType::Flavi => f.write_str("Flavi"),
            VirusType::Other(name) => f.write_str(name),
        }
    }
}

/// Trim-configuration as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrimSettings {
    pub enabled: bool,
    pub custom_start: Option<String>,
    pub custom_end: Option<String>,
}

impl From<&TrimmingConfig> for TrimSettings {
    fn from(config: &TrimmingConfig) -> Self {
        let non_blank = |p: &Option<String>| p.clone().filter(|s| !s.trim().is_empty());
        Self {
            enabled: config.enabled,
            custom_start: non_blank(&config.custom_start),
            custom_end: non_blank(&config.custom_end),
        }
    }
}

/// What happened to a sequence passed through the trimmer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrimStatus {
    /// Kept `sequence[start..end]`, primers included
    Trimmed { start: usize, end: usize },
    Disabled,
    /// Virus type has no builtin primers and none were supplied
    NoPrimers,
    /// Custom primers were supplied but one side is missing
    MissingPrimer,
    /// Primers not found in order
    NotFound,
    /// A primer could not be turned into a pattern
    PatternError(String),
}

/// Trimmed sequence plus how it was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimOutcome {
    pub sequence: String,
    pub status: TrimStatus,
}

impl TrimOutcome {
    fn unchanged(sequence: &str, status: TrimStatus) -> Self {
        Self {
            sequence: sequence.to_string(),
            status,
        }
    }

    pub fn was_trimmed(&self) -> bool {
        matches!(self.status, TrimStatus::Trimmed { .. })
    }
}

/// Expand a primer with IUPAC codes into an equivalent regex
pub fn iupac_to_regex(primer: &str) -> String {
    let mut pattern = String::with_capacity(primer.len() * 4);
    for base in primer.to_ascii_uppercase().chars() {
        let class = match base {
            'R' => "[AG]",
            'Y' => "[CT]",
            'M' => "[AC]",
            'K' => "[GT]",
            'S' => "[GC]",
            'W' => "[AT]",
            'H' => "[ACT]",
            'B' => "[CGT]",
            'V' => "[ACG]",
            'D' => "[AGT]",
            'N' => "[ACGT]",
            other => {
                pattern.push_str(&regex::escape(&other.to_string()));
                continue;
            }
        };
        pattern.push_str(class);
    }
    pattern
}

fn compile(primer: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&iupac_to_regex(primer))
        .case_insensitive(true)
        .build()
}

/// Trims merged sequences to the primer-bounded region
#[derive(Debug, Clone)]
pub struct PatternTrimmer {
    settings: TrimSettings,
    virus_type: VirusType,
}

impl PatternTrimmer {
    pub fn new(settings: TrimSettings, virus_type: VirusType) -> Self {
        Self {
            settings,
            virus_type,
        }
    }

    /// Trimmer that never changes its input
    pub fn disabled() -> Self {
        Self::new(TrimSettings::default(), VirusType::Other("Other".to_string()))
    }

    /// Resolve the active primer pair; custom primers win when either is set
    fn primers(&self) -> Result<(String, String), TrimStatus> {
        let custom_start = self.settings.custom_start.as_deref();
        let custom_end = self.settings.custom_end.as_deref();

        if custom_start.is_some() || custom_end.is_some() {
            return match (custom_start, custom_end) {
                (Some(start), Some(end)) if !start.is_empty() && !end.is_empty() => {
                    Ok((start.to_string(), end.to_string()))
                }
                _ => Err(TrimStatus::MissingPrimer),
            };
        }

        self.virus_type
            .builtin_primers()
            .map(|(start, end)| (start.to_string(), end.to_string()))
            .ok_or(TrimStatus::NoPrimers)
    }

    /// Trim `sequence` to the span from the first start-primer match to the
    /// last end-primer match
    pub fn trim(&self, sequence: &str) -> TrimOutcome {
        if !self.settings.enabled {
            debug!("Primer trimming disabled");
            return TrimOutcome::unchanged(sequence, TrimStatus::Disabled);
        }

        let (start_primer, end_primer) = match self.primers() {
            Ok(pair) => pair,
            Err(TrimStatus::MissingPrimer) => {
                warn!(
                    start = ?self.settings.custom_start,
                    end = ?self.settings.custom_end,
                    "Missing start or end primer, skipping trimming"
                );
                return TrimOutcome::unchanged(sequence, TrimStatus::MissingPrimer);
            }
            Err(status) => {
                debug!(virus_type = %self.virus_type, "No builtin primers, skipping trimming");
                return TrimOutcome::unchanged(sequence, status);
            }
        };

        let (start_re, end_re) = match (compile(&start_primer), compile(&end_primer)) {
            (Ok(start_re), Ok(end_re)) => (start_re, end_re),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Primer pattern rejected, skipping trimming");
                return TrimOutcome::unchanged(sequence, TrimStatus::PatternError(e.to_string()));
            }
        };

        let start_match = start_re.find(sequence);
        let end_match = end_re.find_iter(sequence).last();

        match (start_match, end_match) {
            (Some(s), Some(e)) if s.start() < e.start() => {
                info!(
                    virus_type = %self.virus_type,
                    before = sequence.len(),
                    after = e.end() - s.start(),
                    start = s.start(),
                    end = e.end(),
                    "Trimmed by primer pattern"
                );
                TrimOutcome {
                    sequence: sequence[s.start()..e.end()].to_string(),
                    status: TrimStatus::Trimmed {
                        start: s.start(),
                        end: e.end(),
                    },
                }
            }
            (s, e) => {
                warn!(
                    start_primer = %start_primer,
                    end_primer = %end_primer,
                    start_found = s.is_some(),
                    end_found = e.is_some(),
                    "Trimming primers not found, keeping untrimmed sequence"
                );
                TrimOutcome::unchanged(sequence, TrimStatus::NotFound)
            }
        }
    }
}
