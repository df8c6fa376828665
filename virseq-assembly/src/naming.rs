//! Read file-name conventions: group keys and F/R markers
//!
//! Instruments emit names like `CANB_TISL24_445-FHanta_A01_01_RapidSeq50.ab1`.
//! The group key drops the extension, the instrument suffix and the F/R
//! marker so that both directions of one sample+target land in one group.

use once_cell::sync::Lazy;
use regex::{Captures, Regex, RegexBuilder};
use serde::Serialize;
use std::path::Path;
use tracing::warn;
use virseq_common::config::{NamingConfig, PatternStyle};
use virseq_common::Orientation;

fn ci(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("static naming regex")
}

static TRAILING_SEPARATORS: Lazy<Regex> = Lazy::new(|| ci(r"[_-]+$"));

// Group-key marker removal
static STANDARD_MARKER: Lazy<Regex> = Lazy::new(|| ci(r"[_-][FR]([_-]|$)"));
static SUFFIX_MARKER: Lazy<Regex> = Lazy::new(|| ci(r"[_-][FR]$"));
static EMBEDDED_MARKER: Lazy<Regex> = Lazy::new(|| ci(r"([_-])[FR]([a-z]+)"));
static BARE_MARKER: Lazy<Regex> = Lazy::new(|| ci(r"[_-][FR]([^a-z]|$)"));

// Orientation hints, matched against the lower-cased name
static FORWARD_SEPARATED: Lazy<Regex> = Lazy::new(|| ci(r"[_-]f"));
static REVERSE_SEPARATED: Lazy<Regex> = Lazy::new(|| ci(r"[_-]r"));
static FORWARD_WORD: Lazy<Regex> = Lazy::new(|| ci(r"\bforward\b|\bfwd\b"));
static REVERSE_WORD: Lazy<Regex> = Lazy::new(|| ci(r"\breverse\b|\brev\b"));
static FORWARD_EMBEDDED: Lazy<Regex> = Lazy::new(|| ci(r"[_-]f[a-z]+"));
static REVERSE_EMBEDDED: Lazy<Regex> = Lazy::new(|| ci(r"[_-]r[a-z]+"));

struct StyleProbe {
    style: PatternStyle,
    description: &'static str,
    forward: Regex,
    reverse: Regex,
}

// Checked in order; the first best score wins
static STYLE_PROBES: Lazy<Vec<StyleProbe>> = Lazy::new(|| {
    vec![
        StyleProbe {
            style: PatternStyle::VirusSuffix,
            description: "Virus name before F/R (e.g., -hanta_F/-hanta_R)",
            forward: ci(r"[_-][a-z]+[_-]F([^a-z]|$)"),
            reverse: ci(r"[_-][a-z]+[_-]R([^a-z]|$)"),
        },
        StyleProbe {
            style: PatternStyle::VirusEmbedded,
            description: "With virus name (e.g., -FHanta/-RHanta)",
            forward: ci(r"[_-]F[a-z]+"),
            reverse: ci(r"[_-]R[a-z]+"),
        },
        StyleProbe {
            style: PatternStyle::Standard,
            description: "Standard with dash (e.g., -F/-R)",
            forward: ci(r"[_-]F([^a-z]|$)"),
            reverse: ci(r"[_-]R([^a-z]|$)"),
        },
        StyleProbe {
            style: PatternStyle::Standard,
            description: "Standard with underscore (e.g., _F/_R)",
            forward: ci(r"_F([^a-z]|$)"),
            reverse: ci(r"_R([^a-z]|$)"),
        },
    ]
});

/// File name without directory or extension
fn base_name(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string())
}

fn strip_trailing_separators(name: &str) -> String {
    TRAILING_SEPARATORS.replace(name, "").into_owned()
}

/// Remove `sep + letter` markers; a following virus name keeps its separator
///
/// `-FHanta` becomes `-Hanta`, a bare `-F` disappears.
fn remove_custom_marker(name: &str, separator: char, letter: &str) -> String {
    let pattern = format!(
        "{}{}([a-z]*)",
        regex::escape(&separator.to_string()),
        regex::escape(letter)
    );
    let re = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re,
        Err(e) => {
            warn!(marker = %letter, error = %e, "Invalid custom marker, left in place");
            return name.to_string();
        }
    };
    re.replace_all(name, |caps: &Captures| match caps.get(1) {
        Some(virus) if !virus.as_str().is_empty() => format!("{}{}", separator, virus.as_str()),
        _ => String::new(),
    })
    .into_owned()
}

/// Derive the sample+target group key from a read file name
pub fn group_key(filename: &str, config: &NamingConfig) -> String {
    let mut name = base_name(filename);

    if let Some(pattern) = config.suffix_pattern.as_deref().filter(|p| !p.is_empty()) {
        match Regex::new(pattern) {
            Ok(re) => name = re.replace(&name, "").into_owned(),
            Err(e) => warn!(pattern, error = %e, "Invalid suffix pattern ignored"),
        }
    }

    let name = match config.style {
        PatternStyle::Standard => STANDARD_MARKER.replace_all(&name, "${1}").into_owned(),
        PatternStyle::VirusSuffix => SUFFIX_MARKER.replace(&name, "").into_owned(),
        PatternStyle::VirusEmbedded => {
            let name = EMBEDDED_MARKER.replace_all(&name, "${1}${2}");
            BARE_MARKER.replace_all(&name, "${1}").into_owned()
        }
        PatternStyle::Custom => {
            let fwd = config.forward_marker.as_str();
            let rev = config.reverse_marker.as_str();
            let separated = |m: &str| m.starts_with(['-', '_']);

            if separated(fwd) && separated(rev) {
                let separator = fwd.chars().next().unwrap_or('-');
                let fwd_letter = if fwd.len() > 1 { &fwd[1..] } else { "F" };
                let rev_letter = if rev.len() > 1 { &rev[1..] } else { "R" };
                let name = remove_custom_marker(&name, separator, fwd_letter);
                remove_custom_marker(&name, separator, rev_letter)
            } else {
                name.replace(fwd, "").replace(rev, "")
            }
        }
    };

    strip_trailing_separators(&name)
}

/// Orientation implied by a read file name, if any
pub fn filename_orientation(filename: &str, config: &NamingConfig) -> Option<Orientation> {
    let lower = filename.to_lowercase();

    match config.style {
        PatternStyle::Custom => {
            if lower.contains(&config.forward_marker.to_lowercase()) {
                Some(Orientation::Forward)
            } else if lower.contains(&config.reverse_marker.to_lowercase()) {
                Some(Orientation::Reverse)
            } else {
                None
            }
        }
        PatternStyle::VirusEmbedded => {
            if FORWARD_EMBEDDED.is_match(&lower) {
                Some(Orientation::Forward)
            } else if REVERSE_EMBEDDED.is_match(&lower) {
                Some(Orientation::Reverse)
            } else {
                None
            }
        }
        PatternStyle::Standard | PatternStyle::VirusSuffix => {
            if FORWARD_SEPARATED.is_match(&lower) || FORWARD_WORD.is_match(&lower) {
                Some(Orientation::Forward)
            } else if REVERSE_SEPARATED.is_match(&lower) || REVERSE_WORD.is_match(&lower) {
                Some(Orientation::Reverse)
            } else {
                None
            }
        }
    }
}

/// Naming convention guessed from a batch of file names
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternDetection {
    pub detected: bool,
    pub style: PatternStyle,
    pub description: String,
    pub forward_count: usize,
    pub reverse_count: usize,
    pub total_files: usize,
}

/// Guess the F/R naming convention used by `filenames`
pub fn detect_style<S: AsRef<str>>(filenames: &[S]) -> PatternDetection {
    let mut best: Option<(&StyleProbe, usize, usize)> = None;

    for probe in STYLE_PROBES.iter() {
        let forward = filenames
            .iter()
            .filter(|f| probe.forward.is_match(f.as_ref()))
            .count();
        let reverse = filenames
            .iter()
            .filter(|f| probe.reverse.is_match(f.as_ref()))
            .count();

        let better = match best {
            Some((_, f, r)) => forward + reverse > f + r,
            None => true,
        };
        if better {
            best = Some((probe, forward, reverse));
        }
    }

    match best {
        Some((probe, forward, reverse)) if forward + reverse > 0 => PatternDetection {
            detected: true,
            style: probe.style,
            description: probe.description.to_string(),
            forward_count: forward,
            reverse_count: reverse,
            total_files: filenames.len(),
        },
        _ => PatternDetection {
            detected: false,
            style: PatternStyle::Standard,
            description: "Standard (default)".to_string(),
            forward_count: 0,
            reverse_count: 0,
            total_files: filenames.len(),
        },
    }
}
