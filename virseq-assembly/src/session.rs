//! One assembly pass over every read group of an upload
//!
//! Groups are processed sequentially. A group that cannot be assembled is
//! reported and skipped; its siblings are unaffected.

use crate::complementarity::{assess_group, SwapAssessment};
use crate::consensus::ConsensusBuilder;
use crate::quality::{filter_by_quality_labels, QualityLabel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, info, warn};
use virseq_common::{ConsensusRecord, ManualEdits, ReadGroup};

/// A group left out of the consensus set, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupFailure {
    pub group: String,
    pub reason: String,
}

/// Outcome of an assembly session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblyReport {
    pub records: Vec<ConsensusRecord>,
    pub assessments: Vec<SwapAssessment>,
    /// Groups whose reads all failed review
    pub skipped: Vec<GroupFailure>,
    /// Groups whose assembly returned an error
    pub failed: Vec<GroupFailure>,
}

impl AssemblyReport {
    /// User-facing one-line summary
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.skipped.is_empty() {
            parts.push(format!("{} skipped (poor quality)", self.skipped.len()));
        }
        if !self.failed.is_empty() {
            parts.push(format!("{} failed (assembly error)", self.failed.len()));
        }

        if self.records.is_empty() && !parts.is_empty() {
            return format!(
                "All groups failed: {}. No consensus generated.",
                parts.join(" + ")
            );
        }

        let mut message = format!("Generated {} consensus sequence(s)", self.records.len());
        if !parts.is_empty() {
            message.push_str(&format!(" ({})", parts.join(" + ")));
        }
        message
    }
}

/// Runs the consensus builder across all groups of a session
pub struct AssemblySession {
    builder: ConsensusBuilder,
}

impl AssemblySession {
    pub fn new(builder: ConsensusBuilder) -> Self {
        Self { builder }
    }

    pub fn run(
        &self,
        groups: &[ReadGroup],
        edits: &ManualEdits,
        labels: &HashMap<String, QualityLabel>,
    ) -> AssemblyReport {
        let mut report = AssemblyReport::default();
        info!(groups = groups.len(), "Starting assembly session");

        for group in groups {
            let Some(filtered) = filter_by_quality_labels(group, labels) else {
                warn!(group = %group.key, reads = group.len(), "All reads failed quality review, skipping group");
                report.skipped.push(GroupFailure {
                    group: group.key.clone(),
                    reason: "all reads failed quality review".to_string(),
                });
                continue;
            };

            if let Some(assessment) = assess_group(&filtered) {
                report.assessments.push(assessment);
            }

            match self.builder.build(&filtered, edits) {
                Ok(record) => report.records.push(record),
                Err(e) => {
                    error!(group = %group.key, error = %e, "Assembly failed");
                    report.failed.push(GroupFailure {
                        group: group.key.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            records = report.records.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Assembly session complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primer_trim::PatternTrimmer;
    use virseq_common::{Orientation, Read};

    fn session() -> AssemblySession {
        AssemblySession::new(ConsensusBuilder::new(PatternTrimmer::disabled()))
    }

    fn group(key: &str, quality: u8) -> ReadGroup {
        ReadGroup::new(
            key,
            vec![Read::new(
                format!("{}-F.ab1", key),
                "ACGTACGT",
                vec![quality; 8],
                Orientation::Forward,
            )],
        )
    }

    #[test]
    fn test_failed_group_does_not_stop_siblings() {
        let groups = vec![group("S1", 30), group("S2", 5), group("S3", 30)];
        let report = session().run(&groups, &ManualEdits::new(), &HashMap::new());

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].group, "S2");
        assert!(report.failed[0].reason.contains("no read passed quality trimming"));
        assert_eq!(
            report.summary(),
            "Generated 2 consensus sequence(s) (1 failed (assembly error))"
        );
    }

    #[test]
    fn test_label_filter_skips_group() {
        let groups = vec![group("S1", 30), group("S2", 30)];
        let mut labels = HashMap::new();
        labels.insert("S1-F.ab1".to_string(), QualityLabel::Good);
        labels.insert("S2-F.ab1".to_string(), QualityLabel::Poor);

        let report = session().run(&groups, &ManualEdits::new(), &labels);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.skipped[0].group, "S2");
        assert_eq!(
            report.summary(),
            "Generated 1 consensus sequence(s) (1 skipped (poor quality))"
        );
    }

    #[test]
    fn test_all_failed_summary() {
        let groups = vec![group("S1", 1)];
        let report = session().run(&groups, &ManualEdits::new(), &HashMap::new());
        assert_eq!(
            report.summary(),
            "All groups failed: 1 failed (assembly error). No consensus generated."
        );
    }
}
