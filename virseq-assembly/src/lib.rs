//! Sanger read consensus assembly
//!
//! Quality trimming, F/R pair checks, iterative pairwise merging and
//! primer trimming for groups of reads covering one sample+target.

pub mod alignment;
pub mod complementarity;
pub mod consensus;
pub mod error;
pub mod intake;
pub mod naming;
pub mod primer_trim;
pub mod quality;
pub mod sequence;
pub mod session;

pub use crate::consensus::ConsensusBuilder;
pub use crate::error::{AssemblyError, AssemblyResult};
pub use crate::intake::{group_reads, IntakeFile, IntakeReport, RawRead};
pub use crate::primer_trim::{PatternTrimmer, TrimSettings, VirusType};
pub use crate::quality::QualityLabel;
pub use crate::session::{AssemblyReport, AssemblySession, GroupFailure};
