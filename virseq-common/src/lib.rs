//! # virseq Common Library
//!
//! Shared code for the virseq crates:
//! - Error type and result alias
//! - TOML configuration loading and path resolution
//! - Read, consensus and search-result data model

pub mod config;
pub mod error;
pub mod models;

pub use error::{Error, Result};
pub use models::{
    ConsensusRecord, ManualEdits, Orientation, Read, ReadGroup, SearchHit, SearchResult,
    SearchStatus,
};
