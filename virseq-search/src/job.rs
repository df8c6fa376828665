//! Search jobs and the parameters sent with them

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use virseq_common::config::{SearchConfig, SearchMode, SearchProgram};
use virseq_common::ConsensusRecord;

/// Organism filter applied in virus-only mode
pub const VIRUS_ENTREZ_QUERY: &str = "viruses[organism]";

/// Remote search parameters shared by every batch of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameters {
    pub program: String,
    pub database: String,
    pub megablast: bool,
    pub entrez_query: Option<String>,
    pub hitlist_size: usize,
    pub expect: f64,
}

impl QueryParameters {
    pub fn new(program: SearchProgram, mode: SearchMode) -> Self {
        let (program, database, megablast) = match program {
            SearchProgram::Auto | SearchProgram::Megablast => ("blastn", "nt", true),
            SearchProgram::Blastn => ("blastn", "nt", false),
            SearchProgram::Blastx => ("blastx", "nr", false),
        };
        let entrez_query = match mode {
            SearchMode::Viruses => Some(VIRUS_ENTREZ_QUERY.to_string()),
            SearchMode::All => None,
        };

        Self {
            program: program.to_string(),
            database: database.to_string(),
            megablast,
            entrez_query,
            hitlist_size: 10,
            expect: 10.0,
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            hitlist_size: config.hitlist_size,
            expect: config.expect,
            ..Self::new(config.program, config.mode)
        }
    }
}

/// One named sequence to search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub name: String,
    pub sequence: String,
}

impl SearchQuery {
    pub fn query_length(&self) -> usize {
        self.sequence.len()
    }
}

impl From<&ConsensusRecord> for SearchQuery {
    fn from(record: &ConsensusRecord) -> Self {
        Self {
            name: record.name().to_string(),
            sequence: record.sequence.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// A batch of consecutive records submitted as one request
#[derive(Debug, Clone)]
pub struct SearchJob {
    pub batch_id: Uuid,
    /// Index of the first query within the whole run
    pub offset: usize,
    pub queries: Vec<SearchQuery>,
    pub params: QueryParameters,
    pub status: JobStatus,
}

impl SearchJob {
    pub fn new(offset: usize, queries: Vec<SearchQuery>, params: QueryParameters) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            offset,
            queries,
            params,
            status: JobStatus::Pending,
        }
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}
