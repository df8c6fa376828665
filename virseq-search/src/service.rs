//! Remote homology-search service seam

use crate::error::ServiceResult;
use crate::job::QueryParameters;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One combined request for a batch
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub params: QueryParameters,
    /// Multi-FASTA payload, `>name\nsequence\n` per query
    pub fasta: String,
    pub query_count: usize,
}

impl SearchRequest {
    pub fn new<'a>(params: QueryParameters, queries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut fasta = String::new();
        let mut query_count = 0;
        for (name, sequence) in queries {
            fasta.push('>');
            fasta.push_str(name);
            fasta.push('\n');
            fasta.push_str(sequence);
            fasta.push('\n');
            query_count += 1;
        }
        Self {
            params,
            fasta,
            query_count,
        }
    }
}

/// A hit as reported by the service, best HSP only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    pub accession: String,
    pub title: String,
    /// Scientific name when the service supplies one
    pub organism: Option<String>,
    pub identities: u32,
    pub align_length: u32,
    pub evalue: f64,
    pub bit_score: f64,
    pub query_from: u32,
    pub query_to: u32,
    pub hit_from: u32,
    pub hit_to: u32,
    pub gaps: u32,
}

/// Hits for one query of a batch, in service rank order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryReport {
    pub query_title: String,
    pub query_length: Option<usize>,
    pub hits: Vec<RawHit>,
}

/// Remote search backend
///
/// Returns one report per query of the request, in payload order.
#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> ServiceResult<Vec<QueryReport>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use virseq_common::config::{SearchMode, SearchProgram};

    #[test]
    fn test_fasta_payload() {
        let params = QueryParameters::new(SearchProgram::Auto, SearchMode::All);
        let request = SearchRequest::new(params, [("S1", "ACGT"), ("S2", "GGCC")]);
        assert_eq!(request.fasta, ">S1\nACGT\n>S2\nGGCC\n");
        assert_eq!(request.query_count, 2);
    }
}
