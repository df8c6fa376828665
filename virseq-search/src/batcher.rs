//! Partitioning of finished consensus records into search batches

use crate::job::{QueryParameters, SearchJob, SearchQuery};
use virseq_common::ConsensusRecord;

/// Default number of records per remote request
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Split records into consecutive jobs of at most `batch_size` queries
///
/// A batch size of 0 is treated as 1.
pub fn make_batches(
    records: &[ConsensusRecord],
    batch_size: usize,
    params: &QueryParameters,
) -> Vec<SearchJob> {
    let size = batch_size.max(1);
    records
        .chunks(size)
        .enumerate()
        .map(|(i, chunk)| {
            SearchJob::new(
                i * size,
                chunk.iter().map(SearchQuery::from).collect(),
                params.clone(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use virseq_common::config::{SearchMode, SearchProgram};

    fn records(n: usize) -> Vec<ConsensusRecord> {
        (0..n)
            .map(|i| ConsensusRecord {
                group_key: format!("S{}", i),
                sequence: "ACGT".to_string(),
                original_length: 4,
                trimmed_length: 4,
                source_read_ids: vec![],
                file_count: 1,
                assembled_at: Utc::now(),
            })
            .collect()
    }

    fn params() -> QueryParameters {
        QueryParameters::new(SearchProgram::Auto, SearchMode::Viruses)
    }

    #[test]
    fn test_twelve_records_make_three_batches() {
        let jobs = make_batches(&records(12), DEFAULT_BATCH_SIZE, &params());
        let sizes: Vec<usize> = jobs.iter().map(|j| j.len()).collect();
        assert_eq!(sizes, vec![5, 5, 2]);

        let offsets: Vec<usize> = jobs.iter().map(|j| j.offset).collect();
        assert_eq!(offsets, vec![0, 5, 10]);
        assert_eq!(jobs[2].queries[1].name, "S11");
    }

    #[test]
    fn test_sizes_sum_to_input() {
        for n in [0, 1, 4, 5, 6, 23] {
            for size in [0, 1, 2, 5, 7] {
                let jobs = make_batches(&records(n), size, &params());
                assert_eq!(jobs.iter().map(|j| j.len()).sum::<usize>(), n);
                assert!(jobs.iter().all(|j| !j.is_empty() && j.len() <= size.max(1)));
            }
        }
    }

    #[test]
    fn test_batch_ids_unique() {
        let jobs = make_batches(&records(10), 2, &params());
        let mut ids: Vec<_> = jobs.iter().map(|j| j.batch_id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }
}
