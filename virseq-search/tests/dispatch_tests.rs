//! Search orchestration against in-process services

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use virseq_assembly::{AssemblySession, ConsensusBuilder, PatternTrimmer};
use virseq_common::config::{SearchMode, SearchProgram};
use virseq_common::{ManualEdits, Orientation, Read, ReadGroup, SearchStatus};
use virseq_search::{
    DispatchSettings, NcbiBlastClient, ProgressTracker, QueryParameters, QueryReport, RawHit,
    RunStatus, SearchDispatcher, SearchError, SearchRequest, SearchService, ServiceResult,
};

/// Answers each query with a single full-length hit
struct EchoService {
    requests: AtomicUsize,
}

#[async_trait]
impl SearchService for EchoService {
    async fn search(&self, request: &SearchRequest) -> ServiceResult<Vec<QueryReport>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let mut reports = Vec::new();
        let mut lines = request.fasta.lines();
        while let (Some(header), Some(sequence)) = (lines.next(), lines.next()) {
            let name = header.trim_start_matches('>');
            let len = sequence.len() as u32;
            reports.push(QueryReport {
                query_title: name.to_string(),
                query_length: Some(sequence.len()),
                hits: vec![RawHit {
                    accession: format!("HIT_{}", name),
                    title: "Puumala virus segment S [Puumala orthohantavirus]".to_string(),
                    organism: None,
                    identities: len,
                    align_length: len,
                    evalue: 0.0,
                    bit_score: 500.0,
                    query_from: 1,
                    query_to: len,
                    hit_from: 1,
                    hit_to: len,
                    gaps: 0,
                }],
            });
        }
        Ok(reports)
    }
}

fn group(key: &str, sequence: &str) -> ReadGroup {
    ReadGroup::new(
        key,
        vec![Read::new(
            format!("{}-F.ab1", key),
            sequence,
            vec![30; sequence.len()],
            Orientation::Forward,
        )],
    )
}

#[tokio::test]
async fn test_assembled_records_are_searched_in_order() {
    let groups: Vec<ReadGroup> = (0..7)
        .map(|i| group(&format!("S{}", i), &"ACGTTGCA".repeat(i + 1)))
        .collect();
    let report = AssemblySession::new(ConsensusBuilder::new(PatternTrimmer::disabled())).run(
        &groups,
        &ManualEdits::new(),
        &Default::default(),
    );
    assert_eq!(report.records.len(), 7);

    let service = Arc::new(EchoService {
        requests: AtomicUsize::new(0),
    });
    let progress = Arc::new(ProgressTracker::new());
    let dispatcher = SearchDispatcher::new(
        service.clone(),
        Arc::clone(&progress),
        QueryParameters::new(SearchProgram::Auto, SearchMode::Viruses),
        DispatchSettings::default(),
    );

    let results = dispatcher.dispatch(&report.records).await;

    assert_eq!(service.requests.load(Ordering::SeqCst), 2);
    assert_eq!(results.len(), 7);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.name, format!("S{}", i));
        assert_eq!(result.status, SearchStatus::Success);
        assert_eq!(result.query_length, 8 * (i + 1));
        let hit = &result.hits[0];
        assert_eq!(hit.identity_pct, 100.0);
        assert_eq!(hit.query_coverage_pct, 100.0);
        assert_eq!(hit.organism, "Puumala orthohantavirus");
    }

    let state = progress.snapshot();
    assert_eq!((state.completed, state.total), (7, 7));
    assert_eq!(state.status, RunStatus::Completed);
}

const PUT_BODY: &str = "<!--QBlastInfoBegin\n    RID = TESTRID01\n    RTOE = 0\nQBlastInfoEnd\n-->";
const INFO_BODY: &str = "<!--QBlastInfoBegin\n\tStatus=READY\n\tThereAreHits=yes\nQBlastInfoEnd\n-->";
const REPORT_BODY: &str = r#"{"BlastOutput2": [{"report": {"results": {"search": {
    "query_title": "S1", "query_len": 40,
    "hits": [{"description": [{"accession": "KX000001", "title": "Orthohantavirus seoulense [Seoul orthohantavirus]", "sciname": "Seoul orthohantavirus"}],
              "hsps": [{"bit_score": 70.1, "evalue": 1e-12, "identity": 38, "query_from": 1, "query_to": 40, "hit_from": 100, "hit_to": 139, "align_len": 40, "gaps": 0}]}]
}}}}]}"#;

/// Minimal HTTP/1.1 responder standing in for the BLAST endpoint
async fn serve_stub(listener: TcpListener, put_status: &'static str) {
    loop {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let header_end = loop {
                let n = match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let content_length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            while buf.len() < header_end + content_length {
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }

            let (status, body) = if head.starts_with("POST") {
                (put_status, PUT_BODY)
            } else if head.contains("SearchInfo") {
                ("200 OK", INFO_BODY)
            } else {
                ("200 OK", REPORT_BODY)
            };
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
    }
}

async fn stub_client(put_status: &'static str) -> NcbiBlastClient {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_stub(listener, put_status));

    NcbiBlastClient::new(
        format!("http://{}/Blast.cgi", addr),
        Duration::from_millis(1),
        Duration::from_millis(10),
    )
    .unwrap()
}

#[tokio::test]
async fn test_ncbi_client_round_trip() {
    let client = stub_client("200 OK").await;
    let request = SearchRequest::new(
        QueryParameters::new(SearchProgram::Blastn, SearchMode::All),
        [("S1", "ACGT")],
    );

    let reports = client.search(&request).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].query_title, "S1");
    assert_eq!(reports[0].hits[0].accession, "KX000001");
    assert_eq!(reports[0].hits[0].hit_from, 100);
}

#[tokio::test]
async fn test_ncbi_client_errors() {
    let request = SearchRequest::new(
        QueryParameters::new(SearchProgram::Auto, SearchMode::Viruses),
        [("S1", "ACGT")],
    );

    let rejected = stub_client("400 Bad Request").await;
    let err = rejected.search(&request).await.unwrap_err();
    assert!(matches!(err, SearchError::Fatal(_)));

    let overloaded = stub_client("503 Service Unavailable").await;
    let err = overloaded.search(&request).await.unwrap_err();
    assert!(err.is_transient());
}
