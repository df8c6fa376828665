//! NCBI BLAST URL API client
//!
//! Three-step protocol: `CMD=Put` submits the batch and returns a request id
//! (RID) plus an estimated wait (RTOE); `FORMAT_OBJECT=SearchInfo` is polled
//! until the search is READY; `FORMAT_TYPE=JSON2_S` fetches the hits.
//!
//! API documentation: https://blast.ncbi.nlm.nih.gov/doc/blast-help/urlapi.html

use crate::error::{SearchError, ServiceResult};
use crate::service::{QueryReport, RawHit, SearchRequest, SearchService};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use virseq_common::config::SearchConfig;

static RID_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"RID\s*=\s*(\S+)").expect("static RID regex"));
static RTOE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"RTOE\s*=\s*(\d+)").expect("static RTOE regex"));
static STATUS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Status=(\w+)").expect("static status regex"));

/// Accepted submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub rid: String,
    /// Estimated seconds until results are ready
    pub rtoe: Option<u64>,
}

/// Search state as reported by `FORMAT_OBJECT=SearchInfo`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchInfo {
    Waiting,
    Ready,
    Failed,
    Unknown,
}

pub fn parse_submission(body: &str) -> ServiceResult<Submission> {
    let rid = RID_LINE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| SearchError::Parse("No RID in submission response".to_string()))?;
    let rtoe = RTOE_LINE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok());

    Ok(Submission { rid, rtoe })
}

pub fn parse_search_info(body: &str) -> ServiceResult<SearchInfo> {
    let status = STATUS_LINE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| SearchError::Parse("No Status in SearchInfo response".to_string()))?;

    Ok(match status {
        "WAITING" => SearchInfo::Waiting,
        "READY" => SearchInfo::Ready,
        "FAILED" => SearchInfo::Failed,
        _ => SearchInfo::Unknown,
    })
}

// JSON2_S layout, reduced to the fields used

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

#[derive(Debug, Deserialize)]
struct Json2Document {
    #[serde(rename = "BlastOutput2")]
    outputs: OneOrMany<Json2Output>,
}

#[derive(Debug, Deserialize)]
struct Json2Output {
    report: Json2Report,
}

#[derive(Debug, Deserialize)]
struct Json2Report {
    results: Json2Results,
}

#[derive(Debug, Deserialize)]
struct Json2Results {
    search: Json2Search,
}

#[derive(Debug, Deserialize)]
struct Json2Search {
    #[serde(default)]
    query_title: String,
    #[serde(default)]
    query_len: Option<usize>,
    #[serde(default)]
    hits: Vec<Json2Hit>,
}

#[derive(Debug, Deserialize)]
struct Json2Hit {
    #[serde(default)]
    description: Vec<Json2Description>,
    #[serde(default)]
    hsps: Vec<Json2Hsp>,
}

#[derive(Debug, Deserialize)]
struct Json2Description {
    #[serde(default)]
    accession: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    sciname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Json2Hsp {
    bit_score: f64,
    evalue: f64,
    identity: u32,
    query_from: u32,
    query_to: u32,
    hit_from: u32,
    hit_to: u32,
    align_len: u32,
    #[serde(default)]
    gaps: u32,
}

/// Parse a JSON2_S report into one `QueryReport` per query
///
/// Only the first HSP of each hit is kept; hits without HSPs are dropped.
pub fn parse_report(body: &str) -> ServiceResult<Vec<QueryReport>> {
    let document: Json2Document =
        serde_json::from_str(body).map_err(|e| SearchError::Parse(e.to_string()))?;

    let outputs = match document.outputs {
        OneOrMany::One(output) => vec![output],
        OneOrMany::Many(outputs) => outputs,
    };

    let reports = outputs
        .into_iter()
        .map(|output| {
            let search = output.report.results.search;
            let hits = search
                .hits
                .into_iter()
                .filter_map(|hit| {
                    let hsp = hit.hsps.into_iter().next()?;
                    let description = hit.description.into_iter().next();
                    let (accession, title, organism) = match description {
                        Some(d) => (d.accession, d.title, d.sciname.filter(|s| !s.is_empty())),
                        None => (String::new(), String::new(), None),
                    };
                    Some(RawHit {
                        accession,
                        title,
                        organism,
                        identities: hsp.identity,
                        align_length: hsp.align_len,
                        evalue: hsp.evalue,
                        bit_score: hsp.bit_score,
                        query_from: hsp.query_from,
                        query_to: hsp.query_to,
                        hit_from: hsp.hit_from,
                        hit_to: hsp.hit_to,
                        gaps: hsp.gaps,
                    })
                })
                .collect();

            QueryReport {
                query_title: search.query_title,
                query_length: search.query_len,
                hits,
            }
        })
        .collect();

    Ok(reports)
}

/// Map a non-success HTTP status onto the retry taxonomy
fn status_error(status: StatusCode) -> SearchError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        SearchError::Transient(format!("HTTP {}", status))
    } else {
        SearchError::Fatal(format!("HTTP {}", status))
    }
}

fn transport_error(e: reqwest::Error) -> SearchError {
    if e.is_decode() {
        SearchError::Parse(e.to_string())
    } else {
        SearchError::Transient(e.to_string())
    }
}

/// NCBI BLAST client
///
/// Every HTTP request (submit, poll, fetch) waits on one shared rate limiter.
pub struct NcbiBlastClient {
    client: Client,
    base_url: String,
    poll_interval: Duration,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl NcbiBlastClient {
    pub fn new(
        base_url: impl Into<String>,
        request_interval: Duration,
        poll_interval: Duration,
    ) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(15))
            .user_agent(concat!("virseq/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SearchError::Fatal(format!("Failed to build HTTP client: {}", e)))?;

        let quota = Quota::with_period(request_interval.max(Duration::from_millis(1)))
            .ok_or_else(|| SearchError::Fatal("Request interval must be non-zero".to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            poll_interval,
            rate_limiter: RateLimiter::direct(quota),
        })
    }

    pub fn from_config(config: &SearchConfig) -> ServiceResult<Self> {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.request_interval_secs),
            Duration::from_secs(config.poll_interval_secs),
        )
    }

    async fn send(&self, request: RequestBuilder) -> ServiceResult<String> {
        self.rate_limiter.until_ready().await;

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }
        response.text().await.map_err(transport_error)
    }

    async fn submit(&self, request: &SearchRequest) -> ServiceResult<Submission> {
        let params = &request.params;
        let mut form: Vec<(&str, String)> = vec![
            ("CMD", "Put".to_string()),
            ("PROGRAM", params.program.clone()),
            ("DATABASE", params.database.clone()),
            ("QUERY", request.fasta.clone()),
            ("HITLIST_SIZE", params.hitlist_size.to_string()),
            ("EXPECT", params.expect.to_string()),
        ];
        if let Some(entrez) = &params.entrez_query {
            form.push(("ENTREZ_QUERY", entrez.clone()));
        }
        if params.program == "blastn" {
            if params.megablast {
                form.push(("MEGABLAST", "on".to_string()));
            } else {
                form.push(("SERVICE", "plain".to_string()));
            }
        }

        let body = self
            .send(self.client.post(&self.base_url).form(&form))
            .await?;
        let submission = parse_submission(&body)?;
        info!(
            rid = %submission.rid,
            rtoe = ?submission.rtoe,
            queries = request.query_count,
            "Search submitted"
        );
        Ok(submission)
    }

    async fn wait_until_ready(&self, submission: &Submission) -> ServiceResult<()> {
        let first_wait = submission
            .rtoe
            .map(Duration::from_secs)
            .unwrap_or(self.poll_interval);
        tokio::time::sleep(first_wait).await;

        loop {
            let body = self
                .send(self.client.get(&self.base_url).query(&[
                    ("CMD", "Get"),
                    ("FORMAT_OBJECT", "SearchInfo"),
                    ("RID", submission.rid.as_str()),
                ]))
                .await?;

            match parse_search_info(&body)? {
                SearchInfo::Ready => return Ok(()),
                SearchInfo::Waiting => {
                    debug!(rid = %submission.rid, "Search still running");
                    tokio::time::sleep(self.poll_interval).await;
                }
                SearchInfo::Failed => {
                    return Err(SearchError::Fatal(format!(
                        "Search {} failed on the server",
                        submission.rid
                    )))
                }
                SearchInfo::Unknown => {
                    return Err(SearchError::Fatal(format!(
                        "Search {} expired or unknown",
                        submission.rid
                    )))
                }
            }
        }
    }

    async fn fetch(&self, rid: &str) -> ServiceResult<Vec<QueryReport>> {
        let body = self
            .send(self.client.get(&self.base_url).query(&[
                ("CMD", "Get"),
                ("FORMAT_TYPE", "JSON2_S"),
                ("RID", rid),
            ]))
            .await?;
        parse_report(&body)
    }
}

#[async_trait]
impl SearchService for NcbiBlastClient {
    async fn search(&self, request: &SearchRequest) -> ServiceResult<Vec<QueryReport>> {
        let submission = self.submit(request).await?;
        self.wait_until_ready(&submission).await?;
        let reports = self.fetch(&submission.rid).await?;
        debug!(rid = %submission.rid, reports = reports.len(), "Search results fetched");
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUT_RESPONSE: &str = r#"<!--QBlastInfoBegin
    RID = 7XKB1Z2E016
    RTOE = 18
QBlastInfoEnd
-->"#;

    const REPORT: &str = r#"{
      "BlastOutput2": [
        {"report": {"results": {"search": {
          "query_title": "S1-Hanta",
          "query_len": 400,
          "hits": [
            {"num": 1,
             "description": [{"accession": "MN123456", "title": "Seoul virus strain X segment S [Seoul orthohantavirus]", "sciname": "Seoul orthohantavirus"}],
             "hsps": [{"num": 1, "bit_score": 701.2, "evalue": 0.0, "identity": 390, "query_from": 1, "query_to": 398, "hit_from": 20, "hit_to": 417, "align_len": 398, "gaps": 2},
                      {"num": 2, "bit_score": 40.1, "evalue": 0.5, "identity": 20, "query_from": 1, "query_to": 22, "hit_from": 1, "hit_to": 22, "align_len": 22}]},
            {"num": 2,
             "description": [{"accession": "OK000001", "title": "Hantaan virus isolate Y [Hantaan orthohantavirus]"}],
             "hsps": [{"num": 1, "bit_score": 300.0, "evalue": 1e-80, "identity": 300, "query_from": 5, "query_to": 380, "hit_from": 1, "hit_to": 376, "align_len": 376}]},
            {"num": 3, "description": [], "hsps": []}
          ]
        }}}},
        {"report": {"results": {"search": {"query_title": "S2-Hanta", "query_len": 350, "hits": []}}}}
      ]
    }"#;

    #[test]
    fn test_parse_submission() {
        let submission = parse_submission(PUT_RESPONSE).unwrap();
        assert_eq!(submission.rid, "7XKB1Z2E016");
        assert_eq!(submission.rtoe, Some(18));

        let err = parse_submission("<html>Error</html>").unwrap_err();
        assert!(matches!(err, SearchError::Parse(_)));
    }

    #[test]
    fn test_parse_search_info() {
        let body = "QBlastInfoBegin\n\tStatus=WAITING\nQBlastInfoEnd";
        assert_eq!(parse_search_info(body).unwrap(), SearchInfo::Waiting);
        let body = "QBlastInfoBegin\n\tStatus=READY\n\tThereAreHits=yes\nQBlastInfoEnd";
        assert_eq!(parse_search_info(body).unwrap(), SearchInfo::Ready);
        assert_eq!(parse_search_info("Status=FAILED").unwrap(), SearchInfo::Failed);
        assert_eq!(parse_search_info("Status=UNKNOWN").unwrap(), SearchInfo::Unknown);
        assert!(parse_search_info("nothing here").is_err());
    }

    #[test]
    fn test_parse_report() {
        let reports = parse_report(REPORT).unwrap();
        assert_eq!(reports.len(), 2);

        let first = &reports[0];
        assert_eq!(first.query_title, "S1-Hanta");
        assert_eq!(first.query_length, Some(400));
        assert_eq!(first.hits.len(), 2);

        let top = &first.hits[0];
        assert_eq!(top.accession, "MN123456");
        assert_eq!(top.organism.as_deref(), Some("Seoul orthohantavirus"));
        assert_eq!(top.identities, 390);
        assert_eq!(top.align_length, 398);
        assert_eq!(top.gaps, 2);
        assert_eq!(top.hit_from, 20);

        assert_eq!(first.hits[1].organism, None);
        assert_eq!(first.hits[1].gaps, 0);

        assert!(reports[1].hits.is_empty());
    }

    #[test]
    fn test_parse_single_output_object() {
        let body = r#"{"BlastOutput2": {"report": {"results": {"search": {"query_title": "S9", "hits": []}}}}}"#;
        let reports = parse_report(body).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].query_length, None);
    }

    #[test]
    fn test_malformed_report_is_parse_error() {
        let err = parse_report("{\"unexpected\": true}").unwrap_err();
        assert!(matches!(err, SearchError::Parse(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_status_classification() {
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE).is_transient());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(!status_error(StatusCode::BAD_REQUEST).is_transient());
    }

    #[test]
    fn test_client_from_config() {
        assert!(NcbiBlastClient::from_config(&SearchConfig::default()).is_ok());
    }
}
