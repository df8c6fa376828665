//! Remote homology-search orchestration
//!
//! Consensus records are batched, dispatched to a remote search service with
//! bounded concurrency and retry, and turned into ranked per-record results.
//! Progress and cancellation flow through a shared `ProgressTracker`.

pub mod batcher;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod ncbi;
pub mod progress;
pub mod service;

pub use crate::dispatcher::{DispatchSettings, SearchDispatcher};
pub use crate::error::{SearchError, ServiceResult};
pub use crate::job::{QueryParameters, SearchJob};
pub use crate::ncbi::NcbiBlastClient;
pub use crate::progress::{ProgressState, ProgressTracker, RunStatus};
pub use crate::service::{QueryReport, RawHit, SearchRequest, SearchService};
