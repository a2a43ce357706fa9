//! Reader boundary - the external collaborator that performs the actual reads
//!
//! The poller never touches process memory itself; it hands ordered batches
//! of read requests to a [`ValueReader`] and reconciles the results by item
//! id. How an individual read is performed (pointer chains, module-relative
//! addressing, caching) is entirely the reader's business.

use async_trait::async_trait;
use thiserror::Error;

/// Errors a reader can raise for a whole batch
///
/// A reader error fails the batch, which fails the cycle. Per-item failures
/// are not errors here - they come back as [`ReadResult`]s with
/// `success: false`.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Target process unavailable: {0}")]
    ProcessUnavailable(String),

    #[error("Batch read failed: {0}")]
    BatchFailed(String),

    #[error("Read timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Context token for a batch of reads
///
/// Identifies the target (e.g. a process) plus the pass-through flags the
/// scheduler forwards but does not interpret.
#[derive(Debug, Clone)]
pub struct ReadContext {
    /// Opaque target identifier (process id, connection handle, ...)
    pub target: String,

    /// Forwarded to the reader; skip fast paths if supported
    pub fast_mode: bool,
}

/// One per-item read request within a batch
#[derive(Debug, Clone)]
pub struct ReadRequest {
    /// Item id; the reader must echo this back in its result
    pub id: String,

    /// Opaque read specification owned by the reader's contract
    pub spec: serde_json::Value,

    /// Bypass any reader-side caching for this request
    pub disable_caching: bool,
}

/// One per-item read result
///
/// The reader must echo the request's `id`; the poller reconciles results by
/// id and treats an unknown or missing id as a protocol error that fails the
/// batch.
#[derive(Debug, Clone)]
pub struct ReadResult {
    /// Echoed item id
    pub id: String,

    /// Read value (None on failure)
    pub value: Option<serde_json::Value>,

    /// Whether this individual read succeeded
    pub success: bool,

    /// Error message for a failed read
    pub error: Option<String>,
}

impl ReadResult {
    /// A successful read
    pub fn ok(id: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            value: Some(value),
            success: true,
            error: None,
        }
    }

    /// A failed read
    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: None,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// External reader contract
///
/// One call per batch. The returned results may arrive in any order; the
/// poller reconciles by id. A `ReaderError` rejects the entire batch - the
/// poller never synthesizes placeholder data for a rejected batch, so stale
/// values are never presented as fresh.
#[async_trait]
pub trait ValueReader: Send + Sync {
    /// Read every item in the batch, returning one result per request
    async fn read_batch(&self, ctx: &ReadContext, requests: &[ReadRequest]) -> Result<Vec<ReadResult>, ReaderError>;
}
