//! Batch API plumbing: request preparation, response payload extraction and
//! correlation of responses with their source slices.

pub mod correlator;
pub mod extract;
pub mod requests;

pub use correlator::{
    BatchOutputs, BatchRecord, CorrelatedRecord, Correlation, Correlator, ParseCounts, SourceIndex,
};
pub use extract::{extract_payload, response_content};
pub use requests::{BatchRequest, PreparedBatch, RequestBuilder};
