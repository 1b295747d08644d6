//! Elephenotype core library: synthetic instruction-tuning data from Python
//! repositories.
//!
//! The pipeline analyzes source files with tree-sitter, slices functions and
//! classes into JSONL records, prepares batch API requests from them, and
//! compiles the model's batch responses back into instruction/input/output
//! training items with a seeded train/validation split.

pub mod analyzer;
pub mod batch;
pub mod compiler;
pub mod config;
pub mod errors;
pub mod jsonl;
pub mod models;
pub mod slicer;

pub use config::PipelineConfig;
pub use errors::{CoreError, CoreResult};
