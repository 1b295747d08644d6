//! Dataset compilation: training item rendering, statistics and exports.

pub mod dataset;
pub mod format;
pub mod stats;

pub use dataset::{compile, compile_record, split_dataset, CompileReport, DatasetCompiler};
pub use stats::{DatasetStatistics, StatisticsBuilder};
