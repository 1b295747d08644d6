//! Repository slicing: per-entity slice records, accumulation and export.

pub mod collection;
pub mod pipeline;

pub use collection::{SliceCollection, SliceFilter, SliceStatistics};
pub use pipeline::{discover_repositories, RepositorySource, SliceRun, Slicer};
