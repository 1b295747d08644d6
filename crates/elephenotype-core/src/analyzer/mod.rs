pub mod docstring;
pub mod filesystem;
pub mod parser;
pub mod symbols;

pub use symbols::{analyze_source, Analyzer};
