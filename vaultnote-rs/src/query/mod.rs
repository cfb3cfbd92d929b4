//! Note queries: a small predicate language over tags, header fields, dates,
//! task state, paths and body text.

pub mod matcher;
pub mod parser;
pub mod types;

pub use matcher::{evaluate, NoteSource};
pub use parser::parse_query;
pub use types::*;
