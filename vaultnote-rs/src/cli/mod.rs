//! CLI command implementations.

pub mod args;
pub mod output;

pub mod check;
pub mod content;
pub mod index;
pub mod list;
pub mod metadata;
pub mod tasks;

pub use args::{Cli, Commands};
pub use output::Output;
