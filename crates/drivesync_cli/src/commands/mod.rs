//! CLI command implementations.

pub mod changes;
pub mod serve;
pub mod share;
pub mod sweep;

/// Output format for commands that print records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    /// Human readable lines.
    Text,
    /// One JSON document.
    Json,
}
