//! File Scanner (spec §4.A).

mod comments;
mod files;

pub use comments::{split_top_level_statements, RawStatement};
pub use files::{scan_project, MigrationFile, QueryFile, ScannedProject};
