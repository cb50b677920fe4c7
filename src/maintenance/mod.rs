//! Corruption detection/repair and directory→single-file migration
//! (spec.md §4.9, §4.10).

pub mod migrate;
pub mod repair;
pub mod validate;

pub use migrate::{migrate_directory_to_single_file, MigrationProgress, MigrationReport};
pub use repair::{repair, Aggressiveness, RepairOutcome};
pub use validate::{validate, Issue, Report, Severity, ValidationMode};
