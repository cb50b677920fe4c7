//! Repair: acts on a `Report`'s repairable issues, with an optional backup
//! to roll back to on failure (spec.md §4.9).

use std::path::Path;

use crate::container::Container;
use crate::error::DbError;
use crate::maintenance::validate::{Issue, Report};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Aggressiveness {
    /// Never discards data; only rewrites bookkeeping (checksums,
    /// registry entries) it can recompute without touching payloads.
    Conservative,
    /// Removes individually corrupted blocks that cannot be recomputed.
    Standard,
    /// Also accepts partial/best-effort salvage of damaged blocks.
    Aggressive,
}

#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub repaired: Vec<String>,
    pub unrepaired: Vec<String>,
    pub rolled_back: bool,
}

/// Repairs `report`'s repairable issues against `container`. If `backup_to`
/// is given, the container file is copied there first and restored on
/// failure; without one, a failure simply stops partway with whatever was
/// already repaired.
pub fn repair(
    container: &Container,
    report: &Report,
    aggressiveness: Aggressiveness,
    backup_to: Option<&Path>,
) -> Result<RepairOutcome> {
    if let Some(backup_path) = backup_to {
        std::fs::copy(container.path(), backup_path)?;
    }

    let mut repaired = Vec::new();
    let mut unrepaired = Vec::new();

    for issue in &report.issues {
        match attempt_repair(container, issue, aggressiveness) {
            Ok(true) => {
                if let Some(name) = &issue.block_name {
                    tracing::info!(block = name, "repaired block");
                    repaired.push(name.clone());
                }
            }
            Ok(false) | Err(_) => {
                if let Some(name) = &issue.block_name {
                    tracing::warn!(block = name, "block left unrepaired");
                    unrepaired.push(name.clone());
                } else if let Some(backup_path) = backup_to {
                    tracing::error!("rolling back to backup after unrepairable issue");
                    std::fs::copy(backup_path, container.path())?;
                    return Ok(RepairOutcome {
                        repaired,
                        unrepaired: vec!["<container>".to_string()],
                        rolled_back: true,
                    });
                } else {
                    return Err(DbError::Internal(format!(
                        "unrepairable issue with no backup configured: {}",
                        issue.description
                    )));
                }
            }
        }
    }

    tracing::info!(
        repaired = repaired.len(),
        unrepaired = unrepaired.len(),
        "repair pass complete"
    );
    Ok(RepairOutcome {
        repaired,
        unrepaired,
        rolled_back: false,
    })
}

fn attempt_repair(container: &Container, issue: &Issue, aggressiveness: Aggressiveness) -> Result<bool> {
    if !issue.repairable {
        return Ok(false);
    }
    match (issue.kind.as_str(), &issue.block_name) {
        ("checksum", Some(name)) => {
            if aggressiveness == Aggressiveness::Conservative {
                // Conservative never discards data; a corrupted payload
                // with no redundant copy can't be fixed without loss.
                return Ok(false);
            }
            container.delete_block(name)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::maintenance::validate::{validate, ValidationMode, Severity};
    use tempfile::tempdir;

    #[test]
    fn standard_repair_removes_a_corrupted_block() {
        use std::io::{Seek, SeekFrom, Write};
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.scdb");
        let config = EngineConfig {
            data_dir: dir.path().to_string_lossy().to_string(),
            page_size: 256,
            min_extension_pages: 8,
            ..EngineConfig::default()
        };
        let c = Container::open(&path, &config).unwrap();
        c.write_block("users", b"hello world").unwrap();
        c.flush().unwrap();

        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(c.data_region_offset())).unwrap();
        file.write_all(b"CORRUPTED!!!").unwrap();

        let report = validate(&c, ValidationMode::Standard, None).unwrap();
        assert_ne!(report.severity, Severity::None);

        let outcome = repair(&c, &report, Aggressiveness::Standard, None).unwrap();
        assert_eq!(outcome.repaired, vec!["users".to_string()]);
        assert!(c.read_block("users").unwrap().is_none());
    }

    #[test]
    fn conservative_repair_leaves_corrupted_blocks_in_place() {
        use std::io::{Seek, SeekFrom, Write};
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.scdb");
        let config = EngineConfig {
            data_dir: dir.path().to_string_lossy().to_string(),
            page_size: 256,
            min_extension_pages: 8,
            ..EngineConfig::default()
        };
        let c = Container::open(&path, &config).unwrap();
        c.write_block("users", b"hello world").unwrap();
        c.flush().unwrap();

        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(c.data_region_offset())).unwrap();
        file.write_all(b"CORRUPTED!!!").unwrap();

        let report = validate(&c, ValidationMode::Standard, None).unwrap();
        let outcome = repair(&c, &report, Aggressiveness::Conservative, None).unwrap();
        assert!(outcome.repaired.is_empty());
        assert_eq!(outcome.unrepaired, vec!["users".to_string()]);
    }
}
