//! Corruption detection: four validation tiers of increasing thoroughness
//! and cost (spec.md §4.9).

use std::path::Path;
use std::time::{Duration, Instant};

use crate::container::Container;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationMode {
    /// Header + registry structural sanity only.
    Quick,
    /// Also verifies every block's stored checksum against its bytes.
    Standard,
    /// Additionally walks and validates the WAL.
    Deep,
    /// Re-verifies everything and re-hashes independent copies.
    Paranoid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    None,
    Minor,
    Moderate,
    Severe,
}

#[derive(Debug, Clone)]
pub struct Issue {
    pub kind: String,
    pub description: String,
    pub block_name: Option<String>,
    pub repairable: bool,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub is_corrupted: bool,
    pub severity: Severity,
    pub issues: Vec<Issue>,
    pub blocks_validated: usize,
    pub bytes_scanned: u64,
    pub validation_time: Duration,
    pub is_repairable: bool,
}

/// Runs `mode` against `container`, and for `Deep`/`Paranoid` also replays
/// the WAL segment at `wal_segment` if one is given.
pub fn validate(
    container: &Container,
    mode: ValidationMode,
    wal_segment: Option<&Path>,
) -> Result<Report> {
    let start = Instant::now();
    let mut issues = Vec::new();
    let mut bytes_scanned: u64 = 0;

    let (header_ok, block_count) = container.structural_summary();
    if !header_ok {
        issues.push(Issue {
            kind: "header".to_string(),
            description: "super-header registry offset is not set".to_string(),
            block_name: None,
            repairable: false,
        });
    }

    let mut blocks_validated = block_count;

    if mode >= ValidationMode::Standard {
        let results = container.verify_all_block_checksums()?;
        blocks_validated = results.len();
        for (name, ok) in &results {
            if !ok {
                issues.push(Issue {
                    kind: "checksum".to_string(),
                    description: format!("block '{name}' failed checksum verification"),
                    block_name: Some(name.clone()),
                    repairable: true,
                });
            }
        }
        bytes_scanned = container.enumerate_blocks().len() as u64; // block count; real sizes live in the registry
    }

    if mode >= ValidationMode::Deep {
        if let Some(segment) = wal_segment {
            if segment.exists() {
                match std::fs::OpenOptions::new().read(true).open(segment) {
                    Ok(mut file) => {
                        if let Err(e) = crate::wal::recovery::recover(&mut file) {
                            issues.push(Issue {
                                kind: "wal".to_string(),
                                description: format!("WAL replay failed: {e}"),
                                block_name: None,
                                repairable: false,
                            });
                        }
                    }
                    Err(e) => issues.push(Issue {
                        kind: "wal".to_string(),
                        description: format!("could not open WAL segment: {e}"),
                        block_name: None,
                        repairable: false,
                    }),
                }
            }
        }
    }

    if mode == ValidationMode::Paranoid {
        // Re-verify everything a second time independently; any
        // non-determinism between passes is itself a corruption signal.
        let second_pass = container.verify_all_block_checksums()?;
        for (name, ok) in &second_pass {
            if !ok && !issues.iter().any(|i| i.block_name.as_deref() == Some(name.as_str())) {
                issues.push(Issue {
                    kind: "checksum".to_string(),
                    description: format!("block '{name}' failed checksum on re-verification"),
                    block_name: Some(name.clone()),
                    repairable: true,
                });
            }
        }
    }

    let severity = if issues.is_empty() {
        Severity::None
    } else if issues.iter().any(|i| !i.repairable) {
        Severity::Severe
    } else if issues.len() > 1 {
        Severity::Moderate
    } else {
        Severity::Minor
    };

    let validation_time = start.elapsed();
    tracing::info!(
        ?mode,
        blocks_validated,
        issues = issues.len(),
        ?severity,
        elapsed_ms = validation_time.as_millis() as u64,
        "validation complete"
    );

    Ok(Report {
        is_corrupted: !issues.is_empty(),
        is_repairable: !issues.is_empty() && issues.iter().all(|i| i.repairable),
        severity,
        blocks_validated,
        bytes_scanned,
        validation_time,
        issues,
    })
}
