//! Directory-format → single-file migration: one file per block, converted
//! into one SCDB container (spec.md §4.10).

use std::path::Path;

use crate::config::EngineConfig;
use crate::container::Container;
use crate::error::DbError;
use crate::Result;

#[derive(Debug, Clone)]
pub struct MigrationProgress {
    pub block_name: String,
    pub blocks_done: usize,
    pub blocks_total: usize,
}

impl MigrationProgress {
    pub fn percent_complete(&self) -> f64 {
        if self.blocks_total == 0 {
            100.0
        } else {
            self.blocks_done as f64 / self.blocks_total as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub blocks_migrated: usize,
    pub validated: bool,
}

/// Converts `source_dir` (one file per block, named by the block) into a
/// single-file container at `target_path`. If `backup_dir` is given, the
/// source directory is copied there first. If `validate_after` is set, the
/// resulting container is checked with `Standard` validation before this
/// returns successfully.
pub fn migrate_directory_to_single_file(
    source_dir: &Path,
    target_path: &Path,
    config: &EngineConfig,
    backup_dir: Option<&Path>,
    validate_after: bool,
    mut on_progress: impl FnMut(MigrationProgress),
) -> Result<MigrationReport> {
    if !source_dir.is_dir() {
        return Err(DbError::NotFound(format!(
            "source directory '{}' does not exist",
            source_dir.display()
        )));
    }

    if let Some(backup_dir) = backup_dir {
        copy_directory(source_dir, backup_dir)?;
    }

    let mut block_files: Vec<(String, std::path::PathBuf)> = std::fs::read_dir(source_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            Some((name, e.path()))
        })
        .collect();
    block_files.sort();

    tracing::info!(
        source = %source_dir.display(),
        target = %target_path.display(),
        blocks_total = block_files.len(),
        "starting directory-to-single-file migration"
    );

    let container = Container::open(target_path, config)?;
    let total = block_files.len();
    for (done, (name, path)) in block_files.into_iter().enumerate() {
        let bytes = std::fs::read(&path)?;
        container.write_block(&name, &bytes)?;
        tracing::debug!(block = %name, blocks_done = done + 1, blocks_total = total, "migrated block");
        on_progress(MigrationProgress {
            block_name: name,
            blocks_done: done + 1,
            blocks_total: total,
        });
    }
    container.flush()?;

    let validated = if validate_after {
        let report = crate::maintenance::validate::validate(
            &container,
            crate::maintenance::validate::ValidationMode::Standard,
            None,
        )?;
        if report.is_corrupted {
            return Err(DbError::Corruption(
                "post-migration validation found corrupted blocks".to_string(),
            ));
        }
        true
    } else {
        false
    };

    tracing::info!(blocks_migrated = total, validated, "migration complete");
    Ok(MigrationReport {
        blocks_migrated: total,
        validated,
    })
}

fn copy_directory(source: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let dest_path = dest.join(entry.file_name());
        if entry.path().is_file() {
            std::fs::copy(entry.path(), dest_path)?;
        }
    }
    Ok(())
}
