//! The SCDB single-file container: super-header, block registry, free-extent
//! allocator, and the page-addressed data region (spec.md §4.1).

pub mod allocator;
pub mod header;
pub mod registry;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::common::TransactionId;
use crate::config::{AllocationStrategy, EngineConfig};
use crate::error::DbError;
use crate::wal::Wal;
use crate::Result;

use allocator::{Extent, FreeExtentAllocator};
use header::{SuperHeader, HEADER_REGION_BYTES};
use registry::{BlockKind, BlockRegistry, RegistryEntry};

/// A container file opened for read/write. Header and registry live under
/// one lock each; the data file handle is behind its own lock so registry
/// bookkeeping never blocks a concurrent page read.
pub struct Container {
    path: PathBuf,
    file: Arc<parking_lot::Mutex<File>>,
    page_size: u64,
    header: RwLock<SuperHeader>,
    registry: RwLock<BlockRegistry>,
    allocator: RwLock<FreeExtentAllocator>,
    last_extension_pages: RwLock<u64>,
}

impl Container {
    /// Creates a new container file, or opens an existing one, validating
    /// the magic/version on open (spec.md §4.1).
    pub fn open(path: impl AsRef<Path>, config: &EngineConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let page_size = config.page_size as u64;
        let existed = path.exists();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        if existed && file.metadata()?.len() >= HEADER_REGION_BYTES {
            let mut header_buf = vec![0u8; HEADER_REGION_BYTES as usize];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut header_buf)?;
            let header = SuperHeader::from_bytes(&header_buf)?;
            let registry = Self::load_registry(&mut file, &header, config)?;
            let allocator = Self::rebuild_allocator(&header, &registry, page_size, config);
            tracing::info!(
                path = %path.display(),
                instance_id = %header.instance_id,
                blocks = registry.names().count(),
                "container opened"
            );
            return Ok(Self {
                path,
                file: Arc::new(parking_lot::Mutex::new(file)),
                page_size,
                header: RwLock::new(header),
                registry: RwLock::new(registry),
                allocator: RwLock::new(allocator),
                last_extension_pages: RwLock::new(0),
            });
        }

        let now = crate::common::unix_time_now();
        let mut header = SuperHeader::new(config.page_size as u32, now);
        header.data_region_offset = header.registry_root_offset + page_size;
        let container = Self {
            path,
            file: Arc::new(parking_lot::Mutex::new(file.try_clone()?)),
            page_size,
            header: RwLock::new(header.clone()),
            registry: RwLock::new(BlockRegistry::new(
                config.registry_flush_threshold,
                config.registry_flush_interval_ms,
            )),
            allocator: RwLock::new(FreeExtentAllocator::new(config.allocation_strategy)),
            last_extension_pages: RwLock::new(0),
        };
        container.allocator.write().seed(
            header.data_region_offset / page_size,
            config.min_extension_pages,
        );
        file.set_len(header.data_region_offset + config.min_extension_pages * page_size)?;
        container.write_header_locked(&header)?;
        container.flush()?;
        tracing::info!(
            path = %container.path.display(),
            instance_id = %header.instance_id,
            page_size,
            "container created"
        );
        Ok(container)
    }

    fn load_registry(
        file: &mut File,
        header: &SuperHeader,
        config: &EngineConfig,
    ) -> Result<BlockRegistry> {
        file.seek(SeekFrom::Start(header.registry_root_offset))?;
        let mut len_buf = [0u8; 8];
        file.read_exact(&mut len_buf)?;
        let len = u64::from_le_bytes(len_buf) as usize;
        if len == 0 {
            return Ok(BlockRegistry::new(
                config.registry_flush_threshold,
                config.registry_flush_interval_ms,
            ));
        }
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        let entries = bincode::deserialize(&buf)
            .map_err(|e| DbError::Corruption(format!("registry decode failed: {e}")))?;
        Ok(BlockRegistry::load(
            entries,
            config.registry_flush_threshold,
            config.registry_flush_interval_ms,
        ))
    }

    fn rebuild_allocator(
        header: &SuperHeader,
        registry: &BlockRegistry,
        page_size: u64,
        config: &EngineConfig,
    ) -> FreeExtentAllocator {
        let mut allocator = FreeExtentAllocator::new(config.allocation_strategy);
        let mut occupied: Vec<(u64, u64)> = registry
            .entries()
            .values()
            .map(|e| (e.offset / page_size, e.allocated_pages))
            .collect();
        occupied.sort_unstable();

        let data_start_page = header.data_region_offset / page_size;
        let mut cursor = data_start_page;
        for (start, len) in occupied {
            if start > cursor {
                allocator.seed(cursor, start - cursor);
            }
            cursor = cursor.max(start + len);
        }
        allocator
    }

    fn write_header_locked(&self, header: &SuperHeader) -> Result<()> {
        let bytes = header.to_bytes()?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&bytes)?;
        Ok(())
    }

    fn write_registry_locked(&self, registry: &BlockRegistry) -> Result<()> {
        let header = self.header.read();
        let encoded = bincode::serialize(registry.entries())
            .map_err(|e| DbError::Internal(format!("registry encode failed: {e}")))?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(header.registry_root_offset))?;
        file.write_all(&(encoded.len() as u64).to_le_bytes())?;
        file.write_all(&encoded)?;
        Ok(())
    }

    /// Computes SHA-256 over `bytes` in memory and writes both payload and
    /// registry entry; never reads back to verify (spec.md §4.1 write-path
    /// latency decision).
    ///
    /// Rewriting an existing block that no longer fits its previously
    /// allocated extent frees that extent and allocates a fresh one rather
    /// than writing past it — the allocated extent size is tracked
    /// separately from the payload's byte length precisely so this check
    /// doesn't depend on `bytes.len()` alone.
    pub fn write_block(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let checksum: [u8; 32] = Sha256::digest(bytes).into();
        let length_pages = (bytes.len() as u64).div_ceil(self.page_size).max(1);

        let existing = self.registry.read().get(name).cloned();
        let (offset, allocated_pages) = match existing {
            Some(entry) if length_pages <= entry.allocated_pages => {
                (entry.offset, entry.allocated_pages)
            }
            Some(entry) => {
                self.allocator.write().free(Extent {
                    start_page: entry.offset / self.page_size,
                    length_pages: entry.allocated_pages,
                });
                (self.allocate_for(length_pages)?, length_pages)
            }
            None => (self.allocate_for(length_pages)?, length_pages),
        };

        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(bytes)?;
        }

        let mut registry = self.registry.write();
        registry.put(
            name,
            RegistryEntry {
                kind: BlockKind::Table,
                offset,
                length: bytes.len() as u64,
                allocated_pages,
                checksum,
            },
        );
        if registry.should_flush() {
            tracing::debug!(
                dirty_entries = registry.dirty_entry_count(),
                "flushing block registry"
            );
            self.write_registry_locked(&registry)?;
            registry.mark_flushed();
        }
        Ok(())
    }

    fn allocate_for(&self, length_pages: u64) -> Result<u64> {
        let mut allocator = self.allocator.write();
        if let Some(extent) = allocator.allocate(length_pages) {
            return Ok(extent.start_page * self.page_size);
        }
        drop(allocator);
        self.extend_for(length_pages)
    }

    fn extend_for(&self, length_pages: u64) -> Result<u64> {
        let mut last_extension = self.last_extension_pages.write();
        let extension_pages = FreeExtentAllocator::next_extension_pages(
            length_pages,
            *last_extension,
            *last_extension * 8 + allocator::DEFAULT_MIN_EXTENSION_PAGES * 16,
        );
        *last_extension = extension_pages;

        let old_len = {
            let file = self.file.lock();
            file.metadata()?.len()
        };
        let new_len = old_len + extension_pages * self.page_size;
        tracing::info!(
            old_len,
            new_len,
            extension_pages,
            "extending container file"
        );
        {
            let file = self.file.lock();
            file.set_len(new_len)?;
        }

        let mut allocator = self.allocator.write();
        allocator.seed(old_len / self.page_size, extension_pages);
        let extent = allocator
            .allocate(length_pages)
            .ok_or_else(|| DbError::CapacityExceeded("container could not grow".to_string()))?;
        Ok(extent.start_page * self.page_size)
    }

    /// Reads a block's bytes and verifies its stored checksum, returning
    /// `None` when the name is unknown and `Corruption` on a mismatch.
    pub fn read_block(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let entry = match self.registry.read().get(name).cloned() {
            Some(e) => e,
            None => return Ok(None),
        };
        let mut bytes = vec![0u8; entry.length as usize];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(entry.offset))?;
            file.read_exact(&mut bytes)?;
        }
        let checksum: [u8; 32] = Sha256::digest(&bytes).into();
        if checksum != entry.checksum {
            tracing::error!(block = name, "checksum mismatch reading block");
            return Err(DbError::Corruption(format!(
                "checksum mismatch reading block '{name}'"
            )));
        }
        Ok(Some(bytes))
    }

    pub fn delete_block(&self, name: &str) -> Result<()> {
        let mut registry = self.registry.write();
        let extent = registry.remove(name, self.page_size)?;
        self.allocator.write().free(extent);
        Ok(())
    }

    pub fn enumerate_blocks(&self) -> Vec<String> {
        self.registry.read().names().cloned().collect()
    }

    /// Re-reads every registered block and compares its bytes against the
    /// stored checksum, without stopping at the first mismatch — used by
    /// `crate::maintenance::validate` so one corrupt block doesn't hide the
    /// rest of the report (spec.md §4.9).
    pub fn verify_all_block_checksums(&self) -> Result<Vec<(String, bool)>> {
        let entries: Vec<(String, RegistryEntry)> = self
            .registry
            .read()
            .entries()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut results = Vec::with_capacity(entries.len());
        for (name, entry) in entries {
            let mut bytes = vec![0u8; entry.length as usize];
            let ok = {
                let mut file = self.file.lock();
                file.seek(SeekFrom::Start(entry.offset))
                    .and_then(|_| file.read_exact(&mut bytes))
                    .is_ok()
            };
            let matches = ok && {
                let checksum: [u8; 32] = Sha256::digest(&bytes).into();
                checksum == entry.checksum
            };
            results.push((name, matches));
        }
        Ok(results)
    }

    /// Bytes of the super-header plus the registry's serialized form, for
    /// `crate::maintenance::validate`'s Quick tier (header + registry
    /// structural sanity, no payload reads).
    pub fn structural_summary(&self) -> (bool, usize) {
        let header_ok = self.header.read().registry_root_offset > 0;
        let block_count = self.registry.read().names().count();
        (header_ok, block_count)
    }

    /// Forces the registry and super-header to durable storage, regardless
    /// of the batched-flush threshold (spec.md §4.1).
    pub fn flush(&self) -> Result<()> {
        {
            let mut registry = self.registry.write();
            self.write_registry_locked(&registry)?;
            registry.mark_flushed();
        }
        self.write_header_locked(&self.header.read())?;
        self.file.lock().sync_all()?;
        Ok(())
    }

    pub fn begin_transaction(&self, wal: &Wal) -> Result<TransactionId> {
        wal.begin()
    }

    pub async fn commit_transaction_async(&self, wal: &Wal, txn_id: TransactionId) -> Result<()> {
        wal.commit_async(txn_id).await
    }

    pub fn rollback_transaction(&self, wal: &Wal, txn_id: TransactionId) -> Result<()> {
        wal.rollback(txn_id)
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn data_region_offset(&self) -> u64 {
        self.header.read().data_region_offset
    }

    pub fn instance_id(&self) -> uuid::Uuid {
        self.header.read().instance_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total_free_pages(&self) -> u64 {
        self.allocator.read().total_free_pages()
    }

    /// Reserves `count` contiguous pages in the data region for a caller
    /// that addresses them by page number directly (the Page Manager),
    /// as opposed to the named-block directory above.
    pub fn allocate_pages(&self, count: u64) -> Result<crate::common::PageId> {
        let offset = self.allocate_for(count.max(1))?;
        Ok((offset / self.page_size) as crate::common::PageId)
    }

    pub fn free_pages(&self, start_page: crate::common::PageId, count: u64) {
        self.allocator.write().free(Extent {
            start_page: start_page as u64,
            length_pages: count.max(1),
        });
    }

    pub fn read_raw_page(&self, page_id: crate::common::PageId) -> Result<Vec<u8>> {
        let offset = page_id as u64 * self.page_size;
        let mut buf = vec![0u8; self.page_size as usize];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn write_raw_page(&self, page_id: crate::common::PageId, data: &[u8]) -> Result<()> {
        if data.len() as u64 != self.page_size {
            return Err(DbError::InvariantViolation(format!(
                "page write of {} bytes does not match page size {}",
                data.len(),
                self.page_size
            )));
        }
        let offset = page_id as u64 * self.page_size;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }
}
