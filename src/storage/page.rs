//! Fixed-size slotted page: header + a slot directory growing from the end
//! + record bytes growing from the front, compacted on overflow
//! (spec.md §4.2).

use serde::{Deserialize, Serialize};

use crate::common::PageId;
use crate::error::DbError;
use crate::Result;

const HEADER_SIZE: usize = 8;
const SLOT_SIZE: usize = 4;

/// Sentinel slot length marking a deleted record.
const TOMBSTONE: u16 = 0xFFFF;
/// Sentinel slot length marking a forwarding stub; the slot's `offset`
/// field is reinterpreted as the destination slot id.
const FORWARD: u16 = 0xFFFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Live { offset: u16, length: u16 },
    Tombstone,
    Forward { target: u16 },
}

/// A page as cached in memory: raw bytes plus the bookkeeping the buffer
/// pool needs (dirty flag, pin count). `data.len()` is always the
/// container's configured page size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub data: Vec<u8>,
    #[serde(skip)]
    pub is_dirty: bool,
    #[serde(skip)]
    pub pin_count: usize,
}

impl Page {
    /// Builds a fresh, empty slotted page of `size` bytes.
    pub fn new(id: PageId, size: usize) -> Self {
        let mut data = vec![0u8; size];
        write_u16(&mut data, 0, HEADER_SIZE as u16); // free_space_start
        write_u16(&mut data, 2, 0); // slot_count
        Self {
            id,
            data,
            is_dirty: false,
            pin_count: 0,
        }
    }

    pub fn from_bytes(id: PageId, data: Vec<u8>) -> Self {
        Self {
            id,
            data,
            is_dirty: false,
            pin_count: 0,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn reset(&mut self) {
        let size = self.data.len();
        self.data = vec![0u8; size];
        write_u16(&mut self.data, 0, HEADER_SIZE as u16);
        write_u16(&mut self.data, 2, 0);
        self.is_dirty = false;
    }

    fn free_space_start(&self) -> u16 {
        read_u16(&self.data, 0)
    }

    fn set_free_space_start(&mut self, v: u16) {
        write_u16(&mut self.data, 0, v);
    }

    fn slot_count(&self) -> u16 {
        read_u16(&self.data, 2)
    }

    fn set_slot_count(&mut self, v: u16) {
        write_u16(&mut self.data, 2, v);
    }

    fn slot_dir_offset(&self, slot_id: u16) -> usize {
        self.data.len() - (slot_id as usize + 1) * SLOT_SIZE
    }

    fn slot_state(&self, slot_id: u16) -> SlotState {
        let at = self.slot_dir_offset(slot_id);
        let offset = read_u16(&self.data, at);
        let length = read_u16(&self.data, at + 2);
        match length {
            TOMBSTONE => SlotState::Tombstone,
            FORWARD => SlotState::Forward { target: offset },
            _ => SlotState::Live { offset, length },
        }
    }

    fn set_slot(&mut self, slot_id: u16, offset: u16, length: u16) {
        let at = self.slot_dir_offset(slot_id);
        write_u16(&mut self.data, at, offset);
        write_u16(&mut self.data, at + 2, length);
    }

    fn slot_dir_start(&self) -> usize {
        self.data.len() - self.slot_count() as usize * SLOT_SIZE
    }

    fn free_bytes(&self) -> usize {
        self.slot_dir_start().saturating_sub(self.free_space_start() as usize)
    }

    /// Appends a new record, reusing a tombstoned slot id when one exists.
    /// Fails with `CapacityExceeded` when neither the slot directory nor
    /// the heap has room, even after compaction.
    pub fn insert_record(&mut self, bytes: &[u8]) -> Result<u16> {
        if self.free_bytes() < bytes.len() {
            self.compact();
        }

        let reused_slot = (0..self.slot_count()).find(|&s| self.slot_state(s) == SlotState::Tombstone);
        let needs_new_slot = reused_slot.is_none();
        let needed = bytes.len() + if needs_new_slot { SLOT_SIZE } else { 0 };
        if self.free_bytes() < needed {
            return Err(DbError::CapacityExceeded(format!(
                "page {} has no room for a {}-byte record",
                self.id,
                bytes.len()
            )));
        }

        let write_at = self.free_space_start();
        self.data[write_at as usize..write_at as usize + bytes.len()].copy_from_slice(bytes);
        self.set_free_space_start(write_at + bytes.len() as u16);

        let slot_id = match reused_slot {
            Some(id) => id,
            None => {
                let id = self.slot_count();
                self.set_slot_count(id + 1);
                id
            }
        };
        self.set_slot(slot_id, write_at, bytes.len() as u16);
        self.is_dirty = true;
        Ok(slot_id)
    }

    /// Follows a forwarding chain to the live record for `slot_id`.
    pub fn get_record(&self, slot_id: u16) -> Option<Vec<u8>> {
        let mut current = slot_id;
        loop {
            match self.slot_state(current) {
                SlotState::Live { offset, length } => {
                    return Some(self.data[offset as usize..offset as usize + length as usize].to_vec());
                }
                SlotState::Forward { target } => current = target,
                SlotState::Tombstone => return None,
            }
        }
    }

    /// Updates in place when the new bytes fit the existing slot;
    /// otherwise inserts into a new slot and leaves a forwarding stub
    /// behind (spec.md §4.3).
    pub fn update_record(&mut self, slot_id: u16, bytes: &[u8]) -> Result<()> {
        match self.slot_state(slot_id) {
            SlotState::Tombstone => Err(DbError::NotFound(format!("slot {slot_id} is deleted"))),
            SlotState::Forward { target } => self.update_record(target, bytes),
            SlotState::Live { offset, length } => {
                if bytes.len() <= length as usize {
                    self.data[offset as usize..offset as usize + bytes.len()].copy_from_slice(bytes);
                    self.set_slot(slot_id, offset, bytes.len() as u16);
                    self.is_dirty = true;
                    Ok(())
                } else {
                    let new_slot = self.insert_record(bytes)?;
                    self.set_slot(slot_id, new_slot, FORWARD);
                    self.is_dirty = true;
                    Ok(())
                }
            }
        }
    }

    pub fn delete_record(&mut self, slot_id: u16) -> Result<()> {
        match self.slot_state(slot_id) {
            SlotState::Forward { target } => {
                self.set_slot(slot_id, 0, TOMBSTONE);
                self.delete_record(target)
            }
            SlotState::Tombstone => Ok(()),
            SlotState::Live { .. } => {
                self.set_slot(slot_id, 0, TOMBSTONE);
                self.is_dirty = true;
                Ok(())
            }
        }
    }

    /// Rewrites live records contiguously from `HEADER_SIZE`, eliminating
    /// fragmentation left by updates/deletes. Slot ids are preserved;
    /// forwarding chains are flattened since every live slot gets a fresh
    /// offset.
    pub fn compact(&mut self) {
        let slot_count = self.slot_count();
        let mut live: Vec<(u16, Vec<u8>)> = Vec::new();
        for slot_id in 0..slot_count {
            if let SlotState::Live { .. } = self.slot_state(slot_id) {
                if let Some(bytes) = self.get_record(slot_id) {
                    live.push((slot_id, bytes));
                }
            }
        }

        let mut cursor = HEADER_SIZE as u16;
        for (slot_id, bytes) in &live {
            self.data[cursor as usize..cursor as usize + bytes.len()].copy_from_slice(bytes);
            self.set_slot(*slot_id, cursor, bytes.len() as u16);
            cursor += bytes.len() as u16;
        }
        self.set_free_space_start(cursor);
    }
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn write_u16(buf: &mut [u8], at: usize, v: u16) {
    buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_round_trips() {
        let mut page = Page::new(1, 256);
        let slot = page.insert_record(b"hello").unwrap();
        assert_eq!(page.get_record(slot).unwrap(), b"hello");
    }

    #[test]
    fn update_in_place_when_it_fits() {
        let mut page = Page::new(1, 256);
        let slot = page.insert_record(b"hello").unwrap();
        page.update_record(slot, b"hi").unwrap();
        assert_eq!(page.get_record(slot).unwrap(), b"hi");
    }

    #[test]
    fn update_that_grows_leaves_a_forwarding_stub() {
        let mut page = Page::new(1, 256);
        let slot = page.insert_record(b"hi").unwrap();
        page.update_record(slot, b"a much longer replacement value").unwrap();
        assert_eq!(
            page.get_record(slot).unwrap(),
            b"a much longer replacement value"
        );
    }

    #[test]
    fn delete_then_get_returns_none() {
        let mut page = Page::new(1, 256);
        let slot = page.insert_record(b"gone").unwrap();
        page.delete_record(slot).unwrap();
        assert!(page.get_record(slot).is_none());
    }

    #[test]
    fn deleted_slot_is_reused_by_the_next_insert() {
        let mut page = Page::new(1, 256);
        let slot = page.insert_record(b"first").unwrap();
        page.delete_record(slot).unwrap();
        let reused = page.insert_record(b"second").unwrap();
        assert_eq!(reused, slot);
    }

    #[test]
    fn insert_past_capacity_fails_with_capacity_exceeded() {
        let mut page = Page::new(1, 32);
        let err = page.insert_record(&[0u8; 64]).unwrap_err();
        assert!(matches!(err, DbError::CapacityExceeded(_)));
    }

    #[test]
    fn compaction_reclaims_space_left_by_deletes() {
        let mut page = Page::new(1, 64);
        let a = page.insert_record(&[1u8; 10]).unwrap();
        page.insert_record(&[2u8; 10]).unwrap();
        page.delete_record(a).unwrap();
        page.compact();
        assert!(page.insert_record(&[3u8; 10]).is_ok());
    }
}
