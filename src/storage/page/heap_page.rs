use crate::access::tuple::{Tuple, TupleId};
use crate::access::value::{deserialize_tuple, serialize_tuple, Schema};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{PageId, PAGE_SIZE};
use crate::transaction::TransactionId;
use std::sync::Arc;

/// One fixed-size block in slotted format.
///
/// Layout: `[occupancy bitmap][slot 0][slot 1]...[slot k-1]`, where every
/// slot holds exactly one serialized tuple of the schema's fixed width.
/// The slot count is derived once from the block size and tuple width:
/// each slot costs `width * 8 + 1` bits (payload plus its bitmap bit).
///
/// A page also carries two pieces of transient state the buffer pool
/// relies on: the dirty marker (which transaction last modified it) and
/// the before-image, a frozen copy of the bytes as of the last clean
/// state. The before-image is captured at load time and refreshed only
/// after a commit flush; abort restores it in place.
pub struct HeapPage {
    pid: PageId,
    schema: Arc<Schema>,
    slot_count: u16,
    header_len: usize,
    data: Box<[u8; PAGE_SIZE]>,
    before: Box<[u8; PAGE_SIZE]>,
    dirty: Option<TransactionId>,
}

/// Number of slots that fit in one page for the given tuple width.
pub fn slots_per_page(tuple_width: usize) -> u16 {
    ((PAGE_SIZE * 8) / (tuple_width * 8 + 1)) as u16
}

fn bitmap_len(slot_count: u16) -> usize {
    (slot_count as usize).div_ceil(8)
}

impl HeapPage {
    /// A fresh page with every slot empty. Used for newly appended blocks.
    pub fn empty(pid: PageId, schema: Arc<Schema>) -> Self {
        let slot_count = slots_per_page(schema.tuple_width());
        let header_len = bitmap_len(slot_count);
        Self {
            pid,
            schema,
            slot_count,
            header_len,
            data: Box::new([0u8; PAGE_SIZE]),
            before: Box::new([0u8; PAGE_SIZE]),
            dirty: None,
        }
    }

    /// Reconstructs a page from bytes read off disk. The before-image is
    /// snapshotted from the same bytes.
    pub fn from_bytes(pid: PageId, schema: Arc<Schema>, data: Box<[u8; PAGE_SIZE]>) -> Self {
        let slot_count = slots_per_page(schema.tuple_width());
        let header_len = bitmap_len(slot_count);
        let before = data.clone();
        Self {
            pid,
            schema,
            slot_count,
            header_len,
            data,
            before,
            dirty: None,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.pid
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn slot_count(&self) -> u16 {
        self.slot_count
    }

    /// Raw serialized form, suitable for positioned block I/O.
    pub fn bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    pub fn is_slot_used(&self, slot: u16) -> bool {
        if slot >= self.slot_count {
            return false;
        }
        let byte = self.data[slot as usize / 8];
        byte & (1 << (slot % 8)) != 0
    }

    fn set_slot_used(&mut self, slot: u16, used: bool) {
        let byte = &mut self.data[slot as usize / 8];
        if used {
            *byte |= 1 << (slot % 8);
        } else {
            *byte &= !(1 << (slot % 8));
        }
    }

    pub fn free_slot_count(&self) -> u16 {
        (0..self.slot_count)
            .filter(|&slot| !self.is_slot_used(slot))
            .count() as u16
    }

    fn slot_offset(&self, slot: u16) -> usize {
        self.header_len + slot as usize * self.schema.tuple_width()
    }

    /// Writes the tuple into the lowest-indexed free slot and marks it
    /// occupied. Fails with `PageFull` when no slot is free; callers are
    /// expected to check `free_slot_count` first.
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> StorageResult<u16> {
        let slot = (0..self.slot_count)
            .find(|&slot| !self.is_slot_used(slot))
            .ok_or(StorageError::PageFull)?;

        let bytes = serialize_tuple(tuple.values(), &self.schema)?;
        let offset = self.slot_offset(slot);
        self.data[offset..offset + bytes.len()].copy_from_slice(&bytes);
        self.set_slot_used(slot, true);
        Ok(slot)
    }

    /// Clears the occupancy bit for the given slot. The payload bytes are
    /// left in place; the bitmap alone decides liveness.
    pub fn delete_tuple(&mut self, slot: u16) -> StorageResult<()> {
        if slot >= self.slot_count {
            return Err(StorageError::InvalidSlot {
                slot,
                slots: self.slot_count,
            });
        }
        if !self.is_slot_used(slot) {
            return Err(StorageError::SlotEmpty { slot });
        }
        self.set_slot_used(slot, false);
        Ok(())
    }

    /// Decodes the tuple stored in the given slot.
    pub fn tuple(&self, slot: u16) -> StorageResult<Tuple> {
        if slot >= self.slot_count {
            return Err(StorageError::InvalidSlot {
                slot,
                slots: self.slot_count,
            });
        }
        if !self.is_slot_used(slot) {
            return Err(StorageError::SlotEmpty { slot });
        }
        let offset = self.slot_offset(slot);
        let values = deserialize_tuple(
            &self.data[offset..offset + self.schema.tuple_width()],
            &self.schema,
        )?;
        Ok(Tuple::with_id(TupleId::new(self.pid, slot), values))
    }

    /// Lazy iteration over occupied slots in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = StorageResult<Tuple>> + '_ {
        (0..self.slot_count)
            .filter(|&slot| self.is_slot_used(slot))
            .map(move |slot| self.tuple(slot))
    }

    /// The transaction that last dirtied this page, if any.
    pub fn dirty(&self) -> Option<TransactionId> {
        self.dirty
    }

    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirty = tid;
    }

    /// Refreshes the before-image from the current content. Called at the
    /// points where the page is known clean on disk: after a commit flush.
    pub fn snapshot_before_image(&mut self) {
        self.before.copy_from_slice(self.data.as_ref());
    }

    /// Rolls the content back to the before-image and clears the dirty
    /// marker. The page stays resident; only its bytes change.
    pub fn restore_before_image(&mut self) {
        self.data.copy_from_slice(self.before.as_ref());
        self.dirty = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::{DataType, Value};
    use crate::storage::page::TableId;

    fn test_schema() -> Arc<Schema> {
        Schema::new(vec![DataType::Int32, DataType::Text(16)])
    }

    fn test_page() -> HeapPage {
        HeapPage::empty(PageId::new(TableId(1), 0), test_schema())
    }

    fn int_tuple(v: i32) -> Tuple {
        Tuple::new(vec![Value::Int(v), Value::Text(format!("row-{}", v))])
    }

    #[test]
    fn test_slot_capacity_formula() {
        // width 24 -> floor(4096 * 8 / (24 * 8 + 1)) = 169 slots
        assert_eq!(slots_per_page(24), 169);
        // bitmap (22 bytes) + 169 slots of 24 bytes must fit in one block
        assert!(bitmap_len(169) + 169 * 24 <= PAGE_SIZE);
    }

    #[test]
    fn test_fresh_page_is_empty_and_clean() {
        let page = test_page();
        assert_eq!(page.free_slot_count(), page.slot_count());
        assert!(page.dirty().is_none());
        assert_eq!(page.iter().count(), 0);
    }

    #[test]
    fn test_insert_and_read_back() -> StorageResult<()> {
        let mut page = test_page();

        let slot0 = page.insert_tuple(&int_tuple(1))?;
        let slot1 = page.insert_tuple(&int_tuple(2))?;
        assert_eq!(slot0, 0);
        assert_eq!(slot1, 1);

        let tuple = page.tuple(0)?;
        assert_eq!(tuple.values()[0], Value::Int(1));
        assert_eq!(tuple.id(), Some(TupleId::new(page.page_id(), 0)));

        Ok(())
    }

    #[test]
    fn test_insert_reuses_lowest_free_slot() -> StorageResult<()> {
        let mut page = test_page();
        page.insert_tuple(&int_tuple(1))?;
        page.insert_tuple(&int_tuple(2))?;
        page.insert_tuple(&int_tuple(3))?;

        page.delete_tuple(1)?;
        let slot = page.insert_tuple(&int_tuple(4))?;
        assert_eq!(slot, 1);

        Ok(())
    }

    #[test]
    fn test_page_full() -> StorageResult<()> {
        let mut page = test_page();
        for i in 0..page.slot_count() {
            page.insert_tuple(&int_tuple(i as i32))?;
        }
        assert_eq!(page.free_slot_count(), 0);

        let result = page.insert_tuple(&int_tuple(-1));
        assert!(matches!(result, Err(StorageError::PageFull)));

        Ok(())
    }

    #[test]
    fn test_delete_errors() -> StorageResult<()> {
        let mut page = test_page();
        page.insert_tuple(&int_tuple(1))?;

        page.delete_tuple(0)?;
        assert!(matches!(
            page.delete_tuple(0),
            Err(StorageError::SlotEmpty { slot: 0 })
        ));
        assert!(matches!(
            page.delete_tuple(page.slot_count()),
            Err(StorageError::InvalidSlot { .. })
        ));

        Ok(())
    }

    #[test]
    fn test_iter_skips_deleted_in_slot_order() -> StorageResult<()> {
        let mut page = test_page();
        for i in 0..5 {
            page.insert_tuple(&int_tuple(i))?;
        }
        page.delete_tuple(1)?;
        page.delete_tuple(3)?;

        let values: Vec<i32> = page
            .iter()
            .map(|t| match t.unwrap().values()[0] {
                Value::Int(v) => v,
                _ => panic!("unexpected value type"),
            })
            .collect();
        assert_eq!(values, vec![0, 2, 4]);

        Ok(())
    }

    #[test]
    fn test_serialization_roundtrip() -> StorageResult<()> {
        let mut page = test_page();
        page.insert_tuple(&int_tuple(7))?;
        page.insert_tuple(&int_tuple(8))?;

        let reloaded = HeapPage::from_bytes(
            page.page_id(),
            test_schema(),
            Box::new(*page.bytes()),
        );
        assert_eq!(reloaded.free_slot_count(), page.free_slot_count());
        assert_eq!(reloaded.tuple(0)?.values()[0], Value::Int(7));
        assert_eq!(reloaded.tuple(1)?.values()[0], Value::Int(8));

        Ok(())
    }

    #[test]
    fn test_before_image_restore() -> StorageResult<()> {
        let mut page = test_page();
        page.insert_tuple(&int_tuple(1))?;
        page.snapshot_before_image();
        let snapshot = *page.bytes();

        page.insert_tuple(&int_tuple(2))?;
        page.mark_dirty(Some(TransactionId(9)));
        assert_ne!(&snapshot[..], &page.bytes()[..]);

        page.restore_before_image();
        assert_eq!(&snapshot[..], &page.bytes()[..]);
        assert!(page.dirty().is_none());
        assert!(matches!(page.tuple(1), Err(StorageError::SlotEmpty { .. })));

        Ok(())
    }

    #[test]
    fn test_mutation_does_not_disturb_before_image() -> StorageResult<()> {
        let mut page = test_page();
        let clean = *page.bytes();

        page.insert_tuple(&int_tuple(1))?;
        page.insert_tuple(&int_tuple(2))?;
        page.delete_tuple(0)?;

        page.restore_before_image();
        assert_eq!(&clean[..], &page.bytes()[..]);

        Ok(())
    }
}
