use buffer::PageGuard;
use common::PageId;
use storage::{PAGE_KIND_HEAP, PAGE_SIZE};

// Header layout: kind tag, then free-space pointer, tuple count, previous
// and next page in the heap chain, and the (unused, format-reserved) lsn.
const KIND_OFFSET: usize = 0;
const FREE_SPACE_OFFSET: usize = 4;
const TUPLE_COUNT_OFFSET: usize = 8;
const PREV_PAGE_OFFSET: usize = 12;
const NEXT_PAGE_OFFSET: usize = 16;
const LSN_OFFSET: usize = 20;

pub(crate) const HEADER_BYTES: usize = 24;
const SLOT_BYTES: usize = 8;

/// High bit of a slot's length word marks the tuple as tombstoned.
const TOMBSTONE_FLAG: u32 = 1 << 31;
const LENGTH_MASK: u32 = TOMBSTONE_FLAG - 1;

/// Largest tuple a heap page can take: everything but the header and the
/// tuple's own slot descriptor.
pub const MAX_TUPLE_BYTES: usize = PAGE_SIZE - HEADER_BYTES - SLOT_BYTES;

/// Typed view over a slotted heap page.
///
/// The slot directory grows up from the header, tuple bytes grow down from
/// the page tail; `free_space_pointer` marks the low edge of the tuple
/// region. Slot indexes are the slot halves of record ids and stay stable
/// for the page's lifetime, so physical reclaim compacts tuple bytes but
/// only zeroes the slot, never removes it.
pub struct TablePage<'a, 'p> {
    guard: &'a PageGuard<'p>,
}

impl<'a, 'p> TablePage<'a, 'p> {
    pub fn new(guard: &'a PageGuard<'p>) -> Self {
        Self { guard }
    }

    /// Format a freshly allocated page as an empty member of the chain.
    pub fn init(&self, prev: PageId) {
        let mut page = self.guard.page_mut();
        page.write_u32(KIND_OFFSET, PAGE_KIND_HEAP);
        page.write_u32(FREE_SPACE_OFFSET, PAGE_SIZE as u32);
        page.write_u32(TUPLE_COUNT_OFFSET, 0);
        page.write_page_id(PREV_PAGE_OFFSET, prev);
        page.write_page_id(NEXT_PAGE_OFFSET, PageId::INVALID);
        page.write_u32(LSN_OFFSET, 0);
    }

    pub fn next_page_id(&self) -> PageId {
        self.guard.page().read_page_id(NEXT_PAGE_OFFSET)
    }

    pub fn set_next_page_id(&self, next: PageId) {
        self.guard.page_mut().write_page_id(NEXT_PAGE_OFFSET, next);
    }

    pub fn prev_page_id(&self) -> PageId {
        self.guard.page().read_page_id(PREV_PAGE_OFFSET)
    }

    /// Size of the slot directory (live, tombstoned, and reclaimed slots).
    pub fn tuple_count(&self) -> u32 {
        self.guard.page().read_u32(TUPLE_COUNT_OFFSET)
    }

    fn free_space_pointer(&self) -> u32 {
        self.guard.page().read_u32(FREE_SPACE_OFFSET)
    }

    fn free_space(&self) -> usize {
        let slots_end = HEADER_BYTES + self.tuple_count() as usize * SLOT_BYTES;
        self.free_space_pointer() as usize - slots_end
    }

    fn slot(&self, index: u32) -> (u32, u32) {
        let base = HEADER_BYTES + index as usize * SLOT_BYTES;
        let page = self.guard.page();
        (page.read_u32(base), page.read_u32(base + 4))
    }

    fn set_slot(&self, index: u32, offset: u32, raw_len: u32) {
        let base = HEADER_BYTES + index as usize * SLOT_BYTES;
        let mut page = self.guard.page_mut();
        page.write_u32(base, offset);
        page.write_u32(base + 4, raw_len);
    }

    fn is_live(raw_len: u32) -> bool {
        raw_len != 0 && raw_len & TOMBSTONE_FLAG == 0
    }

    /// Store one tuple, reusing a reclaimed slot when one exists.
    /// `None` when the page lacks room.
    pub fn insert_tuple(&self, data: &[u8]) -> Option<u32> {
        let count = self.tuple_count();
        let recycled = (0..count).find(|&i| self.slot(i).1 == 0);
        let needed = data.len() + if recycled.is_some() { 0 } else { SLOT_BYTES };
        if self.free_space() < needed {
            return None;
        }

        let new_fsp = self.free_space_pointer() - data.len() as u32;
        {
            let mut page = self.guard.page_mut();
            page.write_bytes(new_fsp as usize, data);
            page.write_u32(FREE_SPACE_OFFSET, new_fsp);
        }
        let slot = match recycled {
            Some(slot) => slot,
            None => {
                self.guard
                    .page_mut()
                    .write_u32(TUPLE_COUNT_OFFSET, count + 1);
                count
            }
        };
        self.set_slot(slot, new_fsp, data.len() as u32);
        Some(slot)
    }

    /// Bytes of a live tuple; `None` for out-of-range, tombstoned, or
    /// reclaimed slots.
    pub fn get_tuple(&self, slot: u32) -> Option<Vec<u8>> {
        if slot >= self.tuple_count() {
            return None;
        }
        let (offset, raw_len) = self.slot(slot);
        if !Self::is_live(raw_len) {
            return None;
        }
        Some(
            self.guard
                .page()
                .read_bytes(offset as usize, raw_len as usize)
                .to_vec(),
        )
    }

    /// Replace a live tuple in place. `false` when the new bytes cannot
    /// fit even after reclaiming the old ones.
    pub fn update_tuple(&self, slot: u32, data: &[u8]) -> bool {
        if slot >= self.tuple_count() {
            return false;
        }
        let (_, raw_len) = self.slot(slot);
        if !Self::is_live(raw_len) {
            return false;
        }
        if self.free_space() + (raw_len as usize) < data.len() {
            return false;
        }

        self.reclaim_bytes(slot);
        let new_fsp = self.free_space_pointer() - data.len() as u32;
        {
            let mut page = self.guard.page_mut();
            page.write_bytes(new_fsp as usize, data);
            page.write_u32(FREE_SPACE_OFFSET, new_fsp);
        }
        self.set_slot(slot, new_fsp, data.len() as u32);
        true
    }

    /// Tombstone a live tuple; it disappears from reads until rolled back.
    pub fn mark_delete(&self, slot: u32) -> bool {
        if slot >= self.tuple_count() {
            return false;
        }
        let (offset, raw_len) = self.slot(slot);
        if !Self::is_live(raw_len) {
            return false;
        }
        self.set_slot(slot, offset, raw_len | TOMBSTONE_FLAG);
        true
    }

    /// Clear a tombstone.
    pub fn rollback_delete(&self, slot: u32) -> bool {
        if slot >= self.tuple_count() {
            return false;
        }
        let (offset, raw_len) = self.slot(slot);
        if raw_len & TOMBSTONE_FLAG == 0 {
            return false;
        }
        self.set_slot(slot, offset, raw_len & LENGTH_MASK);
        true
    }

    /// Physically reclaim a tuple's bytes and zero its slot. Works on live
    /// and tombstoned tuples; `false` for empty slots.
    pub fn apply_delete(&self, slot: u32) -> bool {
        if slot >= self.tuple_count() {
            return false;
        }
        let (_, raw_len) = self.slot(slot);
        if raw_len == 0 {
            return false;
        }
        self.reclaim_bytes(slot);
        self.set_slot(slot, 0, 0);
        true
    }

    /// First live slot at or after `from`.
    pub fn next_live_slot(&self, from: u32) -> Option<u32> {
        (from..self.tuple_count()).find(|&i| Self::is_live(self.slot(i).1))
    }

    /// Shift the tuple region to close the gap a tuple leaves behind and
    /// re-point every slot whose bytes moved. The slot itself is left for
    /// the caller to rewrite.
    fn reclaim_bytes(&self, slot: u32) {
        let (offset, raw_len) = self.slot(slot);
        let len = raw_len & LENGTH_MASK;
        let fsp = self.free_space_pointer();
        {
            let mut page = self.guard.page_mut();
            page.data_mut()
                .copy_within(fsp as usize..offset as usize, (fsp + len) as usize);
            page.write_u32(FREE_SPACE_OFFSET, fsp + len);
        }
        for i in 0..self.tuple_count() {
            if i == slot {
                continue;
            }
            let (other_offset, other_raw) = self.slot(i);
            if other_raw != 0 && other_offset < offset {
                self.set_slot(i, other_offset + len, other_raw);
            }
        }
    }
}
