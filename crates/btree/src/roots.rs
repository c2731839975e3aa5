use buffer::PageGuard;
use common::{IndexId, PageId};
use storage::PAGE_SIZE;

/// Fixed location of the index-roots registry.
pub const INDEX_ROOTS_PAGE_ID: PageId = PageId(1);

/// Leading magic of the registry page.
pub const INDEX_ROOTS_MAGIC: u32 = 0x494E_4458;

const MAGIC_OFFSET: usize = 0;
const COUNT_OFFSET: usize = 4;
const ENTRIES_OFFSET: usize = 8;
const ENTRY_BYTES: usize = 8;

/// Entries one page can hold.
pub const MAX_ROOT_ENTRIES: u32 = ((PAGE_SIZE - ENTRIES_OFFSET) / ENTRY_BYTES) as u32;

/// Typed view over the index-roots registry (page 1): the mapping from
/// index id to current root page id.
///
/// Every root change lands here through a single-page write, so the
/// registry is always consistent with the last flushed tree shape.
pub struct IndexRootsPage<'a, 'p> {
    guard: &'a PageGuard<'p>,
}

impl<'a, 'p> IndexRootsPage<'a, 'p> {
    pub fn new(guard: &'a PageGuard<'p>) -> Self {
        Self { guard }
    }

    /// Stamp an empty registry (fresh-database bootstrap).
    pub fn init(&self) {
        let mut page = self.guard.page_mut();
        page.write_u32(MAGIC_OFFSET, INDEX_ROOTS_MAGIC);
        page.write_u32(COUNT_OFFSET, 0);
    }

    pub fn is_initialized(&self) -> bool {
        self.guard.page().read_u32(MAGIC_OFFSET) == INDEX_ROOTS_MAGIC
    }

    pub fn count(&self) -> u32 {
        self.guard.page().read_u32(COUNT_OFFSET)
    }

    fn entry_offset(index: u32) -> usize {
        ENTRIES_OFFSET + index as usize * ENTRY_BYTES
    }

    fn entry(&self, index: u32) -> (IndexId, PageId) {
        let offset = Self::entry_offset(index);
        let page = self.guard.page();
        (
            IndexId(page.read_u32(offset)),
            page.read_page_id(offset + 4),
        )
    }

    fn position(&self, index_id: IndexId) -> Option<u32> {
        (0..self.count()).find(|&i| self.entry(i).0 == index_id)
    }

    /// Current root of an index; `None` when the index is unregistered.
    pub fn get_root(&self, index_id: IndexId) -> Option<PageId> {
        self.position(index_id).map(|i| self.entry(i).1)
    }

    /// Register a new index. `false` when it already has an entry or the
    /// page is full.
    pub fn insert(&self, index_id: IndexId, root: PageId) -> bool {
        if self.position(index_id).is_some() || self.count() >= MAX_ROOT_ENTRIES {
            return false;
        }
        let at = self.count();
        let offset = Self::entry_offset(at);
        let mut page = self.guard.page_mut();
        page.write_u32(offset, index_id.0);
        page.write_page_id(offset + 4, root);
        page.write_u32(COUNT_OFFSET, at + 1);
        true
    }

    /// Repoint an existing entry. `false` when the index is unregistered.
    pub fn update(&self, index_id: IndexId, root: PageId) -> bool {
        let Some(at) = self.position(index_id) else {
            return false;
        };
        self.guard
            .page_mut()
            .write_page_id(Self::entry_offset(at) + 4, root);
        true
    }

    /// Drop an entry, compacting the tail over it.
    pub fn remove(&self, index_id: IndexId) -> bool {
        let Some(at) = self.position(index_id) else {
            return false;
        };
        let count = self.count();
        for i in at + 1..count {
            let (id, root) = self.entry(i);
            let offset = Self::entry_offset(i - 1);
            let mut page = self.guard.page_mut();
            page.write_u32(offset, id.0);
            page.write_page_id(offset + 4, root);
        }
        self.guard.page_mut().write_u32(COUNT_OFFSET, count - 1);
        true
    }
}
