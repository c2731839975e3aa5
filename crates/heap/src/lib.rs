//! Append-structured table heap over slotted pages.
//!
//! A table is a singly linked chain of heap pages starting at
//! `first_page_id`. Inserts walk the chain first-fit and append a page when
//! every existing one is full; updates are in-place when the bytes fit and
//! report no-fit otherwise so the caller can delete-then-insert. Deletion
//! is two-phase: a tombstone (`mark_delete`) hides the tuple and stays
//! reversible (`rollback_delete`) until `apply_delete` reclaims the bytes.

mod table_page;


pub use table_page::{TablePage, MAX_TUPLE_BYTES};

use buffer::BufferPool;
use common::{DbResult, LockManager, LogManager, PageId, RecordId, Transaction};
use log::debug;
use record::{Row, Schema};
use std::rc::Rc;

/// Heap of serialized rows for one table.
pub struct TableHeap {
    pool: Rc<BufferPool>,
    schema: Rc<Schema>,
    first_page_id: PageId,
    lock_manager: Rc<LockManager>,
    log_manager: Rc<LogManager>,
}

impl TableHeap {
    /// Create an empty heap: allocates and formats the first page.
    pub fn create(
        pool: Rc<BufferPool>,
        schema: Rc<Schema>,
        lock_manager: Rc<LockManager>,
        log_manager: Rc<LogManager>,
    ) -> DbResult<Self> {
        let first_page_id = {
            let guard = pool.new_page()?;
            TablePage::new(&guard).init(PageId::INVALID);
            guard.page_id()
        };
        Ok(Self {
            pool,
            schema,
            first_page_id,
            lock_manager,
            log_manager,
        })
    }

    /// Attach to an existing heap chain.
    pub fn open(
        pool: Rc<BufferPool>,
        schema: Rc<Schema>,
        first_page_id: PageId,
        lock_manager: Rc<LockManager>,
        log_manager: Rc<LogManager>,
    ) -> Self {
        Self {
            pool,
            schema,
            first_page_id,
            lock_manager,
            log_manager,
        }
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.schema
    }

    pub fn lock_manager(&self) -> &Rc<LockManager> {
        &self.lock_manager
    }

    pub fn log_manager(&self) -> &Rc<LogManager> {
        &self.log_manager
    }

    /// Store a row, assigning its record id. `Ok(false)` when the
    /// serialized row can never fit a page.
    pub fn insert_tuple(&self, row: &mut Row, _txn: &Transaction) -> DbResult<bool> {
        if row.serialized_size(&self.schema) > MAX_TUPLE_BYTES {
            return Ok(false);
        }
        let mut bytes = Vec::with_capacity(row.serialized_size(&self.schema));
        row.serialize(&mut bytes, &self.schema)?;

        let mut guard = self.pool.fetch_page(self.first_page_id)?;
        loop {
            enum Step {
                Inserted(u32),
                Follow(PageId),
                Append,
            }
            let step = {
                let page = TablePage::new(&guard);
                match page.insert_tuple(&bytes) {
                    Some(slot) => Step::Inserted(slot),
                    None if page.next_page_id().is_valid() => Step::Follow(page.next_page_id()),
                    None => Step::Append,
                }
            };
            match step {
                Step::Inserted(slot) => {
                    row.set_rid(RecordId::new(guard.page_id(), slot));
                    return Ok(true);
                }
                Step::Follow(next) => {
                    guard = self.pool.fetch_page(next)?;
                }
                Step::Append => {
                    let new_guard = self.pool.new_page()?;
                    debug!(
                        "table heap {} grows with page {}",
                        self.first_page_id.0,
                        new_guard.page_id().0
                    );
                    TablePage::new(&guard).set_next_page_id(new_guard.page_id());
                    let new_page = TablePage::new(&new_guard);
                    new_page.init(guard.page_id());
                    let slot = new_page
                        .insert_tuple(&bytes)
                        .expect("fresh heap page must fit a size-checked tuple");
                    row.set_rid(RecordId::new(new_guard.page_id(), slot));
                    return Ok(true);
                }
            }
        }
    }

    /// Replace the tuple at `rid` in place. `Ok(false)` when the new bytes
    /// do not fit or the slot is not live; the caller then deletes and
    /// re-inserts.
    pub fn update_tuple(&self, row: &mut Row, rid: RecordId, _txn: &Transaction) -> DbResult<bool> {
        let mut bytes = Vec::with_capacity(row.serialized_size(&self.schema));
        row.set_rid(rid);
        row.serialize(&mut bytes, &self.schema)?;

        let guard = self.pool.fetch_page(rid.page_id)?;
        Ok(TablePage::new(&guard).update_tuple(rid.slot, &bytes))
    }

    /// Tombstone the tuple at `rid`. `Ok(false)` when it is not live.
    pub fn mark_delete(&self, rid: RecordId, _txn: &Transaction) -> DbResult<bool> {
        let guard = self.pool.fetch_page(rid.page_id)?;
        Ok(TablePage::new(&guard).mark_delete(rid.slot))
    }

    /// Physically reclaim the tuple at `rid` (tombstoned or not).
    pub fn apply_delete(&self, rid: RecordId, _txn: &Transaction) -> DbResult<()> {
        let guard = self.pool.fetch_page(rid.page_id)?;
        TablePage::new(&guard).apply_delete(rid.slot);
        Ok(())
    }

    /// Undo a tombstone left by `mark_delete`.
    pub fn rollback_delete(&self, rid: RecordId, _txn: &Transaction) -> DbResult<()> {
        let guard = self.pool.fetch_page(rid.page_id)?;
        TablePage::new(&guard).rollback_delete(rid.slot);
        Ok(())
    }

    /// Read the live tuple at `rid`. Tombstoned and reclaimed slots read
    /// as absent.
    pub fn get_tuple(&self, rid: RecordId, _txn: &Transaction) -> DbResult<Option<Row>> {
        let guard = self.pool.fetch_page(rid.page_id)?;
        let Some(bytes) = TablePage::new(&guard).get_tuple(rid.slot) else {
            return Ok(None);
        };
        let mut row = Row::deserialize(&mut bytes.as_slice(), &self.schema)?;
        row.set_rid(rid);
        Ok(Some(row))
    }

    /// Iterate live rows in (page, slot) order.
    pub fn iter(&self) -> TableIterator<'_> {
        TableIterator {
            heap: self,
            page_id: self.first_page_id,
            next_slot: 0,
            failed: false,
        }
    }

    /// Delete every page of the chain. The heap is unusable afterwards.
    pub fn delete_table(&self) -> DbResult<()> {
        let mut page_id = self.first_page_id;
        while page_id.is_valid() {
            let next = {
                let guard = self.pool.fetch_page(page_id)?;
                TablePage::new(&guard).next_page_id()
            };
            self.pool.delete_page(page_id)?;
            page_id = next;
        }
        Ok(())
    }
}

/// Forward scan over a heap's live tuples.
///
/// Borrowing the heap keeps the chain structurally stable for the scan's
/// lifetime; each step pins the current page only while decoding one row.
pub struct TableIterator<'a> {
    heap: &'a TableHeap,
    page_id: PageId,
    next_slot: u32,
    failed: bool,
}

impl TableIterator<'_> {
    fn step(&mut self) -> DbResult<Option<Row>> {
        while self.page_id.is_valid() {
            let guard = self.heap.pool.fetch_page(self.page_id)?;
            let page = TablePage::new(&guard);
            if let Some(slot) = page.next_live_slot(self.next_slot) {
                let rid = RecordId::new(self.page_id, slot);
                let bytes = page
                    .get_tuple(slot)
                    .expect("live slot must yield tuple bytes");
                let mut row = Row::deserialize(&mut bytes.as_slice(), &self.heap.schema)?;
                row.set_rid(rid);
                self.next_slot = slot + 1;
                return Ok(Some(row));
            }
            self.page_id = page.next_page_id();
            self.next_slot = 0;
        }
        Ok(None)
    }
}

impl Iterator for TableIterator<'_> {
    type Item = DbResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.step() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
