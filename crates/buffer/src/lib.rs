//! Buffer pool manager for page-level caching and I/O.
//!
//! The pool keeps a fixed array of frames, maps resident page ids to
//! frames, and enforces pinning:
//! - `fetch_page`/`new_page` return a [`PageGuard`] that holds a pin and
//!   releases it on drop
//! - a pinned frame is never evicted; victims come from the free list
//!   first, then from the configured [`Replacer`]
//! - dirty frames are written back before their frame is reused
//!
//! The engine is single-threaded cooperative, so the pool hands out guards
//! through `&self` with interior mutability rather than locks.
//!
//! # Example
//!
//! ```no_run
//! use buffer::BufferPool;
//! use common::ReplacerPolicy;
//! use storage::DiskManager;
//!
//! let disk = DiskManager::open("/tmp/example.db").unwrap();
//! let pool = BufferPool::new(64, disk, ReplacerPolicy::Lru);
//!
//! let page_id = {
//!     let guard = pool.new_page().unwrap();
//!     guard.page_mut().write_u32(0, 42);
//!     guard.page_id()
//! }; // guard dropped: pin released, dirty bit recorded
//!
//! let guard = pool.fetch_page(page_id).unwrap();
//! assert_eq!(guard.page().read_u32(0), 42);
//! ```

mod replacer;

#[cfg(test)]
mod tests;

pub use replacer::{build_replacer, ClockReplacer, LruKReplacer, LruReplacer, Replacer};

use common::{DbError, DbResult, FrameId, PageId, ReplacerPolicy};
use hashbrown::HashMap;
use log::debug;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::VecDeque;
use std::rc::Rc;
use storage::{DiskManager, Page};

/// One slot of the pool: a cached page plus its bookkeeping.
struct Frame {
    page_id: PageId,
    pin_count: u32,
    dirty: bool,
    page: Page,
}

impl Frame {
    fn empty() -> Self {
        Self {
            page_id: PageId::INVALID,
            pin_count: 0,
            dirty: false,
            page: Page::new(),
        }
    }
}

/// Fixed-capacity page cache with pinning and write-back.
pub struct BufferPool {
    frames: Vec<Rc<RefCell<Frame>>>,
    page_table: RefCell<HashMap<PageId, FrameId>>,
    free_list: RefCell<VecDeque<FrameId>>,
    replacer: RefCell<Box<dyn Replacer>>,
    disk: RefCell<DiskManager>,
}

impl BufferPool {
    /// Build a pool of `pool_size` frames over the given disk manager,
    /// with the replacement policy fixed for the pool's lifetime.
    pub fn new(pool_size: usize, disk: DiskManager, policy: ReplacerPolicy) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");
        Self {
            frames: (0..pool_size)
                .map(|_| Rc::new(RefCell::new(Frame::empty())))
                .collect(),
            page_table: RefCell::new(HashMap::new()),
            free_list: RefCell::new((0..pool_size).map(FrameId).collect()),
            replacer: RefCell::new(build_replacer(policy)),
            disk: RefCell::new(disk),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    /// Fetch a page, pinning its frame. Misses read through the disk
    /// manager; `Err(PoolExhausted)` when no frame can be freed.
    pub fn fetch_page(&self, page_id: PageId) -> DbResult<PageGuard<'_>> {
        debug_assert!(page_id.is_valid(), "fetch of the invalid page id");

        let resident = self.page_table.borrow().get(&page_id).copied();
        if let Some(frame_id) = resident {
            self.frames[frame_id.0].borrow_mut().pin_count += 1;
            self.replacer.borrow_mut().pin(frame_id);
            return Ok(self.guard(frame_id, page_id));
        }

        let frame_id = self.take_frame()?;
        {
            let mut frame = self.frames[frame_id.0].borrow_mut();
            if let Err(e) = self.disk.borrow_mut().read_page(page_id, &mut frame.page) {
                drop(frame);
                self.free_list.borrow_mut().push_back(frame_id);
                return Err(e);
            }
            frame.page_id = page_id;
            frame.pin_count = 1;
            frame.dirty = false;
        }
        self.page_table.borrow_mut().insert(page_id, frame_id);
        self.replacer.borrow_mut().pin(frame_id);
        Ok(self.guard(frame_id, page_id))
    }

    /// Allocate a fresh page on disk and pin it in a zeroed frame.
    pub fn new_page(&self) -> DbResult<PageGuard<'_>> {
        let frame_id = self.take_frame()?;
        let page_id = match self.disk.borrow_mut().allocate_page() {
            Ok(pid) => pid,
            Err(e) => {
                self.free_list.borrow_mut().push_back(frame_id);
                return Err(e);
            }
        };
        {
            let mut frame = self.frames[frame_id.0].borrow_mut();
            frame.page.reset();
            frame.page_id = page_id;
            frame.pin_count = 1;
            // A recycled page id may still have stale bytes on disk; the
            // zeroed frame must win on eviction.
            frame.dirty = true;
        }
        self.page_table.borrow_mut().insert(page_id, frame_id);
        self.replacer.borrow_mut().pin(frame_id);
        Ok(self.guard(frame_id, page_id))
    }

    /// Drop one pin, OR-ing in the caller's dirty bit. The frame becomes
    /// evictable when its pin count reaches zero. `false` when the page is
    /// not resident.
    ///
    /// [`PageGuard`] calls this on drop; unpinning a page with no
    /// outstanding pins is an invariant break and panics.
    pub fn unpin_page(&self, page_id: PageId, dirty: bool) -> bool {
        let Some(frame_id) = self.page_table.borrow().get(&page_id).copied() else {
            return false;
        };
        let mut frame = self.frames[frame_id.0].borrow_mut();
        assert!(
            frame.pin_count > 0,
            "pin-count underflow on page {}",
            page_id.0
        );
        frame.dirty |= dirty;
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            self.replacer.borrow_mut().unpin(frame_id);
        }
        true
    }

    /// Write a resident page to disk regardless of its dirty bit and mark
    /// it clean. `Ok(false)` when the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> DbResult<bool> {
        let Some(frame_id) = self.page_table.borrow().get(&page_id).copied() else {
            return Ok(false);
        };
        let mut frame = self.frames[frame_id.0].borrow_mut();
        self.disk.borrow_mut().write_page(page_id, &frame.page)?;
        frame.dirty = false;
        Ok(true)
    }

    /// Write back every resident page (clean-shutdown path).
    pub fn flush_all(&self) -> DbResult<()> {
        let resident: Vec<PageId> = self.page_table.borrow().keys().copied().collect();
        for page_id in resident {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Drop a page from the pool and deallocate it on disk. `Ok(false)`
    /// while the page is pinned. A non-resident page is still deallocated.
    pub fn delete_page(&self, page_id: PageId) -> DbResult<bool> {
        let resident = self.page_table.borrow().get(&page_id).copied();
        let Some(frame_id) = resident else {
            self.disk.borrow_mut().deallocate_page(page_id)?;
            return Ok(true);
        };

        {
            let mut frame = self.frames[frame_id.0].borrow_mut();
            if frame.pin_count > 0 {
                return Ok(false);
            }
            if frame.dirty {
                self.disk.borrow_mut().write_page(page_id, &frame.page)?;
                frame.dirty = false;
            }
            frame.page.reset();
            frame.page_id = PageId::INVALID;
        }
        self.page_table.borrow_mut().remove(&page_id);
        // The frame sat in the replacer as evictable; reclaim it for the
        // free list only.
        self.replacer.borrow_mut().pin(frame_id);
        self.free_list.borrow_mut().push_back(frame_id);
        self.disk.borrow_mut().deallocate_page(page_id)?;
        Ok(true)
    }

    /// Whether `page_id`'s bit is clear in the on-disk bitmap.
    pub fn is_page_free(&self, page_id: PageId) -> DbResult<bool> {
        self.disk.borrow_mut().is_page_free(page_id)
    }

    /// Whether the page currently occupies a frame.
    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.page_table.borrow().contains_key(&page_id)
    }

    /// Pin count of a resident page; `None` when not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let frame_id = self.page_table.borrow().get(&page_id).copied()?;
        Some(self.frames[frame_id.0].borrow().pin_count)
    }

    /// Free a frame for reuse: free list first (no eviction cost), then a
    /// replacer victim with dirty write-back.
    fn take_frame(&self) -> DbResult<FrameId> {
        if let Some(frame_id) = self.free_list.borrow_mut().pop_front() {
            return Ok(frame_id);
        }
        let Some(frame_id) = self.replacer.borrow_mut().victim() else {
            return Err(DbError::PoolExhausted);
        };

        let mut frame = self.frames[frame_id.0].borrow_mut();
        assert_eq!(
            frame.pin_count, 0,
            "replacer victimized pinned frame {}",
            frame_id.0
        );
        if frame.dirty {
            debug!(
                "evicting dirty page {} from frame {}",
                frame.page_id.0, frame_id.0
            );
            self.disk.borrow_mut().write_page(frame.page_id, &frame.page)?;
            frame.dirty = false;
        }
        self.page_table.borrow_mut().remove(&frame.page_id);
        frame.page_id = PageId::INVALID;
        Ok(frame_id)
    }

    fn guard(&self, frame_id: FrameId, page_id: PageId) -> PageGuard<'_> {
        PageGuard {
            pool: self,
            frame: Rc::clone(&self.frames[frame_id.0]),
            page_id,
            dirty: Cell::new(false),
        }
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all() {
            log::warn!("flush on pool teardown failed: {e}");
        }
    }
}

/// Scoped pin on one page.
///
/// Holds the frame pinned for its lifetime and releases exactly one pin on
/// drop, carrying the dirty bit accumulated through [`PageGuard::page_mut`]
/// and [`PageGuard::mark_dirty`]. Borrows of the page bytes must not be
/// held across calls back into the pool.
pub struct PageGuard<'a> {
    pool: &'a BufferPool,
    frame: Rc<RefCell<Frame>>,
    page_id: PageId,
    dirty: Cell<bool>,
}

impl PageGuard<'_> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Read access to the page bytes.
    pub fn page(&self) -> Ref<'_, Page> {
        Ref::map(self.frame.borrow(), |f| &f.page)
    }

    /// Write access to the page bytes; marks the guard dirty.
    pub fn page_mut(&self) -> RefMut<'_, Page> {
        self.dirty.set(true);
        RefMut::map(self.frame.borrow_mut(), |f| &mut f.page)
    }

    /// Record a mutation made through `page()`-adjacent bookkeeping so the
    /// final unpin carries the dirty bit.
    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, self.dirty.get());
    }
}
