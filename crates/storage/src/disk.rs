use crate::bitmap::{BitmapPage, BITS_PER_BITMAP};
use crate::{Page, PAGE_SIZE};
use common::{DbError, DbResult, PageId};
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Physical pages per extent: one bitmap plus the data pages it governs.
const EXTENT_PAGES: u64 = BITS_PER_BITMAP as u64 + 1;

/// Owns the database file and the free-page bitmaps.
///
/// Logical page `p` lives in extent `e = p / B` at intra-extent index
/// `i = p % B` (`B` = [`BITS_PER_BITMAP`]); its byte offset is
/// `(e·(B+1) + 1 + i) · PAGE_SIZE`, and extent `e`'s bitmap occupies
/// `e·(B+1) · PAGE_SIZE`. Allocation scans extents in order and appends a
/// fresh extent when every bitmap is full.
#[derive(Debug)]
pub struct DiskManager {
    file: File,
    path: PathBuf,
}

impl DiskManager {
    /// Open a database file, creating and bootstrapping it when missing.
    ///
    /// A fresh file gets extent 0 with data pages 0 (catalog metadata) and
    /// 1 (index-roots registry) pre-allocated and zeroed.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let mut disk = Self { file, path };

        if disk.file_len()? == 0 {
            disk.bootstrap()?;
        }
        Ok(disk)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Claim the lowest free page id, growing the file by a new extent if
    /// every existing bitmap is full.
    pub fn allocate_page(&mut self) -> DbResult<PageId> {
        let extents = self.num_extents()?;
        for extent in 0..extents {
            let mut bitmap_page = self.read_bitmap(extent)?;
            let mut bitmap = BitmapPage::new(&mut bitmap_page);
            if bitmap.is_full() {
                continue;
            }
            let offset = bitmap
                .allocate()
                .expect("non-full bitmap must yield a free bit");
            self.write_bitmap(extent, &bitmap_page)?;
            let page_id = PageId(extent as u32 * BITS_PER_BITMAP + offset);
            self.ensure_covers(page_id)?;
            return Ok(page_id);
        }

        // All extents full: append a new one.
        debug!("growing database file to extent {extents}");
        let mut bitmap_page = Page::new();
        let offset = BitmapPage::new(&mut bitmap_page)
            .allocate()
            .expect("fresh bitmap must yield a free bit");
        self.write_bitmap(extents, &bitmap_page)?;
        let page_id = PageId(extents as u32 * BITS_PER_BITMAP + offset);
        self.ensure_covers(page_id)?;
        Ok(page_id)
    }

    /// Release a page id back to its bitmap. Double-free is corruption.
    pub fn deallocate_page(&mut self, page_id: PageId) -> DbResult<()> {
        let (extent, offset) = split_page_id(page_id);
        let mut bitmap_page = self.read_bitmap(extent)?;
        if !BitmapPage::new(&mut bitmap_page).deallocate(offset) {
            return Err(DbError::Corrupt(format!(
                "double free of page {}",
                page_id.0
            )));
        }
        self.write_bitmap(extent, &bitmap_page)?;
        Ok(())
    }

    /// Whether `page_id`'s bit is clear in its owning bitmap. Pages in
    /// extents the file has never reached count as free.
    pub fn is_page_free(&mut self, page_id: PageId) -> DbResult<bool> {
        let (extent, offset) = split_page_id(page_id);
        if extent >= self.num_extents()? {
            return Ok(true);
        }
        let mut bitmap_page = self.read_bitmap(extent)?;
        Ok(BitmapPage::new(&mut bitmap_page).is_free(offset))
    }

    /// Read one whole data page. Reading past the end of the file is a
    /// fatal I/O error.
    pub fn read_page(&mut self, page_id: PageId, page: &mut Page) -> DbResult<()> {
        self.read_physical(data_page_physical(page_id), page)
    }

    /// Write one whole data page.
    pub fn write_page(&mut self, page_id: PageId, page: &Page) -> DbResult<()> {
        self.write_physical(data_page_physical(page_id), page)
    }

    /// Lay down extent 0 with the catalog-meta and index-roots pages
    /// already allocated.
    fn bootstrap(&mut self) -> DbResult<()> {
        debug!("bootstrapping fresh database at {}", self.path.display());
        let mut bitmap_page = Page::new();
        {
            let mut bitmap = BitmapPage::new(&mut bitmap_page);
            bitmap.allocate();
            bitmap.allocate();
        }
        self.write_bitmap(0, &bitmap_page)?;
        let zeroed = Page::new();
        self.write_physical(1, &zeroed)?;
        self.write_physical(2, &zeroed)?;
        Ok(())
    }

    fn file_len(&self) -> DbResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Extents the file currently reaches into (a partially written extent
    /// still counts).
    fn num_extents(&self) -> DbResult<u64> {
        let pages = self.file_len()?.div_ceil(PAGE_SIZE as u64);
        Ok(pages.div_ceil(EXTENT_PAGES))
    }

    /// Grow the file so the given data page is readable, without touching
    /// bytes already present.
    fn ensure_covers(&mut self, page_id: PageId) -> DbResult<()> {
        let end = (data_page_physical(page_id) + 1) * PAGE_SIZE as u64;
        if self.file_len()? < end {
            self.file.set_len(end).map_err(|_| DbError::OutOfSpace)?;
        }
        Ok(())
    }

    fn read_bitmap(&mut self, extent: u64) -> DbResult<Page> {
        let mut page = Page::new();
        self.read_physical(extent * EXTENT_PAGES, &mut page)?;
        Ok(page)
    }

    fn write_bitmap(&mut self, extent: u64, page: &Page) -> DbResult<()> {
        self.write_physical(extent * EXTENT_PAGES, page)
    }

    fn read_physical(&mut self, physical: u64, page: &mut Page) -> DbResult<()> {
        self.file
            .seek(SeekFrom::Start(physical * PAGE_SIZE as u64))?;
        self.file.read_exact(page.data_mut().as_mut_slice())?;
        Ok(())
    }

    fn write_physical(&mut self, physical: u64, page: &Page) -> DbResult<()> {
        self.file
            .seek(SeekFrom::Start(physical * PAGE_SIZE as u64))?;
        self.file.write_all(page.data().as_slice())?;
        Ok(())
    }
}

fn split_page_id(page_id: PageId) -> (u64, u32) {
    let extent = page_id.0 / BITS_PER_BITMAP;
    let offset = page_id.0 % BITS_PER_BITMAP;
    (extent as u64, offset)
}

/// Physical page index of a logical data page.
fn data_page_physical(page_id: PageId) -> u64 {
    let (extent, offset) = split_page_id(page_id);
    extent * EXTENT_PAGES + 1 + offset as u64
}
