use buffer::PageGuard;
use common::{DbError, DbResult, IndexId, PageId, TableId};
use storage::PAGE_SIZE;

/// Fixed location of the catalog metadata page.
pub const CATALOG_META_PAGE_ID: PageId = PageId(0);

/// Leading magic of the catalog metadata page.
pub const CATALOG_META_MAGIC: u32 = 0x5EED;

/// Leading magic of a per-index metadata page.
pub const INDEX_META_MAGIC: u32 = 0x4958_4D44;

const MAGIC_OFFSET: usize = 0;
const TABLE_COUNT_OFFSET: usize = 4;
const INDEX_COUNT_OFFSET: usize = 8;
const PAIRS_OFFSET: usize = 12;
const PAIR_BYTES: usize = 8;

/// In-memory form of page 0: which heaps and index-meta pages exist.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CatalogMeta {
    pub tables: Vec<(TableId, PageId)>,
    pub indexes: Vec<(IndexId, PageId)>,
}

/// Typed view over the catalog metadata page (page 0).
///
/// The page holds the magic, both counts, then `(table_id,
/// first_heap_page_id)` pairs followed by `(index_id, index_meta_page_id)`
/// pairs, everything little-endian.
pub struct CatalogMetaPage<'a, 'p> {
    guard: &'a PageGuard<'p>,
}

impl<'a, 'p> CatalogMetaPage<'a, 'p> {
    pub fn new(guard: &'a PageGuard<'p>) -> Self {
        Self { guard }
    }

    /// Stamp an empty catalog (fresh-database bootstrap).
    pub fn init(&self) {
        let mut page = self.guard.page_mut();
        page.write_u32(MAGIC_OFFSET, CATALOG_META_MAGIC);
        page.write_u32(TABLE_COUNT_OFFSET, 0);
        page.write_u32(INDEX_COUNT_OFFSET, 0);
    }

    pub fn is_initialized(&self) -> bool {
        self.guard.page().read_u32(MAGIC_OFFSET) == CATALOG_META_MAGIC
    }

    pub fn read(&self) -> DbResult<CatalogMeta> {
        if !self.is_initialized() {
            return Err(DbError::Corrupt("catalog meta page has no magic".into()));
        }
        let page = self.guard.page();
        let table_count = page.read_u32(TABLE_COUNT_OFFSET) as usize;
        let index_count = page.read_u32(INDEX_COUNT_OFFSET) as usize;

        let mut tables = Vec::with_capacity(table_count);
        let mut offset = PAIRS_OFFSET;
        for _ in 0..table_count {
            tables.push((TableId(page.read_u32(offset)), page.read_page_id(offset + 4)));
            offset += PAIR_BYTES;
        }
        let mut indexes = Vec::with_capacity(index_count);
        for _ in 0..index_count {
            indexes.push((IndexId(page.read_u32(offset)), page.read_page_id(offset + 4)));
            offset += PAIR_BYTES;
        }
        Ok(CatalogMeta { tables, indexes })
    }

    pub fn write(&self, meta: &CatalogMeta) -> DbResult<()> {
        let pairs = meta.tables.len() + meta.indexes.len();
        if PAIRS_OFFSET + pairs * PAIR_BYTES > PAGE_SIZE {
            return Err(DbError::Storage("catalog meta page overflow".into()));
        }
        let mut page = self.guard.page_mut();
        page.write_u32(MAGIC_OFFSET, CATALOG_META_MAGIC);
        page.write_u32(TABLE_COUNT_OFFSET, meta.tables.len() as u32);
        page.write_u32(INDEX_COUNT_OFFSET, meta.indexes.len() as u32);
        let mut offset = PAIRS_OFFSET;
        for (table_id, first_page) in &meta.tables {
            page.write_u32(offset, table_id.0);
            page.write_page_id(offset + 4, *first_page);
            offset += PAIR_BYTES;
        }
        for (index_id, meta_page) in &meta.indexes {
            page.write_u32(offset, index_id.0);
            page.write_page_id(offset + 4, *meta_page);
            offset += PAIR_BYTES;
        }
        Ok(())
    }
}

/// In-memory form of one index-meta page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexMeta {
    pub index_id: IndexId,
    pub table_id: TableId,
    /// Base-table positions of the key columns, in key order.
    pub key_columns: Vec<u32>,
}

/// Typed view over a per-index metadata page.
pub struct IndexMetaPage<'a, 'p> {
    guard: &'a PageGuard<'p>,
}

impl<'a, 'p> IndexMetaPage<'a, 'p> {
    pub fn new(guard: &'a PageGuard<'p>) -> Self {
        Self { guard }
    }

    pub fn write(&self, meta: &IndexMeta) {
        let mut page = self.guard.page_mut();
        page.write_u32(0, INDEX_META_MAGIC);
        page.write_u32(4, meta.index_id.0);
        page.write_u32(8, meta.table_id.0);
        page.write_u32(12, meta.key_columns.len() as u32);
        for (i, column) in meta.key_columns.iter().enumerate() {
            page.write_u32(16 + i * 4, *column);
        }
    }

    pub fn read(&self) -> DbResult<IndexMeta> {
        let page = self.guard.page();
        if page.read_u32(0) != INDEX_META_MAGIC {
            return Err(DbError::Corrupt("index meta page has no magic".into()));
        }
        let index_id = IndexId(page.read_u32(4));
        let table_id = TableId(page.read_u32(8));
        let count = page.read_u32(12) as usize;
        let key_columns = (0..count).map(|i| page.read_u32(16 + i * 4)).collect();
        Ok(IndexMeta {
            index_id,
            table_id,
            key_columns,
        })
    }
}
