//! Catalog wrappers over the storage core: the registry pages plus
//! status-code operations for tables and indexes.
//!
//! Page 0 persists which heaps and index-meta pages exist; everything the
//! outer system owns (names, schemas) lives in memory and is re-attached
//! on open. Operations report [`Status`] codes and leave state unchanged
//! on anything but `Success`.

mod meta_page;


pub use meta_page::{
    CatalogMeta, CatalogMetaPage, IndexMeta, IndexMetaPage, CATALOG_META_MAGIC,
    CATALOG_META_PAGE_ID, INDEX_META_MAGIC,
};

use btree::BPlusTree;
use buffer::BufferPool;
use common::{
    DbResult, IndexId, LockManager, LogManager, PageId, Status, TableId, Transaction,
};
use hashbrown::HashMap;
use heap::TableHeap;
use log::debug;
use record::Schema;
use std::rc::Rc;

/// A registered table: its heap plus the schema the outer system attached.
pub struct TableInfo {
    pub table_id: TableId,
    pub name: String,
    pub schema: Rc<Schema>,
    pub heap: TableHeap,
}

/// A registered index over one table's columns.
pub struct IndexInfo {
    pub index_id: IndexId,
    pub name: String,
    pub table_id: TableId,
    pub meta_page_id: PageId,
    pub key_columns: Vec<u32>,
    pub tree: BPlusTree,
}

/// Registry of tables and indexes, persisted through page 0.
pub struct Catalog {
    pool: Rc<BufferPool>,
    lock_manager: Rc<LockManager>,
    log_manager: Rc<LogManager>,
    tables: HashMap<TableId, TableInfo>,
    table_names: HashMap<String, TableId>,
    indexes: HashMap<IndexId, IndexInfo>,
    index_names: HashMap<String, IndexId>,
    /// Pairs read from page 0 that no session schema has been attached to
    /// yet (tables and indexes created by an earlier process).
    detached_tables: Vec<(TableId, PageId)>,
    detached_indexes: Vec<(IndexId, PageId)>,
    next_table_id: u32,
    next_index_id: u32,
}

impl Catalog {
    /// Open the catalog, stamping page 0 on a fresh database and reading
    /// the registered pairs from an existing one.
    pub fn open(
        pool: Rc<BufferPool>,
        lock_manager: Rc<LockManager>,
        log_manager: Rc<LogManager>,
    ) -> DbResult<Self> {
        let meta = {
            let guard = pool.fetch_page(CATALOG_META_PAGE_ID)?;
            let page = CatalogMetaPage::new(&guard);
            if page.is_initialized() {
                page.read()?
            } else {
                page.init();
                CatalogMeta::default()
            }
        };
        let next_table_id = meta.tables.iter().map(|(id, _)| id.0 + 1).max().unwrap_or(1);
        let next_index_id = meta
            .indexes
            .iter()
            .map(|(id, _)| id.0 + 1)
            .max()
            .unwrap_or(1);
        Ok(Self {
            pool,
            lock_manager,
            log_manager,
            tables: HashMap::new(),
            table_names: HashMap::new(),
            indexes: HashMap::new(),
            index_names: HashMap::new(),
            detached_tables: meta.tables,
            detached_indexes: meta.indexes,
            next_table_id,
            next_index_id,
        })
    }

    /// Tables present on disk but not yet attached with a session schema.
    pub fn detached_tables(&self) -> &[(TableId, PageId)] {
        &self.detached_tables
    }

    /// Indexes present on disk but not yet re-attached by name.
    pub fn detached_indexes(&self) -> &[(IndexId, PageId)] {
        &self.detached_indexes
    }

    /// Re-bind a table read from page 0 to its schema and name.
    pub fn attach_table(&mut self, table_id: TableId, name: &str, schema: Schema) -> Status {
        let Some(at) = self
            .detached_tables
            .iter()
            .position(|(id, _)| *id == table_id)
        else {
            return Status::TableNotExist;
        };
        if self.table_names.contains_key(name) {
            return Status::TableAlreadyExist;
        }
        let (_, first_page_id) = self.detached_tables.remove(at);
        let schema = Rc::new(schema);
        let heap = TableHeap::open(
            Rc::clone(&self.pool),
            Rc::clone(&schema),
            first_page_id,
            Rc::clone(&self.lock_manager),
            Rc::clone(&self.log_manager),
        );
        self.register_table(table_id, name, schema, heap);
        Status::Success
    }

    /// Re-bind an index read from page 0 to a name. The owning table must
    /// already be attached; the tree finds its root through the registry,
    /// so no rebuild happens.
    pub fn attach_index(&mut self, index_id: IndexId, name: &str) -> DbResult<Status> {
        let Some(at) = self
            .detached_indexes
            .iter()
            .position(|(id, _)| *id == index_id)
        else {
            return Ok(Status::IndexNotFound);
        };
        if self.index_names.contains_key(name) {
            return Ok(Status::IndexAlreadyExist);
        }
        let (_, meta_page_id) = self.detached_indexes[at];
        let meta = {
            let guard = self.pool.fetch_page(meta_page_id)?;
            IndexMetaPage::new(&guard).read()?
        };
        let Some(table) = self.tables.get(&meta.table_id) else {
            return Ok(Status::TableNotExist);
        };
        let key_schema = table.schema.project(
            &meta
                .key_columns
                .iter()
                .map(|&c| c as usize)
                .collect::<Vec<_>>(),
        );
        let tree = BPlusTree::new(index_id, Rc::clone(&self.pool), key_schema);

        self.detached_indexes.remove(at);
        self.indexes.insert(
            index_id,
            IndexInfo {
                index_id,
                name: name.to_string(),
                table_id: meta.table_id,
                meta_page_id,
                key_columns: meta.key_columns,
                tree,
            },
        );
        self.index_names.insert(name.to_string(), index_id);
        Ok(Status::Success)
    }

    /// Create a table and its empty heap.
    pub fn create_table(&mut self, name: &str, schema: Schema, _txn: &Transaction) -> DbResult<Status> {
        if self.table_names.contains_key(name) {
            return Ok(Status::TableAlreadyExist);
        }
        let table_id = TableId(self.next_table_id);
        let schema = Rc::new(schema);
        let heap = TableHeap::create(
            Rc::clone(&self.pool),
            Rc::clone(&schema),
            Rc::clone(&self.lock_manager),
            Rc::clone(&self.log_manager),
        )?;
        self.next_table_id += 1;
        self.register_table(table_id, name, schema, heap);
        self.persist_meta()?;
        debug!("created table '{name}' (id {})", table_id.0);
        Ok(Status::Success)
    }

    /// Drop a table, its heap pages, and every index over it.
    pub fn drop_table(&mut self, name: &str, txn: &Transaction) -> DbResult<Status> {
        let Some(&table_id) = self.table_names.get(name) else {
            return Ok(Status::TableNotExist);
        };
        let doomed: Vec<String> = self
            .indexes
            .values()
            .filter(|info| info.table_id == table_id)
            .map(|info| info.name.clone())
            .collect();
        for index_name in doomed {
            self.drop_index(&index_name, txn)?;
        }

        let info = self.tables.remove(&table_id).expect("name map out of sync");
        self.table_names.remove(name);
        info.heap.delete_table()?;
        self.persist_meta()?;
        debug!("dropped table '{name}'");
        Ok(Status::Success)
    }

    pub fn get_table(&self, name: &str) -> Option<&TableInfo> {
        self.table_names.get(name).and_then(|id| self.tables.get(id))
    }

    pub fn get_table_by_id(&self, table_id: TableId) -> Option<&TableInfo> {
        self.tables.get(&table_id)
    }

    /// Create an index over `key_column_names` of `table_name` and
    /// bulk-load the table's current rows.
    pub fn create_index(
        &mut self,
        table_name: &str,
        index_name: &str,
        key_column_names: &[&str],
        txn: &Transaction,
    ) -> DbResult<Status> {
        if self.index_names.contains_key(index_name) {
            return Ok(Status::IndexAlreadyExist);
        }
        let Some(&table_id) = self.table_names.get(table_name) else {
            return Ok(Status::TableNotExist);
        };
        let table = &self.tables[&table_id];

        let mut key_columns = Vec::with_capacity(key_column_names.len());
        for name in key_column_names {
            let Some(position) = table.schema.column_index(name) else {
                return Ok(Status::ColumnNameNotExist);
            };
            key_columns.push(position as u32);
        }
        let key_schema = table
            .schema
            .project(&key_columns.iter().map(|&c| c as usize).collect::<Vec<_>>());

        let index_id = IndexId(self.next_index_id);
        let meta_page_id = {
            let guard = self.pool.new_page()?;
            IndexMetaPage::new(&guard).write(&IndexMeta {
                index_id,
                table_id,
                key_columns: key_columns.clone(),
            });
            guard.page_id()
        };

        let tree = BPlusTree::new(index_id, Rc::clone(&self.pool), key_schema.clone());
        for row in table.heap.iter() {
            let row = row?;
            let key = row.key_from_row(&key_schema);
            tree.insert(&key, row.rid(), txn)?;
        }

        self.next_index_id += 1;
        self.indexes.insert(
            index_id,
            IndexInfo {
                index_id,
                name: index_name.to_string(),
                table_id,
                meta_page_id,
                key_columns,
                tree,
            },
        );
        self.index_names.insert(index_name.to_string(), index_id);
        self.persist_meta()?;
        debug!("created index '{index_name}' (id {}) on '{table_name}'", index_id.0);
        Ok(Status::Success)
    }

    /// Drop an index: destroy the tree and deallocate its meta page.
    pub fn drop_index(&mut self, index_name: &str, _txn: &Transaction) -> DbResult<Status> {
        let Some(&index_id) = self.index_names.get(index_name) else {
            return Ok(Status::IndexNotFound);
        };
        let info = self.indexes.remove(&index_id).expect("name map out of sync");
        self.index_names.remove(index_name);
        info.tree.destroy()?;
        self.pool.delete_page(info.meta_page_id)?;
        self.persist_meta()?;
        debug!("dropped index '{index_name}'");
        Ok(Status::Success)
    }

    pub fn get_index(&self, index_name: &str) -> Option<&IndexInfo> {
        self.index_names
            .get(index_name)
            .and_then(|id| self.indexes.get(id))
    }

    /// Every index registered over one table.
    pub fn indexes_of(&self, table_id: TableId) -> Vec<&IndexInfo> {
        let mut found: Vec<&IndexInfo> = self
            .indexes
            .values()
            .filter(|info| info.table_id == table_id)
            .collect();
        found.sort_by_key(|info| info.index_id.0);
        found
    }

    fn register_table(&mut self, table_id: TableId, name: &str, schema: Rc<Schema>, heap: TableHeap) {
        self.tables.insert(
            table_id,
            TableInfo {
                table_id,
                name: name.to_string(),
                schema,
                heap,
            },
        );
        self.table_names.insert(name.to_string(), table_id);
    }

    /// Rewrite page 0 from the current registry (single-page write).
    fn persist_meta(&self) -> DbResult<()> {
        let mut meta = CatalogMeta::default();
        for (table_id, page_id) in &self.detached_tables {
            meta.tables.push((*table_id, *page_id));
        }
        for info in self.tables.values() {
            meta.tables.push((info.table_id, info.heap.first_page_id()));
        }
        meta.tables.sort_by_key(|(id, _)| id.0);
        for (index_id, page_id) in &self.detached_indexes {
            meta.indexes.push((*index_id, *page_id));
        }
        for info in self.indexes.values() {
            meta.indexes.push((info.index_id, info.meta_page_id));
        }
        meta.indexes.sort_by_key(|(id, _)| id.0);

        let guard = self.pool.fetch_page(CATALOG_META_PAGE_ID)?;
        CatalogMetaPage::new(&guard).write(&meta)
    }
}
