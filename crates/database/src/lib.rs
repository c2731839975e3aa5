//! Explicit database handle owning the full storage stack.
//!
//! A [`Database`] value owns its disk manager (through the buffer pool),
//! the pool itself, and the catalog; there is no process-wide registry of
//! open databases. Dropping or [`Database::close`]-ing the handle flushes
//! every resident page, which is the engine's whole durability story
//! (clean shutdown, no write-ahead log).
//!
//! # Example
//!
//! ```no_run
//! use common::{Config, Status, Transaction};
//! use database::Database;
//! use record::{Column, Schema};
//!
//! let config = Config::builder().db_path("/tmp/people.db".into()).build();
//! let mut db = Database::open(config).unwrap();
//!
//! let schema = Schema::new(vec![Column::new_int("id", 0, false, true)]);
//! let txn = Transaction::default();
//! assert_eq!(
//!     db.catalog_mut().create_table("people", schema, &txn).unwrap(),
//!     Status::Success
//! );
//! db.close().unwrap();
//! ```

use btree::{IndexRootsPage, INDEX_ROOTS_PAGE_ID};
use buffer::BufferPool;
use catalog::Catalog;
use common::{Config, DbResult, LockManager, LogManager};
use log::debug;
use std::rc::Rc;
use storage::DiskManager;

/// One open database: pool, catalog, and the opaque collaborator handles.
pub struct Database {
    pool: Rc<BufferPool>,
    catalog: Catalog,
    lock_manager: Rc<LockManager>,
    log_manager: Rc<LogManager>,
}

impl Database {
    /// Open (creating if missing) the database file named by `config`.
    ///
    /// A fresh file comes back from the disk manager with pages 0 and 1
    /// allocated but zeroed; this stamps the catalog-meta and index-roots
    /// magics so every later open recognizes them.
    pub fn open(config: Config) -> DbResult<Self> {
        let disk = DiskManager::open(&config.db_path)?;
        let pool = Rc::new(BufferPool::new(
            config.buffer_pool_pages,
            disk,
            config.replacer,
        ));

        {
            let guard = pool.fetch_page(INDEX_ROOTS_PAGE_ID)?;
            let roots = IndexRootsPage::new(&guard);
            if !roots.is_initialized() {
                debug!("stamping fresh index-roots registry");
                roots.init();
            }
        }

        let lock_manager = Rc::new(LockManager);
        let log_manager = Rc::new(LogManager);
        let catalog = Catalog::open(
            Rc::clone(&pool),
            Rc::clone(&lock_manager),
            Rc::clone(&log_manager),
        )?;
        Ok(Self {
            pool,
            catalog,
            lock_manager,
            log_manager,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    pub fn pool(&self) -> &Rc<BufferPool> {
        &self.pool
    }

    pub fn lock_manager(&self) -> &Rc<LockManager> {
        &self.lock_manager
    }

    pub fn log_manager(&self) -> &Rc<LogManager> {
        &self.log_manager
    }

    /// Flush every resident page and consume the handle.
    ///
    /// Dropping the pool flushes too; `close` exists so shutdown I/O
    /// errors are observable instead of swallowed by `Drop`.
    pub fn close(self) -> DbResult<()> {
        self.pool.flush_all()
    }
}
