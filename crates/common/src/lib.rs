//! Shared identifiers, errors, and configuration for the storage engine.
//!
//! Everything here is consumed by the layered crates above it:
//! - Typed ids (`PageId`, `FrameId`, `RecordId`, …) with the on-disk
//!   invalid sentinel
//! - The canonical `DbError`/`DbResult` error channel
//! - `Status` codes returned by catalog-facing operations
//! - Opaque transaction/lock/log handles the core threads through unchanged


use serde::{Deserialize, Serialize};
use std::{io, path::PathBuf};
use thiserror::Error;

/// Logical identifier for a page in the database file.
///
/// Data pages are numbered densely from zero; bitmap pages are invisible at
/// this level. The all-ones bit pattern is the on-disk "no page" sentinel
/// (the signed −1 of the file format).
///
/// Examples:
/// - `let catalog_meta = PageId(0);`
/// - `let index_roots = PageId(1);`
/// - `let none = PageId::INVALID;`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl PageId {
    /// Sentinel for "no page"; stored on disk as `0xFFFF_FFFF`.
    pub const INVALID: PageId = PageId(u32::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

/// Index of a frame in the buffer pool's page array.
/// Examples:
/// - `let first = FrameId(0);`
/// - `let last = FrameId(pool_size - 1);`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameId(pub usize);

/// Logical identifier for a table registered in the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId(pub u32);

/// Logical identifier for a secondary index registered in the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexId(pub u32);

/// Fully-qualified identifier for a tuple: the heap page holding it plus
/// its slot in that page's directory. 8 bytes on disk (page id, then slot,
/// both little-endian).
///
/// Examples:
/// - `let rid = RecordId { page_id: PageId(42), slot: 3 };`
/// - `let none = RecordId::INVALID;`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u32,
}

impl RecordId {
    pub const INVALID: RecordId = RecordId {
        page_id: PageId::INVALID,
        slot: 0,
    };

    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }

    pub fn is_valid(self) -> bool {
        self.page_id.is_valid()
    }
}

/// Canonical error type shared across the storage subsystems.
///
/// Logical outcomes (key not found, duplicate key, tuple does not fit) are
/// *values*, not errors: they travel as `bool`/`Option`/[`Status`].
/// `DbError` carries the failures a caller may need to recover from or
/// report: I/O, corruption, and resource exhaustion. Invariant breaks
/// (pin-count underflow, page-table/free-list disagreement) panic instead.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("corrupt page: {0}")]
    Corrupt(String),
    #[error("buffer pool exhausted: all frames pinned")]
    PoolExhausted,
    #[error("database file cannot grow: out of space")]
    OutOfSpace,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Outcome codes surfaced by catalog-facing wrappers.
///
/// These mirror what an execution engine reports to its client; the core
/// leaves state unchanged whenever it returns anything but `Success`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Success,
    NotExist,
    AlreadyExist,
    TableNotExist,
    TableAlreadyExist,
    IndexNotFound,
    IndexAlreadyExist,
    ColumnNameNotExist,
    KeyNotFound,
    Failed,
    Quit,
}

impl Status {
    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

/// Replacement policy for the buffer pool, fixed at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplacerPolicy {
    /// Evict the least recently unpinned frame.
    Lru,
    /// LRU-K: frames with fewer than `k` recorded accesses are preferred
    /// victims over frames that reached `k`.
    LruK { k: usize },
    /// Second-chance clock sweep.
    Clock,
}

/// Runtime configuration for a database instance.
///
/// # Example
/// ```
/// use common::{Config, ReplacerPolicy};
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .db_path(PathBuf::from("./my.db"))
///     .buffer_pool_pages(64)
///     .replacer(ReplacerPolicy::LruK { k: 2 })
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Path of the single backing file for this database.
    #[builder(default = PathBuf::from("./db_data/main.db"))]
    pub db_path: PathBuf,
    /// Number of frames the buffer pool keeps resident.
    #[builder(default = 256)]
    pub buffer_pool_pages: usize,
    /// Which eviction policy the pool runs.
    #[builder(default = ReplacerPolicy::Lru)]
    pub replacer: ReplacerPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./db_data/main.db"),
            buffer_pool_pages: 256,
            replacer: ReplacerPolicy::Lru,
        }
    }
}

/// Opaque transaction handle.
///
/// The single-threaded core accepts and propagates it so the mutation APIs
/// keep their final shape; nothing in this workspace inspects it.
#[derive(Clone, Copy, Debug, Default)]
pub struct Transaction {
    id: u64,
}

impl Transaction {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Opaque lock-manager handle, threaded through heap operations unchanged.
#[derive(Debug, Default)]
pub struct LockManager;

/// Opaque log-manager handle, threaded through page operations unchanged.
#[derive(Debug, Default)]
pub struct LogManager;

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{
        Config, DbError, DbResult, FrameId, IndexId, PageId, RecordId, ReplacerPolicy, Status,
        TableId, Transaction,
    };
}
