//! Record codec: typed fields, column/schema metadata, and row
//! serialization.
//!
//! Everything that crosses a page boundary is encoded little-endian with an
//! explicit layout so pages remain byte-identical across platforms:
//! - a `Column` serializes as magic, name length, name bytes, type, byte
//!   length, table index, nullable, unique
//! - a `Schema` serializes as magic, column count, concatenated columns
//! - a `Row` serializes as its record id, then per column one null byte
//!   followed by the field bytes (fixed-width for int/float,
//!   length-prefixed for char)

mod field;
mod row;
mod schema;

#[cfg(test)]
mod tests;

pub use field::{Field, TypeId};
pub use row::Row;
pub use schema::{Column, Schema};

/// Leading magic of a serialized column.
pub const COLUMN_MAGIC: u32 = 0x434C_4D4E;

/// Leading magic of a serialized schema.
pub const SCHEMA_MAGIC: u32 = 0x5343_484D;
