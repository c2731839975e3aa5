use crate::field::{ensure_remaining, Field};
use crate::Schema;
use bytes::{Buf, BufMut};
use common::{DbError, DbResult, PageId, RecordId};
use std::cmp::Ordering;

/// Positional row representation carrying its record id once stored.
///
/// Examples:
/// - `let row = Row::new(vec![Field::Int(1)]);`
/// - `let row = Row::new(vec![Field::Char("ada".into()), Field::Null]);`
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub fields: Vec<Field>,
    rid: RecordId,
}

impl Row {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            rid: RecordId::INVALID,
        }
    }

    pub fn with_rid(mut self, rid: RecordId) -> Self {
        self.rid = rid;
        self
    }

    pub fn rid(&self) -> RecordId {
        self.rid
    }

    pub fn set_rid(&mut self, rid: RecordId) {
        self.rid = rid;
    }

    /// Serialized byte count under `schema`: record id, then one null byte
    /// plus the field bytes per column.
    pub fn serialized_size(&self, schema: &Schema) -> usize {
        debug_assert_eq!(self.fields.len(), schema.column_count());
        8 + self
            .fields
            .iter()
            .map(|f| 1 + f.serialized_size())
            .sum::<usize>()
    }

    pub fn serialize(&self, buf: &mut impl BufMut, schema: &Schema) -> DbResult<()> {
        if self.fields.len() != schema.column_count() {
            return Err(DbError::Storage(format!(
                "row has {} fields but schema has {} columns",
                self.fields.len(),
                schema.column_count()
            )));
        }
        buf.put_u32_le(self.rid.page_id.0);
        buf.put_u32_le(self.rid.slot);
        for field in &self.fields {
            buf.put_u8(field.is_null() as u8);
            field.serialize(buf);
        }
        Ok(())
    }

    pub fn deserialize(buf: &mut impl Buf, schema: &Schema) -> DbResult<Row> {
        ensure_remaining(buf, 8)?;
        let page_id = PageId(buf.get_u32_le());
        let slot = buf.get_u32_le();
        let mut fields = Vec::with_capacity(schema.column_count());
        for column in schema.columns() {
            ensure_remaining(buf, 1)?;
            let is_null = buf.get_u8() != 0;
            fields.push(Field::deserialize(buf, column.type_id, is_null)?);
        }
        Ok(Row {
            fields,
            rid: RecordId { page_id, slot },
        })
    }

    /// Project this row over an index's key schema. Each key column carries
    /// the index of the field it came from in the base table.
    pub fn key_from_row(&self, key_schema: &Schema) -> Row {
        let fields = key_schema
            .columns()
            .iter()
            .map(|c| self.fields[c.table_index as usize].clone())
            .collect();
        Row::new(fields)
    }

    /// Lexicographic field-by-field comparison; `None` when a pair of
    /// fields is incomparable (type mismatch or NaN).
    pub fn cmp_fields(&self, other: &Row) -> Option<Ordering> {
        for (a, b) in self.fields.iter().zip(other.fields.iter()) {
            match a.cmp_same_type(b)? {
                Ordering::Equal => continue,
                non_eq => return Some(non_eq),
            }
        }
        Some(self.fields.len().cmp(&other.fields.len()))
    }
}
