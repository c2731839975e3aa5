use common::{DbError, DbResult};
use record::{Field, Row, Schema, TypeId};
use std::cmp::Ordering;

/// Fixed-width codec for index keys.
///
/// A key is a row projected over the index's key schema, encoded to a
/// constant `key_size` so node pages can pack (key, value) pairs as a flat
/// array: per column one null byte, then `column.length` bytes (int and
/// float little-endian, char zero-padded to the declared capacity).
/// Comparison is typed, field by field, never a raw memcmp.
#[derive(Clone, Debug)]
pub struct KeyCodec {
    schema: Schema,
    key_size: usize,
}

impl KeyCodec {
    pub fn new(schema: Schema) -> Self {
        let key_size = schema
            .columns()
            .iter()
            .map(|c| 1 + c.length as usize)
            .sum();
        Self { schema, key_size }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Encode a key row into its fixed-width form.
    pub fn encode(&self, key: &Row) -> DbResult<Vec<u8>> {
        if key.fields.len() != self.schema.column_count() {
            return Err(DbError::Storage(format!(
                "key has {} fields but key schema has {} columns",
                key.fields.len(),
                self.schema.column_count()
            )));
        }
        let mut out = vec![0u8; self.key_size];
        let mut offset = 0;
        for (field, column) in key.fields.iter().zip(self.schema.columns()) {
            let width = column.length as usize;
            match field {
                Field::Null => out[offset] = 1,
                Field::Int(v) => out[offset + 1..offset + 5].copy_from_slice(&v.to_le_bytes()),
                Field::Float(v) => out[offset + 1..offset + 5].copy_from_slice(&v.to_le_bytes()),
                Field::Char(s) => {
                    if s.len() > width {
                        return Err(DbError::Storage(format!(
                            "char key value of {} bytes exceeds column capacity {width}",
                            s.len()
                        )));
                    }
                    out[offset + 1..offset + 1 + s.len()].copy_from_slice(s.as_bytes());
                }
            }
            offset += 1 + width;
        }
        Ok(out)
    }

    /// Decode a fixed-width key back into a row.
    pub fn decode(&self, bytes: &[u8]) -> DbResult<Row> {
        if bytes.len() != self.key_size {
            return Err(DbError::Corrupt(format!(
                "key of {} bytes, expected {}",
                bytes.len(),
                self.key_size
            )));
        }
        let mut fields = Vec::with_capacity(self.schema.column_count());
        let mut offset = 0;
        for column in self.schema.columns() {
            let width = column.length as usize;
            let is_null = bytes[offset] != 0;
            let body = &bytes[offset + 1..offset + 1 + width];
            fields.push(if is_null {
                Field::Null
            } else {
                match column.type_id {
                    TypeId::Int => Field::Int(i32::from_le_bytes(body[..4].try_into().unwrap())),
                    TypeId::Float => {
                        Field::Float(f32::from_le_bytes(body[..4].try_into().unwrap()))
                    }
                    TypeId::Char => {
                        let end = body.iter().position(|&b| b == 0).unwrap_or(width);
                        let s = std::str::from_utf8(&body[..end])
                            .map_err(|_| DbError::Corrupt("char key is not utf-8".into()))?;
                        Field::Char(s.to_string())
                    }
                }
            });
            offset += 1 + width;
        }
        Ok(Row::new(fields))
    }

    /// Typed comparison of two encoded keys. Null sorts first; an
    /// undefined float comparison (NaN) counts as equal.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        debug_assert_eq!(a.len(), self.key_size);
        debug_assert_eq!(b.len(), self.key_size);
        let mut offset = 0;
        for column in self.schema.columns() {
            let width = column.length as usize;
            let (a_null, b_null) = (a[offset] != 0, b[offset] != 0);
            let ord = match (a_null, b_null) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => {
                    let body_a = &a[offset + 1..offset + 1 + width];
                    let body_b = &b[offset + 1..offset + 1 + width];
                    match column.type_id {
                        TypeId::Int => {
                            let va = i32::from_le_bytes(body_a[..4].try_into().unwrap());
                            let vb = i32::from_le_bytes(body_b[..4].try_into().unwrap());
                            va.cmp(&vb)
                        }
                        TypeId::Float => {
                            let va = f32::from_le_bytes(body_a[..4].try_into().unwrap());
                            let vb = f32::from_le_bytes(body_b[..4].try_into().unwrap());
                            va.partial_cmp(&vb).unwrap_or(Ordering::Equal)
                        }
                        // Zero padding compares below every character.
                        TypeId::Char => body_a.cmp(body_b),
                    }
                }
            };
            if ord != Ordering::Equal {
                return ord;
            }
            offset += 1 + width;
        }
        Ordering::Equal
    }
}
