use crate::field::{ensure_remaining, TypeId};
use crate::{COLUMN_MAGIC, SCHEMA_MAGIC};
use bytes::{Buf, BufMut};
use common::{DbError, DbResult};

/// Metadata for one column of a table.
///
/// `length` is the byte width of the column's values: 4 for int and float,
/// the declared capacity for fixed-length char. `table_index` is the
/// column's position in its base table, which survives projection into key
/// schemas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub type_id: TypeId,
    pub length: u32,
    pub table_index: u32,
    pub nullable: bool,
    pub unique: bool,
}

impl Column {
    pub fn new_int(name: impl Into<String>, table_index: u32, nullable: bool, unique: bool) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::Int,
            length: 4,
            table_index,
            nullable,
            unique,
        }
    }

    pub fn new_float(
        name: impl Into<String>,
        table_index: u32,
        nullable: bool,
        unique: bool,
    ) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::Float,
            length: 4,
            table_index,
            nullable,
            unique,
        }
    }

    pub fn new_char(
        name: impl Into<String>,
        length: u32,
        table_index: u32,
        nullable: bool,
        unique: bool,
    ) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::Char,
            length,
            table_index,
            nullable,
            unique,
        }
    }

    pub fn serialized_size(&self) -> usize {
        // magic + name length + name + type + length + table index + two flag bytes
        4 + 4 + self.name.len() + 4 + 4 + 4 + 2
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(COLUMN_MAGIC);
        buf.put_u32_le(self.name.len() as u32);
        buf.put_slice(self.name.as_bytes());
        buf.put_u32_le(self.type_id.to_u32());
        buf.put_u32_le(self.length);
        buf.put_u32_le(self.table_index);
        buf.put_u8(self.nullable as u8);
        buf.put_u8(self.unique as u8);
    }

    pub fn deserialize(buf: &mut impl Buf) -> DbResult<Self> {
        ensure_remaining(buf, 8)?;
        let magic = buf.get_u32_le();
        if magic != COLUMN_MAGIC {
            return Err(DbError::Corrupt(format!(
                "bad column magic {magic:#x}, expected {COLUMN_MAGIC:#x}"
            )));
        }
        let name_len = buf.get_u32_le() as usize;
        ensure_remaining(buf, name_len)?;
        let mut name_bytes = vec![0u8; name_len];
        buf.copy_to_slice(&mut name_bytes);
        let name = String::from_utf8(name_bytes)
            .map_err(|_| DbError::Corrupt("column name is not utf-8".into()))?;
        ensure_remaining(buf, 14)?;
        let type_id = TypeId::from_u32(buf.get_u32_le())?;
        let length = buf.get_u32_le();
        let table_index = buf.get_u32_le();
        let nullable = buf.get_u8() != 0;
        let unique = buf.get_u8() != 0;
        Ok(Self {
            name,
            type_id,
            length,
            table_index,
            nullable,
            unique,
        })
    }
}

/// An ordered list of columns describing a table or an index key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Build a key schema from a subset of this schema's column positions.
    /// The projected columns keep their base-table indexes.
    pub fn project(&self, indexes: &[usize]) -> Schema {
        Schema::new(indexes.iter().map(|&i| self.columns[i].clone()).collect())
    }

    pub fn serialized_size(&self) -> usize {
        8 + self
            .columns
            .iter()
            .map(Column::serialized_size)
            .sum::<usize>()
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(SCHEMA_MAGIC);
        buf.put_u32_le(self.columns.len() as u32);
        for column in &self.columns {
            column.serialize(buf);
        }
    }

    pub fn deserialize(buf: &mut impl Buf) -> DbResult<Self> {
        ensure_remaining(buf, 8)?;
        let magic = buf.get_u32_le();
        if magic != SCHEMA_MAGIC {
            return Err(DbError::Corrupt(format!(
                "bad schema magic {magic:#x}, expected {SCHEMA_MAGIC:#x}"
            )));
        }
        let count = buf.get_u32_le() as usize;
        let mut columns = Vec::with_capacity(count);
        for _ in 0..count {
            columns.push(Column::deserialize(buf)?);
        }
        Ok(Self { columns })
    }
}
