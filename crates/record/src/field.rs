use bytes::{Buf, BufMut};
use common::{DbError, DbResult};
use std::cmp::Ordering;

/// On-disk type tag of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeId {
    Int,
    Float,
    Char,
}

impl TypeId {
    pub(crate) fn to_u32(self) -> u32 {
        match self {
            TypeId::Int => 1,
            TypeId::Float => 2,
            TypeId::Char => 3,
        }
    }

    pub(crate) fn from_u32(raw: u32) -> DbResult<Self> {
        match raw {
            1 => Ok(TypeId::Int),
            2 => Ok(TypeId::Float),
            3 => Ok(TypeId::Char),
            other => Err(DbError::Corrupt(format!("unknown type id {other}"))),
        }
    }
}

/// A single typed value in a row.
#[derive(Clone, Debug, PartialEq)]
pub enum Field {
    Int(i32),
    Float(f32),
    Char(String),
    Null,
}

impl Field {
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    /// Compare two fields of the same type. `None` when the types differ or
    /// a float comparison is undefined (NaN).
    ///
    /// Null sorts before every non-null value so projected keys have a total
    /// order.
    pub fn cmp_same_type(&self, other: &Field) -> Option<Ordering> {
        match (self, other) {
            (Field::Null, Field::Null) => Some(Ordering::Equal),
            (Field::Null, _) => Some(Ordering::Less),
            (_, Field::Null) => Some(Ordering::Greater),
            (Field::Int(a), Field::Int(b)) => Some(a.cmp(b)),
            (Field::Float(a), Field::Float(b)) => a.partial_cmp(b),
            (Field::Char(a), Field::Char(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Bytes this field contributes to a serialized row (the null byte is
    /// accounted by the row codec).
    pub fn serialized_size(&self) -> usize {
        match self {
            Field::Int(_) | Field::Float(_) => 4,
            Field::Char(s) => 4 + s.len(),
            Field::Null => 0,
        }
    }

    pub(crate) fn serialize(&self, buf: &mut impl BufMut) {
        match self {
            Field::Int(v) => buf.put_i32_le(*v),
            Field::Float(v) => buf.put_f32_le(*v),
            Field::Char(s) => {
                buf.put_u32_le(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
            Field::Null => {}
        }
    }

    pub(crate) fn deserialize(buf: &mut impl Buf, type_id: TypeId, is_null: bool) -> DbResult<Self> {
        if is_null {
            return Ok(Field::Null);
        }
        match type_id {
            TypeId::Int => {
                ensure_remaining(buf, 4)?;
                Ok(Field::Int(buf.get_i32_le()))
            }
            TypeId::Float => {
                ensure_remaining(buf, 4)?;
                Ok(Field::Float(buf.get_f32_le()))
            }
            TypeId::Char => {
                ensure_remaining(buf, 4)?;
                let len = buf.get_u32_le() as usize;
                ensure_remaining(buf, len)?;
                let mut bytes = vec![0u8; len];
                buf.copy_to_slice(&mut bytes);
                let s = String::from_utf8(bytes)
                    .map_err(|_| DbError::Corrupt("char field is not utf-8".into()))?;
                Ok(Field::Char(s))
            }
        }
    }
}

pub(crate) fn ensure_remaining(buf: &impl Buf, needed: usize) -> DbResult<()> {
    if buf.remaining() < needed {
        return Err(DbError::Corrupt(format!(
            "truncated record: need {needed} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(())
}
