use super::*;
use common::{DbError, PageId, RecordId};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::cmp::Ordering::{Equal, Greater, Less};

fn people_schema() -> Schema {
    Schema::new(vec![
        Column::new_int("id", 0, false, true),
        Column::new_char("name", 16, 1, true, false),
        Column::new_float("score", 2, true, false),
    ])
}

#[test]
fn field_cmp_same_type_works() {
    assert_eq!(Field::Int(1).cmp_same_type(&Field::Int(2)), Some(Less));
    assert_eq!(
        Field::Char("b".into()).cmp_same_type(&Field::Char("a".into())),
        Some(Greater)
    );
    assert_eq!(Field::Int(1).cmp_same_type(&Field::Float(1.0)), None);
}

#[test]
fn null_sorts_before_everything() {
    assert_eq!(Field::Null.cmp_same_type(&Field::Int(i32::MIN)), Some(Less));
    assert_eq!(Field::Null.cmp_same_type(&Field::Null), Some(Equal));
    assert_eq!(Field::Int(0).cmp_same_type(&Field::Null), Some(Greater));
}

#[test]
fn row_round_trips_all_types() {
    let schema = people_schema();
    let row = Row::new(vec![
        Field::Int(42),
        Field::Char("ada".into()),
        Field::Float(3.5),
    ])
    .with_rid(RecordId::new(PageId(7), 3));

    let mut bytes = Vec::new();
    row.serialize(&mut bytes, &schema).unwrap();
    assert_eq!(bytes.len(), row.serialized_size(&schema));

    let back = Row::deserialize(&mut bytes.as_slice(), &schema).unwrap();
    assert_eq!(back, row);
    assert_eq!(back.rid(), RecordId::new(PageId(7), 3));
}

#[test]
fn row_round_trips_nulls() {
    let schema = people_schema();
    let row = Row::new(vec![Field::Int(1), Field::Null, Field::Null]);

    let mut bytes = Vec::new();
    row.serialize(&mut bytes, &schema).unwrap();
    let back = Row::deserialize(&mut bytes.as_slice(), &schema).unwrap();
    assert_eq!(back.fields, row.fields);
}

#[test]
fn row_rejects_field_count_mismatch() {
    let schema = people_schema();
    let row = Row::new(vec![Field::Int(1)]);
    let mut bytes = Vec::new();
    assert!(matches!(
        row.serialize(&mut bytes, &schema),
        Err(DbError::Storage(_))
    ));
}

#[test]
fn schema_round_trips() {
    let schema = people_schema();
    let mut bytes = Vec::new();
    schema.serialize(&mut bytes);
    assert_eq!(bytes.len(), schema.serialized_size());

    let back = Schema::deserialize(&mut bytes.as_slice()).unwrap();
    assert_eq!(back, schema);
}

#[test]
fn schema_rejects_bad_magic() {
    let schema = people_schema();
    let mut bytes = Vec::new();
    schema.serialize(&mut bytes);
    bytes[0] ^= 0xFF;
    assert!(matches!(
        Schema::deserialize(&mut bytes.as_slice()),
        Err(DbError::Corrupt(_))
    ));
}

#[test]
fn truncated_column_is_corrupt_not_panic() {
    let schema = people_schema();
    let mut bytes = Vec::new();
    schema.serialize(&mut bytes);
    bytes.truncate(bytes.len() / 2);
    assert!(Schema::deserialize(&mut bytes.as_slice()).is_err());
}

#[test]
fn key_projection_pulls_base_table_fields() {
    let schema = people_schema();
    let key_schema = schema.project(&[1, 0]);
    let row = Row::new(vec![
        Field::Int(9),
        Field::Char("grace".into()),
        Field::Float(1.0),
    ]);

    let key = row.key_from_row(&key_schema);
    assert_eq!(key.fields, vec![Field::Char("grace".into()), Field::Int(9)]);
}

#[test]
fn row_cmp_is_lexicographic() {
    let a = Row::new(vec![Field::Int(1), Field::Char("b".into())]);
    let b = Row::new(vec![Field::Int(1), Field::Char("c".into())]);
    let c = Row::new(vec![Field::Int(2), Field::Char("a".into())]);
    assert_eq!(a.cmp_fields(&b), Some(Less));
    assert_eq!(b.cmp_fields(&c), Some(Less));
    assert_eq!(a.cmp_fields(&a), Some(Equal));
}

proptest! {
    #[test]
    fn int_rows_round_trip(id in any::<i32>(), score in any::<f32>().prop_filter("finite", |f| f.is_finite())) {
        let schema = people_schema();
        let row = Row::new(vec![Field::Int(id), Field::Char("x".into()), Field::Float(score)]);
        let mut bytes = Vec::new();
        row.serialize(&mut bytes, &schema).unwrap();
        let back = Row::deserialize(&mut bytes.as_slice(), &schema).unwrap();
        prop_assert_eq!(back.fields, row.fields);
    }

    #[test]
    fn char_rows_round_trip(name in "[a-z]{0,16}") {
        let schema = Schema::new(vec![Column::new_char("name", 16, 0, false, false)]);
        let row = Row::new(vec![Field::Char(name)]);
        let mut bytes = Vec::new();
        row.serialize(&mut bytes, &schema).unwrap();
        let back = Row::deserialize(&mut bytes.as_slice(), &schema).unwrap();
        prop_assert_eq!(back.fields, row.fields);
    }

    #[test]
    fn int_field_order_matches_i32(a in any::<i32>(), b in any::<i32>()) {
        let fa = Field::Int(a);
        let fb = Field::Int(b);
        prop_assert_eq!(fa.cmp_same_type(&fb), Some(a.cmp(&b)));
    }
}
