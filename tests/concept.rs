mod common;

use common::table;
use serde_json::json;
use vizbind::{
    concept::{
        FieldItem, FieldSource, Transformation, duplicate_field, fields_for_table,
        find_base_fields, original_field_id, would_create_cycle,
    },
    types::DataType,
};

fn ids(fields: &[FieldItem]) -> Vec<&str> {
    fields.iter().map(|f| f.id.as_str()).collect()
}

#[test]
fn original_fields_follow_table_columns() {
    let people = table("people", json!([{"name": "Ann", "age": 31}, {"name": "Bo", "age": 31}]));
    let fields = fields_for_table(&people);
    assert_eq!(
        ids(&fields),
        vec!["original--people--name", "original--people--age"]
    );
    assert_eq!(fields[1].data_type, DataType::Integer);
    assert_eq!(fields[1].domain, vec![json!(31)]);
    assert_eq!(fields[0].source, FieldSource::Original);
    assert_eq!(fields[0].table_ref.as_deref(), Some("people"));
}

#[test]
fn base_fields_resolve_through_derived_chain() {
    let a = FieldItem::original("t", "a", DataType::Integer, Vec::new());
    let b = FieldItem::original("t", "b", DataType::Integer, Vec::new());
    let sum = FieldItem::derived("sum", "sum", vec![a.id.clone(), b.id.clone()], "a + b")
        .expect("parents given");
    let doubled = FieldItem::derived("doubled", "doubled", vec![sum.id.clone(), a.id.clone()], "sum * 2")
        .expect("parents given");
    let all = vec![a.clone(), b.clone(), sum.clone(), doubled.clone()];

    let bases = find_base_fields(&doubled, &all);
    assert_eq!(ids(&bases), vec![a.id.as_str(), b.id.as_str()]);
    assert_eq!(ids(&find_base_fields(&a, &all)), vec![a.id.as_str()]);
}

#[test]
fn base_field_closure_terminates_on_self_reference() {
    let mut looped = FieldItem::custom("loop", "loop");
    looped.source = FieldSource::Derived;
    looped.transform = Some(Transformation {
        parent_ids: vec!["loop".to_string()],
        code: "loop + 1".to_string(),
        description: String::new(),
    });
    let all = vec![looped.clone()];
    let bases = find_base_fields(&looped, &all);
    assert_eq!(ids(&bases), vec!["loop"]);
}

#[test]
fn base_field_closure_terminates_on_mutual_reference() {
    let mut first = FieldItem::derived("f1", "f1", vec!["f2".to_string()], "f2").expect("parents");
    let second = FieldItem::derived("f2", "f2", vec!["f1".to_string()], "f1").expect("parents");
    first.name = "first".to_string();
    let all = vec![first.clone(), second];
    let bases = find_base_fields(&first, &all);
    assert_eq!(ids(&bases), vec!["f1"]);
}

#[test]
fn derived_fields_need_parents() {
    assert!(FieldItem::derived("x", "x", Vec::new(), "1").is_err());
}

#[test]
fn cycle_detection_follows_ancestors() {
    let a = FieldItem::original("t", "a", DataType::Integer, Vec::new());
    let b = FieldItem::derived("b", "b", vec![a.id.clone()], "a").expect("parents");
    let c = FieldItem::derived("c", "c", vec!["b".to_string()], "b").expect("parents");
    let all = vec![a.clone(), b, c];

    assert!(would_create_cycle("b", &["c".to_string()], &all));
    assert!(would_create_cycle("b", &["b".to_string()], &all));
    assert!(!would_create_cycle("d", &["c".to_string(), a.id.clone()], &all));
    assert_eq!(a.id, original_field_id("t", "a"));
}

#[test]
fn duplicated_field_is_an_independent_copy() {
    let mut field = FieldItem::derived(
        "share",
        "share",
        vec![original_field_id("t", "part"), original_field_id("t", "whole")],
        "part / whole",
    )
    .expect("parents");
    field.levels = Some(vec![json!("low"), json!("high")]);

    let mut copy = duplicate_field(&field);
    assert_eq!(copy, field);
    assert_eq!(copy.id, "share");

    copy.name = "ratio".to_string();
    copy.levels = None;
    if let Some(transform) = copy.transform.as_mut() {
        transform.code = "part * 100 / whole".to_string();
        transform.parent_ids.pop();
    }
    assert_eq!(field.name, "share");
    assert_eq!(field.levels, Some(vec![json!("low"), json!("high")]));
    assert_eq!(field.parent_ids().len(), 2);
    assert_eq!(
        field.transform.as_ref().map(|t| t.code.as_str()),
        Some("part / whole")
    );
}
