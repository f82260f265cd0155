//! Fields ("concepts") and their derivation lineage.
//!
//! A [`FieldItem`] names a data attribute that charts can bind to. Original
//! fields mirror a table column; derived fields are computed from other
//! fields through a [`Transformation`]; custom fields are created by the user
//! without backing data.

use std::collections::{HashMap, HashSet};

use anyhow::{Result, ensure};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{table::Table, types::DataType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSource {
    Original,
    Derived,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transformation {
    #[serde(rename = "parentIDs")]
    pub parent_ids: Vec<String>,
    pub code: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldItem {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub source: FieldSource,
    #[serde(default)]
    pub domain: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transformation>,
}

impl FieldItem {
    pub fn original(table_id: &str, name: &str, data_type: DataType, domain: Vec<Value>) -> Self {
        FieldItem {
            id: original_field_id(table_id, name),
            name: name.to_string(),
            data_type,
            source: FieldSource::Original,
            domain,
            levels: None,
            semantic_type: None,
            table_ref: Some(table_id.to_string()),
            transform: None,
        }
    }

    pub fn custom(id: &str, name: &str) -> Self {
        FieldItem {
            id: id.to_string(),
            name: name.to_string(),
            data_type: DataType::Auto,
            source: FieldSource::Custom,
            domain: Vec::new(),
            levels: None,
            semantic_type: None,
            table_ref: None,
            transform: None,
        }
    }

    /// A field computed from `parent_ids` by `code`. The type stays `Auto`
    /// until the values are materialized.
    pub fn derived(id: &str, name: &str, parent_ids: Vec<String>, code: &str) -> Result<Self> {
        ensure!(
            !parent_ids.is_empty(),
            "Derived field '{name}' must name at least one parent field"
        );
        Ok(FieldItem {
            id: id.to_string(),
            name: name.to_string(),
            data_type: DataType::Auto,
            source: FieldSource::Derived,
            domain: Vec::new(),
            levels: None,
            semantic_type: None,
            table_ref: None,
            transform: Some(Transformation {
                parent_ids,
                code: code.to_string(),
                description: String::new(),
            }),
        })
    }

    pub fn is_derived(&self) -> bool {
        self.source == FieldSource::Derived
    }

    pub fn parent_ids(&self) -> &[String] {
        match &self.transform {
            Some(transform) if self.is_derived() => &transform.parent_ids,
            _ => &[],
        }
    }
}

pub fn original_field_id(table_id: &str, name: &str) -> String {
    format!("original--{table_id}--{name}")
}

/// Original fields for every column of `table`, with the column's distinct
/// values as domain.
pub fn fields_for_table(table: &Table) -> Vec<FieldItem> {
    table
        .columns()
        .iter()
        .map(|column| {
            let mut field = FieldItem::original(
                table.id(),
                column.name(),
                column.data_type(),
                column.uniques().to_vec(),
            );
            if let Some(meta) = table.metadata().get(column.name()) {
                if !meta.semantic_type.is_empty() {
                    field.semantic_type = Some(meta.semantic_type.clone());
                }
                if !meta.levels.is_empty() {
                    field.levels = Some(meta.levels.clone());
                }
            }
            field
        })
        .collect()
}

/// Value copy of a field for scratch editing; the original stays untouched
/// until an explicit update is dispatched.
pub fn duplicate_field(field: &FieldItem) -> FieldItem {
    field.clone()
}

/// The original and custom fields `field` is ultimately computed from.
///
/// Results are deduplicated by id in discovery order. A field reached a second
/// time is treated as a base field instead of being expanded again, so a
/// corrupted parent chain still terminates.
pub fn find_base_fields(field: &FieldItem, all_fields: &[FieldItem]) -> Vec<FieldItem> {
    let by_id: HashMap<&str, &FieldItem> = all_fields.iter().map(|f| (f.id.as_str(), f)).collect();
    let mut visited = HashSet::new();
    let mut emitted = HashSet::new();
    let mut bases = Vec::new();
    collect_base_fields(field, &by_id, &mut visited, &mut emitted, &mut bases);
    bases
}

fn collect_base_fields<'a>(
    field: &'a FieldItem,
    by_id: &HashMap<&str, &'a FieldItem>,
    visited: &mut HashSet<&'a str>,
    emitted: &mut HashSet<&'a str>,
    bases: &mut Vec<FieldItem>,
) {
    let first_visit = visited.insert(field.id.as_str());
    if !first_visit || !field.is_derived() {
        if emitted.insert(field.id.as_str()) {
            bases.push(field.clone());
        }
        return;
    }
    for parent_id in field.parent_ids() {
        match by_id.get(parent_id.as_str()) {
            Some(parent) => collect_base_fields(parent, by_id, visited, emitted, bases),
            None => warn!(
                "Field '{}' references unknown parent '{}'",
                field.id, parent_id
            ),
        }
    }
}

/// Whether giving `field_id` the parents `parent_ids` would make it its own
/// ancestor.
pub fn would_create_cycle(field_id: &str, parent_ids: &[String], all_fields: &[FieldItem]) -> bool {
    let by_id: HashMap<&str, &FieldItem> = all_fields.iter().map(|f| (f.id.as_str(), f)).collect();
    let mut seen = HashSet::new();
    let mut stack: Vec<&str> = parent_ids.iter().map(String::as_str).collect();

    while let Some(current) = stack.pop() {
        if current == field_id {
            return true;
        }
        if !seen.insert(current) {
            continue;
        }
        if let Some(parent) = by_id.get(current) {
            stack.extend(parent.parent_ids().iter().map(String::as_str));
        }
    }
    false
}
