//! Spec assembly: chart template + channel bindings + table → rendering spec.
//!
//! ## Steps
//!
//! 1. Look up the template by chart name.
//! 2. Copy its skeleton; the shared template is never touched.
//! 3. For every bound channel the template declares, build an encoding
//!    fragment (`field`, `type` and the configured aggregate, bin, sort, stack
//!    and color scheme) and merge the identical fragment into each location the
//!    channel maps to.
//! 4. Run the template's post-processing strategy over the table's rows.

use std::collections::{BTreeSet, HashMap};

use log::{debug, warn};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::{
    concept::FieldItem,
    encoding::{
        AggregateOp, Channel, EncodingItem, EncodingMap, SortOrder, StackMode, VisualType,
    },
    table::{Row, Table},
    template::{PathSegment, Skeleton, SpecPath, chart_template},
    types::{DataType, resolve_type},
};

/// Rows a post-processing strategy inspects when picking categories.
pub const POSTPROCESS_SAMPLE_ROWS: usize = 5_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChartError {
    #[error("unknown chart type '{0}'")]
    UnknownChartType(String),
    #[error("chart '{chart}' maps channel '{channel}' to '{path}', which does not fit its skeleton")]
    InvalidPath {
        chart: String,
        channel: Channel,
        path: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct AssembleOptions {
    /// Inline the table rows as `data.values`.
    pub embed_data: bool,
}

pub fn assemble_spec(
    chart_type: &str,
    encoding_map: &EncodingMap,
    fields: &[FieldItem],
    table: &Table,
) -> Result<Value, ChartError> {
    assemble_spec_with(chart_type, encoding_map, fields, table, &AssembleOptions::default())
}

pub fn assemble_spec_with(
    chart_type: &str,
    encoding_map: &EncodingMap,
    fields: &[FieldItem],
    table: &Table,
    options: &AssembleOptions,
) -> Result<Value, ChartError> {
    let template = chart_template(chart_type)
        .ok_or_else(|| ChartError::UnknownChartType(chart_type.to_string()))?;
    let mut spec = template.skeleton.instantiate();
    let by_id: HashMap<&str, &FieldItem> = fields.iter().map(|f| (f.id.as_str(), f)).collect();

    for (channel, item) in encoding_map {
        if !template.supports(*channel) {
            debug!("Chart '{chart_type}' has no '{channel}' channel; binding ignored");
            continue;
        }
        let Some(field_id) = item.field_id.as_deref() else {
            continue;
        };
        let Some(field) = by_id.get(field_id) else {
            warn!("Channel '{channel}' of '{chart_type}' is bound to unknown field '{field_id}'");
            continue;
        };
        let fragment = encoding_fragment(field, item, table);
        for path in template.paths_for(*channel) {
            if !merge_at_path(&mut spec, path, &fragment) {
                return Err(ChartError::InvalidPath {
                    chart: chart_type.to_string(),
                    channel: *channel,
                    path: path.to_string(),
                });
            }
        }
    }

    if let Some(post_process) = template.post_process {
        post_process.apply(&mut spec, table.rows());
    }

    if options.embed_data
        && !matches!(template.skeleton, Skeleton::Empty)
        && let Some(object) = spec.as_object_mut()
    {
        object.insert("data".to_string(), json!({ "values": table.rows() }));
    }
    Ok(spec)
}

/// Display datatype of `field` when drawn from `table`. `Auto` fields are
/// typed by inferring over the bound column.
pub fn visual_type(field: &FieldItem, table: &Table) -> VisualType {
    let data_type = match field.data_type {
        DataType::Auto => table
            .column(&field.name)
            .map(|column| resolve_type(DataType::Auto, column.values()))
            .unwrap_or(DataType::String),
        other => other,
    };
    match data_type {
        DataType::Integer | DataType::Number => VisualType::Quantitative,
        DataType::Date => VisualType::Temporal,
        _ if has_levels(field) => VisualType::Ordinal,
        _ => VisualType::Nominal,
    }
}

fn has_levels(field: &FieldItem) -> bool {
    field.levels.as_ref().is_some_and(|levels| !levels.is_empty())
}

pub fn encoding_fragment(field: &FieldItem, item: &EncodingItem, table: &Table) -> Value {
    let mut fragment = Map::new();
    fragment.insert("field".to_string(), json!(field.name));

    let mut visual = visual_type(field, table);
    if let Some(aggregate) = item.aggregate {
        if item.bin {
            warn!(
                "Field '{}' is both binned and aggregated; keeping the aggregate",
                field.name
            );
        }
        fragment.insert("aggregate".to_string(), json!(aggregate.vega_name()));
        if aggregate == AggregateOp::Count || visual != VisualType::Temporal {
            visual = VisualType::Quantitative;
        }
    } else if item.bin {
        fragment.insert("bin".to_string(), json!(true));
    }
    fragment.insert("type".to_string(), json!(visual.as_str()));

    if let Some(sort) = sort_directive(field, item, visual) {
        fragment.insert("sort".to_string(), sort);
    }
    if let Some(stack) = item.stack {
        let mode = match stack {
            StackMode::Layered => Value::Null,
            StackMode::Zero => json!("zero"),
            StackMode::Normalize => json!("normalize"),
            StackMode::Center => json!("center"),
        };
        fragment.insert("stack".to_string(), mode);
    }
    if let Some(scheme) = &item.scheme {
        fragment.insert("scale".to_string(), json!({ "scheme": scheme }));
    }
    Value::Object(fragment)
}

fn sort_directive(field: &FieldItem, item: &EncodingItem, visual: VisualType) -> Option<Value> {
    let descending = item
        .sort_order
        .is_some_and(|order| order == SortOrder::Descending);
    if let Some(by) = &item.sort_by {
        return Some(if by.parse::<Channel>().is_ok() {
            json!(if descending { format!("-{by}") } else { by.clone() })
        } else {
            json!({
                "field": by,
                "order": if descending { "descending" } else { "ascending" }
            })
        });
    }
    if let Some(order) = item.sort_order {
        return Some(json!(order.as_str()));
    }
    if visual == VisualType::Ordinal {
        return field.levels.clone().map(Value::Array);
    }
    None
}

/// Merges `fragment` into the object at `path`, creating missing object keys
/// along the way. Array indices must already exist. Returns false when the
/// path does not fit the document.
fn merge_at_path(spec: &mut Value, path: &SpecPath, fragment: &Value) -> bool {
    let mut node = spec;
    for segment in path.segments() {
        node = match segment {
            PathSegment::Key(key) => {
                let Some(object) = node.as_object_mut() else {
                    return false;
                };
                let child = object
                    .entry(key.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if child.is_null() {
                    *child = Value::Object(Map::new());
                }
                child
            }
            PathSegment::Index(idx) => match node.as_array_mut().and_then(|a| a.get_mut(*idx)) {
                Some(child) => child,
                None => return false,
            },
        };
    }
    deep_merge(node, fragment);
    true
}

fn deep_merge(target: &mut Value, source: &Value) {
    if let (Some(target_map), Some(source_map)) = (target.as_object_mut(), source.as_object()) {
        for (key, value) in source_map {
            if let Some(existing) = target_map.get_mut(key)
                && existing.is_object()
                && value.is_object()
            {
                deep_merge(existing, value);
                continue;
            }
            target_map.insert(key.clone(), value.clone());
        }
        return;
    }
    *target = source.clone();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renderability {
    pub ok: bool,
    pub missing_field_names: Vec<String>,
}

/// Whether a chart can be drawn from data shaped like `sample_row`.
///
/// At least one channel must be bound and every bound field's name must be a
/// key of the sample row. Bindings to unknown fields are reported by id.
pub fn is_chart_renderable(
    encoding_map: &EncodingMap,
    fields: &[FieldItem],
    sample_row: Option<&Row>,
) -> Renderability {
    let bound = encoding_map
        .values()
        .filter_map(|item| item.field_id.as_deref())
        .collect::<Vec<_>>();
    if bound.is_empty() {
        return Renderability {
            ok: false,
            missing_field_names: Vec::new(),
        };
    }

    let mut missing = BTreeSet::new();
    for field_id in bound {
        let name = fields
            .iter()
            .find(|f| f.id == field_id)
            .map(|f| f.name.as_str())
            .unwrap_or(field_id);
        if !sample_row.is_some_and(|row| row.contains_key(name)) {
            missing.insert(name.to_string());
        }
    }
    Renderability {
        ok: missing.is_empty(),
        missing_field_names: missing.into_iter().collect(),
    }
}
