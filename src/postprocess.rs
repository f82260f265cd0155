//! Template-specific fixups applied to an assembled spec.
//!
//! Every strategy inspects the assembled document and the bound table's rows.
//! Category picks look at the first [`POSTPROCESS_SAMPLE_ROWS`] rows only;
//! scale domains are computed over every row the renderer will aggregate.
//! When the data does not fit a strategy's assumptions, the spec is left as it
//! was.

use std::{cmp::Reverse, collections::HashMap};

use itertools::Itertools;
use log::debug;
use serde_json::{Map, Value, json};

use crate::{assemble::POSTPROCESS_SAMPLE_ROWS, table::Row, types::as_number};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostProcess {
    /// Show the x axis as categories.
    NominalX,
    /// Show both axes as categories.
    NominalXY,
    /// Split a two-sided bar chart on the two most frequent color values and
    /// give both sides the same value domain.
    PyramidSplit,
    /// Keep category identity on the connecting line of a ranged dot plot.
    RangedDotDetail,
}

impl PostProcess {
    pub fn name(&self) -> &'static str {
        match self {
            PostProcess::NominalX => "nominal-x",
            PostProcess::NominalXY => "nominal-xy",
            PostProcess::PyramidSplit => "pyramid-split",
            PostProcess::RangedDotDetail => "ranged-dot-detail",
        }
    }

    pub fn apply(&self, spec: &mut Value, rows: &[Row]) {
        match self {
            PostProcess::NominalX => force_nominal(spec, &["x"]),
            PostProcess::NominalXY => force_nominal(spec, &["x", "y"]),
            PostProcess::PyramidSplit => split_pyramid(spec, rows),
            PostProcess::RangedDotDetail => copy_nominal_axis_to_detail(spec),
        }
    }
}

fn force_nominal(spec: &mut Value, axes: &[&str]) {
    for axis in axes {
        if let Some(encoding) = spec.pointer_mut(&format!("/encoding/{axis}"))
            && let Some(encoding) = encoding.as_object_mut()
            && encoding.contains_key("field")
        {
            encoding.insert("type".to_string(), json!("nominal"));
        }
    }
}

fn copy_nominal_axis_to_detail(spec: &mut Value) {
    let source = ["y", "x"].into_iter().find_map(|axis| {
        spec.pointer(&format!("/encoding/{axis}"))
            .filter(|enc| enc.get("type").and_then(Value::as_str) == Some("nominal"))
            .cloned()
    });
    let Some(source) = source else {
        debug!("Ranged dot plot has no nominal axis; detail left unset");
        return;
    };
    if let Some(layer) = spec
        .pointer_mut("/layer/0/encoding")
        .and_then(Value::as_object_mut)
    {
        layer.insert("detail".to_string(), source);
    }
}

fn field_at<'a>(spec: &'a Value, pointer: &str) -> Option<&'a str> {
    spec.pointer(pointer)
        .and_then(|enc| enc.get("field"))
        .and_then(Value::as_str)
}

fn split_pyramid(spec: &mut Value, rows: &[Row]) {
    let Some(color_field) = field_at(spec, "/hconcat/0/encoding/color").map(str::to_string)
    else {
        debug!("Pyramid chart has no color field; sides left unfiltered");
        return;
    };
    let sample = &rows[..rows.len().min(POSTPROCESS_SAMPLE_ROWS)];
    let sides = most_frequent_values(sample, &color_field, 2);
    if sides.len() < 2 {
        debug!("Pyramid chart needs two values of '{color_field}', found {}", sides.len());
        return;
    }

    let has_filters = (0..2).all(|i| spec.pointer(&format!("/hconcat/{i}/transform/0")).is_some());
    if !has_filters {
        return;
    }
    for (i, value) in sides.iter().enumerate() {
        if let Some(slot) = spec.pointer_mut(&format!("/hconcat/{i}/transform/0")) {
            *slot = json!({"filter": {"field": color_field, "equal": value}});
        }
    }

    let Some(x_field) = field_at(spec, "/hconcat/0/encoding/x").map(str::to_string) else {
        return;
    };
    let y_field = field_at(spec, "/hconcat/0/encoding/y").map(str::to_string);
    let aggregate = spec
        .pointer("/hconcat/0/encoding/x/aggregate")
        .and_then(Value::as_str)
        .map(str::to_string);
    let Some(max) = side_maximum(
        rows,
        &color_field,
        &sides,
        &x_field,
        y_field.as_deref(),
        aggregate.as_deref(),
    ) else {
        debug!("Pyramid chart has no positive values in '{x_field}'; domain left open");
        return;
    };

    for i in 0..2 {
        if let Some(x) = spec
            .pointer_mut(&format!("/hconcat/{i}/encoding/x"))
            .and_then(Value::as_object_mut)
            && let Some(scale) = object_entry(x, "scale")
        {
            scale.insert("domain".to_string(), json!([0, max]));
        }
    }
}

fn object_entry<'a>(object: &'a mut Map<String, Value>, key: &str) -> Option<&'a mut Map<String, Value>> {
    let entry = object
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if entry.is_null() {
        *entry = Value::Object(Map::new());
    }
    entry.as_object_mut()
}

/// Up to `limit` distinct non-null values of `field`, most frequent first;
/// ties keep first-appearance order.
fn most_frequent_values(rows: &[Row], field: &str, limit: usize) -> Vec<Value> {
    let values = rows
        .iter()
        .filter_map(|row| row.get(field))
        .filter(|v| !v.is_null())
        .collect::<Vec<_>>();
    let counts = values.iter().map(|v| v.to_string()).counts();
    let mut distinct = values
        .into_iter()
        .unique_by(|v| v.to_string())
        .collect::<Vec<_>>();
    distinct.sort_by_key(|v| Reverse(counts.get(&v.to_string()).copied().unwrap_or(0)));
    distinct.into_iter().take(limit).cloned().collect()
}

/// Largest bar length across both sides, honoring the x aggregate.
fn side_maximum(
    rows: &[Row],
    color_field: &str,
    sides: &[Value],
    x_field: &str,
    y_field: Option<&str>,
    aggregate: Option<&str>,
) -> Option<f64> {
    let mut groups: HashMap<(String, String), (f64, usize)> = HashMap::new();
    let mut raw_max: Option<f64> = None;

    for row in rows {
        let Some(color) = row.get(color_field).filter(|c| sides.contains(c)) else {
            continue;
        };
        let y = y_field
            .and_then(|f| row.get(f))
            .map(|v| v.to_string())
            .unwrap_or_default();
        let x = row.get(x_field).and_then(as_number);
        let group = groups.entry((color.to_string(), y)).or_insert((0.0, 0));
        group.1 += 1;
        if let Some(x) = x {
            group.0 += x;
            raw_max = Some(raw_max.map_or(x, |m| m.max(x)));
        }
    }

    let max = match aggregate {
        Some("count") => groups.values().map(|(_, n)| *n as f64).reduce(f64::max),
        Some("sum") => groups.values().map(|(sum, _)| *sum).reduce(f64::max),
        Some("mean") => groups
            .values()
            .filter(|(_, n)| *n > 0)
            .map(|(sum, n)| sum / *n as f64)
            .reduce(f64::max),
        _ => raw_max,
    };
    max.filter(|m| m.is_finite() && *m > 0.0)
}
