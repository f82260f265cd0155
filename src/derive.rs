//! Materializes derived fields into table columns.
//!
//! A derived field's transformation code is an `evalexpr` expression. Each
//! parent field's value is bound under the field's name, its normalized name,
//! and positionally as `p0`, `p1`, ... in parent order; `row_number` holds the
//! 1-based row position.

use std::collections::HashMap;

use evalexpr::{
    ContextWithMutableVariables, HashMapContext, Node, Value as EvalValue, build_operator_tree,
};
use log::debug;
use serde_json::{Number, Value};
use thiserror::Error;

use crate::{
    concept::{FieldItem, FieldSource},
    table::{Column, Table, sanitize_column_names},
};

#[derive(Debug, Error)]
pub enum DeriveError {
    #[error("field '{0}' is not a derived field")]
    NotDerived(String),
    #[error("parent '{parent}' of field '{field}' is not a known field")]
    UnknownParent { field: String, parent: String },
    #[error("parent '{parent}' of field '{field}' is not a column of table '{table}'")]
    MissingColumn {
        field: String,
        parent: String,
        table: String,
    },
    #[error("transformation of field '{field}' does not parse: {message}")]
    InvalidExpression { field: String, message: String },
    #[error("field '{field}' would overwrite original column '{column}' of table '{table}'")]
    ColumnConflict {
        field: String,
        column: String,
        table: String,
    },
}

pub fn normalize_column_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' => c,
            _ => '_',
        })
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Evaluates `field`'s transformation over every row of `table` and returns a
/// rebuilt table containing the result as a column named after the field.
///
/// The column name is sanitized like loaded headers. Re-deriving a field
/// replaces its earlier column; a column claimed by an original field of
/// `table` is never replaced.
///
/// Rows whose evaluation fails get a null cell.
pub fn derive_column(
    table: &Table,
    field: &FieldItem,
    all_fields: &[FieldItem],
) -> Result<Table, DeriveError> {
    let transform = match &field.transform {
        Some(transform) if field.is_derived() => transform,
        _ => return Err(DeriveError::NotDerived(field.id.clone())),
    };

    let column_name = sanitize_column_names(std::slice::from_ref(&field.name))
        .into_iter()
        .next()
        .unwrap_or_else(|| field.name.clone());
    let claimed = all_fields.iter().any(|f| {
        f.source == FieldSource::Original
            && f.name == column_name
            && f.table_ref.as_deref() == Some(table.id())
    });
    if claimed && table.column(&column_name).is_some() {
        return Err(DeriveError::ColumnConflict {
            field: field.id.clone(),
            column: column_name,
            table: table.id().to_string(),
        });
    }

    let by_id: HashMap<&str, &FieldItem> = all_fields.iter().map(|f| (f.id.as_str(), f)).collect();
    let mut parents = Vec::with_capacity(transform.parent_ids.len());
    for parent_id in &transform.parent_ids {
        let parent = by_id
            .get(parent_id.as_str())
            .ok_or_else(|| DeriveError::UnknownParent {
                field: field.id.clone(),
                parent: parent_id.clone(),
            })?;
        if table.column(&parent.name).is_none() {
            return Err(DeriveError::MissingColumn {
                field: field.id.clone(),
                parent: parent.name.clone(),
                table: table.id().to_string(),
            });
        }
        parents.push(parent.name.as_str());
    }

    let tree: Node = build_operator_tree(&transform.code).map_err(|err| {
        DeriveError::InvalidExpression {
            field: field.id.clone(),
            message: err.to_string(),
        }
    })?;

    let values = table
        .rows()
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            let bound = parents
                .iter()
                .map(|name| row.get(*name).cloned().unwrap_or(Value::Null))
                .collect::<Vec<_>>();
            match evaluate_row(&tree, &parents, &bound, idx + 1) {
                Ok(value) => value,
                Err(message) => {
                    debug!(
                        "Row {} of '{}' yields no value for '{}': {message}",
                        idx + 1,
                        table.id(),
                        column_name
                    );
                    Value::Null
                }
            }
        })
        .collect::<Vec<_>>();

    Ok(table.with_column(Column::from_raw(column_name, &values)))
}

fn evaluate_row(
    tree: &Node,
    names: &[&str],
    values: &[Value],
    row_number: usize,
) -> Result<Value, String> {
    let mut context = HashMapContext::new();
    for (idx, (name, value)) in names.iter().zip(values).enumerate() {
        let bound = json_to_evalexpr(value);
        for key in [
            name.to_string(),
            normalize_column_name(name),
            format!("p{idx}"),
        ] {
            context
                .set_value(key, bound.clone())
                .map_err(|err| err.to_string())?;
        }
    }
    context
        .set_value("row_number".into(), EvalValue::Int(row_number as i64))
        .map_err(|err| err.to_string())?;

    let result = tree
        .eval_with_context(&context)
        .map_err(|err| err.to_string())?;
    Ok(evalexpr_to_json(result))
}

fn json_to_evalexpr(value: &Value) -> EvalValue {
    match value {
        Value::Null => EvalValue::Empty,
        Value::Bool(b) => EvalValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => EvalValue::Int(i),
            None => EvalValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => EvalValue::String(s.clone()),
        other => EvalValue::String(other.to_string()),
    }
}

fn evalexpr_to_json(value: EvalValue) -> Value {
    match value {
        EvalValue::String(s) => Value::String(s),
        EvalValue::Int(i) => Value::from(i),
        EvalValue::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        EvalValue::Boolean(b) => Value::Bool(b),
        EvalValue::Tuple(values) => Value::Array(values.into_iter().map(evalexpr_to_json).collect()),
        EvalValue::Empty => Value::Null,
    }
}
