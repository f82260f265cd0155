//! Tabular data model: typed columns plus a row-object view.
//!
//! A [`Table`] is built once from row objects by [`build_table()`] and is never
//! patched in place. Operations that change the column set (such as
//! [`Table::with_column()`]) return a rebuilt table whose row objects are
//! regenerated from the columns, so the columnar and row views always agree.

use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    lineage::Trigger,
    types::{DataType, coerce_values, display_value, infer_type},
};

pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    values: Vec<Value>,
    data_type: DataType,
    uniques: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>, data_type: DataType) -> Self {
        let uniques = distinct_values(&values);
        Self {
            name: name.into(),
            values,
            data_type,
            uniques,
        }
    }

    /// Infers the type of `raw` and stores the coerced values.
    pub fn from_raw(name: impl Into<String>, raw: &[Value]) -> Self {
        let data_type = infer_type(raw);
        Self::new(name, coerce_values(raw, data_type), data_type)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Distinct non-null values in first-appearance order.
    pub fn uniques(&self) -> &[Value] {
        &self.uniques
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn distinct_values(values: &[Value]) -> Vec<Value> {
    let mut seen = HashSet::new();
    values
        .iter()
        .filter(|v| !v.is_null())
        .filter(|v| seen.insert(v.to_string()))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub semantic_type: String,
    #[serde(default)]
    pub levels: Vec<Value>,
}

impl ColumnMetadata {
    fn for_type(data_type: DataType) -> Self {
        Self {
            data_type,
            semantic_type: String::new(),
            levels: Vec::new(),
        }
    }
}

/// How a table was produced from other tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Derivation {
    pub source: Vec<String>,
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default)]
    pub dialog: Vec<Value>,
    pub trigger: Trigger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TableRecord", into = "TableRecord")]
pub struct Table {
    id: String,
    columns: Vec<Column>,
    rows: Vec<Row>,
    anchored: bool,
    metadata: BTreeMap<String, ColumnMetadata>,
    derive: Option<Derivation>,
}

impl Table {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    pub fn metadata(&self) -> &BTreeMap<String, ColumnMetadata> {
        &self.metadata
    }

    pub fn derive(&self) -> Option<&Derivation> {
        self.derive.as_ref()
    }

    /// Records asynchronous analysis results for a column. Unknown columns are ignored.
    pub fn annotate(&mut self, column: &str, semantic_type: &str, levels: Vec<Value>) {
        if let Some(meta) = self.metadata.get_mut(column) {
            meta.semantic_type = semantic_type.to_string();
            meta.levels = levels;
        }
    }

    /// Returns a rebuilt table with `column` appended, or replacing the
    /// existing column of the same name.
    ///
    /// Columns shorter than the table are padded with nulls; longer ones are
    /// truncated so every column keeps the table's row count.
    pub fn with_column(&self, column: Column) -> Table {
        let row_count = if self.columns.is_empty() {
            column.len()
        } else {
            self.row_count()
        };
        let mut values = column.values;
        values.resize(row_count, Value::Null);
        let column = Column::new(column.name, values, column.data_type);

        let mut columns = self.columns.clone();
        match columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => columns.push(column),
        }
        let mut metadata = self.metadata.clone();
        for c in &columns {
            metadata
                .entry(c.name.clone())
                .and_modify(|meta| meta.data_type = c.data_type)
                .or_insert_with(|| ColumnMetadata::for_type(c.data_type));
        }
        Table {
            id: self.id.clone(),
            rows: regenerate_rows(&columns),
            columns,
            anchored: self.anchored,
            metadata,
            derive: self.derive.clone(),
        }
    }
}

pub fn build_table(id: &str, rows: &[Row], anchored: bool, derive: Option<Derivation>) -> Table {
    let Some(first) = rows.first() else {
        return Table {
            id: id.to_string(),
            columns: Vec::new(),
            rows: Vec::new(),
            anchored,
            metadata: BTreeMap::new(),
            derive,
        };
    };

    let raw_names = first.keys().cloned().collect::<Vec<_>>();
    let names = sanitize_column_names(&raw_names);
    let columns = raw_names
        .iter()
        .zip(&names)
        .map(|(raw, name)| {
            let values = rows
                .iter()
                .map(|row| row.get(raw).cloned().unwrap_or(Value::Null))
                .collect::<Vec<_>>();
            Column::from_raw(name.clone(), &values)
        })
        .collect::<Vec<_>>();

    let metadata = columns
        .iter()
        .map(|c| (c.name.clone(), ColumnMetadata::for_type(c.data_type)))
        .collect();

    Table {
        id: id.to_string(),
        rows: regenerate_rows(&columns),
        columns,
        anchored,
        metadata,
        derive,
    }
}

/// Makes column names safe for use as field references in a chart spec.
///
/// Blank names become `c{index}` and dots become underscores, since the
/// renderer reads a dot in a field name as nested access. Any collision this
/// produces gets a `_{k}` suffix.
pub fn sanitize_column_names(raw: &[String]) -> Vec<String> {
    let mut taken: HashSet<String> = raw
        .iter()
        .filter(|name| !name.trim().is_empty() && !name.contains('.'))
        .cloned()
        .collect();
    let mut emitted: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(raw.len());

    for (idx, name) in raw.iter().enumerate() {
        let base = if name.trim().is_empty() {
            format!("c{idx}")
        } else {
            name.replace('.', "_")
        };
        let untouched = !name.trim().is_empty() && !name.contains('.');
        let mut candidate = base.clone();
        let mut k = 1;
        while emitted.contains(&candidate) || (!untouched && taken.contains(&candidate)) {
            candidate = format!("{base}_{k}");
            k += 1;
        }
        taken.insert(candidate.clone());
        emitted.insert(candidate.clone());
        names.push(candidate);
    }
    names
}

fn regenerate_rows(columns: &[Column]) -> Vec<Row> {
    let row_count = columns.first().map(Column::len).unwrap_or(0);
    (0..row_count)
        .map(|idx| {
            columns
                .iter()
                .map(|c| {
                    let value = c.values.get(idx).cloned().unwrap_or(Value::Null);
                    (c.name.clone(), value)
                })
                .collect()
        })
        .collect()
}

/// Writes the table's rows as delimiter-separated text with a header row.
pub fn export_delimited(table: &Table, delimiter: u8) -> Result<String> {
    if table.columns.is_empty() {
        return Ok(String::new());
    }
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true)
        .from_writer(Vec::new());
    writer
        .write_record(table.names())
        .context("Writing header row")?;
    for (idx, row) in table.rows.iter().enumerate() {
        let record = table
            .columns
            .iter()
            .map(|c| row.get(&c.name).map(display_value).unwrap_or_default());
        writer
            .write_record(record)
            .with_context(|| format!("Writing row {}", idx + 1))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| anyhow!("Flushing delimited output: {}", err.error()))?;
    String::from_utf8(bytes).context("Delimited output is not valid UTF-8")
}

#[derive(Serialize, Deserialize)]
struct TableRecord {
    id: String,
    #[serde(default)]
    anchored: bool,
    rows: Vec<Row>,
    #[serde(default)]
    metadata: BTreeMap<String, ColumnMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    derive: Option<Derivation>,
}

impl From<TableRecord> for Table {
    fn from(record: TableRecord) -> Self {
        let mut table = build_table(&record.id, &record.rows, record.anchored, record.derive);
        for (name, meta) in record.metadata {
            table.annotate(&name, &meta.semantic_type, meta.levels);
        }
        table
    }
}

impl From<Table> for TableRecord {
    fn from(table: Table) -> Self {
        TableRecord {
            id: table.id,
            anchored: table.anchored,
            rows: table.rows,
            metadata: table.metadata,
            derive: table.derive,
        }
    }
}
