//! Session store for tables, fields and charts.
//!
//! All mutation goes through [`Session::dispatch()`], which validates an
//! [`Action`] against the current state before applying it. A rejected action
//! leaves the session untouched.
//!
//! ## Invariants
//!
//! - Table ids are unique and a derivation only names tables already loaded,
//!   so table lineage stays acyclic.
//! - Field ids are unique; derived fields never become their own ancestor.
//! - Every chart channel is declared by the chart's template and every bound
//!   field id resolves.

use std::{
    collections::HashSet,
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    concept::{FieldItem, FieldSource, fields_for_table, would_create_cycle},
    encoding::{Channel, Chart, EncodingItem},
    lineage::derived_descendants,
    table::Table,
    template::chart_template,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("table '{0}' already exists")]
    DuplicateTable(String),
    #[error("table '{0}' does not exist")]
    UnknownTable(String),
    #[error("field '{0}' already exists")]
    DuplicateField(String),
    #[error("field '{0}' does not exist")]
    UnknownField(String),
    #[error("derived field '{0}' would become its own ancestor")]
    CyclicField(String),
    #[error("derived field '{0}' has no transformation parents")]
    MissingTransform(String),
    #[error("chart '{0}' already exists")]
    DuplicateChart(String),
    #[error("chart '{0}' does not exist")]
    UnknownChart(String),
    #[error("unknown chart type '{0}'")]
    UnknownChartType(String),
    #[error("chart type '{chart_type}' has no '{channel}' channel")]
    IllegalChannel { chart_type: String, channel: Channel },
    #[error("invalid encoding on '{channel}': {message}")]
    InvalidEncoding { channel: Channel, message: String },
}

#[derive(Debug, Clone)]
pub enum Action {
    /// Adds a table and registers original fields for its columns.
    LoadTable(Table),
    /// Removes a table, every table derived from it, their charts and their
    /// original fields.
    DeleteTable(String),
    AddField(FieldItem),
    UpdateField(FieldItem),
    /// Removes a field and clears every encoding bound to it.
    DeleteField(String),
    CreateChart(Chart),
    SetEncoding {
        chart_id: String,
        channel: Channel,
        item: EncodingItem,
    },
    DeleteChart(String),
    Reset,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub fields: Vec<FieldItem>,
    #[serde(default)]
    pub charts: Vec<Chart>,
}

impl Session {
    pub fn new() -> Self {
        Session::default()
    }

    pub fn table(&self, id: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.id() == id)
    }

    pub fn field(&self, id: &str) -> Option<&FieldItem> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn chart(&self, id: &str) -> Option<&Chart> {
        self.charts.iter().find(|c| c.id == id)
    }

    pub fn dispatch(&mut self, action: Action) -> Result<(), StoreError> {
        match action {
            Action::LoadTable(table) => self.load_table(table),
            Action::DeleteTable(id) => self.delete_table(&id),
            Action::AddField(field) => self.add_field(field),
            Action::UpdateField(field) => self.update_field(field),
            Action::DeleteField(id) => self.delete_field(&id),
            Action::CreateChart(chart) => self.create_chart(chart),
            Action::SetEncoding {
                chart_id,
                channel,
                item,
            } => self.set_encoding(&chart_id, channel, item),
            Action::DeleteChart(id) => {
                let before = self.charts.len();
                self.charts.retain(|c| c.id != id);
                if self.charts.len() == before {
                    return Err(StoreError::UnknownChart(id));
                }
                Ok(())
            }
            Action::Reset => {
                *self = Session::default();
                Ok(())
            }
        }
    }

    fn load_table(&mut self, table: Table) -> Result<(), StoreError> {
        if self.table(table.id()).is_some() {
            return Err(StoreError::DuplicateTable(table.id().to_string()));
        }
        if let Some(derive) = table.derive()
            && let Some(missing) = derive.source.iter().find(|s| self.table(s).is_none())
        {
            return Err(StoreError::UnknownTable(missing.clone()));
        }
        let known = self.fields.iter().map(|f| f.id.clone()).collect::<HashSet<_>>();
        let originals = fields_for_table(&table)
            .into_iter()
            .filter(|f| !known.contains(&f.id))
            .collect::<Vec<_>>();
        debug!(
            "Loaded table '{}' with {} original field(s)",
            table.id(),
            originals.len()
        );
        self.fields.extend(originals);
        self.tables.push(table);
        Ok(())
    }

    fn delete_table(&mut self, id: &str) -> Result<(), StoreError> {
        if self.table(id).is_none() {
            return Err(StoreError::UnknownTable(id.to_string()));
        }
        let mut doomed = derived_descendants(id, &self.tables);
        doomed.push(id.to_string());
        let doomed = doomed.into_iter().collect::<HashSet<_>>();

        self.tables.retain(|t| !doomed.contains(t.id()));
        self.charts.retain(|c| !doomed.contains(&c.table_ref));
        let removed = self.collect_garbage();
        info!(
            "Deleted {} table(s) and {} unreachable field(s)",
            doomed.len(),
            removed
        );
        Ok(())
    }

    fn validate_field(&self, field: &FieldItem) -> Result<(), StoreError> {
        if field.source != FieldSource::Derived {
            return Ok(());
        }
        let parents = field.parent_ids();
        if parents.is_empty() {
            return Err(StoreError::MissingTransform(field.id.clone()));
        }
        if let Some(missing) = parents.iter().find(|p| self.field(p).is_none()) {
            return Err(StoreError::UnknownField(missing.clone()));
        }
        if would_create_cycle(&field.id, parents, &self.fields) {
            return Err(StoreError::CyclicField(field.id.clone()));
        }
        Ok(())
    }

    fn add_field(&mut self, field: FieldItem) -> Result<(), StoreError> {
        if self.field(&field.id).is_some() {
            return Err(StoreError::DuplicateField(field.id));
        }
        self.validate_field(&field)?;
        self.fields.push(field);
        Ok(())
    }

    fn update_field(&mut self, field: FieldItem) -> Result<(), StoreError> {
        let Some(position) = self.fields.iter().position(|f| f.id == field.id) else {
            return Err(StoreError::UnknownField(field.id));
        };
        self.validate_field(&field)?;
        self.fields[position] = field;
        Ok(())
    }

    fn delete_field(&mut self, id: &str) -> Result<(), StoreError> {
        if self.field(id).is_none() {
            return Err(StoreError::UnknownField(id.to_string()));
        }
        self.fields.retain(|f| f.id != id);
        self.collect_garbage();
        Ok(())
    }

    fn create_chart(&mut self, chart: Chart) -> Result<(), StoreError> {
        if self.chart(&chart.id).is_some() {
            return Err(StoreError::DuplicateChart(chart.id));
        }
        if chart_template(&chart.chart_type).is_none() {
            return Err(StoreError::UnknownChartType(chart.chart_type));
        }
        if self.table(&chart.table_ref).is_none() {
            return Err(StoreError::UnknownTable(chart.table_ref));
        }
        for (channel, item) in &chart.encoding_map {
            self.validate_encoding(&chart.chart_type, *channel, item)?;
        }
        self.charts.push(chart);
        Ok(())
    }

    fn set_encoding(
        &mut self,
        chart_id: &str,
        channel: Channel,
        item: EncodingItem,
    ) -> Result<(), StoreError> {
        let chart_type = self
            .chart(chart_id)
            .map(|c| c.chart_type.clone())
            .ok_or_else(|| StoreError::UnknownChart(chart_id.to_string()))?;
        self.validate_encoding(&chart_type, channel, &item)?;
        if let Some(chart) = self.charts.iter_mut().find(|c| c.id == chart_id) {
            chart.encoding_map.insert(channel, item);
        }
        Ok(())
    }

    fn validate_encoding(
        &self,
        chart_type: &str,
        channel: Channel,
        item: &EncodingItem,
    ) -> Result<(), StoreError> {
        let template = chart_template(chart_type)
            .ok_or_else(|| StoreError::UnknownChartType(chart_type.to_string()))?;
        if !template.supports(channel) {
            return Err(StoreError::IllegalChannel {
                chart_type: chart_type.to_string(),
                channel,
            });
        }
        item.validate()
            .map_err(|err| StoreError::InvalidEncoding {
                channel,
                message: err.to_string(),
            })?;
        if let Some(field_id) = &item.field_id
            && self.field(field_id).is_none()
        {
            return Err(StoreError::UnknownField(field_id.clone()));
        }
        Ok(())
    }

    /// Drops fields that can no longer be reached: original fields whose table
    /// is gone, and derived fields with a missing ancestor. Encodings bound to
    /// dropped fields are cleared. Returns the number of fields removed.
    pub fn collect_garbage(&mut self) -> usize {
        let before = self.fields.len();
        let tables = self.tables.iter().map(|t| t.id()).collect::<HashSet<_>>();
        self.fields.retain(|f| match (&f.source, &f.table_ref) {
            (FieldSource::Original, Some(table)) => tables.contains(table.as_str()),
            _ => true,
        });

        loop {
            let ids = self.fields.iter().map(|f| f.id.clone()).collect::<HashSet<_>>();
            let count = self.fields.len();
            self.fields
                .retain(|f| f.parent_ids().iter().all(|p| ids.contains(p)));
            if self.fields.len() == count {
                break;
            }
        }

        let ids = self.fields.iter().map(|f| f.id.as_str()).collect::<HashSet<_>>();
        for chart in &mut self.charts {
            for item in chart.encoding_map.values_mut() {
                if item.field_id.as_deref().is_some_and(|id| !ids.contains(id)) {
                    item.field_id = None;
                }
            }
        }
        before - self.fields.len()
    }

    /// Reads a session file; `.json` files are JSON, anything else YAML.
    ///
    /// The decoded state is checked with [`Session::validate()`] and rejected
    /// when it breaks a store invariant.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening session file {path:?}"))?;
        let reader = BufReader::new(file);
        let session: Session = if is_json(path) {
            serde_json::from_reader(reader).context("Parsing session JSON")?
        } else {
            serde_yaml::from_reader(reader).context("Parsing session YAML")?
        };
        session
            .validate()
            .with_context(|| format!("Session file {path:?} is inconsistent"))?;
        debug!(
            "Loaded session with {} table(s), {} field(s) and {} chart(s)",
            session.tables.len(),
            session.fields.len(),
            session.charts.len()
        );
        Ok(session)
    }

    /// Replays tables, fields and charts through [`Session::dispatch()`] into
    /// an empty session, in stored order, and reports the first rejection.
    pub fn validate(&self) -> Result<(), StoreError> {
        let mut replay = Session::new();
        for table in &self.tables {
            replay.dispatch(Action::LoadTable(table.clone()))?;
        }
        // Original fields deleted before saving stay deleted.
        let stored = self.fields.iter().map(|f| f.id.as_str()).collect::<HashSet<_>>();
        replay.fields.retain(|f| stored.contains(f.id.as_str()));
        // An update can point a field at a parent stored after it, so fields
        // are retried until a pass makes no progress.
        let mut pending = self.fields.iter().collect::<Vec<_>>();
        while !pending.is_empty() {
            let mut deferred = Vec::new();
            let mut first_error = None;
            for field in pending.iter().copied() {
                let action = if replay.field(&field.id).is_some() {
                    Action::UpdateField(field.clone())
                } else {
                    Action::AddField(field.clone())
                };
                if let Err(err) = replay.dispatch(action) {
                    first_error.get_or_insert(err);
                    deferred.push(field);
                }
            }
            if deferred.len() == pending.len()
                && let Some(err) = first_error
            {
                return Err(err);
            }
            pending = deferred;
        }
        for chart in &self.charts {
            replay.dispatch(Action::CreateChart(chart.clone()))?;
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("Creating session file {path:?}"))?;
        let writer = BufWriter::new(file);
        if is_json(path) {
            serde_json::to_writer_pretty(writer, self).context("Writing session JSON")
        } else {
            serde_yaml::to_writer(writer, self).context("Writing session YAML")
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
