//! Table derivation lineage.
//!
//! Every derived table carries exactly one [`Trigger`] in its
//! [`Derivation`](crate::table::Derivation), naming the table it was derived
//! from. Following those links backwards reconstructs the "thread" of
//! instructions that produced a table.

use std::collections::{HashMap, HashSet, VecDeque};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    /// Table the user was looking at when the derivation was requested.
    pub table_id: String,
    #[serde(default)]
    pub source_table_ids: Vec<String>,
    pub instruction: String,
    pub result_table_id: String,
    /// Chart whose encoding motivated the derivation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_ref: Option<String>,
}

impl Trigger {
    pub fn new(table_id: &str, instruction: &str, result_table_id: &str) -> Self {
        Trigger {
            table_id: table_id.to_string(),
            source_table_ids: vec![table_id.to_string()],
            instruction: instruction.to_string(),
            result_table_id: result_table_id.to_string(),
            chart_ref: None,
        }
    }
}

/// Triggers leading to `table`, oldest first.
///
/// The walk stops quietly when an originating table is missing from
/// `all_tables` or a table id repeats.
pub fn trigger_chain(table: &Table, all_tables: &[Table]) -> Vec<Trigger> {
    let by_id: HashMap<&str, &Table> = all_tables.iter().map(|t| (t.id(), t)).collect();
    let mut visited = HashSet::new();
    let mut chain = Vec::new();
    let mut current = table;

    while visited.insert(current.id()) {
        let Some(derive) = current.derive() else {
            break;
        };
        chain.push(derive.trigger.clone());
        match by_id.get(derive.trigger.table_id.as_str()).copied() {
            Some(previous) => current = previous,
            None => {
                warn!(
                    "Lineage of '{}' references missing table '{}'",
                    table.id(),
                    derive.trigger.table_id
                );
                break;
            }
        }
    }
    chain.reverse();
    chain
}

/// Ids of every table whose derivation depends, directly or transitively, on
/// `table_id`. Order is breadth-first from the given table.
pub fn derived_descendants(table_id: &str, all_tables: &[Table]) -> Vec<String> {
    let mut found = Vec::new();
    let mut seen: HashSet<&str> = HashSet::from([table_id]);
    let mut queue = VecDeque::from([table_id]);

    while let Some(current) = queue.pop_front() {
        for table in all_tables {
            let Some(derive) = table.derive() else {
                continue;
            };
            if derive.source.iter().any(|s| s == current) && seen.insert(table.id()) {
                found.push(table.id().to_string());
                queue.push_back(table.id());
            }
        }
    }
    found
}
