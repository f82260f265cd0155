//! Channel vocabulary and per-channel encoding configuration.

use std::{collections::BTreeMap, fmt};

use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::lineage::Trigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    X,
    Y,
    X2,
    Y2,
    Color,
    Size,
    Shape,
    Opacity,
    Text,
    Detail,
    Column,
    Row,
    Group,
    Theta,
}

impl Channel {
    pub const ALL: [Channel; 14] = [
        Channel::X,
        Channel::Y,
        Channel::X2,
        Channel::Y2,
        Channel::Color,
        Channel::Size,
        Channel::Shape,
        Channel::Opacity,
        Channel::Text,
        Channel::Detail,
        Channel::Column,
        Channel::Row,
        Channel::Group,
        Channel::Theta,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::X => "x",
            Channel::Y => "y",
            Channel::X2 => "x2",
            Channel::Y2 => "y2",
            Channel::Color => "color",
            Channel::Size => "size",
            Channel::Shape => "shape",
            Channel::Opacity => "opacity",
            Channel::Text => "text",
            Channel::Detail => "detail",
            Channel::Column => "column",
            Channel::Row => "row",
            Channel::Group => "group",
            Channel::Theta => "theta",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Channel::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| anyhow!("Unknown channel '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateOp {
    Count,
    Sum,
    Average,
}

impl AggregateOp {
    /// Operator name in the rendering grammar.
    pub fn vega_name(&self) -> &'static str {
        match self {
            AggregateOp::Count => "count",
            AggregateOp::Sum => "sum",
            AggregateOp::Average => "mean",
        }
    }
}

impl std::str::FromStr for AggregateOp {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "count" => Ok(AggregateOp::Count),
            "sum" => Ok(AggregateOp::Sum),
            "average" | "mean" | "avg" => Ok(AggregateOp::Average),
            other => bail!("Unknown aggregate '{other}'. Supported: count, sum, average"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackMode {
    Layered,
    Zero,
    Normalize,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ascending",
            SortOrder::Descending => "descending",
        }
    }
}

/// Display datatype understood by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualType {
    Quantitative,
    Nominal,
    Ordinal,
    Temporal,
}

impl VisualType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisualType::Quantitative => "quantitative",
            VisualType::Nominal => "nominal",
            VisualType::Ordinal => "ordinal",
            VisualType::Temporal => "temporal",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingItem {
    #[serde(default, rename = "fieldID", skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<AggregateOp>,
    #[serde(default)]
    pub bin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<StackMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
    /// Channel or field name to sort by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
}

impl EncodingItem {
    pub fn bound(field_id: &str) -> Self {
        EncodingItem {
            field_id: Some(field_id.to_string()),
            ..EncodingItem::default()
        }
    }

    pub fn with_aggregate(mut self, aggregate: AggregateOp) -> Self {
        self.aggregate = Some(aggregate);
        self
    }

    pub fn is_bound(&self) -> bool {
        self.field_id.is_some()
    }

    /// Binning and aggregation are competing intents on one channel.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bin && self.aggregate.is_some() {
            bail!("An encoding cannot be both binned and aggregated");
        }
        Ok(())
    }
}

pub type EncodingMap = BTreeMap<Channel, EncodingItem>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub id: String,
    pub chart_type: String,
    #[serde(default)]
    pub encoding_map: EncodingMap,
    pub table_ref: String,
    #[serde(default)]
    pub saved: bool,
    /// Present on scratch charts that only exist as a step of a derivation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intermediate: Option<Trigger>,
}

impl Chart {
    pub fn new(id: &str, chart_type: &str, table_ref: &str) -> Self {
        Chart {
            id: id.to_string(),
            chart_type: chart_type.to_string(),
            encoding_map: EncodingMap::new(),
            table_ref: table_ref.to_string(),
            saved: false,
            intermediate: None,
        }
    }

    pub fn bound_field_ids(&self) -> impl Iterator<Item = &str> {
        self.encoding_map
            .values()
            .filter_map(|item| item.field_id.as_deref())
    }
}
