//! Chart template registry.
//!
//! Each [`ChartTemplate`] pairs a spec skeleton with the channels it accepts
//! and, per channel, the location(s) inside the skeleton where the channel's
//! encoding is written. The registry is built once and shared; chart names are
//! unique across every family so lookups can ignore families entirely.

use std::{collections::BTreeMap, fmt, sync::OnceLock};

use serde_json::{Value, json};

use crate::{encoding::Channel, postprocess::PostProcess};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSegment {
    Key(&'static str),
    Index(usize),
}

/// Location inside a spec document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecPath(Vec<PathSegment>);

impl SpecPath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        SpecPath(segments)
    }

    /// `encoding.<channel key>` of a single-view spec.
    pub fn encoding(key: &'static str) -> Self {
        SpecPath(vec![PathSegment::Key("encoding"), PathSegment::Key(key)])
    }

    /// `<container>[index].encoding.<key>` of a layered or concatenated spec.
    pub fn nested(container: &'static str, index: usize, key: &'static str) -> Self {
        SpecPath(vec![
            PathSegment::Key(container),
            PathSegment::Index(index),
            PathSegment::Key("encoding"),
            PathSegment::Key(key),
        ])
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Reads the value at this path, if every segment resolves.
    pub fn lookup<'a>(&self, spec: &'a Value) -> Option<&'a Value> {
        self.0.iter().try_fold(spec, |node, segment| match segment {
            PathSegment::Key(key) => node.get(*key),
            PathSegment::Index(idx) => node.get(*idx),
        })
    }
}

impl fmt::Display for SpecPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if idx == 0 => write!(f, "{key}")?,
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

/// Where a channel is written: one location, or several that all receive the
/// same fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelPaths {
    One(SpecPath),
    Many(Vec<SpecPath>),
}

impl ChannelPaths {
    pub fn paths(&self) -> &[SpecPath] {
        match self {
            ChannelPaths::One(path) => std::slice::from_ref(path),
            ChannelPaths::Many(paths) => paths,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Skeleton {
    /// Rendered as a data grid; no spec is produced.
    Empty,
    Single(Value),
    Layered(Value),
    Concat(Value),
}

impl Skeleton {
    pub fn shape(&self) -> &'static str {
        match self {
            Skeleton::Empty => "empty",
            Skeleton::Single(_) => "single",
            Skeleton::Layered(_) => "layered",
            Skeleton::Concat(_) => "concat",
        }
    }

    /// A fresh copy of the skeleton document.
    pub fn instantiate(&self) -> Value {
        match self {
            Skeleton::Empty => json!({}),
            Skeleton::Single(spec) | Skeleton::Layered(spec) | Skeleton::Concat(spec) => {
                spec.clone()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChartTemplate {
    pub name: &'static str,
    pub icon: &'static str,
    pub skeleton: Skeleton,
    pub channels: Vec<Channel>,
    pub paths: BTreeMap<Channel, ChannelPaths>,
    pub post_process: Option<PostProcess>,
}

impl ChartTemplate {
    fn single(name: &'static str, icon: &'static str, spec: Value, channels: &[Channel]) -> Self {
        let paths = channels
            .iter()
            .map(|c| (*c, ChannelPaths::One(SpecPath::encoding(encoding_key(*c)))))
            .collect();
        ChartTemplate {
            name,
            icon,
            skeleton: Skeleton::Single(spec),
            channels: channels.to_vec(),
            paths,
            post_process: None,
        }
    }

    fn grid(name: &'static str, icon: &'static str) -> Self {
        ChartTemplate {
            name,
            icon,
            skeleton: Skeleton::Empty,
            channels: Vec::new(),
            paths: BTreeMap::new(),
            post_process: None,
        }
    }

    fn with_post_process(mut self, post_process: PostProcess) -> Self {
        self.post_process = Some(post_process);
        self
    }

    fn with_path(mut self, channel: Channel, paths: ChannelPaths) -> Self {
        self.paths.insert(channel, paths);
        self
    }

    pub fn supports(&self, channel: Channel) -> bool {
        self.channels.contains(&channel)
    }

    pub fn paths_for(&self, channel: Channel) -> &[SpecPath] {
        self.paths.get(&channel).map(ChannelPaths::paths).unwrap_or(&[])
    }
}

/// Key under `encoding` a channel is written to. `group` has no encoding of
/// its own and is mapped explicitly by the templates that accept it.
fn encoding_key(channel: Channel) -> &'static str {
    channel.as_str()
}

#[derive(Debug, Clone)]
pub struct ChartFamily {
    pub name: &'static str,
    pub templates: Vec<ChartTemplate>,
}

static REGISTRY: OnceLock<Vec<ChartFamily>> = OnceLock::new();

pub fn chart_families() -> &'static [ChartFamily] {
    REGISTRY.get_or_init(build_registry)
}

pub fn all_templates() -> impl Iterator<Item = &'static ChartTemplate> {
    chart_families().iter().flat_map(|family| family.templates.iter())
}

/// Flat lookup by exact chart name across every family.
pub fn chart_template(name: &str) -> Option<&'static ChartTemplate> {
    all_templates().find(|t| t.name == name)
}

/// Declared channels of `name`, or an empty list for unknown charts.
pub fn channels_for_chart(name: &str) -> Vec<Channel> {
    chart_template(name)
        .map(|t| t.channels.clone())
        .unwrap_or_default()
}

fn build_registry() -> Vec<ChartFamily> {
    use Channel::*;

    let table = vec![
        ChartTemplate::grid("Auto", "chart-icon-auto"),
        ChartTemplate::grid("Table", "chart-icon-table"),
    ];

    let scatter = vec![
        ChartTemplate::single(
            "Scatter Plot",
            "chart-icon-scatter",
            json!({"mark": "circle", "encoding": {}}),
            &[X, Y, Color, Size, Opacity, Column, Row],
        ),
        ChartTemplate {
            name: "Ranged Dot Plot",
            icon: "chart-icon-dot-plot",
            skeleton: Skeleton::Layered(json!({
                "encoding": {},
                "layer": [
                    {"mark": "line", "encoding": {"detail": {}}},
                    {"mark": {"type": "point", "filled": true}, "encoding": {}}
                ]
            })),
            channels: vec![X, Y, Color],
            paths: BTreeMap::from([
                (X, ChannelPaths::One(SpecPath::encoding("x"))),
                (Y, ChannelPaths::One(SpecPath::encoding("y"))),
                (Color, ChannelPaths::One(SpecPath::nested("layer", 1, "color"))),
            ]),
            post_process: Some(PostProcess::RangedDotDetail),
        },
        ChartTemplate::single(
            "Boxplot",
            "chart-icon-box-plot",
            json!({"mark": "boxplot", "encoding": {}}),
            &[X, Y, Color, Opacity, Column, Row],
        )
        .with_post_process(PostProcess::NominalX),
    ];

    let bar = vec![
        ChartTemplate::single(
            "Bar Chart",
            "chart-icon-column",
            json!({"mark": "bar", "encoding": {}}),
            &[X, Y, Color, Opacity, Column, Row],
        ),
        ChartTemplate {
            name: "Pyramid Chart",
            icon: "chart-icon-pyramid",
            skeleton: Skeleton::Concat(json!({
                "spacing": 0,
                "resolve": {"scale": {"y": "shared"}},
                "hconcat": [
                    {
                        "mark": "bar",
                        "transform": [{"filter": "true"}],
                        "encoding": {
                            "y": {},
                            "x": {"scale": {"reverse": true}, "stack": null},
                            "color": {"legend": null}
                        }
                    },
                    {
                        "mark": "bar",
                        "transform": [{"filter": "true"}],
                        "encoding": {
                            "y": {"axis": null},
                            "x": {"stack": null},
                            "color": {"legend": null}
                        }
                    }
                ],
                "config": {"view": {"stroke": null}, "axis": {"grid": false}}
            })),
            channels: vec![X, Y, Color],
            paths: [X, Y, Color]
                .into_iter()
                .map(|c| {
                    let key = encoding_key(c);
                    let paths = vec![
                        SpecPath::nested("hconcat", 0, key),
                        SpecPath::nested("hconcat", 1, key),
                    ];
                    (c, ChannelPaths::Many(paths))
                })
                .collect(),
            post_process: Some(PostProcess::PyramidSplit),
        },
        ChartTemplate::single(
            "Grouped Bar Chart",
            "chart-icon-column-grouped",
            json!({"mark": "bar", "encoding": {}}),
            &[X, Y, Group, Column, Row],
        )
        .with_path(
            Group,
            ChannelPaths::Many(vec![
                SpecPath::encoding("color"),
                SpecPath::encoding("xOffset"),
            ]),
        ),
        ChartTemplate::single(
            "Stacked Bar Chart",
            "chart-icon-column-stacked",
            json!({"mark": "bar", "encoding": {}}),
            &[X, Y, Color, Column, Row],
        ),
        ChartTemplate::single(
            "Histogram",
            "chart-icon-histogram",
            json!({
                "mark": "bar",
                "encoding": {
                    "x": {"bin": true},
                    "y": {"aggregate": "count", "type": "quantitative"}
                }
            }),
            &[X, Color, Column, Row],
        ),
        ChartTemplate::single(
            "Heatmap",
            "chart-icon-heat-map",
            json!({"mark": "rect", "encoding": {}}),
            &[X, Y, Color, Column, Row],
        )
        .with_post_process(PostProcess::NominalXY),
    ];

    let line = vec![
        ChartTemplate::single(
            "Line Chart",
            "chart-icon-line",
            json!({"mark": "line", "encoding": {}}),
            &[X, Y, Color, Opacity, Column, Row],
        ),
        ChartTemplate::single(
            "Dotted Line Chart",
            "chart-icon-dot-line",
            json!({"mark": {"type": "line", "point": true}, "encoding": {}}),
            &[X, Y, Color, Column, Row],
        ),
    ];

    let area = vec![
        ChartTemplate::single(
            "Area Chart",
            "chart-icon-area",
            json!({"mark": "area", "encoding": {}}),
            &[X, Y, Color, Opacity, Column, Row],
        ),
        ChartTemplate::single(
            "Streamgraph",
            "chart-icon-streamgraph",
            json!({"mark": "area", "encoding": {"y": {"stack": "center", "axis": null}}}),
            &[X, Y, Color, Column, Row],
        ),
        ChartTemplate::single(
            "Pie Chart",
            "chart-icon-pie",
            json!({"mark": "arc", "encoding": {}}),
            &[Theta, Color, Column, Row],
        ),
    ];

    let custom = vec![
        ChartTemplate::single(
            "Custom Point",
            "chart-icon-custom-point",
            json!({"mark": "point", "encoding": {}}),
            &[X, Y, Color, Opacity, Size, Shape, Column, Row],
        ),
        ChartTemplate::single(
            "Custom Line",
            "chart-icon-custom-line",
            json!({"mark": "line", "encoding": {}}),
            &[X, Y, Color, Opacity, Detail, Column, Row],
        ),
        ChartTemplate::single(
            "Custom Bar",
            "chart-icon-custom-bar",
            json!({"mark": "bar", "encoding": {}}),
            &[X, Y, X2, Y2, Color, Opacity, Size, Column, Row],
        ),
        ChartTemplate::single(
            "Custom Rect",
            "chart-icon-custom-rect",
            json!({"mark": "rect", "encoding": {}}),
            &[X, Y, X2, Y2, Color, Opacity, Column, Row],
        ),
        ChartTemplate::single(
            "Custom Area",
            "chart-icon-custom-area",
            json!({"mark": "area", "encoding": {}}),
            &[X, Y, X2, Y2, Color, Opacity, Column, Row],
        ),
        ChartTemplate::single(
            "Custom Text",
            "chart-icon-custom-text",
            json!({"mark": "text", "encoding": {}}),
            &[X, Y, Text, Color, Opacity, Size, Column, Row],
        ),
    ];

    vec![
        ChartFamily { name: "table", templates: table },
        ChartFamily { name: "scatter", templates: scatter },
        ChartFamily { name: "bar", templates: bar },
        ChartFamily { name: "line", templates: line },
        ChartFamily { name: "area", templates: area },
        ChartFamily { name: "custom", templates: custom },
    ]
}
