pub mod assemble;
pub mod cli;
pub mod concept;
pub mod derive;
pub mod encoding;
pub mod io_utils;
pub mod lineage;
pub mod postprocess;
pub mod render;
pub mod store;
pub mod table;
pub mod template;
pub mod types;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::{LevelFilter, debug, info};
use serde_json::json;

use crate::{
    assemble::{AssembleOptions, assemble_spec_with},
    cli::{Cli, Commands, InputArgs, ProbeFormat},
    concept::{fields_for_table, original_field_id},
    encoding::{EncodingItem, EncodingMap},
    lineage::trigger_chain,
    render::render_table,
    store::Session,
    table::{Table, build_table, export_delimited},
    template::chart_families,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("vizbind", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Probe(args) => handle_probe(&args),
        Commands::Export(args) => handle_export(&args),
        Commands::Templates(args) => handle_templates(&args),
        Commands::Assemble(args) => handle_assemble(&args),
        Commands::Lineage(args) => handle_lineage(&args),
    }
}

/// Table ids for loaded files are the file stem, or `stdin` for `-`.
fn table_id_for(path: &Path) -> String {
    if io_utils::is_dash(path) {
        return "stdin".to_string();
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("table")
        .to_string()
}

fn load_table(args: &InputArgs) -> Result<Table> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    info!(
        "Loading '{}' with delimiter '{}'",
        args.input.display(),
        printable_delimiter(delimiter)
    );
    let rows = io_utils::load_rows(&args.input, Some(delimiter), encoding)?
        .ok_or_else(|| anyhow!("Input {:?} is empty or malformed", args.input))?;
    let table = build_table(&table_id_for(&args.input), &rows, true, None);
    debug!(
        "Built table '{}' with {} column(s) and {} row(s)",
        table.id(),
        table.columns().len(),
        table.row_count()
    );
    Ok(table)
}

fn handle_probe(args: &cli::ProbeArgs) -> Result<()> {
    let table = load_table(&args.input)?;
    match args.format {
        ProbeFormat::Table => {
            let rows = table
                .columns()
                .iter()
                .map(|column| {
                    vec![
                        column.name().to_string(),
                        column.data_type().to_string(),
                        column.uniques().len().to_string(),
                    ]
                })
                .collect::<Vec<_>>();
            print!("{}", render_table(&["column", "type", "distinct"], &rows));
        }
        ProbeFormat::Json => {
            let summary = table
                .columns()
                .iter()
                .map(|column| {
                    json!({
                        "name": column.name(),
                        "type": column.data_type(),
                        "distinct": column.uniques().len(),
                    })
                })
                .collect::<Vec<_>>();
            let text = serde_json::to_string_pretty(&summary)
                .context("Serializing column summary")?;
            println!("{text}");
        }
    }
    info!(
        "Inferred {} column(s) over {} row(s)",
        table.columns().len(),
        table.row_count()
    );
    Ok(())
}

fn handle_export(args: &cli::ExportArgs) -> Result<()> {
    let table = load_table(&args.input)?;
    let input_delimiter = io_utils::resolve_input_delimiter(&args.input.input, args.input.delimiter);
    let delimiter = io_utils::resolve_output_delimiter(
        args.output.as_deref(),
        args.output_delimiter,
        input_delimiter,
    );
    let encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())?;
    let text = export_delimited(&table, delimiter)
        .with_context(|| format!("Exporting table '{}'", table.id()))?;
    io_utils::write_output(args.output.as_deref(), &text, encoding)?;
    info!(
        "Exported {} row(s) with delimiter '{}'",
        table.row_count(),
        printable_delimiter(delimiter)
    );
    Ok(())
}

fn handle_templates(args: &cli::TemplatesArgs) -> Result<()> {
    let families = chart_families()
        .iter()
        .filter(|family| {
            args.family
                .as_deref()
                .is_none_or(|wanted| family.name.eq_ignore_ascii_case(wanted))
        })
        .collect::<Vec<_>>();
    if families.is_empty()
        && let Some(wanted) = &args.family
    {
        bail!("Unknown chart family '{wanted}'");
    }
    let rows = families
        .iter()
        .flat_map(|family| {
            family.templates.iter().map(|template| {
                let channels = template
                    .channels
                    .iter()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                vec![family.name.to_string(), template.name.to_string(), channels]
            })
        })
        .collect::<Vec<_>>();
    print!("{}", render_table(&["family", "chart", "channels"], &rows));
    Ok(())
}

fn handle_assemble(args: &cli::AssembleArgs) -> Result<()> {
    let table = load_table(&args.input)?;
    let fields = fields_for_table(&table);

    let mut encoding_map = EncodingMap::new();
    for binding in &args.encodings {
        if table.column(&binding.field).is_none() {
            bail!(
                "Column '{}' not found; available columns: {}",
                binding.field,
                table.names().join(", ")
            );
        }
        let item = EncodingItem {
            aggregate: binding.aggregate,
            bin: binding.bin,
            ..EncodingItem::bound(&original_field_id(table.id(), &binding.field))
        };
        encoding_map.insert(binding.channel, item);
    }

    let options = AssembleOptions {
        embed_data: args.embed_data,
    };
    let spec = assemble_spec_with(&args.chart, &encoding_map, &fields, &table, &options)?;
    let mut text = if args.compact {
        serde_json::to_string(&spec)
    } else {
        serde_json::to_string_pretty(&spec)
    }
    .context("Serializing chart spec")?;
    text.push('\n');
    io_utils::write_output(args.output.as_deref(), &text, encoding_rs::UTF_8)?;
    info!(
        "Assembled '{}' with {} binding(s)",
        args.chart,
        encoding_map.len()
    );
    Ok(())
}

fn handle_lineage(args: &cli::LineageArgs) -> Result<()> {
    let session = Session::load(&args.session)
        .with_context(|| format!("Loading session from {:?}", args.session))?;
    let table = session
        .table(&args.table)
        .ok_or_else(|| anyhow!("Table '{}' not found in session", args.table))?;
    let chain = trigger_chain(table, &session.tables);
    if chain.is_empty() {
        info!("Table '{}' is not derived from another table", table.id());
        return Ok(());
    }
    let rows = chain
        .iter()
        .enumerate()
        .map(|(idx, trigger)| {
            vec![
                (idx + 1).to_string(),
                trigger.table_id.clone(),
                trigger.result_table_id.clone(),
                trigger.instruction.clone(),
            ]
        })
        .collect::<Vec<_>>();
    print!(
        "{}",
        render_table(&["step", "from", "to", "instruction"], &rows)
    );
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
