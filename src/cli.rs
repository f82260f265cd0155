use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::encoding::{AggregateOp, Channel};

#[derive(Debug, Parser)]
#[command(author, version, about = "Bind data fields to chart templates and trace derived tables", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Infer column types of a CSV/TSV/JSON file
    Probe(ProbeArgs),
    /// Re-export a data file as delimited text with inferred values
    Export(ExportArgs),
    /// List chart templates and the channels they accept
    Templates(TemplatesArgs),
    /// Assemble a Vega-Lite spec for a chart over a data file
    Assemble(AssembleArgs),
    /// Print the chain of derivation triggers that produced a table
    Lineage(LineageArgs),
}

#[derive(Debug, Clone, Args)]
pub struct InputArgs {
    /// Input data file (.csv, .tsv or .json); `-` reads stdin as delimited text
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Input delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum ProbeFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Output format for the inferred column summary
    #[arg(long, value_enum, default_value_t = ProbeFormat::Table)]
    pub format: ProbeFormat,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Output file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Output delimiter (defaults from the output extension, else the input delimiter)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding for the output (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct TemplatesArgs {
    /// Only list templates of this family (table, scatter, bar, line, area, custom)
    #[arg(long)]
    pub family: Option<String>,
}

#[derive(Debug, Args)]
pub struct AssembleArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Chart template name, e.g. "Bar Chart"
    #[arg(short = 'c', long = "chart")]
    pub chart: String,
    /// Channel bindings of the form `channel=field[:aggregate|:bin]`
    #[arg(short = 'e', long = "encode", value_parser = parse_binding, action = clap::ArgAction::Append)]
    pub encodings: Vec<Binding>,
    /// Inline the data rows as `data.values`
    #[arg(long = "embed-data")]
    pub embed_data: bool,
    /// Emit compact JSON instead of pretty-printed
    #[arg(long)]
    pub compact: bool,
    /// Output file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct LineageArgs {
    /// Session file (.yaml or .json) holding tables, fields and charts
    #[arg(short = 's', long = "session")]
    pub session: PathBuf,
    /// Table whose derivation thread is printed
    #[arg(short = 't', long = "table")]
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub channel: Channel,
    pub field: String,
    pub aggregate: Option<AggregateOp>,
    pub bin: bool,
}

pub fn parse_binding(value: &str) -> Result<Binding, String> {
    let (channel, rest) = value
        .split_once('=')
        .ok_or_else(|| format!("Binding '{value}' must look like channel=field"))?;
    let channel = channel.parse::<Channel>().map_err(|err| err.to_string())?;
    let (field, aggregate, bin) = match rest.rsplit_once(':') {
        Some((field, modifier)) if modifier.trim() == "bin" => (field, None, true),
        Some((field, modifier)) => match modifier.parse::<AggregateOp>() {
            Ok(op) => (field, Some(op), false),
            Err(_) => (rest, None, false),
        },
        None => (rest, None, false),
    };
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("Binding '{value}' is missing a field name"));
    }
    Ok(Binding {
        channel,
        field: field.to_string(),
        aggregate,
        bin,
    })
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "pipe" | "|" => Ok(b'|'),
        "semicolon" | ";" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() || !first.is_ascii() {
                return Err("Delimiter must be a single ASCII character".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_binding_reads_modifiers() {
        let plain = parse_binding("x=Country").unwrap();
        assert_eq!(plain.channel, Channel::X);
        assert_eq!(plain.field, "Country");
        assert_eq!(plain.aggregate, None);

        let summed = parse_binding("y=Population:sum").unwrap();
        assert_eq!(summed.aggregate, Some(AggregateOp::Sum));

        let binned = parse_binding("x=Age:bin").unwrap();
        assert!(binned.bin);

        let colon = parse_binding("x=time:12").unwrap();
        assert_eq!(colon.field, "time:12");
    }

    #[test]
    fn parse_binding_rejects_unknown_channels() {
        assert!(parse_binding("depth=Age").is_err());
        assert!(parse_binding("x=").is_err());
        assert!(parse_binding("Age").is_err());
    }

    #[test]
    fn parse_delimiter_accepts_names() {
        assert_eq!(parse_delimiter("tab").unwrap(), b'\t');
        assert_eq!(parse_delimiter(";").unwrap(), b';');
        assert!(parse_delimiter("ab").is_err());
    }
}
