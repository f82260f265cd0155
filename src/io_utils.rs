//! Input loading and output writing.
//!
//! Loaders turn raw text into row objects for [`build_table()`]. Malformed
//! input (empty text, ragged or unparseable delimited content, JSON that is
//! not an array of objects) is logged and reported as `None`, so callers check
//! for a result instead of handling an error at the ingestion boundary.
//!
//! - **Delimiter resolution**: `.tsv` means tab, anything else comma, unless
//!   overridden.
//! - **Encoding**: input bytes are decoded with `encoding_rs`, defaulting to
//!   UTF-8; output may be transcoded the same way.
//! - **stdin/stdout**: the `-` path routes through the standard streams.
//!
//! [`build_table()`]: crate::table::build_table

use std::{
    fs,
    io::{self, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};
use log::warn;
use serde_json::Value;

use crate::table::Row;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
}

pub fn is_json_path(path: &Path) -> bool {
    has_extension(path, "json")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'")),
        None => Ok(UTF_8),
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or(if has_extension(path, "tsv") {
        DEFAULT_TSV_DELIMITER
    } else {
        DEFAULT_CSV_DELIMITER
    })
}

pub fn resolve_output_delimiter(path: Option<&Path>, provided: Option<u8>, fallback: u8) -> u8 {
    if let Some(delim) = provided {
        return delim;
    }
    match path {
        Some(p) if has_extension(p, "tsv") => DEFAULT_TSV_DELIMITER,
        Some(p) if has_extension(p, "csv") => DEFAULT_CSV_DELIMITER,
        _ => fallback,
    }
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn read_text(path: &Path, encoding: &'static Encoding) -> Result<String> {
    let bytes = if is_dash(path) {
        let mut buffer = Vec::new();
        io::stdin()
            .lock()
            .read_to_end(&mut buffer)
            .context("Reading standard input")?;
        buffer
    } else {
        fs::read(path).with_context(|| format!("Opening input file {path:?}"))?
    };
    decode_bytes(&bytes, encoding).with_context(|| format!("Decoding {path:?}"))
}

/// Parses delimited text with a header row into row objects whose cells are
/// strings.
pub fn parse_delimited(text: &str, delimiter: u8) -> Option<Vec<Row>> {
    if text.trim().is_empty() {
        warn!("Delimited input is empty");
        return None;
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false)
        .from_reader(text.as_bytes());
    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(err) => {
            warn!("Delimited input has an unreadable header: {err}");
            return None;
        }
    };

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                warn!("Delimited input row {} is malformed: {err}", idx + 2);
                return None;
            }
        };
        let row = headers
            .iter()
            .zip(record.iter())
            .map(|(name, cell)| (name.to_string(), Value::String(cell.to_string())))
            .collect::<Row>();
        rows.push(row);
    }
    Some(rows)
}

/// Parses a JSON array of objects. Non-object elements make the whole input
/// malformed.
pub fn parse_json_rows(text: &str) -> Option<Vec<Row>> {
    if text.trim().is_empty() {
        warn!("JSON input is empty");
        return None;
    }
    match serde_json::from_str::<Vec<Row>>(text) {
        Ok(rows) => Some(rows),
        Err(err) => {
            warn!("JSON input is not an array of row objects: {err}");
            None
        }
    }
}

/// Loads row objects from `path`, picking the JSON or delimited loader by
/// extension. I/O failures are errors; malformed content is `Ok(None)`.
pub fn load_rows(
    path: &Path,
    delimiter: Option<u8>,
    encoding: &'static Encoding,
) -> Result<Option<Vec<Row>>> {
    let text = read_text(path, encoding)?;
    if is_json_path(path) {
        Ok(parse_json_rows(&text))
    } else {
        Ok(parse_delimited(&text, resolve_input_delimiter(path, delimiter)))
    }
}

/// Writes `text` to `path` (stdout when `None` or `-`), transcoding from UTF-8
/// when another encoding is requested.
pub fn write_output(path: Option<&Path>, text: &str, encoding: &'static Encoding) -> Result<()> {
    let bytes = if encoding == UTF_8 {
        text.as_bytes().to_vec()
    } else {
        let (encoded, _, had_errors) = encoding.encode(text);
        if had_errors {
            return Err(anyhow!("Failed to encode output using {}", encoding.name()));
        }
        encoded.into_owned()
    };
    match path {
        Some(p) if !is_dash(p) => {
            fs::write(p, bytes).with_context(|| format!("Writing output file {p:?}"))
        }
        _ => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&bytes).context("Writing to stdout")?;
            stdout.flush().context("Flushing stdout")
        }
    }
}
