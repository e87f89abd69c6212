//! VCF ingestion — header-driven schema inference and record parsing.
//!
//! A VCF file describes its own schema: `##INFO` and `##FORMAT`
//! meta-information lines declare the per-record and per-genotype fields
//! with an identifier, an element count and a type. This module maps those
//! declarations onto table columns:
//!
//! | VCF type    | Column                                  |
//! |-------------|-----------------------------------------|
//! | `Integer`   | int, 2-byte elements                    |
//! | `Float`     | float, 4-byte elements                  |
//! | `Flag`      | uint(1), single element (stored as 1)   |
//! | `Character` | char, fixed length                      |
//! | `String`    | char, variable length                   |
//!
//! A `Number` of `.`, `A`, `G` or `R` becomes a variable-count column.
//! INFO fields become columns named `INFO_<ID>`, genotype fields
//! `<sample>_<ID>`. The fixed VCF columns (CHROM, POS, ID, REF, ALT,
//! QUAL, FILTER) are always present; the literal `.` denotes a missing
//! value and inserts nothing.


use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::schema::{Column, ElementCount, ElementType, Schema, sidecar};
use crate::table::Table;

/// Fixed VCF columns, in file order.
const FIXED_COLUMNS: [&str; 7] = ["CHROM", "POS", "ID", "REF", "ALT", "QUAL", "FILTER"];

/// The literal VCF missing value.
const MISSING_VALUE: &str = ".";

/// Default row-id column width (4 bytes ≈ 4 billion records).
const ROW_ID_SIZE: usize = 4;

// ------------------------------------------------------------------------------------------------
// Input plumbing
// ------------------------------------------------------------------------------------------------

/// Open an input stream: `-` is standard input, a `.gz` extension selects
/// gzip decoding, anything else is read as a plain file.
pub fn open_input(spec: &str) -> Result<Box<dyn BufRead>> {
    if spec == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(spec)?;
    if spec.ends_with(".gz") {
        let decoder: Box<dyn Read> = Box::new(MultiGzDecoder::new(file));
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

// ------------------------------------------------------------------------------------------------
// Meta-information parsing
// ------------------------------------------------------------------------------------------------

/// Key/value pairs of a `##INFO=<...>` or `##FORMAT=<...>` line, with
/// quoted values (which may contain commas) handled.
fn parse_meta_fields(line: &str) -> Result<Vec<(String, String)>> {
    let start = line
        .find('<')
        .ok_or_else(|| Error::invalid(format!("malformed meta line: {line}")))?;
    let end = line
        .rfind('>')
        .ok_or_else(|| Error::invalid(format!("malformed meta line: {line}")))?;
    let body = &line[start + 1..end];

    let mut fields = Vec::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut in_quotes = false;
    for c in body.chars() {
        match c {
            '"' if in_value => in_quotes = !in_quotes,
            '=' if !in_value => in_value = true,
            ',' if in_value && !in_quotes => {
                fields.push((std::mem::take(&mut key), std::mem::take(&mut value)));
                in_value = false;
            }
            _ => {
                if in_value {
                    value.push(c);
                } else {
                    key.push(c);
                }
            }
        }
    }
    if !key.is_empty() {
        fields.push((key, value));
    }
    Ok(fields)
}

/// Build the column for one `##INFO` / `##FORMAT` declaration, its name
/// prefixed with `prefix` and an underscore.
fn meta_column(line: &str, prefix: &str) -> Result<Column> {
    let fields = parse_meta_fields(line)?;
    let get = |name: &str| {
        fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| Error::invalid(format!("meta line is missing '{name}': {line}")))
    };
    let id = get("ID")?;
    let description = get("Description").unwrap_or_default();
    let number = get("Number")?;
    let vcf_type = get("Type")?;

    let count = match number {
        "." | "A" | "G" | "R" => ElementCount::Variable,
        n => {
            let n: usize = n
                .parse()
                .map_err(|_| Error::invalid(format!("bad Number '{n}' in meta line: {line}")))?;
            if n == 0 {
                // Flag fields declare Number=0; stored as a single marker
                ElementCount::Fixed(1)
            } else {
                ElementCount::Fixed(n)
            }
        }
    };
    let name = format!("{prefix}_{id}");
    match vcf_type {
        "Integer" => Column::new(name, description, ElementType::Int, 2, count),
        "Float" => Column::new(name, description, ElementType::Float, 4, count),
        "Flag" => Column::new(name, description, ElementType::Uint, 1, ElementCount::Fixed(1)),
        "Character" => Column::new(name, description, ElementType::Char, 1, count),
        "String" => Column::new(name, description, ElementType::Char, 1, ElementCount::Variable),
        other => Err(Error::invalid(format!("unknown VCF type '{other}'"))),
    }
}

fn fixed_columns() -> Result<Vec<Column>> {
    Ok(vec![
        Column::row_id(ROW_ID_SIZE)?,
        Column::char("CHROM", "Chromosome", ElementCount::Variable)?,
        Column::uint("POS", "1-based position", 5, ElementCount::Fixed(1))?,
        Column::char("ID", "Record identifier", ElementCount::Variable)?,
        Column::char("REF", "Reference allele", ElementCount::Variable)?,
        Column::char("ALT", "Alternative alleles", ElementCount::Variable)?,
        Column::float("QUAL", "Phred-scaled quality", 4, ElementCount::Fixed(1))?,
        Column::char("FILTER", "Filter status", ElementCount::Variable)?,
    ])
}

// ------------------------------------------------------------------------------------------------
// Header processing
// ------------------------------------------------------------------------------------------------

struct Header {
    columns: Vec<Column>,
    samples: Vec<String>,
}

fn parse_version(line: &str) -> Result<()> {
    let version: f64 = line
        .split('v')
        .nth(1)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(-1.0);
    if version < 4.0 {
        return Err(Error::invalid(format!(
            "unsupported VCF version in '{}' (4.0 or later required)",
            line.trim_end()
        )));
    }
    Ok(())
}

/// Consume the header of a VCF stream, leaving the reader positioned at
/// the first record.
fn read_header(input: &mut impl BufRead) -> Result<Header> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    parse_version(&line)?;

    let mut info_columns = Vec::new();
    let mut genotype_columns = Vec::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        if line.starts_with("##INFO") {
            info_columns.push(meta_column(&line, "INFO")?);
        } else if line.starts_with("##FORMAT") {
            genotype_columns.push(meta_column(&line, "FORMAT")?);
        } else if !line.starts_with("##") {
            break;
        }
    }
    // `line` now holds the #CHROM header row naming the samples
    let samples: Vec<String> = line
        .trim_end()
        .split('\t')
        .skip(9)
        .map(str::to_string)
        .collect();

    let mut columns = fixed_columns()?;
    columns.extend(info_columns);
    for sample in &samples {
        for col in &genotype_columns {
            let field = col
                .name()
                .split_once('_')
                .map_or(col.name(), |(_, rest)| rest);
            columns.push(Column::new(
                format!("{sample}_{field}"),
                col.description(),
                col.element_type(),
                col.element_size(),
                col.element_count(),
            )?);
        }
    }
    Ok(Header { columns, samples })
}

/// Infer the full column list of a VCF stream from its header.
pub fn generate_schema(mut input: impl BufRead) -> Result<Vec<Column>> {
    Ok(read_header(&mut input)?.columns)
}

/// Write the inferred schema of a VCF stream to a sidecar file without
/// building a table.
pub fn write_schema(input: impl BufRead, out: &Path) -> Result<()> {
    let columns = generate_schema(input)?;
    let schema = Schema::new(columns)?;
    sidecar::write_table_metadata(out, &schema)
}

// ------------------------------------------------------------------------------------------------
// Record ingestion
// ------------------------------------------------------------------------------------------------

/// Column routing resolved once per build.
struct Router {
    /// `(file field index, column position)` for present fixed columns.
    fixed: Vec<(usize, usize)>,
    /// INFO field id → column position.
    info: Vec<(String, usize)>,
    /// Per sample: genotype field id → column position.
    genotypes: Vec<Vec<(String, usize)>>,
}

impl Router {
    fn new(table: &Table, samples: &[String]) -> Self {
        let mut fixed = Vec::new();
        for (field, name) in FIXED_COLUMNS.iter().enumerate() {
            if let Some(position) = table.column_position(name) {
                fixed.push((field, position));
            }
        }
        let mut info = Vec::new();
        let mut genotypes = vec![Vec::new(); samples.len()];
        for (position, col) in table.columns().iter().enumerate() {
            if let Some(id) = col.name().strip_prefix("INFO_") {
                info.push((id.to_string(), position));
            } else if let Some((owner, field)) = col.name().split_once('_') {
                if let Some(j) = samples.iter().position(|s| s == owner) {
                    genotypes[j].push((field.to_string(), position));
                }
            }
        }
        Self {
            fixed,
            info,
            genotypes,
        }
    }

    fn info_position(&self, id: &str) -> Option<usize> {
        self.info
            .iter()
            .find(|(name, _)| name == id)
            .map(|&(_, p)| p)
    }
}

fn insert_record(table: &mut Table, router: &Router, line: &str) -> Result<()> {
    let fields: Vec<&str> = line.trim_end_matches(['\n', '\r']).split('\t').collect();

    for &(field, position) in &router.fixed {
        match fields.get(field) {
            Some(&value) if value != MISSING_VALUE => {
                table.insert_encoded_element(position, value.as_bytes())?;
            }
            _ => {}
        }
    }

    if let Some(info) = fields.get(7) {
        for mapping in info.split(';') {
            let (id, value) = match mapping.split_once('=') {
                Some((id, value)) => (id, value),
                None => (mapping, "1"), // Flag field
            };
            if let Some(position) = router.info_position(id) {
                table.insert_encoded_element(position, value.as_bytes())?;
            }
        }
    }

    if let Some(format) = fields.get(8) {
        let format_fields: Vec<&str> = format.split(':').collect();
        for (j, sample_value) in fields.iter().skip(9).enumerate() {
            let Some(routes) = router.genotypes.get(j) else {
                break;
            };
            let tokens: Vec<&str> = sample_value.split(':').collect();
            // trailing fields may be dropped per sample; present tokens
            // pair with the FORMAT declaration positionally
            for (k, token) in tokens.iter().enumerate() {
                let Some(&field) = format_fields.get(k) else {
                    break;
                };
                if *token == MISSING_VALUE {
                    continue;
                }
                if let Some(&(_, position)) = routes.iter().find(|(id, _)| id == field) {
                    table.insert_encoded_element(position, token.as_bytes())?;
                }
            }
        }
    }

    table.commit_row()?;
    Ok(())
}

/// Ingest a VCF stream into a new table under `homedir`. Returns the
/// number of rows written.
pub fn build_table(homedir: &Path, mut input: impl BufRead) -> Result<u64> {
    let header = read_header(&mut input)?;
    debug!(
        columns = header.columns.len(),
        samples = header.samples.len(),
        "inferred VCF schema"
    );

    let mut table = Table::new(homedir);
    for column in header.columns {
        table.add_column(column)?;
    }
    table.open(crate::db::Mode::Write)?;
    let router = Router::new(&table, &header.samples);

    let mut line = String::new();
    let mut rows = 0u64;
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        insert_record(&mut table, &router, &line)?;
        rows += 1;
        if rows % 100_000 == 0 {
            info!(rows, "ingesting VCF records");
        }
    }
    table.close()?;
    info!(rows, homedir = %homedir.display(), "VCF table sealed");
    Ok(rows)
}
