//! GTF ingestion.
//!
//! GTF records carry eight fixed tab-separated fields plus a trailing
//! attribute list (`gene_id "g";  transcript_id "t"; ...`). The schema is
//! static: the fixed fields plus `gene_id` and `transcript_id` extracted
//! from the attributes. The literal `.` denotes a missing value and
//! inserts nothing.

use std::io::BufRead;
use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};
use crate::schema::{Column, ElementCount};
use crate::table::Table;

const MISSING_VALUE: &str = ".";
const ROW_ID_SIZE: usize = 4;

/// The column list of every GTF table.
pub fn gtf_columns() -> Result<Vec<Column>> {
    Ok(vec![
        Column::row_id(ROW_ID_SIZE)?,
        Column::char("seqname", "Sequence name", ElementCount::Variable)?,
        Column::char("source", "Annotation source", ElementCount::Variable)?,
        Column::char("feature", "Feature type", ElementCount::Variable)?,
        Column::uint("start", "1-based start", 5, ElementCount::Fixed(1))?,
        Column::uint("end", "1-based end", 5, ElementCount::Fixed(1))?,
        Column::float("score", "Feature score", 4, ElementCount::Fixed(1))?,
        Column::char("strand", "Strand", ElementCount::Fixed(1))?,
        Column::char("frame", "Reading frame", ElementCount::Fixed(1))?,
        Column::char("gene_id", "Gene identifier", ElementCount::Variable)?,
        Column::char("transcript_id", "Transcript identifier", ElementCount::Variable)?,
    ])
}

/// Extract the value of one attribute (`key "value";`) from a GTF
/// attribute list.
fn attribute_value<'a>(attributes: &'a str, key: &str) -> Option<&'a str> {
    for entry in attributes.split(';') {
        let entry = entry.trim();
        if let Some(rest) = entry.strip_prefix(key) {
            if rest.starts_with([' ', '\t']) {
                return Some(rest.trim().trim_matches('"'));
            }
        }
    }
    None
}

fn insert_record(table: &mut Table, line: &str) -> Result<()> {
    let fields: Vec<&str> = line.trim_end_matches(['\n', '\r']).split('\t').collect();
    if fields.len() < 9 {
        return Err(Error::invalid(format!(
            "GTF record has {} fields, expected 9",
            fields.len()
        )));
    }
    for (position, value) in fields[..8].iter().enumerate() {
        if *value != MISSING_VALUE {
            table.insert_encoded_element(position + 1, value.as_bytes())?;
        }
    }
    let attributes = fields[8];
    if let Some(gene_id) = attribute_value(attributes, "gene_id") {
        table.insert_encoded_element(9, gene_id.as_bytes())?;
    }
    if let Some(transcript_id) = attribute_value(attributes, "transcript_id") {
        table.insert_encoded_element(10, transcript_id.as_bytes())?;
    }
    table.commit_row()?;
    Ok(())
}

/// Ingest a GTF stream into a new table under `homedir`. Returns the
/// number of rows written.
pub fn build_table(homedir: &Path, input: impl BufRead) -> Result<u64> {
    let mut table = Table::new(homedir);
    for column in gtf_columns()? {
        table.add_column(column)?;
    }
    table.open(crate::db::Mode::Write)?;

    let mut rows = 0u64;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        insert_record(&mut table, &line)?;
        rows += 1;
        if rows % 100_000 == 0 {
            info!(rows, "ingesting GTF records");
        }
    }
    table.close()?;
    info!(rows, homedir = %homedir.display(), "GTF table sealed");
    Ok(rows)
}
