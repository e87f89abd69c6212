//! Administration tool for wormtable home directories: dump rows, build
//! and inspect indexes.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;

use wormtable::{
    Column, ElementType, Error, Index, Mode, Result, Table, Value, open_index, open_table,
    parse_cache_size,
};

/// Administer wormtable home directories
#[derive(Parser, Debug)]
#[command(name = "wtadmin")]
#[command(about = "Administer wormtable home directories")]
struct Args {
    /// Cache size in bytes, with an optional K/M/G suffix
    #[arg(long, default_value = "16M", global = true)]
    cache_size: String,

    /// Suppress all output except errors and results
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print rows in table or index order
    Dump {
        /// Table home directory
        homedir: PathBuf,
        /// Columns to print (default: all)
        columns: Vec<String>,
        /// Iterate in the order of this index
        #[arg(long)]
        index: Option<String>,
        /// First key (index order) or row id (table order), inclusive
        #[arg(long)]
        start: Option<String>,
        /// Last key (index order) or row id (table order), exclusive
        #[arg(long)]
        stop: Option<String>,
    },
    /// Build a new index
    Add {
        /// Table home directory
        homedir: PathBuf,
        /// Column specification: `c1[+c2...]`, each optionally with a
        /// bucket width as `name[width]`
        colspec: String,
    },
    /// Print the distinct keys of an index with their row counts
    Hist {
        /// Table home directory
        homedir: PathBuf,
        /// Column specification of the index
        colspec: String,
    },
    /// List the indexes of a table
    Ls {
        /// Table home directory
        homedir: PathBuf,
    },
    /// Remove an index
    Rm {
        /// Table home directory
        homedir: PathBuf,
        /// Index name
        name: String,
    },
}

fn init_tracing(quiet: bool) {
    let level = if quiet {
        LevelFilter::ERROR
    } else {
        LevelFilter::INFO
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

/// Parse `c1+c2[w]` into `(column name, bucket width)` pairs.
fn parse_colspec(spec: &str) -> Result<Vec<(String, f64)>> {
    spec.split('+')
        .map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "empty column in colspec '{spec}'"
                )));
            }
            match part.split_once('[') {
                Some((name, rest)) => {
                    let width: f64 = rest
                        .strip_suffix(']')
                        .and_then(|w| w.parse().ok())
                        .ok_or_else(|| {
                            Error::InvalidArgument(format!(
                                "malformed bucket width in colspec part '{part}'"
                            ))
                        })?;
                    Ok((name.to_string(), width))
                }
                None => Ok((part.to_string(), 0.0)),
            }
        })
        .collect()
}

/// Parse a textual key bound for one index key column.
fn parse_key(column: &Column, text: &str) -> Result<Value> {
    let bad = || {
        Error::InvalidArgument(format!(
            "cannot parse key '{text}' for column '{}'",
            column.name()
        ))
    };
    Ok(match column.element_type() {
        ElementType::Uint => Value::Uint(text.parse().map_err(|_| bad())?),
        ElementType::Int => Value::Int(text.parse().map_err(|_| bad())?),
        ElementType::Float => Value::Float(text.parse().map_err(|_| bad())?),
        ElementType::Char => Value::Char(text.as_bytes().to_vec()),
    })
}

fn resolve_positions(table: &Table, columns: &[String]) -> Result<Vec<usize>> {
    if columns.is_empty() {
        return Ok((0..table.columns().len()).collect());
    }
    columns
        .iter()
        .map(|name| {
            table.column_position(name).ok_or_else(|| {
                Error::InvalidArgument(format!("no column named '{name}'"))
            })
        })
        .collect()
}

fn print_row(row: &[Value]) {
    let text: Vec<String> = row.iter().map(Value::display_text).collect();
    println!("{}", text.join("\t"));
}

fn dump(
    homedir: &PathBuf,
    columns: &[String],
    index_name: Option<&str>,
    start: Option<&str>,
    stop: Option<&str>,
    cache_size: u64,
) -> Result<()> {
    let table = open_table(homedir, cache_size)?;
    let positions = resolve_positions(&table, columns)?;
    match index_name {
        None => {
            let mut it = table.row_iterator(&positions)?;
            if let Some(start) = start {
                it.set_min(start.parse().map_err(|_| {
                    Error::InvalidArgument(format!("malformed row id '{start}'"))
                })?);
            }
            if let Some(stop) = stop {
                it.set_max(stop.parse().map_err(|_| {
                    Error::InvalidArgument(format!("malformed row id '{stop}'"))
                })?);
            }
            for row in it {
                print_row(&row?);
            }
        }
        Some(name) => {
            let index = open_index(&table, name, cache_size)?;
            let key_columns = index.key_columns();
            let first_key = key_columns
                .first()
                .ok_or_else(|| Error::InvalidArgument("index has no key columns".into()))?;
            let mut it = index.row_iterator(&positions)?;
            if let Some(start) = start {
                it.set_min(&[parse_key(first_key, start)?])?;
            }
            if let Some(stop) = stop {
                it.set_max(&[parse_key(first_key, stop)?])?;
            }
            for row in it {
                print_row(&row?);
            }
        }
    }
    Ok(())
}

fn add(homedir: &PathBuf, colspec: &str, cache_size: u64) -> Result<()> {
    let table = open_table(homedir, cache_size)?;
    let keys = parse_colspec(colspec)?;
    let mut index = Index::new(&table, colspec)?;
    if index.exists() {
        return Err(Error::InvalidArgument(format!(
            "index '{colspec}' already exists"
        )));
    }
    index.set_cache_size(cache_size)?;
    for (name, width) in &keys {
        index.add_key_column(name, *width)?;
    }
    index.open(Mode::Write)?;
    index.build_with_progress(&mut |rows| info!(rows, "building index"), 100_000)?;
    index.close()?;
    info!(index = colspec, "index built");
    Ok(())
}

fn hist(homedir: &PathBuf, colspec: &str, cache_size: u64) -> Result<()> {
    let table = open_table(homedir, cache_size)?;
    let index = open_index(&table, colspec, cache_size)?;
    println!("count\tkey");
    for key in index.distinct_keys_iterator()? {
        let key = key?;
        let count = index.num_rows(&key)?;
        let text: Vec<String> = key.iter().map(Value::display_text).collect();
        println!("{count}\t{}", text.join("\t"));
    }
    Ok(())
}

fn ls(homedir: &PathBuf, cache_size: u64) -> Result<()> {
    let table = open_table(homedir, cache_size)?;
    println!("{} rows", table.num_rows()?);
    for name in table.indexes()? {
        println!("{name}");
    }
    Ok(())
}

fn rm(homedir: &PathBuf, name: &str, cache_size: u64) -> Result<()> {
    let table = open_table(homedir, cache_size)?;
    let mut index = Index::new(&table, name)?;
    if !index.exists() {
        return Err(Error::NotFound(format!("index '{name}' not found")));
    }
    index.delete()?;
    info!(index = name, "index removed");
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let cache_size = parse_cache_size(&args.cache_size)?;
    match &args.command {
        Command::Dump {
            homedir,
            columns,
            index,
            start,
            stop,
        } => dump(
            homedir,
            columns,
            index.as_deref(),
            start.as_deref(),
            stop.as_deref(),
            cache_size,
        ),
        Command::Add { homedir, colspec } => add(homedir, colspec, cache_size),
        Command::Hist { homedir, colspec } => hist(homedir, colspec, cache_size),
        Command::Ls { homedir } => ls(homedir, cache_size),
        Command::Rm { homedir, name } => rm(homedir, name, cache_size),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.quiet);
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("wtadmin: {e}");
            ExitCode::FAILURE
        }
    }
}
