//! Ingest a VCF stream into a new wormtable home directory.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use wormtable::vcf;

/// Convert a VCF file to a wormtable
#[derive(Parser, Debug)]
#[command(name = "vcf2wt")]
#[command(about = "Convert a VCF file to a wormtable")]
struct Args {
    /// Input VCF file; `-` reads standard input, `.gz` is detected by
    /// extension
    input: String,

    /// Destination home directory (or schema file path with -g)
    homedir: PathBuf,

    /// Overwrite an existing destination
    #[arg(short, long)]
    force: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,

    /// Only generate the schema file, do not build the table
    #[arg(short = 'g', long = "generate-schema")]
    schema_only: bool,
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

fn prepare_homedir(homedir: &PathBuf, force: bool) -> wormtable::Result<()> {
    if homedir.exists() {
        let occupied = homedir.join("table.db").exists() || homedir.join("table.xml").exists();
        if occupied && !force {
            return Err(wormtable::Error::InvalidArgument(format!(
                "'{}' already holds a table; use --force to overwrite",
                homedir.display()
            )));
        }
        if occupied {
            std::fs::remove_dir_all(homedir)?;
        }
    }
    std::fs::create_dir_all(homedir)?;
    Ok(())
}

fn run(args: &Args) -> wormtable::Result<()> {
    let input = vcf::open_input(&args.input)?;
    if args.schema_only {
        return vcf::write_schema(input, &args.homedir);
    }
    prepare_homedir(&args.homedir, args.force)?;
    vcf::build_table(&args.homedir, input)?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.quiet);
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("vcf2wt: {e}");
            ExitCode::FAILURE
        }
    }
}
