use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser as ClapParser;
use dbml::error::ParseError;
use dbml::options::{MergePolicy, ParseOptions};
use dbml::parser::Parser;
use thiserror::Error;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "dbml", version, about = "Parse a DBML schema and print it as JSON")]
struct Cli {
    /// Input .dbml file
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print JSON on a single line
    #[arg(long)]
    compact: bool,

    /// Which side wins when a partial and its table set the same key:
    /// table-wins or partial-wins
    #[arg(long, default_value = "table-wins", value_parser = parse_merge_policy)]
    merge_policy: MergePolicy,

    /// Fail instead of skipping anything the parser does not understand
    #[arg(long)]
    strict: bool,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize document to JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Rejected(#[from] ParseError),
}

fn parse_merge_policy(s: &str) -> Result<MergePolicy, String> {
    MergePolicy::from_str(s).ok_or_else(|| format!("unknown merge policy `{s}`"))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("{e}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let input = fs::read_to_string(&cli.input).map_err(|source| CliError::Read {
        path: cli.input.clone(),
        source,
    })?;

    let options = ParseOptions {
        merge_policy: cli.merge_policy,
        strict: cli.strict,
    };
    let output = Parser::with_options(&input, options).parse();

    for diagnostic in &output.diagnostics {
        warn!("{}: {diagnostic}", cli.input.display());
    }

    let document = output.into_result()?;
    debug!(
        tables = document.tables.len(),
        enums = document.enums.len(),
        "writing document"
    );

    let json = if cli.compact {
        serde_json::to_string(&document)?
    } else {
        serde_json::to_string_pretty(&document)?
    };

    match &cli.output {
        Some(path) => fs::write(path, json + "\n").map_err(|source| CliError::Write {
            path: path.clone(),
            source,
        })?,
        None => println!("{json}"),
    }

    Ok(())
}
