//! Orgload CLI - Import organizations and addresses from CSV
//!
//! ```bash
//! orgload import companies.csv      # Validate and write to the database
//! orgload check companies.csv       # Dry run: report line errors, write nothing
//! orgload list                      # Print stored organizations as JSON
//! orgload serve                     # Start HTTP server (port 3000)
//! ```
//!
//! Defaults come from `ORGLOAD_*` environment variables (and `.env`); flags win.

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use orgload::{
    bulk_insert_response, check, config::parse_delimiter, import, rejected_response,
    ConflictPolicy, EncodingMode, ImportError, ImportOptions, ImportOutcome, ImportResponse,
    RowErrorPolicy, Source, Store,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "orgload")]
#[command(about = "Bulk import organizations and addresses from CSV", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a CSV file and write it to the database
    Import {
        /// Input CSV file
        input: PathBuf,

        #[command(flatten)]
        db: DbArgs,

        #[command(flatten)]
        csv: CsvArgs,

        /// What to do with registration numbers already stored
        #[arg(long)]
        conflict: Option<ConflictPolicy>,

        /// Write nothing if any row is invalid
        #[arg(long)]
        reject_on_row_errors: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a CSV file without writing anything
    Check {
        /// Input CSV file
        input: PathBuf,

        #[command(flatten)]
        csv: CsvArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print stored organizations with their addresses
    List {
        #[command(flatten)]
        db: DbArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        #[command(flatten)]
        db: DbArgs,
    },
}

#[derive(Args)]
struct DbArgs {
    /// SQLite database file
    #[arg(long = "db", env = "ORGLOAD_DATABASE", default_value = "orgload.db")]
    path: PathBuf,
}

#[derive(Args)]
struct CsvArgs {
    /// CSV delimiter (auto-detect if not specified)
    #[arg(short, long, value_parser = delimiter_arg)]
    delimiter: Option<char>,

    /// Input encoding
    #[arg(long)]
    encoding: Option<EncodingMode>,
}

impl CsvArgs {
    fn apply(&self, mut options: ImportOptions) -> ImportOptions {
        if let Some(delimiter) = self.delimiter {
            options = options.with_delimiter(delimiter);
        }
        if let Some(encoding) = self.encoding {
            options = options.with_encoding(encoding);
        }
        options
    }
}

fn delimiter_arg(value: &str) -> Result<char, String> {
    parse_delimiter("--delimiter", value).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Import {
            input,
            db,
            csv,
            conflict,
            reject_on_row_errors,
            output,
        } => load_options().and_then(|options| {
            let mut options = csv.apply(options);
            if let Some(policy) = conflict {
                options = options.with_conflict_policy(policy);
            }
            if reject_on_row_errors {
                options = options.with_row_errors(RowErrorPolicy::RejectAll);
            }
            cmd_import(&input, &db.path, &options, output.as_deref())
        }),

        Commands::Check { input, csv, output } => {
            load_options().and_then(|options| cmd_check(&input, &csv.apply(options), output.as_deref()))
        }

        Commands::List { db, output } => cmd_list(&db.path, output.as_deref()),

        Commands::Serve { port, db } => cmd_serve(port, &db.path).await,
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

type CmdResult = Result<bool, Box<dyn std::error::Error>>;

fn load_options() -> Result<ImportOptions, Box<dyn std::error::Error>> {
    Ok(ImportOptions::from_env()?)
}

/// Returns `Ok(false)` when the import was refused or rolled back.
fn cmd_import(input: &Path, db: &Path, options: &ImportOptions, output: Option<&Path>) -> CmdResult {
    eprintln!("📄 Importing: {}", input.display());
    eprintln!("   Database: {}", db.display());

    let mut store = Store::open(db)?;
    let source = Source::path(input);

    let (json, success) = match import(&source, &mut store, options, Utc::now()) {
        Ok(ImportOutcome::Malformed(error)) => (rejected_response(&[error]), false),
        Ok(ImportOutcome::Processed(summary)) => {
            let rejected =
                options.row_errors == RowErrorPolicy::RejectAll && !summary.errors.is_empty();
            if rejected {
                (rejected_response(&summary.errors), false)
            } else {
                (serde_json::to_value(ImportResponse::from(summary))?, true)
            }
        }
        Err(ImportError::BulkInsert(err)) => (bulk_insert_response(&err), false),
        Err(e) => return Err(e.into()),
    };

    write_output(&serde_json::to_string_pretty(&json)?, output)?;

    if success {
        eprintln!("\n✨ Done!");
    }
    Ok(success)
}

fn cmd_check(input: &Path, options: &ImportOptions, output: Option<&Path>) -> CmdResult {
    eprintln!("✔️  Checking: {}", input.display());

    let result = check(&Source::path(input), options, Utc::now())?;

    eprintln!(
        "\n📊 Results: {} organizations, {} addresses, {} invalid rows",
        result.organizations.len(),
        result.addresses.len(),
        result.errors.len()
    );

    let json = serde_json::to_string_pretty(&serde_json::json!({
        "organizationCount": result.organizations.len(),
        "addressCount": result.addresses.len(),
        "errors": result.errors,
    }))?;
    write_output(&json, output)?;

    Ok(result.errors.is_empty())
}

fn cmd_list(db: &Path, output: Option<&Path>) -> CmdResult {
    let store = Store::open(db)?;
    let organizations = store.list_organizations()?;

    eprintln!("📋 {} organizations in {}", organizations.len(), db.display());

    let json = serde_json::to_string_pretty(&organizations)?;
    write_output(&json, output)?;

    Ok(true)
}

async fn cmd_serve(port: u16, db: &Path) -> CmdResult {
    let options = ImportOptions::from_env()?;
    let store = Store::open(db)?;
    orgload::server::start_server(port, store, options).await?;
    Ok(true)
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
