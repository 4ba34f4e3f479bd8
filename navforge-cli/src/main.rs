//! NavForge CLI - Command-line interface
//!
//! This binary provides a command-line interface to the NavForge
//! library.
//!
//! # Architecture
//!
//! The CLI is organized into:
//! - `Cli` / `Commands`: Argument parsing (clap)
//! - `CliRunner`: Common setup (logging, database, progress)
//! - `CliError`: Centralized error handling with user-friendly messages

mod error;
mod runner;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use navforge::compile::{NavCompileOptions, SourceKind};
use navforge::db::DatabaseMeta;

use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "navforge")]
#[command(version = navforge::VERSION)]
#[command(about = "Navigation data compiler for flight simulators", long_about = None)]
struct Cli {
    /// Suppress the progress line
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by all compile commands.
#[derive(Args)]
struct CompileArgs {
    /// Output database file
    #[arg(short, long)]
    output: PathBuf,

    /// Magnetic declination grid file
    #[arg(long)]
    magdec: Option<PathBuf>,

    /// Keep duplicate rows from overlapping source areas
    #[arg(long)]
    no_dedup: bool,

    /// Skip airway resolution
    #[arg(long)]
    no_airways: bool,

    /// Populate the flight-plan routing network tables
    #[arg(long)]
    route_tables: bool,

    /// Compare table row counts against minimums after the compile
    #[arg(long)]
    validate: bool,

    /// Fail the run on the first file error
    #[arg(long)]
    strict: bool,

    /// Vacuum the database after the compile
    #[arg(long)]
    vacuum: bool,

    /// Skip the final analyze step
    #[arg(long)]
    no_analyze: bool,
}

impl CompileArgs {
    fn to_options(&self, source: SourceKind) -> NavCompileOptions {
        let mut options = NavCompileOptions::new(source);
        options.magdec_path = self.magdec.clone();
        options.deduplicate = !self.no_dedup;
        options.resolve_airways = !self.no_airways;
        options.create_route_tables = self.route_tables;
        options.basic_validation = self.validate;
        options.strict = self.strict;
        options.vacuum = self.vacuum;
        options.analyze = !self.no_analyze;
        options
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compile binary scenery archives listed by a scenery descriptor
    Scenery {
        /// Simulator base directory containing the scenery areas
        #[arg(long)]
        base_path: PathBuf,

        /// Scenery descriptor INI listing areas, layers and flags
        #[arg(long)]
        scenery_config: PathBuf,

        #[command(flatten)]
        compile: CompileArgs,
    },

    /// Compile an attached relational navigation source database
    Dfd {
        /// Source database file
        #[arg(long)]
        source_db: PathBuf,

        #[command(flatten)]
        compile: CompileArgs,
    },

    /// Compile line-oriented text files under a base directory
    Text {
        /// Directory containing the text source files
        #[arg(long)]
        base_path: PathBuf,

        #[command(flatten)]
        compile: CompileArgs,
    },

    /// Show the metadata of a compiled database
    Info {
        /// Compiled database file
        #[arg(short, long)]
        database: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        error.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Scenery {
            base_path,
            scenery_config,
            compile,
        } => {
            let options = compile.to_options(SourceKind::BglScenery {
                base_path,
                scenery_config,
            });
            run_compile(cli.quiet, &options, &compile)
        }
        Commands::Dfd { source_db, compile } => {
            let options = compile.to_options(SourceKind::Dfd { source_db });
            run_compile(cli.quiet, &options, &compile)
        }
        Commands::Text { base_path, compile } => {
            let options = compile.to_options(SourceKind::TextLine { base_path });
            run_compile(cli.quiet, &options, &compile)
        }
        Commands::Info { database } => run_info(&database),
    }
}

fn run_compile(
    quiet: bool,
    options: &NavCompileOptions,
    args: &CompileArgs,
) -> Result<(), CliError> {
    let runner = CliRunner::new(quiet)?;
    let result = runner.compile(options, &args.output)?;

    if result.aborted {
        return Err(CliError::Aborted);
    }
    if result.navigraph_found {
        println!("Third-party navdata package detected in the scenery library.");
    }
    if result.basic_validation_error {
        return Err(CliError::ValidationFailed);
    }

    println!("Database compiled to {}", args.output.display());
    Ok(())
}

fn run_info(database: &std::path::Path) -> Result<(), CliError> {
    let conn = rusqlite::Connection::open(database).map_err(|e| CliError::OpenDatabase {
        path: database.display().to_string(),
        error: e.to_string(),
    })?;

    let meta = DatabaseMeta::read(&conn).map_err(|e| CliError::OpenDatabase {
        path: database.display().to_string(),
        error: e.to_string(),
    })?;

    match meta {
        Some(meta) => {
            println!("Data source:      {}", meta.data_source.as_deref().unwrap_or("-"));
            println!("AIRAC cycle:      {}", meta.airac_cycle.as_deref().unwrap_or("-"));
            println!("Valid through:    {}", meta.valid_through.as_deref().unwrap_or("-"));
            println!("Compiler version: {}", meta.compiler_version.as_deref().unwrap_or("-"));
        }
        None => println!("No compiler metadata found in {}", database.display()),
    }
    Ok(())
}
