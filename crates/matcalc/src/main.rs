//! matcalc
//!
//! Command-line front end for material type templates:
//! - **validate / payload**: check a template file and print its persistence payload
//! - **eval**: fill in row values and print the recomputed columns
//! - **submit / list**: save templates to a local JSON store and browse them
//! - **run**: replay a scripted editing session

use anyhow::Result;
use clap::{Parser, Subcommand};
use matcalc_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

use cli::config::MatcalcConfig;

#[derive(Parser, Debug)]
#[command(name = "matcalc", about = "Edit, evaluate and store material type templates")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (default: $MATCALC_HOME/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Template store directory
    #[arg(long, global = true, env = "MATCALC_STORE")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that a template file is ready to submit
    Validate {
        /// Template JSON file
        file: PathBuf,
    },

    /// Evaluate a template's formulas for one row
    Eval {
        /// Template JSON file
        file: PathBuf,

        /// Row value, e.g. --set quantity=4 --set "Unit Cost=2,5"
        #[arg(long = "set", value_name = "COLUMN=VALUE")]
        values: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the persistence payload of a template
    Payload {
        /// Template JSON file
        file: PathBuf,
    },

    /// Validate a template and save it to the store
    Submit {
        /// Template JSON file
        file: PathBuf,

        /// Update this stored template instead of creating a new one
        #[arg(long)]
        editing_id: Option<i64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored templates
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay a scripted editing session
    Run {
        /// Script TOML file
        script: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn run_command(cli: Cli, config: MatcalcConfig) -> Result<()> {
    match cli.command {
        Commands::Validate { file } => cli::template::validate(&file),
        Commands::Eval { file, values, json } => cli::template::eval(&file, &values, json),
        Commands::Payload { file } => cli::template::payload(&file),
        Commands::Submit {
            file,
            editing_id,
            json,
        } => {
            let store_dir = config.resolve_store_dir(cli.store)?;
            cli::template::submit(&file, &store_dir, editing_id, json)
        }
        Commands::List { json } => {
            let store_dir = config.resolve_store_dir(cli.store)?;
            cli::template::list(&store_dir, json)
        }
        Commands::Run { script, json } => cli::script::run(cli::script::RunArgs {
            script,
            json,
            flash_duration: config.flash_duration(),
        }),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match MatcalcConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{:?}", err);
            return ExitCode::from(1);
        }
    };

    let _log_guard = match init_logging(LogConfig {
        app_name: "matcalc",
        verbose: cli.verbose,
        filter: config.log_filter.as_deref(),
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: failed to initialize logging: {}", err);
            None
        }
    };

    match run_command(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}
