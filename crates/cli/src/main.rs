//! `dbzero` — a read-mostly exploration CLI: list prefixes, list
//! classes/attributes declared for a data directory, dump instances of a
//! class, and (as a scoped-down stub) list queries for a module.
//!
//! Exit codes: `0` success, `1` I/O or engine error, `2` bad arguments.

mod commands;
mod format;
mod manifest;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dbzero_engine::{DbZeroConfig, Engine};

use manifest::ClassManifest;

#[derive(Parser)]
#[command(name = "dbzero", about = "Explore a DBZero data directory")]
struct Cli {
    /// Data directory (a `dbzero.toml` plus one subdirectory per prefix).
    #[arg(long, default_value = "./data")]
    db: PathBuf,

    /// Class manifest TOML (required by every command except
    /// `list-prefixes`, which needs no class knowledge).
    #[arg(long)]
    classes: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every prefix found on disk under `--db`.
    ListPrefixes,
    /// List classes declared for one prefix.
    ListClasses {
        #[arg(long)]
        prefix: String,
    },
    /// List the declared attributes of one class.
    ListAttributes {
        #[arg(long)]
        class: String,
    },
    /// Dump every instance of one class, across every prefix.
    Dump {
        #[arg(long)]
        class: String,
    },
    /// List queries registered for a module (always empty; see `commands::queries`).
    Queries {
        #[arg(long)]
        module: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::try_init().ok();
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> ExitCode {
    match &cli.command {
        Commands::ListPrefixes => match commands::list_prefixes(&cli.db) {
            Ok(out) => {
                println!("{out}");
                ExitCode::from(0)
            }
            Err(e) => fail(e),
        },
        Commands::ListClasses { prefix } => match load_classes(&cli) {
            Ok(classes) => {
                println!("{}", commands::list_classes(&classes, prefix));
                ExitCode::from(0)
            }
            Err(e) => fail(e),
        },
        Commands::ListAttributes { class } => match load_classes(&cli).and_then(|classes| commands::list_attributes(&classes, class)) {
            Ok(out) => {
                println!("{out}");
                ExitCode::from(0)
            }
            Err(e) => fail(e),
        },
        Commands::Dump { class } => {
            let result = load_classes(&cli).and_then(|classes| {
                let mut config = DbZeroConfig::default();
                config.autocommit = false;
                let engine = Engine::open_with_config(&cli.db, config)?;
                commands::dump(&engine, &cli.db, &classes, class)
            });
            match result {
                Ok(out) => {
                    println!("{out}");
                    ExitCode::from(0)
                }
                Err(e) => fail(e),
            }
        }
        Commands::Queries { module } => {
            println!("{}", commands::queries(module));
            ExitCode::from(0)
        }
    }
}

fn load_classes(cli: &Cli) -> dbzero_core::DbZeroResult<ClassManifest> {
    match &cli.classes {
        Some(path) => ClassManifest::load(path),
        None => Ok(ClassManifest::empty()),
    }
}

fn fail(err: dbzero_core::DbZeroError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(1)
}
