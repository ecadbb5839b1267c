use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::command_compile;

mod commands;

#[derive(Parser)]
#[command(version, about, arg_required_else_help(true))]
struct Cli {
    #[command(subcommand)]
    commands: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a DEX file's program classes and print the assembled image's summary.
    Compile {
        #[arg(required = true)]
        input: PathBuf,

        #[arg(long, default_value_t = 21)]
        min_api: u32,

        #[arg(long, default_value_t = false)]
        desugar: bool,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match &cli.commands {
        Some(Commands::Compile { input, min_api, desugar }) => command_compile(input, *min_api, *desugar),
        None => Ok(()),
    };

    if let Err(err) = result {
        eprintln!("{:#}", err);
    }
}
