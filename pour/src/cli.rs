// pour/src/cli.rs
//! Defines the command-line argument structure using clap.
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use pour_common::error::Result;
use pour_common::Config;

pub mod info;
pub mod install;
pub mod list;

use crate::cli::info::Info;
use crate::cli::install::InstallArgs;
use crate::cli::list::List;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "pour", bin_name = "pour")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Installation prefix (overrides POUR_PREFIX)
    #[arg(long, value_name = "DIR", global = true)]
    pub prefix: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install one or more formula files
    Install(InstallArgs),
    /// Show what a formula file declares
    Info(Info),
    /// List installed kegs
    List(List),
}

impl Command {
    pub async fn run(&self, config: &Config) -> Result<()> {
        match self {
            Self::Install(command) => command.run(config).await,
            Self::Info(command) => command.run(config).await,
            Self::List(command) => command.run(config).await,
        }
    }
}
