//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::BackendKind;

/// Quern live jsonnet playground CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: quern.toml)
    #[arg(short = 'C', long, default_value = "quern.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Live-edit a jsonnet file and watch the compiled result update
    #[command(visible_alias = "e")]
    Edit {
        /// Jsonnet source file to watch
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,

        /// Compile backend for this run (overrides config)
        #[arg(short, long, value_enum)]
        backend: Option<BackendKind>,

        /// Restore a shared session: a token or a full playground link
        #[arg(short, long)]
        share: Option<String>,
    },

    /// Compile a file once and print the result
    #[command(visible_alias = "c")]
    Compile {
        /// Jsonnet source file
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,
    },

    /// Persist a source snapshot remotely and print its share link
    #[command(visible_alias = "s")]
    Share {
        /// Jsonnet source file
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,
    },
}

#[allow(unused)]
impl Cli {
    pub const fn is_edit(&self) -> bool {
        matches!(self.command, Commands::Edit { .. })
    }
    pub const fn is_compile(&self) -> bool {
        matches!(self.command, Commands::Compile { .. })
    }
    pub const fn is_share(&self) -> bool {
        matches!(self.command, Commands::Share { .. })
    }
}
