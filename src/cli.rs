use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::store::Representation;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Nutrition question answering over local CSV datasets",
    long_about = None
)]
pub struct Cli {
    /// Config file (defaults to ./nutri_rag.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read the CSV sources, embed every row and persist the index
    Build {
        /// CSV file to index; repeat for several. Overrides the configured sources
        #[arg(short, long = "source")]
        sources: Vec<PathBuf>,

        /// Representations to write
        #[arg(
            long,
            value_enum,
            value_delimiter = ',',
            default_values_t = vec![TierArg::Full, TierArg::Split]
        )]
        tiers: Vec<TierArg>,
    },
    /// Ask questions interactively on the console
    Ask {
        /// Print each answer at once instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TierArg {
    /// Directory with metadata, docstore and vector store
    Full,
    /// Vector-index file plus document list
    Split,
    /// Document list only (forces a rebuild on load)
    Docs,
}

impl From<TierArg> for Representation {
    fn from(arg: TierArg) -> Self {
        match arg {
            TierArg::Full => Representation::FullIndex,
            TierArg::Split => Representation::SplitIndex,
            TierArg::Docs => Representation::DocumentList,
        }
    }
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
