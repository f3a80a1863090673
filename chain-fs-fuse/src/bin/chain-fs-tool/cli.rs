use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Volume image
    #[arg(long, short, default_value = "fs.img")]
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty volume, overwriting the image
    Format {
        /// Image size in KiB
        #[arg(long, short, default_value_t = 128)]
        size: u64,

        /// Blocks reserved for the directory, 4 files per block
        #[arg(long, default_value_t = chain_fs::DEFAULT_DIR_BLOCKS)]
        dir_blocks: usize,
    },
    #[command(flatten)]
    Volume(VolumeCommand),
}

/// Commands operating on a formatted volume
#[derive(Subcommand)]
pub enum VolumeCommand {
    /// List files
    Ls,
    /// Show block usage
    Stat,
    /// Show the tag of every block
    Map,
    /// Copy a host file into the volume, replacing any file of that name
    Put {
        source: PathBuf,

        /// Name inside the volume, defaults to the source file name
        #[arg(long, short)]
        name: Option<String>,
    },
    /// Append text to an existing file
    Append { name: String, text: String },
    /// Print a file to stdout
    Cat {
        name: String,

        /// Start reading at this byte
        #[arg(long)]
        offset: Option<usize>,
    },
    /// Delete a file
    Rm { name: String },
}
