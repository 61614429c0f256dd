use clap::Subcommand;
use std::path::PathBuf;

pub mod execute;
pub mod info;
pub mod list;
pub mod package;

#[derive(Subcommand)]
pub enum Commands {
    /// Show the header summary of a package
    Info {
        /// Package file (.pcc, .sfm, .u, .upk)
        path: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the name, import or export table
    List {
        /// Package file
        path: PathBuf,

        /// List names
        #[arg(long, conflicts_with_all = ["imports", "exports"])]
        names: bool,

        /// List imports
        #[arg(long, conflicts_with = "exports")]
        imports: bool,

        /// List exports (default)
        #[arg(long)]
        exports: bool,
    },

    /// Save a package uncompressed
    Decompress {
        /// Source package
        source: PathBuf,

        /// Output package
        destination: PathBuf,
    },

    /// Save a package chunk-compressed
    Compress {
        /// Source package
        source: PathBuf,

        /// Output package
        destination: PathBuf,

        /// Compression codec (zlib, lzo). Defaults to the game's codec
        #[arg(short, long)]
        codec: Option<String>,
    },

    /// Dump the payload of one export
    Payload {
        /// Package file
        path: PathBuf,

        /// Export uindex (1-based, as used by object references)
        uindex: i32,

        /// Output file
        destination: PathBuf,
    },
}
