//! # MePak
//!
//! A pure-Rust reader and writer for the Unreal packages (`.pcc`, `.sfm`, `.u`,
//! `.upk`) shipped with Mass Effect 1, 2 and 3.
//!
//! ## Features
//!
//! - **Headers** - Parse and write the per-game header layouts
//! - **Tables** - Name, import and export tables with mutation helpers
//! - **Compression** - Chunked Zlib and LZO bodies, decompressed and compressed in parallel
//! - **Relocation** - Absolute offsets inside export payloads are rewritten on save
//!
//! ## Quick Start
//!
//! ```no_run
//! use mepak::package::{Package, SaveOptions};
//!
//! let mut package = Package::open("BioP_Char.pcc", false)?;
//! println!("{} names, {} exports", package.name_count(), package.export_count());
//!
//! package.add_name("MyNewName");
//! package.save_with_options("BioP_Char.pcc", &SaveOptions::compressed())?;
//! # Ok::<(), mepak::Error>(())
//! ```
//!
//! ### Using the Prelude
//!
//! ```
//! use mepak::prelude::*;
//!
//! let package = Package::new(MeGame::Me3);
//! assert_eq!(package.export_count(), 0);
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` - Enables the `mepak` command-line binary

pub mod compression;
pub mod error;
pub mod package;
pub mod utils;

// Re-exports for convenience
pub use error::{Error, ErrorKind, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::compression::CompressionType;
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::package::{
        Entry, EntryRef, ExportEntry, ImportEntry, MeGame, NameRef, OpenOptions, Package,
        PackageFlags, PackageHeader, SaveOptions,
    };
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// CLI module (feature-gated)
#[cfg(feature = "cli")]
pub mod cli;
