//! Unreal package format for the Mass Effect trilogy
//!
//! A package is a header, three tables (names, imports, exports), a dependency
//! table and the export payloads. The body after the header may be stored as
//! compressed chunks.
//!
//! # Example
//!
//! ```no_run
//! use mepak::package::Package;
//!
//! let mut package = Package::open("BioD_Nor.pcc", false)?;
//! for export in package.exports() {
//!     println!("{} bytes at 0x{:X}", export.data_size(), export.data_offset());
//! }
//!
//! let mut data = package.export_payload(0)?.to_vec();
//! data.push(0);
//! package.set_export_payload(0, data)?;
//! package.save("BioD_Nor.pcc", true)?;
//! # Ok::<(), mepak::Error>(())
//! ```

pub mod chunk;
mod document;
pub mod header;
mod options;
pub mod properties;
mod reader;
pub mod relocate;
pub mod tables;
pub mod types;
pub mod writer;

pub use chunk::{
    decompress_full_file_me3, ChunkDescriptor, ChunkDialect, ChunkTableLocation, MAX_BLOCK_SIZE,
    MAX_CHUNK_SIZE,
};
pub use document::{Package, PackageSummary};
pub use header::PackageHeader;
pub use options::{OpenOptions, SaveOptions};
pub use tables::{Entry, EntryRef, ExportEntry, ImportEntry};
pub use types::{MeGame, NameRef, PackageFlags};
pub use writer::{LayoutPlan, WrittenPackage};

/// Magic at the start of every package and every compressed chunk.
pub const PACKAGE_TAG: u32 = 0x9E2A83C1;
