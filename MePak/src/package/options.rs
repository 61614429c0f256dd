//! Options for opening and saving packages

use crate::compression::CompressionType;

use super::types::MeGame;

/// Options for [`Package::open_with_options`](super::Package::open_with_options).
///
/// # Example
///
/// ```no_run
/// use mepak::package::{OpenOptions, Package};
///
/// // Only parse the header, skipping tables and payloads
/// let options = OpenOptions::header_only();
/// let package = Package::open_with_options("BioP_Global.pcc", &options)?;
/// println!("{} exports", package.export_count());
/// # Ok::<(), mepak::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Stop after the header. Tables and payloads are not loaded.
    pub header_only: bool,
}

impl OpenOptions {
    /// Full load of header, tables and payloads.
    #[must_use]
    pub fn new() -> Self {
        Self { header_only: false }
    }

    #[must_use]
    pub fn header_only() -> Self {
        Self { header_only: true }
    }

    #[must_use]
    pub fn with_header_only(mut self, header_only: bool) -> Self {
        self.header_only = header_only;
        self
    }
}

/// Options for saving a package.
///
/// # Example
///
/// ```no_run
/// use mepak::compression::CompressionType;
/// use mepak::package::{Package, SaveOptions};
///
/// let mut package = Package::open("SFXGame.pcc", false)?;
/// let options = SaveOptions::new()
///     .with_compress(true)
///     .with_compression(Some(CompressionType::Zlib));
/// package.save_with_options("SFXGame.pcc", &options)?;
/// # Ok::<(), mepak::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Chunk-compress the package body.
    pub compress: bool,

    /// Codec override. When `None` the game's default codec is used.
    pub compression: Option<CompressionType>,

    /// Write the "additional packages to cook" list.
    /// Only honored for packages that were compressed on disk; packages read
    /// uncompressed always keep their list.
    pub include_additional_packages_to_cook: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SaveOptions {
    /// Uncompressed save that keeps the additional packages list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            compress: false,
            compression: None,
            include_additional_packages_to_cook: true,
        }
    }

    /// Compressed save with the game's default codec.
    #[must_use]
    pub fn compressed() -> Self {
        Self::new().with_compress(true)
    }

    #[must_use]
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    #[must_use]
    pub fn with_compression(mut self, compression: Option<CompressionType>) -> Self {
        self.compression = compression;
        self
    }

    #[must_use]
    pub fn with_additional_packages_to_cook(mut self, include: bool) -> Self {
        self.include_additional_packages_to_cook = include;
        self
    }

    /// Codec the body will be written with.
    ///
    /// ME1 packages are always written uncompressed.
    #[must_use]
    pub fn resolve_compression(&self, game: MeGame) -> CompressionType {
        if !self.compress || game == MeGame::Me1 {
            return CompressionType::None;
        }
        self.compression
            .filter(|c| *c != CompressionType::None)
            .unwrap_or_else(|| game.default_compression())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_compression() {
        let compressed = SaveOptions::compressed();
        assert_eq!(compressed.resolve_compression(MeGame::Me3), CompressionType::Zlib);
        assert_eq!(compressed.resolve_compression(MeGame::Me2), CompressionType::Lzo);
        assert_eq!(compressed.resolve_compression(MeGame::Me1), CompressionType::None);

        let overridden = compressed.with_compression(Some(CompressionType::Lzo));
        assert_eq!(overridden.resolve_compression(MeGame::Me3), CompressionType::Lzo);
        assert_eq!(SaveOptions::new().resolve_compression(MeGame::Me3), CompressionType::None);
    }

    #[test]
    fn test_open_options() {
        assert!(!OpenOptions::new().header_only);
        assert!(OpenOptions::new().with_header_only(true).header_only);
    }
}
