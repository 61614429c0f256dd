//! Types shared across the package reader and writer

use std::fmt;

use serde::Serialize;

use crate::compression::CompressionType;
use crate::error::{Error, Result};

/// Game generation a package belongs to, identified by its version tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MeGame {
    Me1,
    Me2,
    Me3,
}

impl MeGame {
    /// Identify the game from the (engine version, licensee version) pair at offset 4.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedVersion`] for any other pair.
    pub fn from_version(version: u16, licensee: u16) -> Result<Self> {
        match (version, licensee) {
            (491, 1008) => Ok(MeGame::Me1),
            (512, 130) => Ok(MeGame::Me2),
            (684, 194) => Ok(MeGame::Me3),
            _ => Err(Error::UnsupportedVersion { version, licensee }),
        }
    }

    /// The (engine version, licensee version) pair written at offset 4.
    #[must_use]
    pub fn version_tag(self) -> (u16, u16) {
        match self {
            MeGame::Me1 => (491, 1008),
            MeGame::Me2 => (512, 130),
            MeGame::Me3 => (684, 194),
        }
    }

    #[must_use]
    pub fn engine_version(self) -> i32 {
        match self {
            MeGame::Me1 => 3240,
            MeGame::Me2 => 3607,
            MeGame::Me3 => 6383,
        }
    }

    #[must_use]
    pub fn cooked_content_version(self) -> i32 {
        match self {
            MeGame::Me1 => 47,
            MeGame::Me2 => 64,
            MeGame::Me3 => 196715,
        }
    }

    /// Reserved bytes following each name table string.
    #[must_use]
    pub fn name_trailer_len(self) -> usize {
        match self {
            MeGame::Me1 => 8,
            MeGame::Me2 => 4,
            MeGame::Me3 => 0,
        }
    }

    /// Whether header and name strings are written as UTF-16.
    #[must_use]
    pub fn uses_unicode_strings(self) -> bool {
        self == MeGame::Me3
    }

    /// Codec used when a compressed save is requested without an override.
    ///
    /// ME1 packages are never compressed on save.
    #[must_use]
    pub fn default_compression(self) -> CompressionType {
        match self {
            MeGame::Me1 => CompressionType::None,
            MeGame::Me2 => CompressionType::Lzo,
            MeGame::Me3 => CompressionType::Zlib,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MeGame::Me1 => "ME1",
            MeGame::Me2 => "ME2",
            MeGame::Me3 => "ME3",
        }
    }
}

impl fmt::Display for MeGame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Package flags (`EPackageFlags`) stored in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct PackageFlags(pub u32);

impl PackageFlags {
    pub const ALLOW_DOWNLOAD: u32 = 0x1;
    pub const COOKED: u32 = 0x8;
    pub const DISALLOW_LAZY_LOADING: u32 = 0x80;
    pub const REQUIRE_IMPORTS_ALREADY_LOADED: u32 = 0x100;
    pub const COMPRESSED: u32 = 0x0200_0000;
    /// Set on ME3 packages carrying an extra name region before the name table.
    pub const EXTRA_NAME_LIST: u32 = 0x1000_0000;

    /// Flags of a freshly created package.
    #[must_use]
    pub fn new_package() -> Self {
        Self(
            Self::COOKED
                | Self::ALLOW_DOWNLOAD
                | Self::DISALLOW_LAZY_LOADING
                | Self::REQUIRE_IMPORTS_ALREADY_LOADED,
        )
    }

    #[must_use]
    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    #[must_use]
    pub fn with(self, flag: u32, enabled: bool) -> Self {
        if enabled {
            Self(self.0 | flag)
        } else {
            Self(self.0 & !flag)
        }
    }

    #[must_use]
    pub fn is_cooked(self) -> bool {
        self.contains(Self::COOKED)
    }

    #[must_use]
    pub fn is_compressed(self) -> bool {
        self.contains(Self::COMPRESSED)
    }
}

/// Object flags stored at offset 24 of an export header.
pub mod object_flags {
    /// The export payload starts with a script stack frame.
    pub const HAS_STACK: u64 = 0x0200_0000;
}

/// Reference into the name table: an index plus an instance number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct NameRef {
    pub index: i32,
    pub number: i32,
}

impl NameRef {
    #[must_use]
    pub fn new(index: i32, number: i32) -> Self {
        Self { index, number }
    }

    /// Resolve against a name table. Instance numbers are 1-based on disk.
    #[must_use]
    pub fn resolve(self, names: &[String]) -> Option<String> {
        let base = usize::try_from(self.index).ok().and_then(|i| names.get(i))?;
        if self.number > 0 {
            Some(format!("{base}_{}", self.number - 1))
        } else {
            Some(base.clone())
        }
    }
}

/// First generation record of the header; later generations are not retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Generation {
    pub export_count: i32,
    pub name_count: i32,
    pub net_object_count: i32,
}
