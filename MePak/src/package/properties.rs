//! Property block scanning
//!
//! Only the tag framing is understood here: enough to find where the property
//! block ends and which top-level properties are present. Values are skipped.

use super::tables::ExportEntry;
use super::types::MeGame;
use crate::error::{Error, Result};

/// A top-level property tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyTag {
    pub name: String,
    pub type_name: String,
    pub size: i32,
    pub array_index: i32,
    /// Offset of the value bytes within the payload.
    pub value_offset: usize,
}

/// Result of scanning an export's property block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertyBlock {
    pub start: usize,
    /// First byte after the terminating `None` name; the binary tail starts here.
    pub end: usize,
    pub tags: Vec<PropertyTag>,
}

impl PropertyBlock {
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&PropertyTag> {
        self.tags.iter().find(|tag| tag.name == name)
    }

    /// True if a property with this name and type is present.
    #[must_use]
    pub fn has(&self, name: &str, type_name: &str) -> bool {
        self.tags.iter().any(|tag| tag.name == name && tag.type_name == type_name)
    }
}

/// Offset of the first property tag in an export payload.
#[must_use]
pub fn property_start(game: MeGame, export: &ExportEntry) -> usize {
    if export.has_stack() {
        if game == MeGame::Me3 { 30 } else { 32 }
    } else {
        // net index
        4
    }
}

/// Walk the property tags of an export payload.
///
/// # Errors
/// Returns [`Error::MalformedProperties`] when a tag reaches outside the
/// payload or names an index outside the name table.
pub fn scan_properties(game: MeGame, names: &[String], export: &ExportEntry) -> Result<PropertyBlock> {
    let start = property_start(game, export);
    if export.class_index() == 0 {
        return Ok(PropertyBlock {
            start,
            end: start,
            tags: Vec::new(),
        });
    }

    let mut scanner = Scanner {
        data: export.data(),
        names,
        pos: start,
        export: export.index(),
    };
    let mut tags = Vec::new();

    loop {
        let name = scanner.name()?;
        if name == "None" {
            break;
        }
        let type_name = scanner.name()?.to_string();
        let size = scanner.i32()?;
        let array_index = scanner.i32()?;

        match type_name.as_str() {
            "StructProperty" => scanner.skip(8)?,
            "BoolProperty" => scanner.skip(if game == MeGame::Me3 { 1 } else { 4 })?,
            "ByteProperty" if game == MeGame::Me3 => scanner.skip(8)?,
            _ => {}
        }

        let value_offset = scanner.pos;
        let value_len = usize::try_from(size)
            .map_err(|_| scanner.malformed(format!("property {name} has negative size {size}")))?;
        scanner.skip(value_len)?;

        tags.push(PropertyTag {
            name: name.to_string(),
            type_name,
            size,
            array_index,
            value_offset,
        });
    }

    Ok(PropertyBlock {
        start,
        end: scanner.pos,
        tags,
    })
}

struct Scanner<'a> {
    data: &'a [u8],
    names: &'a [String],
    pos: usize,
    export: usize,
}

impl<'a> Scanner<'a> {
    fn malformed(&self, message: String) -> Error {
        Error::MalformedProperties {
            export: self.export,
            message,
        }
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(self.malformed(format!(
                "{len} bytes at offset {} run past payload of {} bytes",
                self.pos,
                self.data.len()
            )));
        }
        self.pos = end;
        Ok(())
    }

    fn i32(&mut self) -> Result<i32> {
        let at = self.pos;
        self.skip(4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.data[at..at + 4]);
        Ok(i32::from_le_bytes(buf))
    }

    /// Name reference; the instance number is not needed for tag matching.
    fn name(&mut self) -> Result<&'a str> {
        let names = self.names;
        let index = self.i32()?;
        self.i32()?;
        usize::try_from(index)
            .ok()
            .and_then(|i| names.get(i))
            .map(String::as_str)
            .ok_or_else(|| self.malformed(format!("name index {index} out of range")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::types::{object_flags, NameRef};

    fn names() -> Vec<String> {
        ["None", "Filename", "NameProperty", "BoolProperty", "bFlag", "StructProperty", "Vector", "Pos"]
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn tag(out: &mut Vec<u8>, name: i32, type_name: i32, size: i32) {
        for value in [name, 0, type_name, 0, size, 0] {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }

    fn export(data: Vec<u8>) -> ExportEntry {
        ExportEntry::new(-1, 0, 0, NameRef::new(1, 0), data)
    }

    #[test]
    fn test_scan_finds_end_and_tags() {
        for game in [MeGame::Me1, MeGame::Me3] {
            let mut data = vec![0xFF; 4];
            tag(&mut data, 1, 2, 8);
            data.extend_from_slice(&[0u8; 8]);
            tag(&mut data, 4, 3, 0);
            data.extend(std::iter::repeat_n(1u8, if game == MeGame::Me3 { 1 } else { 4 }));
            tag(&mut data, 7, 5, 12);
            data.extend_from_slice(&6i64.to_le_bytes());
            data.extend_from_slice(&[0u8; 12]);
            data.extend_from_slice(&0i64.to_le_bytes());
            let end = data.len();
            data.extend_from_slice(&[9u8; 16]);

            let block = scan_properties(game, &names(), &export(data)).unwrap();
            assert_eq!(block.start, 4);
            assert_eq!(block.end, end);
            assert_eq!(block.tags.len(), 3);
            assert!(block.has("Filename", "NameProperty"));
            assert_eq!(block.find("Pos").unwrap().size, 12);
        }
    }

    #[test]
    fn test_has_stack_moves_start() {
        let mut export = export(vec![0u8; 40]);
        export.set_object_flags(object_flags::HAS_STACK);
        assert_eq!(property_start(MeGame::Me3, &export), 30);
        assert_eq!(property_start(MeGame::Me2, &export), 32);
        let block = scan_properties(MeGame::Me2, &names(), &export).unwrap();
        assert_eq!(block.end, 40);
    }

    #[test]
    fn test_class_export_has_no_properties() {
        let export = ExportEntry::new(0, 0, 0, NameRef::new(1, 0), vec![1, 2, 3]);
        let block = scan_properties(MeGame::Me3, &names(), &export).unwrap();
        assert_eq!(block.start, block.end);
        assert!(block.tags.is_empty());
    }

    #[test]
    fn test_truncated_block_is_malformed() {
        let mut data = vec![0u8; 4];
        tag(&mut data, 1, 2, 100);
        let err = scan_properties(MeGame::Me3, &names(), &export(data)).unwrap_err();
        assert!(matches!(err, Error::MalformedProperties { .. }));
    }

    #[test]
    fn test_bad_name_index_is_malformed() {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&99i64.to_le_bytes());
        assert!(scan_properties(MeGame::Me3, &names(), &export(data)).is_err());
    }
}
