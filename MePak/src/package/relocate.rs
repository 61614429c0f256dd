//! Payload offset relocation
//!
//! A few export classes store the absolute file offset of their own bulk data
//! inside their payload. When an export moves, those offsets are rewritten.
//! Each (game, class) pair maps to a pure patcher over the payload bytes.

use super::properties::{scan_properties, PropertyBlock};
use super::tables::ExportEntry;
use super::types::MeGame;
use crate::error::{Error, Result};

/// Inputs a patcher needs besides the payload itself.
#[derive(Debug, Clone, Copy)]
pub struct RelocationContext<'a> {
    pub class_name: &'a str,
    pub props: &'a PropertyBlock,
    /// DataOffset the payload's stored offsets currently refer to.
    pub old_data_offset: i32,
    pub new_data_offset: i32,
}

/// Rewrites the self-referencing offsets of one payload.
pub type Patcher = fn(&RelocationContext<'_>, Vec<u8>) -> Result<Vec<u8>>;

const RELOCATIONS: &[(MeGame, &str, Patcher)] = &[
    (MeGame::Me1, "Texture2D", me1_texture),
    (MeGame::Me1, "LightMapTexture2D", me1_texture),
    (MeGame::Me1, "ShadowMapTexture2D", me1_texture),
    (MeGame::Me1, "TextureFlipBook", me1_texture),
    (MeGame::Me1, "StaticMeshComponent", static_mesh_component),
    (MeGame::Me2, "StaticMeshComponent", static_mesh_component),
    (MeGame::Me2, "WwiseStream", me2_wwise_stream),
    (MeGame::Me2, "WwiseBank", me2_wwise_bank),
    (MeGame::Me2, "ShaderCache", me2_shader_cache),
    (MeGame::Me3, "WwiseStream", me3_wwise_stream),
    (MeGame::Me3, "WwiseBank", me3_bulk_data),
    (MeGame::Me3, "TextureMovie", me3_texture_movie),
    (MeGame::Me3, "ShaderCache", me3_shader_cache),
];

/// Look up the patcher for a class, if it embeds offsets in this game.
#[must_use]
pub fn patcher_for(game: MeGame, class_name: &str) -> Option<Patcher> {
    RELOCATIONS
        .iter()
        .find(|(g, class, _)| *g == game && *class == class_name)
        .map(|(_, _, patcher)| *patcher)
}

/// Class prototypes carry no real bulk data references.
#[must_use]
pub fn is_default_object(object_name: &str) -> bool {
    object_name.starts_with("Default__")
}

/// Relocate an export's payload to `new_data_offset`.
///
/// Returns `None` when the export needs no patching.
pub fn relocate_payload(
    game: MeGame,
    names: &[String],
    export: &ExportEntry,
    class_name: &str,
    object_name: &str,
    new_data_offset: u32,
) -> Result<Option<Vec<u8>>> {
    if is_default_object(object_name) {
        return Ok(None);
    }
    let Some(patcher) = patcher_for(game, class_name) else {
        return Ok(None);
    };

    let props = scan_properties(game, names, export)?;
    let context = RelocationContext {
        class_name,
        props: &props,
        old_data_offset: export.data_offset(),
        new_data_offset: i32::try_from(new_data_offset).map_err(|_| Error::LayoutOverflow {
            what: "export data offset",
            value: u64::from(new_data_offset),
        })?,
    };
    tracing::debug!(
        "Relocating {class_name} export {} from 0x{:X} to 0x{new_data_offset:X}",
        export.index(),
        export.data_offset()
    );
    patcher(&context, export.data().to_vec()).map(Some)
}

fn me1_texture(ctx: &RelocationContext<'_>, mut data: Vec<u8>) -> Result<Vec<u8>> {
    let mut w = Walker::new(ctx, &mut data, ctx.props.end);
    // thumbnail bulk data: flags, element count, size, offset
    w.skip(8)?;
    let thumbnail_size = w.read_i32()?;
    w.write_offset_to_next()?;
    w.skip(i64::from(thumbnail_size))?;

    let mip_count = w.read_i32()?;
    for _ in 0..mip_count {
        if w.at_end() {
            break;
        }
        let storage = w.read_i32()?;
        if storage & 0x1 == 0 {
            let uncompressed = w.read_i32()?;
            let compressed = w.read_i32()?;
            w.write_offset_to_next()?;
            let stored = if storage == 0 { uncompressed } else { compressed };
            // mip bytes, then width and height
            w.skip(i64::from(stored) + 8)?;
        } else {
            w.skip(20)?;
        }
    }
    Ok(data)
}

fn static_mesh_component(ctx: &RelocationContext<'_>, mut data: Vec<u8>) -> Result<Vec<u8>> {
    let mut w = Walker::new(ctx, &mut data, ctx.props.end);
    let lod_count = w.read_i32()?;
    for _ in 0..lod_count {
        w.skip_list(4)?;
        w.skip_list(4)?;
        let light_map = w.read_i32()?;
        if light_map == 0 {
            continue;
        }
        w.skip_list(16)?;
        match light_map {
            1 => {
                w.skip(12)?;
                let size = w.read_i32()?;
                w.write_offset_to_next()?;
                w.skip(i64::from(size))?;
                w.skip(56)?;
                let size = w.read_i32()?;
                w.write_offset_to_next()?;
                w.skip(i64::from(size))?;
            }
            2 => w.skip(80)?,
            other => {
                tracing::warn!("Unknown light map type {other} in {}; stopping relocation walk", ctx.class_name);
                break;
            }
        }
    }
    Ok(data)
}

fn me2_wwise_stream(ctx: &RelocationContext<'_>, data: Vec<u8>) -> Result<Vec<u8>> {
    if ctx.props.has("Filename", "NameProperty") || data.len() < ctx.props.end + 48 {
        return Ok(data);
    }
    patch_binary_offset(ctx, data, 44)
}

fn me2_wwise_bank(ctx: &RelocationContext<'_>, data: Vec<u8>) -> Result<Vec<u8>> {
    patch_binary_offset(ctx, data, 20)
}

fn me3_wwise_stream(ctx: &RelocationContext<'_>, data: Vec<u8>) -> Result<Vec<u8>> {
    if ctx.props.has("Filename", "NameProperty") {
        return Ok(data);
    }
    me3_bulk_data(ctx, data)
}

fn me3_texture_movie(ctx: &RelocationContext<'_>, data: Vec<u8>) -> Result<Vec<u8>> {
    if ctx.props.has("TextureFileCacheName", "NameProperty") {
        return Ok(data);
    }
    me3_bulk_data(ctx, data)
}

/// Single bulk data header at the start of the binary tail.
fn me3_bulk_data(ctx: &RelocationContext<'_>, data: Vec<u8>) -> Result<Vec<u8>> {
    patch_binary_offset(ctx, data, 12)
}

/// Point the offset at `at` (relative to the binary tail) to the bytes after it.
fn patch_binary_offset(ctx: &RelocationContext<'_>, mut data: Vec<u8>, at: usize) -> Result<Vec<u8>> {
    let mut w = Walker::new(ctx, &mut data, ctx.props.end + at);
    w.write_offset_to_next()?;
    Ok(data)
}

fn me2_shader_cache(ctx: &RelocationContext<'_>, data: Vec<u8>) -> Result<Vec<u8>> {
    shader_cache(ctx, data, MeGame::Me2)
}

fn me3_shader_cache(ctx: &RelocationContext<'_>, data: Vec<u8>) -> Result<Vec<u8>> {
    shader_cache(ctx, data, MeGame::Me3)
}

fn shader_cache(ctx: &RelocationContext<'_>, mut data: Vec<u8>, game: MeGame) -> Result<Vec<u8>> {
    // platform byte precedes the name lists
    let mut w = Walker::new(ctx, &mut data, ctx.props.end + 1);
    w.skip_list(12)?;
    if game == MeGame::Me3 {
        w.skip_list(12)?;
    }

    let shader_count = w.read_i32()?;
    for _ in 0..shader_count {
        w.skip(24)?;
        w.rebase_next_offset()?;
    }

    // vertex factory map
    w.skip_list(12)?;

    let material_map_count = w.read_i32()?;
    for _ in 0..material_map_count {
        w.skip(16)?;
        // static switch and component mask parameters
        w.skip_list(32)?;
        w.skip_list(44)?;
        if game == MeGame::Me3 {
            w.skip_list(29)?;
            w.skip(8)?;
        }
        w.rebase_next_offset()?;
    }
    Ok(data)
}

/// Bounds-checked cursor over a payload, positioned relative to its start.
struct Walker<'a> {
    data: &'a mut [u8],
    pos: usize,
    class_name: &'a str,
    old_data_offset: i64,
    new_data_offset: i64,
}

impl<'a> Walker<'a> {
    fn new(ctx: &RelocationContext<'a>, data: &'a mut [u8], pos: usize) -> Self {
        Self {
            data,
            pos,
            class_name: ctx.class_name,
            old_data_offset: i64::from(ctx.old_data_offset),
            new_data_offset: i64::from(ctx.new_data_offset),
        }
    }

    fn out_of_bounds(&self, offset: i64) -> Error {
        Error::RelocationOutOfBounds {
            class: self.class_name.to_string(),
            offset: offset.max(0) as usize,
            len: self.data.len(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn seek(&mut self, pos: i64) -> Result<()> {
        if pos < 0 || pos > self.data.len() as i64 {
            return Err(self.out_of_bounds(pos));
        }
        self.pos = pos as usize;
        Ok(())
    }

    fn skip(&mut self, len: i64) -> Result<()> {
        if len < 0 {
            return Err(self.out_of_bounds(self.pos as i64 + len));
        }
        self.seek(self.pos as i64 + len)
    }

    /// Skip a count-prefixed list of fixed-size elements.
    fn skip_list(&mut self, element_size: i64) -> Result<()> {
        let count = self.read_i32()?;
        self.skip(i64::from(count) * element_size)
    }

    fn field(&self) -> Result<std::ops::Range<usize>> {
        let end = self.pos + 4;
        if end > self.data.len() {
            return Err(self.out_of_bounds(end as i64));
        }
        Ok(self.pos..end)
    }

    fn read_i32(&mut self) -> Result<i32> {
        let range = self.field()?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.data[range]);
        self.pos += 4;
        Ok(i32::from_le_bytes(buf))
    }

    fn write_i32(&mut self, value: i64) -> Result<()> {
        let value = i32::try_from(value).map_err(|_| Error::LayoutOverflow {
            what: "relocated offset",
            value: value as u64,
        })?;
        let range = self.field()?;
        self.data[range].copy_from_slice(&value.to_le_bytes());
        self.pos += 4;
        Ok(())
    }

    /// Write the absolute file offset of the byte following this field.
    fn write_offset_to_next(&mut self) -> Result<()> {
        let absolute = self.new_data_offset + self.pos as i64 + 4;
        self.write_i32(absolute)
    }

    /// Rebase a stored absolute "next" offset and jump to it.
    fn rebase_next_offset(&mut self) -> Result<()> {
        let stored = i64::from(self.read_i32()?);
        let relative = stored - self.old_data_offset;
        self.pos -= 4;
        self.write_i32(relative + self.new_data_offset)?;
        self.seek(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::properties::PropertyTag;

    fn props(end: usize) -> PropertyBlock {
        PropertyBlock {
            start: 4,
            end,
            tags: Vec::new(),
        }
    }

    fn ctx<'a>(class_name: &'a str, props: &'a PropertyBlock, old: i32, new: i32) -> RelocationContext<'a> {
        RelocationContext {
            class_name,
            props,
            old_data_offset: old,
            new_data_offset: new,
        }
    }

    fn read(data: &[u8], at: usize) -> i32 {
        i32::from_le_bytes(data[at..at + 4].try_into().unwrap())
    }

    fn push(data: &mut Vec<u8>, values: &[i32]) {
        for value in values {
            data.extend_from_slice(&value.to_le_bytes());
        }
    }

    #[test]
    fn test_lookup_matrix() {
        assert!(patcher_for(MeGame::Me3, "WwiseStream").is_some());
        assert!(patcher_for(MeGame::Me1, "WwiseStream").is_none());
        assert!(patcher_for(MeGame::Me3, "StaticMeshComponent").is_none());
        assert!(patcher_for(MeGame::Me1, "LightMapTexture2D").is_some());
        assert!(patcher_for(MeGame::Me2, "Texture2D").is_none());
    }

    #[test]
    fn test_default_objects_exempt() {
        assert!(is_default_object("Default__WwiseStream"));
        assert!(!is_default_object("VO_Line"));
    }

    #[test]
    fn test_me3_bulk_offset() {
        let block = props(20);
        let data = vec![0u8; 20 + 16 + 32];
        let patched = me3_bulk_data(&ctx("WwiseBank", &block, 0, 1000), data).unwrap();
        assert_eq!(read(&patched, 32), 1000 + 20 + 16);
    }

    #[test]
    fn test_me3_stream_with_filename_untouched() {
        let mut block = props(20);
        block.tags.push(PropertyTag {
            name: "Filename".to_string(),
            type_name: "NameProperty".to_string(),
            size: 8,
            array_index: 0,
            value_offset: 12,
        });
        let data = vec![0u8; 60];
        let patched = me3_wwise_stream(&ctx("WwiseStream", &block, 0, 1000), data.clone()).unwrap();
        assert_eq!(patched, data);
    }

    #[test]
    fn test_me2_stream_short_binary_untouched() {
        let block = props(8);
        let data = vec![0u8; 8 + 47];
        let patched = me2_wwise_stream(&ctx("WwiseStream", &block, 0, 500), data.clone()).unwrap();
        assert_eq!(patched, data);

        let data = vec![0u8; 8 + 60];
        let patched = me2_wwise_stream(&ctx("WwiseStream", &block, 0, 500), data).unwrap();
        assert_eq!(read(&patched, 8 + 44), 500 + 8 + 48);
    }

    #[test]
    fn test_me2_bank_offset() {
        let block = props(8);
        let patched = me2_wwise_bank(&ctx("WwiseBank", &block, 0, 500), vec![0u8; 8 + 40]).unwrap();
        assert_eq!(read(&patched, 8 + 20), 500 + 8 + 24);
    }

    #[test]
    fn test_me2_shader_cache_rebases_chain() {
        let old = 3000;
        let new = 7000;
        let end = 4;
        let mut data = vec![0u8; end + 1];
        // one empty name list, one shader
        push(&mut data, &[0, 1]);
        data.extend_from_slice(&[0u8; 24]);
        let shader_next_at = data.len();
        let after_shader = (shader_next_at + 4 + 6) as i32;
        push(&mut data, &[old + after_shader]);
        data.extend_from_slice(&[0u8; 6]);
        // vertex factory map, one material shader map without ME3 extras
        push(&mut data, &[0, 1]);
        data.extend_from_slice(&[0u8; 16]);
        push(&mut data, &[0, 0]);
        let map_next_at = data.len();
        let tail = (map_next_at + 4) as i32;
        push(&mut data, &[old + tail]);

        let block = props(end);
        let patched = me2_shader_cache(&ctx("ShaderCache", &block, old, new), data).unwrap();
        assert_eq!(read(&patched, shader_next_at), new + after_shader);
        assert_eq!(read(&patched, map_next_at), new + tail);
    }

    #[test]
    fn test_me2_bank_out_of_bounds() {
        let block = props(8);
        let err = me2_wwise_bank(&ctx("WwiseBank", &block, 0, 500), vec![0u8; 20]).unwrap_err();
        assert!(matches!(err, Error::RelocationOutOfBounds { .. }));
    }

    #[test]
    fn test_me1_texture_mips() {
        let end = 8;
        let mut data = vec![0u8; end];
        // thumbnail: flags, count, size 4, offset, 4 bytes
        push(&mut data, &[0, 0, 4, 0]);
        data.extend_from_slice(&[0xEE; 4]);
        push(&mut data, &[2]);
        // internal uncompressed mip of 6 bytes
        push(&mut data, &[0, 6, 6, 0]);
        let mip_at = data.len();
        data.extend_from_slice(&[0xAB; 6]);
        push(&mut data, &[2, 2]);
        // external mip
        push(&mut data, &[1, 100, 50, 7777, 4, 4]);

        let block = props(end);
        let patched = me1_texture(&ctx("Texture2D", &block, 0, 2000), data).unwrap();
        assert_eq!(read(&patched, end + 12), 2000 + end as i32 + 16);
        assert_eq!(read(&patched, mip_at - 4), 2000 + mip_at as i32);
        assert_eq!(read(&patched, patched.len() - 12), 7777);
    }

    #[test]
    fn test_static_mesh_component_light_maps() {
        let end = 4;
        let mut data = vec![0u8; end];
        push(&mut data, &[2]);
        // lod 0: one shadow map, no verts, type 1 light map with one guid
        push(&mut data, &[1, 9, 0, 1, 1]);
        data.extend_from_slice(&[0u8; 16]);
        data.extend_from_slice(&[0u8; 12]);
        push(&mut data, &[3, 0]);
        let first = data.len();
        data.extend_from_slice(&[1u8; 3]);
        data.extend_from_slice(&[0u8; 56]);
        push(&mut data, &[2, 0]);
        let second = data.len();
        data.extend_from_slice(&[2u8; 2]);
        // lod 1: no light map
        push(&mut data, &[0, 0, 0]);

        let block = props(end);
        let patched = static_mesh_component(&ctx("StaticMeshComponent", &block, 0, 300), data).unwrap();
        assert_eq!(read(&patched, first - 4), 300 + first as i32);
        assert_eq!(read(&patched, second - 4), 300 + second as i32);
    }

    #[test]
    fn test_me3_shader_cache_rebases_chain() {
        let old = 5000;
        let new = 9000;
        let end = 4;
        let mut data = vec![0u8; end + 1];
        // two empty name lists, one shader
        push(&mut data, &[0, 0, 1]);
        data.extend_from_slice(&[0u8; 24]);
        let shader_next_at = data.len();
        let after_shader = (shader_next_at + 4 + 10) as i32;
        push(&mut data, &[old + after_shader]);
        data.extend_from_slice(&[0u8; 10]);
        // vertex factory map, one material shader map
        push(&mut data, &[0, 1]);
        data.extend_from_slice(&[0u8; 16]);
        push(&mut data, &[0, 0, 0]);
        data.extend_from_slice(&[0u8; 8]);
        let map_next_at = data.len();
        let tail = (map_next_at + 4) as i32;
        push(&mut data, &[old + tail]);

        let block = props(end);
        let patched = me3_shader_cache(&ctx("ShaderCache", &block, old, new), data).unwrap();
        assert_eq!(read(&patched, shader_next_at), new + after_shader);
        assert_eq!(read(&patched, map_next_at), new + tail);
    }
}
