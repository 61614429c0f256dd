//! Length-prefixed strings as stored in package headers and name tables
//!
//! A positive length means that many single-byte characters including the
//! trailing NUL; a negative length means `|len|` UTF-16LE code units including
//! the trailing NUL. Zero is an empty string.

use std::io::{Read, Seek, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// Largest string length accepted on read.
const MAX_STRING_LENGTH: i64 = 1 << 20;

/// Read a length-prefixed string.
///
/// # Errors
/// Returns [`Error::InvalidString`] if the length prefix is implausible, or an
/// IO error if the stream ends early.
pub fn read_unreal_string<R: Read + Seek>(reader: &mut R) -> Result<String> {
    let offset = reader.stream_position()?;
    let length = i64::from(reader.read_i32::<LittleEndian>()?);

    if length.abs() > MAX_STRING_LENGTH {
        return Err(Error::InvalidString {
            offset,
            message: format!("length {length} is out of range"),
        });
    }

    if length == 0 {
        return Ok(String::new());
    }

    if length > 0 {
        let mut bytes = vec![0u8; length as usize];
        reader.read_exact(&mut bytes)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(bytes[..end].iter().map(|&b| char::from(b)).collect())
    } else {
        let units = (-length) as usize;
        let mut raw = Vec::with_capacity(units);
        for _ in 0..units {
            raw.push(reader.read_u16::<LittleEndian>()?);
        }
        let end = raw.iter().position(|&u| u == 0).unwrap_or(raw.len());
        Ok(String::from_utf16_lossy(&raw[..end]))
    }
}

/// Write a string with a positive (single-byte) length prefix.
///
/// Characters outside Latin-1 are written as `?`.
pub fn write_unreal_string_ascii<W: Write>(writer: &mut W, value: &str) -> Result<()> {
    let bytes: Vec<u8> = value
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect();
    writer.write_i32::<LittleEndian>(length_with_nul(bytes.len())?)?;
    writer.write_all(&bytes)?;
    writer.write_u8(0)?;
    Ok(())
}

/// Write a string with a negative (UTF-16) length prefix.
pub fn write_unreal_string_unicode<W: Write>(writer: &mut W, value: &str) -> Result<()> {
    let units: Vec<u16> = value.encode_utf16().collect();
    writer.write_i32::<LittleEndian>(-length_with_nul(units.len())?)?;
    for unit in units {
        writer.write_u16::<LittleEndian>(unit)?;
    }
    writer.write_u16::<LittleEndian>(0)?;
    Ok(())
}

fn length_with_nul(len: usize) -> Result<i32> {
    i32::try_from(len + 1).map_err(|_| Error::LayoutOverflow {
        what: "string length",
        value: len as u64 + 1,
    })
}
