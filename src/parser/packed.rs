//! Decoders for the packed container frames: ziplist, zipmap, intset.
//!
//! Each decoder takes a self-contained byte slice (already decompressed)
//! and yields its entries; integer specializations are stringified to
//! their decimal form.

use anyhow::{bail, Context};
use bytes::Bytes;

use super::combinators::{read_be_u32, read_exact, read_le_u16, read_le_u32, read_le_u64, read_u8};
use crate::{error::ParseError, helper::AnyResult};

/// Decodes a ziplist frame into its entries.
///
/// Layout: `<zlbytes><zltail><zllen><entry>...<zlend>`; the trailing end
/// byte is not consumed since `zllen` bounds the walk.
pub(crate) fn ziplist_entries(blob: &[u8]) -> AnyResult<Vec<Bytes>> {
    let (input, _zlbytes) = read_exact(blob, 4).context("ziplist header")?;
    let (input, _zltail) = read_exact(input, 4).context("ziplist header")?;
    let (mut input, count) = read_le_u16(input).context("ziplist entry count")?;

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (rest, entry) = ziplist_entry(input).context("ziplist entry")?;
        entries.push(entry);
        input = rest;
    }
    Ok(entries)
}

fn ziplist_entry(input: &[u8]) -> AnyResult<(&[u8], Bytes)> {
    // prev-entry length: one byte, or four more after the 0xfe marker;
    // always discarded
    let (input, prev) = read_u8(input)?;
    let input = if prev == 0xfe {
        read_exact(input, 4)?.0
    } else {
        input
    };

    let (input, flag) = read_u8(input)?;
    match flag >> 6 {
        0 => {
            let (input, data) = read_exact(input, (flag & 0x3f) as usize)?;
            Ok((input, Bytes::copy_from_slice(data)))
        }
        1 => {
            let (input, second) = read_u8(input)?;
            let len = ((flag & 0x3f) as usize) << 8 | second as usize;
            let (input, data) = read_exact(input, len)?;
            Ok((input, Bytes::copy_from_slice(data)))
        }
        2 => {
            let (input, len) = read_be_u32(input)?;
            let (input, data) = read_exact(input, len as usize)?;
            Ok((input, Bytes::copy_from_slice(data)))
        }
        _ => ziplist_int(input, flag),
    }
}

fn ziplist_int(input: &[u8], flag: u8) -> AnyResult<(&[u8], Bytes)> {
    let (input, value) = match (flag >> 4) & 0x03 {
        0 => {
            let (input, v) = read_le_u16(input)?;
            (input, v as i16 as i64)
        }
        1 => {
            let (input, v) = read_le_u32(input)?;
            (input, v as i32 as i64)
        }
        2 => {
            let (input, v) = read_le_u64(input)?;
            (input, v as i64)
        }
        _ => match flag {
            0xf0 => {
                // 24-bit little-endian, sign-extended through an i32 shift
                let (input, b) = read_exact(input, 3)?;
                let raw = (b[2] as i32) << 24 | (b[1] as i32) << 16 | (b[0] as i32) << 8;
                (input, (raw >> 8) as i64)
            }
            0xfe => {
                let (input, b) = read_u8(input)?;
                (input, b as i8 as i64)
            }
            0xf1..=0xfd => (input, (flag - 0xf1) as i64),
            _ => bail!(ParseError::PayloadParse),
        },
    };
    Ok((input, Bytes::from(value.to_string())))
}

/// Decodes a zipmap frame into key/value pairs.
///
/// Layout: `<zmlen> (<len>key <len><free>value)* <zmend>`; the `free`
/// byte counts junk padding after the value bytes.
pub(crate) fn zipmap_entries(blob: &[u8]) -> AnyResult<Vec<(Bytes, Bytes)>> {
    let (mut input, _zmlen) = read_u8(blob).context("zipmap header")?;

    let mut pairs = Vec::new();
    loop {
        match input.first() {
            None => bail!(ParseError::PayloadParse),
            Some(&0xff) => return Ok(pairs),
            Some(_) => {}
        }
        let (rest, key) = zipmap_entry(input, false).context("zipmap key")?;
        let (rest, value) = zipmap_entry(rest, true).context("zipmap value")?;
        pairs.push((key, value));
        input = rest;
    }
}

fn zipmap_entry(input: &[u8], is_value: bool) -> AnyResult<(&[u8], Bytes)> {
    let (input, first) = read_u8(input)?;
    let (input, len) = match first {
        0..=253 => (input, first as usize),
        254 => {
            let (input, len) = read_le_u32(input)?;
            (input, len as usize)
        }
        _ => return Err(ParseError::InvalidZipmapEntry.into()),
    };
    let (input, free) = if is_value {
        let (input, free) = read_u8(input)?;
        (input, free as usize)
    } else {
        (input, 0)
    };
    let (input, data) = read_exact(input, len)?;
    let (input, _padding) = read_exact(input, free)?;
    Ok((input, Bytes::copy_from_slice(data)))
}

/// Decodes an intset frame: element width, element count, then that many
/// signed little-endian integers of the declared width.
pub(crate) fn intset_entries(blob: &[u8]) -> AnyResult<Vec<i64>> {
    let (input, width) = read_le_u32(blob).context("intset width")?;
    let (mut input, count) = read_le_u32(input).context("intset count")?;

    let mut values = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (rest, value) = match width {
            2 => {
                let (rest, v) = read_le_u16(input)?;
                (rest, v as i16 as i64)
            }
            4 => {
                let (rest, v) = read_le_u32(input)?;
                (rest, v as i32 as i64)
            }
            8 => {
                let (rest, v) = read_le_u64(input)?;
                (rest, v as i64)
            }
            _ => bail!(ParseError::PayloadParse),
        };
        values.push(value);
        input = rest;
    }
    Ok(values)
}
