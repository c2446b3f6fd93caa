//! Slice-level read helpers for self-contained packed frames.
//!
//! Short reads mean a malformed frame, not missing stream data, so every
//! helper fails with [`ParseError::PayloadParse`].

use crate::{error::ParseError, helper::AnyResult};

pub(crate) fn read_exact(input: &[u8], len: usize) -> AnyResult<(&[u8], &[u8])> {
    if input.len() < len {
        return Err(ParseError::PayloadParse.into());
    }
    Ok((&input[len..], &input[..len]))
}

pub(crate) fn read_u8(input: &[u8]) -> AnyResult<(&[u8], u8)> {
    let (input, found) = read_exact(input, 1)?;
    Ok((input, found[0]))
}

pub(crate) fn read_le_u16(input: &[u8]) -> AnyResult<(&[u8], u16)> {
    let (input, found) = read_exact(input, 2)?;
    Ok((input, u16::from_le_bytes([found[0], found[1]])))
}

pub(crate) fn read_le_u32(input: &[u8]) -> AnyResult<(&[u8], u32)> {
    let (input, found) = read_exact(input, 4)?;
    Ok((
        input,
        u32::from_le_bytes([found[0], found[1], found[2], found[3]]),
    ))
}

pub(crate) fn read_le_u64(input: &[u8]) -> AnyResult<(&[u8], u64)> {
    let (input, found) = read_exact(input, 8)?;
    Ok((
        input,
        u64::from_le_bytes([
            found[0], found[1], found[2], found[3], found[4], found[5], found[6], found[7],
        ]),
    ))
}

pub(crate) fn read_be_u32(input: &[u8]) -> AnyResult<(&[u8], u32)> {
    let (input, found) = read_exact(input, 4)?;
    Ok((
        input,
        u32::from_be_bytes([found[0], found[1], found[2], found[3]]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_consume_input() {
        let input = [0x01, 0x02, 0x03, 0x04, 0x05];
        let (rest, value) = read_le_u16(&input).unwrap();
        assert_eq!(value, 0x0201);
        let (rest, bytes) = read_exact(rest, 2).unwrap();
        assert_eq!(bytes, &[0x03, 0x04]);
        let (rest, byte) = read_u8(rest).unwrap();
        assert_eq!(byte, 0x05);
        assert!(rest.is_empty());
    }

    #[test]
    fn short_input_is_payload_error() {
        let err = read_le_u32(&[0x01, 0x02]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ParseError>(),
            Some(&ParseError::PayloadParse)
        );
    }

    #[test]
    fn endianness() {
        let input = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(read_le_u32(&input).unwrap().1, 0x7856_3412);
        assert_eq!(read_be_u32(&input).unwrap().1, 0x1234_5678);
        assert_eq!(
            read_le_u64(&[1, 0, 0, 0, 0, 0, 0, 0]).unwrap().1,
            1
        );
    }
}
