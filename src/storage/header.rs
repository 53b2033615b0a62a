//! # Long-Column Length Header
//!
//! Long-column byte data is stored behind a small length header. The first
//! header byte selects one of four encodings:
//!
//! | First byte        | Size | Length                                   |
//! |-------------------|------|------------------------------------------|
//! | `0xC0`            | 5    | next 4 bytes, big-endian                 |
//! | `0xA0`            | 3    | next 2 bytes, big-endian                 |
//! | other, high bit   | 1    | low five bits                            |
//! | high bit clear    | 4    | legacy: all 4 bytes = length in **bits** |
//!
//! A decoded length of zero means the writer did not know the length (values
//! written from a stream use four zero bytes). The only way to learn the real
//! length is then to read the payload to exhaustion; the handle does this at
//! most once and caches the result.
//!
//! ## Payload Offset
//!
//! [`StreamHeader::payload_offset`] is the number of header bytes, i.e. the
//! absolute stream offset of the first payload byte. Callers add it to every
//! logical offset before repositioning the store stream.

use std::io::{self, Read};

use crate::config::{
    HEADER_MARKER_INT, HEADER_MARKER_SHORT, HEADER_MARKER_TINY, HEADER_TINY_MAX,
    LEGACY_HEADER_SIZE, MAX_HEADER_SIZE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    declared_length: Option<u64>,
    payload_offset: u64,
}

impl StreamHeader {
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let mut first = [0u8; 1];
        reader.read_exact(&mut first)?;
        let marker = first[0];

        let (length, payload_offset) = if marker & HEADER_MARKER_TINY != 0 {
            match marker {
                HEADER_MARKER_INT => {
                    let mut buf = [0u8; 4];
                    reader.read_exact(&mut buf)?;
                    let len = i32::from_be_bytes(buf);
                    if len < 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("negative long-column length {len}"),
                        ));
                    }
                    (len as u64, 5)
                }
                HEADER_MARKER_SHORT => {
                    let mut buf = [0u8; 2];
                    reader.read_exact(&mut buf)?;
                    (u16::from_be_bytes(buf) as u64, 3)
                }
                _ => ((marker as u64) & HEADER_TINY_MAX, 1),
            }
        } else {
            let mut rest = [0u8; LEGACY_HEADER_SIZE - 1];
            reader.read_exact(&mut rest)?;
            let bits = u32::from_be_bytes([marker, rest[0], rest[1], rest[2]]) as u64;
            (bits.div_ceil(8), LEGACY_HEADER_SIZE as u64)
        };

        Ok(Self {
            declared_length: (length != 0).then_some(length),
            payload_offset,
        })
    }

    pub fn declared_length(&self) -> Option<u64> {
        self.declared_length
    }

    pub fn payload_offset(&self) -> u64 {
        self.payload_offset
    }

    /// Encodes a header in the shortest format able to hold `length`.
    /// Unknown lengths, and lengths the 5-byte form cannot hold, fall back to
    /// the four-zero-byte form.
    pub fn encode(length: Option<u64>) -> Vec<u8> {
        let mut out = Vec::with_capacity(MAX_HEADER_SIZE);
        match length {
            Some(len) if len > 0 && len <= HEADER_TINY_MAX => {
                out.push(HEADER_MARKER_TINY | len as u8);
            }
            Some(len) if len > 0 && len <= u16::MAX as u64 => {
                out.push(HEADER_MARKER_SHORT);
                out.extend_from_slice(&(len as u16).to_be_bytes());
            }
            Some(len) if len > 0 && len <= i32::MAX as u64 => {
                out.push(HEADER_MARKER_INT);
                out.extend_from_slice(&(len as i32).to_be_bytes());
            }
            _ => out.resize(LEGACY_HEADER_SIZE, 0),
        }
        out
    }

    /// Encodes a legacy header holding the length as a bit count.
    pub fn encode_legacy(length: u64) -> io::Result<[u8; LEGACY_HEADER_SIZE]> {
        let bits = length
            .checked_mul(8)
            .filter(|bits| *bits < (1u64 << 31))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("length {length} too large for legacy header"),
                )
            })?;
        Ok((bits as u32).to_be_bytes())
    }
}
