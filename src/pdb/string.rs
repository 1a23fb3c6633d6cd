// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Decoder for the variable-length string encoding used throughout `export.pdb` rows.
//!
//! A string is addressed by the offset of its header byte `m`. If bit 0 of `m` is set the
//! string uses the short-ASCII form, where the remaining bits of `m` give the length
//! (including the header byte itself). Otherwise `m` is a flags byte for the long form,
//! which is followed by a 16-bit length and then the payload.

use crate::error::{Error, Result};

const FLAG_UTF16: u8 = 0x10;
const FLAG_UTF8: u8 = 0x20;
const FLAG_ASCII: u8 = 0x40;

/// Decodes a DeviceSQL string starting at `offset` within `data`.
///
/// An `offset` of `0` is not a valid string location in this codec; callers should treat a
/// zero offset as "no string" before calling this function (see [`decode_optional`]).
pub fn decode(data: &[u8], offset: usize) -> Result<String> {
    let header = *data.get(offset).ok_or(Error::TruncatedInput {
        context: "devicesql string header",
    })?;

    if header & 0x01 != 0 {
        let len = (header >> 1) as usize;
        let content_len = len.saturating_sub(1);
        let start = offset + 1;
        let bytes = data
            .get(start..start + content_len)
            .ok_or(Error::TruncatedInput {
                context: "devicesql short ascii string",
            })?;
        return Ok(bytes.iter().map(|&b| b as char).collect());
    }

    let flags = header;
    let len_bytes = data
        .get(offset + 1..offset + 3)
        .ok_or(Error::TruncatedInput {
            context: "devicesql long string length",
        })?;
    let len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
    let content_len = len.saturating_sub(4);
    let start = offset + 4;
    let bytes = data
        .get(start..start + content_len)
        .ok_or(Error::TruncatedInput {
            context: "devicesql long string content",
        })?;

    if flags & FLAG_UTF16 != 0 {
        let mut units = Vec::with_capacity(bytes.len() / 2);
        for chunk in bytes.chunks_exact(2) {
            units.push(u16::from_le_bytes([chunk[0], chunk[1]]));
        }
        while units.last() == Some(&0) {
            units.pop();
        }
        String::from_utf16(&units).map_err(|_| Error::InvalidUtf16 { offset })
    } else if flags & FLAG_UTF8 != 0 {
        Ok(String::from_utf8_lossy(trim_trailing_nul(bytes)).into_owned())
    } else if flags & FLAG_ASCII != 0 {
        Ok(trim_trailing_nul(bytes).iter().map(|&b| b as char).collect())
    } else {
        Ok(String::new())
    }
}

/// Decodes the string at `offset`, treating `0` as "no string" and returning an empty string.
pub fn decode_optional(data: &[u8], offset: usize) -> Result<String> {
    if offset == 0 {
        Ok(String::new())
    } else {
        decode(data, offset)
    }
}

fn trim_trailing_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().rposition(|&b| b != 0) {
        Some(pos) => &bytes[..=pos],
        None => &[],
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Builds the bytes for a short-ASCII string, mirroring the layout this module decodes.
    fn encode_short_ascii(s: &str) -> Vec<u8> {
        assert!(s.is_ascii());
        let len = s.len() + 1;
        assert!(len < 128);
        let mut out = vec![((len as u8) << 1) | 0x01];
        out.extend_from_slice(s.as_bytes());
        out
    }

    fn encode_long_ascii(s: &str) -> Vec<u8> {
        let len = s.len() + 4 + 1; // +1 for the trailing NUL the real format always carries
        let mut out = vec![FLAG_ASCII];
        out.extend_from_slice(&(len as u16).to_le_bytes());
        out.extend_from_slice(s.as_bytes());
        out.push(0);
        out
    }

    fn encode_long_utf16(s: &str) -> Vec<u8> {
        let units: Vec<u16> = s.encode_utf16().collect();
        let len = 4 + units.len() * 2 + 2;
        let mut out = vec![FLAG_UTF16];
        out.extend_from_slice(&(len as u16).to_le_bytes());
        for unit in units {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out.extend_from_slice(&[0, 0]);
        out
    }

    #[test]
    fn test_decode_short_ascii() {
        let data = encode_short_ascii("Title");
        assert_eq!(decode(&data, 0).unwrap(), "Title");
    }

    #[test]
    fn test_decode_short_ascii_empty() {
        let data = encode_short_ascii("");
        assert_eq!(decode(&data, 0).unwrap(), "");
    }

    #[test]
    fn test_decode_long_ascii() {
        let data = encode_long_ascii("A Longer Track Title");
        assert_eq!(decode(&data, 0).unwrap(), "A Longer Track Title");
    }

    #[test]
    fn test_decode_long_utf16() {
        let data = encode_long_utf16("Héllo Wörld");
        assert_eq!(decode(&data, 0).unwrap(), "Héllo Wörld");
    }

    #[test]
    fn test_decode_optional_zero_offset_is_empty() {
        assert_eq!(decode_optional(&[], 0).unwrap(), "");
    }

    #[test]
    fn test_decode_truncated_header_errors() {
        let data: [u8; 0] = [];
        assert!(decode(&data, 0).is_err());
    }

    #[test]
    fn test_decode_truncated_long_length_errors() {
        let data = [FLAG_ASCII, 0x05];
        assert!(decode(&data, 0).is_err());
    }

    #[test]
    fn test_roundtrip_short_ascii() {
        for s in ["", "a", "Kick Drum.wav", &"x".repeat(60)] {
            let data = encode_short_ascii(s);
            assert_eq!(decode(&data, 0).unwrap(), s);
        }
    }
}
