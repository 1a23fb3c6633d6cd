// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Parser for rekordbox track analysis files (`ANLZ0000.DAT`/`.EXT`).
//!
//! These hold one track's beat grid and cue points as a sequence of big-endian tagged
//! sections. Unlike `export.pdb`, every section is self-delimiting (`len_tag` says exactly how
//! far to advance), so the fixed-size envelope and section headers are declared with `binrw`
//! and the variable-length cue comment/tail is read by hand afterwards.

use crate::error::{Error, Result};
use binrw::BinRead;
use std::io::Cursor;

#[derive(BinRead, Debug)]
#[br(big, magic = b"PMAI")]
struct Envelope {
    len_header: u32,
    len_file: u32,
}

#[derive(BinRead, Debug, Clone, Copy)]
#[br(big)]
struct SectionHeader {
    magic: [u8; 4],
    #[allow(dead_code)]
    len_header: u32,
    len_tag: u32,
}

#[derive(BinRead, Debug, Clone, Copy)]
#[br(big)]
struct BeatRecord {
    num: u16,
    tempo_x100: u16,
    time_ms: u32,
}

#[derive(BinRead, Debug, Clone, Copy)]
#[br(big, magic = b"PCP2")]
struct CueHeader {
    #[allow(dead_code)]
    len_header: u32,
    len_entry: u32,
    hot_slot: u32,
    shape: u8,
    _pad1: u8,
    _pad2: u16,
    time_ms: u32,
    loop_end_ms: u32,
    color_id: u8,
    _pad3: u8,
    _pad4: u16,
    _pad5: u32,
    loop_numerator: u16,
    loop_denominator: u16,
    len_comment: u32,
}

/// Total bytes consumed by [`CueHeader`] including its 4-byte magic.
const CUE_HEADER_SIZE: u32 = 4 + 4 + 4 + 4 + 1 + 1 + 2 + 4 + 4 + 1 + 1 + 2 + 4 + 2 + 2 + 4;

const SECTION_BEAT_GRID: &[u8; 4] = b"PQTZ";
const SECTION_CUE_LIST_V2: &[u8; 4] = b"PCO2";

/// A beat-grid marker: beat position within the bar, tempo at that beat, and its time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Beat {
    pub num: u16,
    pub tempo_x100: u16,
    pub time_ms: u32,
}

/// The shape of a cue: a single point or a loop with an end time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueShape {
    Point,
    Loop,
}

/// A decoded memory or hot cue.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub is_hot: bool,
    pub shape: CueShape,
    pub time_ms: u32,
    pub loop_end_ms: u32,
    pub color_id: u8,
    pub loop_numerator: u16,
    pub loop_denominator: u16,
    pub comment: String,
    /// Hot-cue display color, present only on the subset of cues that carry one.
    pub rgb: Option<rgb::RGB8>,
}

/// The beats and cues decoded from a track's `.DAT`/`.EXT` analysis files.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub beats: Vec<Beat>,
    pub cues: Vec<Cue>,
}

impl Analysis {
    /// Parses one analysis file and appends its beats/cues onto this analysis. Sections with
    /// unrecognized magics are skipped by advancing `len_tag`, not treated as errors.
    pub fn parse_into(&mut self, data: &[u8]) -> Result<()> {
        let mut cursor = Cursor::new(data);
        let envelope = Envelope::read(&mut cursor).map_err(|_| Error::BadMagic {
            context: "anlz envelope",
            expected: b"PMAI",
            got: data.get(0..4).unwrap_or_default().to_vec(),
        })?;

        let mut offset = envelope.len_header as u64;
        while offset < envelope.len_file as u64 {
            let Some(header_bytes) = data.get(offset as usize..) else {
                break;
            };
            let mut header_cursor = Cursor::new(header_bytes);
            let Ok(header) = SectionHeader::read(&mut header_cursor) else {
                break;
            };

            let section_start = offset as usize;
            let section_end = section_start + header.len_tag as usize;
            let Some(section_bytes) = data.get(section_start..section_end.min(data.len())) else {
                break;
            };

            if &header.magic == SECTION_BEAT_GRID {
                self.beats.extend(parse_beat_grid(section_bytes)?);
            } else if &header.magic == SECTION_CUE_LIST_V2 {
                self.cues.extend(parse_cue_list(section_bytes)?);
            }

            if header.len_tag == 0 {
                break;
            }
            offset += header.len_tag as u64;
        }

        Ok(())
    }
}

/// Byte offset of the section payload after its 12-byte header.
const SECTION_HEADER_SIZE: usize = 12;

fn parse_beat_grid(section: &[u8]) -> Result<Vec<Beat>> {
    let len_beats = section
        .get(SECTION_HEADER_SIZE + 8..SECTION_HEADER_SIZE + 12)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(Error::TruncatedInput {
            context: "anlz beat grid count",
        })?;

    let mut beats = Vec::with_capacity(len_beats as usize);
    let mut cursor = Cursor::new(&section[SECTION_HEADER_SIZE + 12..]);
    for _ in 0..len_beats {
        let record = BeatRecord::read(&mut cursor).map_err(|_| Error::TruncatedInput {
            context: "anlz beat record",
        })?;
        beats.push(Beat {
            num: record.num,
            tempo_x100: record.tempo_x100,
            time_ms: record.time_ms,
        });
    }
    Ok(beats)
}

fn parse_cue_list(section: &[u8]) -> Result<Vec<Cue>> {
    let len_cues = section
        .get(SECTION_HEADER_SIZE + 4..SECTION_HEADER_SIZE + 6)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(Error::TruncatedInput {
            context: "anlz cue list count",
        })?;

    let mut cues = Vec::with_capacity(len_cues as usize);
    let mut cue_offset = SECTION_HEADER_SIZE + 8;
    for _ in 0..len_cues {
        let Some(cue_bytes) = section.get(cue_offset..) else {
            break;
        };
        let mut cursor = Cursor::new(cue_bytes);
        let header = CueHeader::read(&mut cursor).map_err(|_| Error::TruncatedInput {
            context: "anlz cue header",
        })?;

        let shape = match header.shape {
            2 => CueShape::Loop,
            _ => CueShape::Point,
        };

        let comment = if header.len_entry > CUE_HEADER_SIZE && header.len_comment > 0 {
            let comment_start = CUE_HEADER_SIZE as usize;
            let comment_bytes = cue_bytes
                .get(comment_start..comment_start + header.len_comment as usize)
                .ok_or(Error::TruncatedInput {
                    context: "anlz cue comment",
                })?;
            decode_utf16_be_trimmed(comment_bytes)?
        } else {
            String::new()
        };

        let tail_start = CUE_HEADER_SIZE as u64 + header.len_comment as u64;
        let rgb = if header.len_entry as u64 > tail_start + 3 {
            cue_bytes
                .get(tail_start as usize..tail_start as usize + 4)
                .map(|t| rgb::RGB8::new(t[1], t[2], t[3]))
        } else {
            None
        };

        cues.push(Cue {
            is_hot: header.hot_slot != 0,
            shape,
            time_ms: header.time_ms,
            loop_end_ms: if shape == CueShape::Loop {
                header.loop_end_ms
            } else {
                0
            },
            color_id: header.color_id,
            loop_numerator: header.loop_numerator,
            loop_denominator: header.loop_denominator,
            comment,
            rgb,
        });

        cue_offset += header.len_entry as usize;
    }

    Ok(cues)
}

fn decode_utf16_be_trimmed(bytes: &[u8]) -> Result<String> {
    let mut units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    while units.last() == Some(&0) {
        units.pop();
    }
    String::from_utf16(&units).map_err(|_| Error::InvalidUtf16 { offset: 0 })
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn build_envelope_padded_to(len_header: usize) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"PMAI");
        out.extend_from_slice(&(len_header as u32).to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes()); // len_file, patched by caller
        out.resize(len_header, 0);
        out
    }

    fn build_section_header(magic: &[u8; 4]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(magic);
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes()); // len_tag, patched by caller
        out
    }

    fn patch_len_tag(section: &mut [u8], len_tag: u32) {
        section[8..12].copy_from_slice(&len_tag.to_be_bytes());
    }

    #[test]
    fn test_parse_beat_grid_section() {
        let mut data = build_envelope_padded_to(28);

        let mut section = build_section_header(b"PQTZ");
        section.extend_from_slice(&0u32.to_be_bytes());
        section.extend_from_slice(&0u32.to_be_bytes());
        section.extend_from_slice(&2u32.to_be_bytes()); // len_beats
        section.extend_from_slice(&1u16.to_be_bytes()); // beat 1: num
        section.extend_from_slice(&12800u16.to_be_bytes()); // tempo
        section.extend_from_slice(&0u32.to_be_bytes()); // time
        section.extend_from_slice(&2u16.to_be_bytes()); // beat 2: num
        section.extend_from_slice(&12800u16.to_be_bytes());
        section.extend_from_slice(&469u32.to_be_bytes());

        patch_len_tag(&mut section, section.len() as u32);

        let len_file = (data.len() + section.len()) as u32;
        data[8..12].copy_from_slice(&len_file.to_be_bytes());
        data.extend(section);

        let mut analysis = Analysis::default();
        analysis.parse_into(&data).unwrap();
        assert_eq!(analysis.beats.len(), 2);
        assert_eq!(analysis.beats[0].num, 1);
        assert_eq!(analysis.beats[1].time_ms, 469);
    }

    #[test]
    fn test_parse_cue_list_point_cue_with_comment() {
        let mut data = build_envelope_padded_to(28);

        let comment = "Drop";
        let mut comment_bytes = Vec::new();
        for unit in comment.encode_utf16() {
            comment_bytes.extend_from_slice(&unit.to_be_bytes());
        }
        comment_bytes.extend_from_slice(&[0, 0]);
        let len_comment = comment_bytes.len() as u32;

        let mut cue = Vec::new();
        cue.extend_from_slice(b"PCP2");
        cue.extend_from_slice(&CUE_HEADER_SIZE.to_be_bytes());
        let len_entry = CUE_HEADER_SIZE + len_comment;
        cue.extend_from_slice(&len_entry.to_be_bytes());
        cue.extend_from_slice(&0u32.to_be_bytes()); // hot_slot = memory cue
        cue.push(1); // shape = point
        cue.push(0);
        cue.extend_from_slice(&0u16.to_be_bytes());
        cue.extend_from_slice(&1234u32.to_be_bytes()); // time_ms
        cue.extend_from_slice(&0u32.to_be_bytes()); // loop_end_ms
        cue.push(3); // color_id
        cue.push(0);
        cue.extend_from_slice(&0u16.to_be_bytes());
        cue.extend_from_slice(&0u32.to_be_bytes()); // _pad5
        cue.extend_from_slice(&0u16.to_be_bytes()); // loop_numerator
        cue.extend_from_slice(&0u16.to_be_bytes()); // loop_denominator
        cue.extend_from_slice(&len_comment.to_be_bytes());
        cue.extend(comment_bytes);

        let mut section = build_section_header(b"PCO2");
        section.extend_from_slice(&0u32.to_be_bytes()); // list_kind
        section.extend_from_slice(&1u16.to_be_bytes()); // len_cues
        section.extend_from_slice(&0u16.to_be_bytes());
        section.extend(cue);

        patch_len_tag(&mut section, section.len() as u32);

        let len_file = (data.len() + section.len()) as u32;
        data[8..12].copy_from_slice(&len_file.to_be_bytes());
        data.extend(section);

        let mut analysis = Analysis::default();
        analysis.parse_into(&data).unwrap();
        assert_eq!(analysis.cues.len(), 1);
        let cue = &analysis.cues[0];
        assert_eq!(cue.time_ms, 1234);
        assert_eq!(cue.shape, CueShape::Point);
        assert_eq!(cue.comment, "Drop");
        assert_eq!(cue.loop_end_ms, 0, "point cues must not carry a loop end");
        assert!(!cue.is_hot);
    }

    #[test]
    fn test_parse_rejects_bad_magic() {
        let data = vec![0u8; 28];
        let mut analysis = Analysis::default();
        assert!(analysis.parse_into(&data).is_err());
    }
}
