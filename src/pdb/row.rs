// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Per-table row decoders.
//!
//! Every row is a fixed-size header followed by zero or more variable-length strings, each
//! addressed by a little-endian offset relative to the row's own start (`0` meaning "absent").
//! Offsets are hand-indexed here rather than expressed as a derive, since the string table's
//! position depends on the row kind and isn't expressible as a single fixed layout.

use super::string;
use crate::error::{Error, Result};

fn u8_at(row: &[u8], offset: usize) -> Result<u8> {
    row.get(offset).copied().ok_or(Error::TruncatedInput {
        context: "pdb row u8 field",
    })
}

fn u16_at(row: &[u8], offset: usize) -> Result<u16> {
    row.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(Error::TruncatedInput {
            context: "pdb row u16 field",
        })
}

fn u32_at(row: &[u8], offset: usize) -> Result<u32> {
    row.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(Error::TruncatedInput {
            context: "pdb row u32 field",
        })
}

/// A decoded artist row.
#[derive(Debug, Clone)]
pub struct ArtistRow {
    pub artist_id: u32,
    pub name: String,
}

/// Subtype value meaning the artist name uses the short (1-byte) offset.
const ARTIST_SUBTYPE_SHORT: u16 = 0x60;
/// Subtype value meaning the artist name uses the long (2-byte) offset.
const ARTIST_SUBTYPE_LONG: u16 = 0x64;

pub fn decode_artist(row: &[u8]) -> Result<ArtistRow> {
    let subtype = u16_at(row, 0)?;
    let artist_id = u32_at(row, 4)?;
    let name_off_short = u8_at(row, 9)? as usize;
    let name_off_long = u16_at(row, 10)? as usize;
    let name = match subtype {
        ARTIST_SUBTYPE_SHORT => string::decode_optional(row, name_off_short)?,
        ARTIST_SUBTYPE_LONG => string::decode_optional(row, name_off_long)?,
        _ => String::new(),
    };
    Ok(ArtistRow { artist_id, name })
}

/// A decoded album row.
#[derive(Debug, Clone)]
pub struct AlbumRow {
    pub album_id: u32,
    pub artist_id: u32,
    pub name: String,
}

pub fn decode_album(row: &[u8]) -> Result<AlbumRow> {
    let artist_id = u32_at(row, 8)?;
    let album_id = u32_at(row, 12)?;
    let name_off = u8_at(row, 21)? as usize;
    let name = string::decode_optional(row, name_off)?;
    Ok(AlbumRow {
        album_id,
        artist_id,
        name,
    })
}

/// A decoded genre, label or key row: all share the `id: u32` + trailing-string shape, differing
/// only in where the string offset sits.
#[derive(Debug, Clone)]
pub struct NamedRow {
    pub id: u32,
    pub name: String,
}

pub fn decode_genre(row: &[u8]) -> Result<NamedRow> {
    let id = u32_at(row, 0)?;
    let name = string::decode(row, 4)?;
    Ok(NamedRow { id, name })
}

pub fn decode_label(row: &[u8]) -> Result<NamedRow> {
    let id = u32_at(row, 0)?;
    let name = string::decode(row, 4)?;
    Ok(NamedRow { id, name })
}

pub fn decode_key(row: &[u8]) -> Result<NamedRow> {
    let id = u32_at(row, 0)?;
    let name = string::decode(row, 8)?;
    Ok(NamedRow { id, name })
}

pub fn decode_artwork(row: &[u8]) -> Result<NamedRow> {
    let id = u32_at(row, 0)?;
    let name = string::decode(row, 4)?;
    Ok(NamedRow { id, name })
}

/// A decoded color row.
#[derive(Debug, Clone)]
pub struct ColorRow {
    pub color_id: u16,
    pub name: String,
}

pub fn decode_color(row: &[u8]) -> Result<ColorRow> {
    let color_id = u16_at(row, 4)?;
    let name = string::decode(row, 8)?;
    Ok(ColorRow { color_id, name })
}

/// A decoded playlist tree node (folder or playlist).
#[derive(Debug, Clone)]
pub struct PlaylistTreeNodeRow {
    pub playlist_id: u32,
    pub parent_id: u32,
    pub sort_order: u32,
    pub is_folder: bool,
    pub name: String,
}

pub fn decode_playlist_tree_node(row: &[u8]) -> Result<PlaylistTreeNodeRow> {
    let parent_id = u32_at(row, 0)?;
    let sort_order = u32_at(row, 8)?;
    let playlist_id = u32_at(row, 12)?;
    let is_folder = u32_at(row, 16)? != 0;
    let name = string::decode(row, 20)?;
    Ok(PlaylistTreeNodeRow {
        playlist_id,
        parent_id,
        sort_order,
        is_folder,
        name,
    })
}

/// A decoded playlist entry (links a track into a playlist at a given position).
#[derive(Debug, Clone, Copy)]
pub struct PlaylistEntryRow {
    pub entry_index: u32,
    pub track_id: u32,
    pub playlist_id: u32,
}

pub fn decode_playlist_entry(row: &[u8]) -> Result<PlaylistEntryRow> {
    Ok(PlaylistEntryRow {
        entry_index: u32_at(row, 0)?,
        track_id: u32_at(row, 4)?,
        playlist_id: u32_at(row, 8)?,
    })
}

/// Byte size of a track row's fixed header, before the 21 trailing string offsets.
const TRACK_BASE_SIZE: usize = 94;

/// A decoded track row, capturing only the fields named by the data model.
#[derive(Debug, Clone)]
pub struct TrackRow {
    pub track_id: u32,
    pub artist_id: u32,
    pub album_id: u32,
    pub genre_id: u32,
    pub label_id: u32,
    pub key_id: u32,
    pub artwork_id: u32,
    pub orig_artist_id: u32,
    pub remixer_id: u32,
    pub composer_id: u32,
    pub color_id: u8,
    pub rating: u16,
    pub bitrate: u32,
    pub tempo_x100: u32,
    pub track_number: u32,
    pub disc_number: u16,
    pub play_count: u16,
    pub year: u16,
    pub sample_depth: u16,
    pub sample_rate: u32,
    pub duration_s: u16,
    pub file_size: u32,
    pub date_added: String,
    pub release_date: String,
    pub mix_name: String,
    pub analyze_path: String,
    pub analyze_date: String,
    pub comment: String,
    pub title: String,
    pub file_name: String,
    pub file_path: String,
}

pub fn decode_track(row: &[u8]) -> Result<TrackRow> {
    let sample_rate = u32_at(row, 8)?;
    let composer_id = u32_at(row, 12)?;
    let file_size = u32_at(row, 16)?;
    let artwork_id = u32_at(row, 28)?;
    let key_id = u32_at(row, 32)?;
    let orig_artist_id = u32_at(row, 36)?;
    let label_id = u32_at(row, 40)?;
    let remixer_id = u32_at(row, 44)?;
    let bitrate = u32_at(row, 48)?;
    let track_number = u32_at(row, 52)?;
    let tempo_x100 = u32_at(row, 56)?;
    let genre_id = u32_at(row, 60)?;
    let album_id = u32_at(row, 64)?;
    let artist_id = u32_at(row, 68)?;
    let track_id = u32_at(row, 72)?;
    let disc_number = u16_at(row, 76)?;
    let play_count = u16_at(row, 78)?;
    let year = u16_at(row, 80)?;
    let sample_depth = u16_at(row, 82)?;
    let duration_s = u16_at(row, 84)?;
    let color_id = u8_at(row, 88)?;
    let rating = u8_at(row, 89)? as u16;

    let string_offset = |slot_1based: usize| -> Result<usize> {
        Ok(u16_at(row, TRACK_BASE_SIZE + (slot_1based - 1) * 2)? as usize)
    };

    let date_added = string::decode_optional(row, string_offset(10)?)?;
    let release_date = string::decode_optional(row, string_offset(11)?)?;
    let mix_name = string::decode_optional(row, string_offset(12)?)?;
    let analyze_path = string::decode_optional(row, string_offset(14)?)?;
    let analyze_date = string::decode_optional(row, string_offset(15)?)?;
    let comment = string::decode_optional(row, string_offset(16)?)?;
    let title = string::decode_optional(row, string_offset(17)?)?;
    let file_name = string::decode_optional(row, string_offset(19)?)?;
    let file_path = string::decode_optional(row, string_offset(20)?)?;

    Ok(TrackRow {
        track_id,
        artist_id,
        album_id,
        genre_id,
        label_id,
        key_id,
        artwork_id,
        orig_artist_id,
        remixer_id,
        composer_id,
        color_id,
        rating,
        bitrate,
        tempo_x100,
        track_number,
        disc_number,
        play_count,
        year,
        sample_depth,
        sample_rate,
        duration_s,
        file_size,
        date_added,
        release_date,
        mix_name,
        analyze_path,
        analyze_date,
        comment,
        title,
        file_name,
        file_path,
    })
}
