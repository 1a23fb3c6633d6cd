// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Emitter for Traktor NML playlists.
//!
//! Written with `quick_xml::Writer`'s event API rather than `serde` derive: the format needs
//! exact tab indentation, explicit closing tags on empty elements, and attributes that are
//! present or absent depending on the track's data, none of which a derived `Serialize` can
//! guarantee without its own hand-written `Serialize` impl anyway.

use crate::anlz::CueShape;
use crate::error::Result;
use crate::model::{Library, Track};
use chrono::{DateTime, Datelike, Timelike, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use std::io::Cursor;

/// Memory cues beyond this count are dropped (see [`crate::error::Diagnostic::TooManyMemoryCues`]).
const MAX_MEMORY_CUES: usize = 8;

/// How far forward of the real wall clock `MODIFIED_DATE`/`MODIFIED_TIME` are shifted, so that
/// symlinks created moments after NML emission never appear newer than the playlist itself.
const MODIFIED_TIME_SHIFT_YEARS: i32 = 10;

fn rekordbox_color_to_traktor(color_id: u8) -> Option<&'static str> {
    match color_id {
        1 => Some("7"), // pink
        2 => Some("1"), // red
        3 => Some("2"), // orange
        4 => Some("3"), // yellow
        5 => Some("4"), // green
        6 => Some("5"), // aqua -> falls back to Traktor's blue slot
        7 => Some("5"), // blue
        8 => Some("6"), // purple
        _ => None,
    }
}

fn format_traktor_date(date: &str) -> String {
    // Source dates are `YYYY-MM-DD`; Traktor wants `Y/M/D` with no zero-padding.
    let mut parts = date.splitn(3, '-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(y), Some(m), Some(d)) if !y.is_empty() => {
            let month: u32 = m.parse().unwrap_or(0);
            let day: u32 = d.parse().unwrap_or(0);
            format!("{y}/{month}/{day}")
        }
        _ => String::new(),
    }
}

/// Emits the NML document for one non-folder playlist's entries.
///
/// `now` is passed in explicitly (rather than read from the system clock) so tests can assert
/// on exact `MODIFIED_DATE`/`MODIFIED_TIME` output.
pub fn emit_playlist(
    library: &Library,
    playlist_id: u32,
    usb_volume: &str,
    now: DateTime<Utc>,
    diagnostics: &mut Vec<crate::error::Diagnostic>,
) -> Result<Vec<u8>> {
    let entries = library.entries_of(playlist_id);
    let playlist = &library.playlists[&playlist_id];
    let shifted = now
        .with_year(now.year() + MODIFIED_TIME_SHIFT_YEARS)
        .unwrap_or(now);
    let modified_date = format!("{}/{}/{}", shifted.year(), shifted.month(), shifted.day());
    let modified_time = (shifted.hour() * 3600 + shifted.minute() * 60 + shifted.second()).to_string();

    let buf = Vec::new();
    let mut writer = Writer::new_with_indent(Cursor::new(buf), b'\t', 1);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    write_start(&mut writer, "NML", &[("VERSION", "20")])?;

    write_empty(
        &mut writer,
        "HEAD",
        &[
            ("COMPANY", "www.native-instruments.com"),
            ("PROGRAM", "Traktor Pro 4"),
        ],
    )?;

    write_start(&mut writer, "COLLECTION", &[("ENTRIES", &entries.len().to_string())])?;
    for entry in &entries {
        let Some(track) = library.tracks.get(&entry.track_id) else {
            diagnostics.push(crate::error::Diagnostic::DanglingForeignKey {
                playlist_id,
                track_id: entry.track_id,
            });
            continue;
        };
        write_entry(
            &mut writer,
            library,
            track,
            usb_volume,
            &modified_date,
            &modified_time,
            diagnostics,
        )?;
    }
    write_end(&mut writer, "COLLECTION")?;

    write_empty(&mut writer, "SETS", &[("ENTRIES", "0")])?;

    write_start(&mut writer, "PLAYLISTS", &[])?;
    write_start(
        &mut writer,
        "NODE",
        &[("TYPE", "FOLDER"), ("NAME", "$ROOT")],
    )?;
    write_start(&mut writer, "SUBNODES", &[("COUNT", "1")])?;
    write_start(&mut writer, "NODE", &[("TYPE", "PLAYLIST"), ("NAME", &playlist.name)])?;

    let uuid = playlist_uuid(playlist_id);
    write_start(
        &mut writer,
        "PLAYLIST",
        &[
            ("ENTRIES", &entries.len().to_string()),
            ("TYPE", "LIST"),
            ("UUID", &uuid),
        ],
    )?;
    for entry in &entries {
        let Some(track) = library.tracks.get(&entry.track_id) else {
            continue;
        };
        write_start(&mut writer, "ENTRY", &[])?;
        let key = format!("{usb_volume}/:TRAKTOR/:{}", track.file_name);
        write_empty(&mut writer, "PRIMARYKEY", &[("TYPE", "TRACK"), ("KEY", &key)])?;
        write_end(&mut writer, "ENTRY")?;
    }
    write_end(&mut writer, "PLAYLIST")?;
    write_end(&mut writer, "NODE")?;
    write_end(&mut writer, "SUBNODES")?;
    write_end(&mut writer, "NODE")?;
    write_end(&mut writer, "PLAYLISTS")?;

    write_empty(&mut writer, "INDEXING", &[])?;
    write_end(&mut writer, "NML")?;

    Ok(writer.into_inner().into_inner())
}

fn write_entry(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    library: &Library,
    track: &Track,
    usb_volume: &str,
    modified_date: &str,
    modified_time: &str,
    diagnostics: &mut Vec<crate::error::Diagnostic>,
) -> Result<()> {
    write_start(
        writer,
        "ENTRY",
        &[
            ("MODIFIED_DATE", modified_date),
            ("MODIFIED_TIME", modified_time),
            ("TITLE", &track.title),
            ("ARTIST", library.artist_name(track.artist_id)),
        ],
    )?;

    write_empty(
        writer,
        "LOCATION",
        &[
            ("DIR", "/:TRAKTOR/:"),
            ("FILE", &track.file_name),
            ("VOLUME", usb_volume),
            ("VOLUMEID", usb_volume),
        ],
    )?;

    write_empty(
        writer,
        "ALBUM",
        &[
            ("TRACK", &track.track_number.to_string()),
            ("TITLE", library.album_name(track.album_id)),
        ],
    )?;

    write_info(writer, library, track)?;

    write_empty(writer, "TEMPO", &[("BPM", &format!("{:.6}", track.tempo)), ("BPM_QUALITY", "100.000000")])?;

    write_autogrid_cue(writer, track)?;
    write_memory_cues(writer, track, diagnostics)?;

    write_end(writer, "ENTRY")
}

fn write_info(writer: &mut Writer<Cursor<Vec<u8>>>, library: &Library, track: &Track) -> Result<()> {
    let mut attrs: Vec<(&str, String)> = vec![
        ("GENRE", library.genre_name(track.genre_id).to_string()),
        ("COMMENT", track.comment.clone()),
        ("PLAYCOUNT", track.play_count.to_string()),
        ("LABEL", library.label_name(track.label_id).to_string()),
        ("KEY", library.key_name(track.key_id).to_string()),
        ("PLAYTIME", track.duration_s.to_string()),
        ("PLAYTIME_FLOAT", format!("{:.6}", track.duration_s as f64)),
        ("IMPORT_DATE", format_traktor_date(&track.date_added)),
        ("RELEASE_DATE", format_traktor_date(&track.release_date)),
    ];
    if track.color_id != 0 {
        if let Some(color) = rekordbox_color_to_traktor(track.color_id) {
            attrs.push(("COLOR", color.to_string()));
        }
    }
    if track.file_size != 0 {
        attrs.push(("FILESIZE", (track.file_size / 1024).to_string()));
    }
    if track.bitrate != 0 {
        attrs.push(("BITRATE", (track.bitrate * 1000).to_string()));
    }
    if track.rating != 0 {
        attrs.push(("RANKING", (track.rating as u32 * 51).to_string()));
    }

    let refs: Vec<(&str, &str)> = attrs.iter().map(|(k, v)| (*k, v.as_str())).collect();
    write_empty(writer, "INFO", &refs)
}

fn write_autogrid_cue(writer: &mut Writer<Cursor<Vec<u8>>>, track: &Track) -> Result<()> {
    let Some(first_beat) = track.analysis.beats.iter().find(|b| b.num == 1) else {
        return Ok(());
    };
    write_start(
        writer,
        "CUE_V2",
        &[
            ("NAME", "AutoGrid"),
            ("DISPL_ORDER", "0"),
            ("TYPE", "4"),
            ("START", &format!("{:.6}", first_beat.time_ms as f64)),
            ("LEN", "0.000000"),
            ("REPEATS", "-1"),
            ("HOTCUE", "-1"),
        ],
    )?;
    write_empty(writer, "GRID", &[("BPM", &format!("{:.6}", track.tempo))])?;
    write_end(writer, "CUE_V2")
}

fn write_memory_cues(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    track: &Track,
    diagnostics: &mut Vec<crate::error::Diagnostic>,
) -> Result<()> {
    let mut memory_cues: Vec<_> = track.analysis.cues.iter().filter(|c| !c.is_hot).collect();
    memory_cues.sort_by_key(|c| c.time_ms);

    if track.analysis.beats.iter().find(|b| b.num == 1).is_none() {
        diagnostics.push(crate::error::Diagnostic::MissingAutoGrid {
            track_id: track.track_id,
        });
    }

    if memory_cues.len() > MAX_MEMORY_CUES {
        diagnostics.push(crate::error::Diagnostic::TooManyMemoryCues {
            track_id: track.track_id,
            found: memory_cues.len(),
            kept: MAX_MEMORY_CUES,
        });
    }

    for (index, cue) in memory_cues.iter().take(MAX_MEMORY_CUES).enumerate() {
        let name = if cue.comment.is_empty() {
            "n.n.".to_string()
        } else {
            cue.comment.clone()
        };
        let is_loop = cue.shape == CueShape::Loop;
        let len = if is_loop {
            (cue.loop_end_ms - cue.time_ms) as f64
        } else {
            0.0
        };
        write_empty(
            writer,
            "CUE_V2",
            &[
                ("NAME", &name),
                ("DISPL_ORDER", "0"),
                ("TYPE", if is_loop { "5" } else { "0" }),
                ("START", &format!("{:.6}", cue.time_ms as f64)),
                ("LEN", &format!("{:.6}", len)),
                ("REPEATS", "-1"),
                ("HOTCUE", &index.to_string()),
            ],
        )?;
    }
    Ok(())
}

/// Derives a stable-looking 32-char hex UUID from the playlist id. Traktor only requires the
/// value to be unique within the collection, not globally, so this avoids a random-UUID
/// dependency for a value with no cross-run meaning.
fn playlist_uuid(playlist_id: u32) -> String {
    format!("{playlist_id:032x}")
}

fn write_start(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    attrs: &[(&str, &str)],
) -> Result<()> {
    let mut start = BytesStart::new(name);
    start.extend_attributes(attrs.iter().copied());
    writer.write_event(Event::Start(start))?;
    Ok(())
}

fn write_end(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str) -> Result<()> {
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_empty(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    attrs: &[(&str, &str)],
) -> Result<()> {
    write_start(writer, name, attrs)?;
    write_end(writer, name)
}
