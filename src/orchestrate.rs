// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Drives the batch pipeline: decode the PDB, attach each track's analysis, lay out symlinks,
//! and emit one NML per non-folder playlist.

use crate::anlz::Analysis;
use crate::error::{Diagnostic, Result};
use crate::fs::Filesystem;
use crate::model::{Album, Artist, Library, Named, Playlist, PlaylistEntry, Track};
use crate::nml;
use crate::pdb::{row, Header, PageType};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Name of the flat output directory Traktor reads its library from.
const TRAKTOR_DIR: &str = "TRAKTOR";

/// Decodes `export.pdb` into a [`Library`], without touching the analysis files or filesystem.
pub fn decode_library(pdb_bytes: &[u8]) -> Result<Library> {
    let header = Header::parse(pdb_bytes)?;
    let mut library = Library::new();

    for table in &header.tables {
        let rows = header.read_table_rows(pdb_bytes, table)?;
        match table.page_type {
            PageType::Artists => {
                for row_bytes in rows {
                    let r = row::decode_artist(row_bytes)?;
                    library.artists.insert(r.artist_id, Artist { name: r.name });
                }
            }
            PageType::Albums => {
                for row_bytes in rows {
                    let r = row::decode_album(row_bytes)?;
                    library.albums.insert(
                        r.album_id,
                        Album {
                            name: r.name,
                            artist_id: r.artist_id,
                        },
                    );
                }
            }
            PageType::Genres => {
                for row_bytes in rows {
                    let r = row::decode_genre(row_bytes)?;
                    library.genres.insert(r.id, Named { name: r.name });
                }
            }
            PageType::Labels => {
                for row_bytes in rows {
                    let r = row::decode_label(row_bytes)?;
                    library.labels.insert(r.id, Named { name: r.name });
                }
            }
            PageType::Keys => {
                for row_bytes in rows {
                    let r = row::decode_key(row_bytes)?;
                    library.keys.insert(r.id, Named { name: r.name });
                }
            }
            PageType::Artwork => {
                for row_bytes in rows {
                    let r = row::decode_artwork(row_bytes)?;
                    library.artwork.insert(r.id, Named { name: r.name });
                }
            }
            PageType::PlaylistTree => {
                for row_bytes in rows {
                    let r = row::decode_playlist_tree_node(row_bytes)?;
                    library.playlists.insert(
                        r.playlist_id,
                        Playlist {
                            playlist_id: r.playlist_id,
                            name: r.name,
                            parent_id: r.parent_id,
                            sort_order: r.sort_order,
                            is_folder: r.is_folder,
                        },
                    );
                }
            }
            PageType::PlaylistEntries => {
                for row_bytes in rows {
                    let r = row::decode_playlist_entry(row_bytes)?;
                    library.playlist_entries.push(PlaylistEntry {
                        playlist_id: r.playlist_id,
                        entry_index: r.entry_index,
                        track_id: r.track_id,
                    });
                }
            }
            PageType::Tracks => {
                for row_bytes in rows {
                    let r = row::decode_track(row_bytes)?;
                    library.tracks.insert(
                        r.track_id,
                        Track {
                            track_id: r.track_id,
                            title: r.title,
                            file_name: r.file_name,
                            file_path: r.file_path,
                            duration_s: r.duration_s,
                            tempo: r.tempo_x100 as f64 / 100.0,
                            bitrate: r.bitrate,
                            file_size: r.file_size,
                            track_number: r.track_number,
                            disc_number: r.disc_number,
                            year: r.year,
                            play_count: r.play_count,
                            rating: r.rating,
                            sample_rate: r.sample_rate,
                            sample_depth: r.sample_depth,
                            color_id: r.color_id,
                            date_added: r.date_added,
                            release_date: r.release_date,
                            comment: r.comment,
                            analyze_path: r.analyze_path,
                            artist_id: r.artist_id,
                            album_id: r.album_id,
                            genre_id: r.genre_id,
                            label_id: r.label_id,
                            key_id: r.key_id,
                            artwork_id: r.artwork_id,
                            orig_artist_id: r.orig_artist_id,
                            remixer_id: r.remixer_id,
                            composer_id: r.composer_id,
                            analysis: Analysis::default(),
                        },
                    );
                }
            }
            _ => {}
        }
    }

    Ok(library)
}

/// Swaps a sibling analysis path's extension, e.g. `ANLZ0000.DAT` -> `ANLZ0000.EXT`.
fn sibling_with_extension(path: &str, extension: &str) -> PathBuf {
    let mut pb = PathBuf::from(path.trim_start_matches('/'));
    pb.set_extension(extension);
    pb
}

/// Reads and attaches each track's `.DAT`/`.EXT` analysis, relative to `usb_path`.
fn attach_analysis(fs: &dyn Filesystem, usb_path: &Path, library: &mut Library) -> Result<()> {
    for track in library.tracks.values_mut() {
        if track.analyze_path.is_empty() {
            continue;
        }
        let mut analysis = Analysis::default();
        for extension in ["DAT", "EXT"] {
            let sibling = usb_path.join(sibling_with_extension(&track.analyze_path, extension));
            if let Ok(bytes) = fs.read(&sibling) {
                analysis.parse_into(&bytes)?;
            }
        }
        track.analysis = analysis;
    }
    Ok(())
}

/// Creates one symlink per track under `usb_path/TRAKTOR`, renaming on filename collisions by
/// prefixing `"{n}-"` starting at `n = 2`. Returns the final, possibly-renamed file name per
/// track id so the emitter can use the same name the symlink was created under.
fn lay_out_symlinks(
    fs: &mut dyn Filesystem,
    usb_path: &Path,
    library: &mut Library,
) -> Result<()> {
    let traktor_dir = usb_path.join(TRAKTOR_DIR);
    fs.recreate_dir(&traktor_dir)?;

    for track in library.tracks.values_mut() {
        let mut candidate = track.file_name.clone();
        let mut counter = 2;
        while fs.is_symlink(&traktor_dir.join(&candidate)) {
            candidate = format!("{counter}-{}", track.file_name);
            counter += 1;
        }
        let link = traktor_dir.join(&candidate);
        let target = PathBuf::from(format!("../{}", track.file_path));
        fs.symlink(&link, &target)?;
        track.file_name = candidate;
    }
    Ok(())
}

/// Runs the full pipeline against `usb_path`, returning every non-fatal diagnostic observed.
pub fn run(
    fs: &mut dyn Filesystem,
    usb_path: &Path,
    now: DateTime<Utc>,
) -> Result<Vec<Diagnostic>> {
    let pdb_path = usb_path.join("PIONEER").join("rekordbox").join("export.pdb");
    let pdb_bytes = fs.read(&pdb_path)?;

    let mut library = decode_library(&pdb_bytes)?;
    attach_analysis(fs, usb_path, &mut library)?;
    lay_out_symlinks(fs, usb_path, &mut library)?;

    let usb_volume = usb_path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut diagnostics = Vec::new();
    let traktor_dir = usb_path.join(TRAKTOR_DIR);
    let playlist_ids: Vec<u32> = library
        .playlists
        .values()
        .filter(|p| !p.is_folder)
        .map(|p| p.playlist_id)
        .collect();

    for playlist_id in playlist_ids {
        let Some(file_stem) = library.qualified_playlist_name(playlist_id) else {
            continue;
        };
        let xml = nml::emit_playlist(&library, playlist_id, &usb_volume, now, &mut diagnostics)?;
        let nml_path = traktor_dir.join(format!("{file_stem}.nml"));
        fs.write(&nml_path, &xml)?;
    }

    Ok(diagnostics)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fs::MemFilesystem;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn le(n: u32) -> [u8; 4] {
        n.to_le_bytes()
    }

    fn short_ascii(s: &str) -> Vec<u8> {
        let len = s.len() + 1;
        let mut out = vec![((len as u8) << 1) | 0x01];
        out.extend_from_slice(s.as_bytes());
        out
    }

    /// Builds a minimal one-page-per-table `export.pdb` with one track, one root playlist and
    /// one entry linking them, matching the byte layout `pdb::Header`/`row` expect.
    fn build_minimal_pdb() -> Vec<u8> {
        const PAGE_SIZE: usize = 2048;

        let table_defs = [
            (0u32, 1u32), // Tracks -> page 1
            (7u32, 2u32), // PlaylistTree -> page 2
            (8u32, 3u32), // PlaylistEntries -> page 3
        ];

        let mut data = vec![0u8; 28 + table_defs.len() * 16];
        data[4..8].copy_from_slice(&(PAGE_SIZE as u32).to_le_bytes());
        data[8..12].copy_from_slice(&(table_defs.len() as u32).to_le_bytes());
        for (i, (page_type, page_index)) in table_defs.iter().enumerate() {
            let base = 28 + i * 16;
            data[base..base + 4].copy_from_slice(&le(*page_type));
            data[base + 8..base + 12].copy_from_slice(&le(*page_index));
            data[base + 12..base + 16].copy_from_slice(&le(*page_index));
        }

        data.resize(PAGE_SIZE, 0); // page 0 unused, matches real export.pdb's empty first page

        // Track row.
        let mut track_row = vec![0u8; 94 + 21 * 2];
        track_row[72..76].copy_from_slice(&le(1)); // track_id
        track_row[56..60].copy_from_slice(&le(12800)); // tempo_x100
        track_row[84..86].copy_from_slice(&245u16.to_le_bytes()); // duration_s
        let title_off = track_row.len() as u16;
        track_row.extend(short_ascii("Strobe"));
        let file_name_off = track_row.len() as u16;
        track_row.extend(short_ascii("strobe.mp3"));
        let file_path_off = track_row.len() as u16;
        track_row.extend(short_ascii("Contents/strobe.mp3"));
        track_row[94 + (17 - 1) * 2..94 + (17 - 1) * 2 + 2].copy_from_slice(&title_off.to_le_bytes());
        track_row[94 + (19 - 1) * 2..94 + (19 - 1) * 2 + 2]
            .copy_from_slice(&file_name_off.to_le_bytes());
        track_row[94 + (20 - 1) * 2..94 + (20 - 1) * 2 + 2]
            .copy_from_slice(&file_path_off.to_le_bytes());
        append_page(&mut data, PAGE_SIZE, 1, 0, &[track_row]);

        // Playlist tree: one non-folder playlist "P" at root.
        let mut playlist_row = vec![0u8; 20];
        playlist_row[12..16].copy_from_slice(&le(1)); // playlist_id
        playlist_row.extend(short_ascii("P"));
        append_page(&mut data, PAGE_SIZE, 2, 7, &[playlist_row]);

        // Playlist entries: track 1 at index 0 of playlist 1.
        let mut entry_row = vec![0u8; 12];
        entry_row[0..4].copy_from_slice(&le(0)); // entry_index
        entry_row[4..8].copy_from_slice(&le(1)); // track_id
        entry_row[8..12].copy_from_slice(&le(1)); // playlist_id
        append_page(&mut data, PAGE_SIZE, 3, 8, &[entry_row]);

        data
    }

    /// Appends a fully-formed data page at `page_index` holding `rows`, padding `data` up to
    /// that page's start first.
    fn append_page(data: &mut Vec<u8>, page_size: usize, page_index: u32, page_type: u32, rows: &[Vec<u8>]) {
        data.resize(page_index as usize * page_size, 0);
        let mut page = vec![0u8; page_size];
        page[4..8].copy_from_slice(&le(page_index));
        page[8..12].copy_from_slice(&le(page_type));
        page[12..16].copy_from_slice(&le(page_index)); // next_page == self == last_page
        page[24] = rows.len() as u8;
        page[27] = 0x40; // DATA flag

        const HEADER_SIZE: usize = 40;
        const GROUP_SIZE: usize = 36;
        let mut cursor = HEADER_SIZE;
        let mut offsets = Vec::new();
        for row in rows {
            offsets.push((cursor - HEADER_SIZE) as u16);
            page[cursor..cursor + row.len()].copy_from_slice(row);
            cursor += row.len();
        }

        let mut presence_mask: u16 = 0;
        for i in 0..rows.len() {
            presence_mask |= 1 << i;
        }
        let group_start = page_size - GROUP_SIZE;
        let mut words = [0u16; 18];
        words[1] = presence_mask;
        for (i, offset) in offsets.iter().enumerate() {
            words[2 + i] = *offset;
        }
        for (i, word) in words.iter().enumerate() {
            page[group_start + i * 2..group_start + i * 2 + 2].copy_from_slice(&word.to_le_bytes());
        }

        data.extend(page);
    }

    #[test]
    fn test_decode_library_minimal() {
        let pdb = build_minimal_pdb();
        let library = decode_library(&pdb).unwrap();
        assert_eq!(library.tracks.len(), 1);
        assert_eq!(library.tracks[&1].title, "Strobe");
        assert_eq!(library.playlists.len(), 1);
        assert_eq!(library.playlist_entries.len(), 1);
    }

    #[test]
    fn test_run_end_to_end_emits_one_nml() {
        let pdb = build_minimal_pdb();
        let mut fs = MemFilesystem::default();
        let usb_path = PathBuf::from("/Volumes/USB1");
        fs.files.insert(
            usb_path.join("PIONEER").join("rekordbox").join("export.pdb"),
            pdb,
        );

        let now = Utc.with_ymd_and_hms(2026, 7, 30, 12, 0, 0).unwrap();
        let diagnostics = run(&mut fs, &usb_path, now).unwrap();
        assert!(diagnostics.is_empty());

        let nml_path = usb_path.join("TRAKTOR").join("P.nml");
        let xml = String::from_utf8(fs.files.get(&nml_path).unwrap().clone()).unwrap();
        assert!(xml.contains(r#"FILE="strobe.mp3""#));
        assert!(xml.contains(r#"VOLUME="USB1""#));

        assert!(fs.symlinks.contains_key(&usb_path.join("TRAKTOR").join("strobe.mp3")));
    }

    #[test]
    fn test_symlink_collision_renames_and_nml_matches() {
        let mut library = Library::new();
        library.tracks.insert(
            1,
            crate::model::Track {
                track_id: 1,
                title: "A".into(),
                file_name: "kick.wav".into(),
                file_path: "Contents/a/kick.wav".into(),
                duration_s: 1,
                tempo: 120.0,
                bitrate: 0,
                file_size: 0,
                track_number: 0,
                disc_number: 0,
                year: 0,
                play_count: 0,
                rating: 0,
                sample_rate: 0,
                sample_depth: 0,
                color_id: 0,
                date_added: String::new(),
                release_date: String::new(),
                comment: String::new(),
                analyze_path: String::new(),
                artist_id: 0,
                album_id: 0,
                genre_id: 0,
                label_id: 0,
                key_id: 0,
                artwork_id: 0,
                orig_artist_id: 0,
                remixer_id: 0,
                composer_id: 0,
                analysis: Analysis::default(),
            },
        );
        library.tracks.insert(
            2,
            crate::model::Track {
                track_id: 2,
                title: "B".into(),
                file_name: "kick.wav".into(),
                file_path: "Contents/b/kick.wav".into(),
                duration_s: 1,
                tempo: 120.0,
                bitrate: 0,
                file_size: 0,
                track_number: 0,
                disc_number: 0,
                year: 0,
                play_count: 0,
                rating: 0,
                sample_rate: 0,
                sample_depth: 0,
                color_id: 0,
                date_added: String::new(),
                release_date: String::new(),
                comment: String::new(),
                analyze_path: String::new(),
                artist_id: 0,
                album_id: 0,
                genre_id: 0,
                label_id: 0,
                key_id: 0,
                artwork_id: 0,
                orig_artist_id: 0,
                remixer_id: 0,
                composer_id: 0,
                analysis: Analysis::default(),
            },
        );

        let mut fs = MemFilesystem::default();
        let usb_path = PathBuf::from("/Volumes/USB1");
        lay_out_symlinks(&mut fs, &usb_path, &mut library).unwrap();

        assert_eq!(library.tracks[&1].file_name, "kick.wav");
        assert_eq!(library.tracks[&2].file_name, "2-kick.wav");
    }
}
