// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! The normalized in-memory library built from the decoded PDB and ANLZ data.
//!
//! Every id-keyed map is seeded with an empty-string record at key `0`, so callers never have
//! to branch on whether a foreign key is actually set: an unset `artist_id` simply looks up an
//! artist named `""`.

use crate::anlz::Analysis;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct Artist {
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct Album {
    pub name: String,
    pub artist_id: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Named {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Track {
    pub track_id: u32,
    pub title: String,
    pub file_name: String,
    pub file_path: String,
    pub duration_s: u16,
    pub tempo: f64,
    pub bitrate: u32,
    pub file_size: u32,
    pub track_number: u32,
    pub disc_number: u16,
    pub year: u16,
    pub play_count: u16,
    pub rating: u16,
    pub sample_rate: u32,
    pub sample_depth: u16,
    pub color_id: u8,
    pub date_added: String,
    pub release_date: String,
    pub comment: String,
    pub analyze_path: String,
    pub artist_id: u32,
    pub album_id: u32,
    pub genre_id: u32,
    pub label_id: u32,
    pub key_id: u32,
    pub artwork_id: u32,
    pub orig_artist_id: u32,
    pub remixer_id: u32,
    pub composer_id: u32,
    pub analysis: Analysis,
}

#[derive(Debug, Clone)]
pub struct Playlist {
    pub playlist_id: u32,
    pub name: String,
    pub parent_id: u32,
    pub sort_order: u32,
    pub is_folder: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PlaylistEntry {
    pub playlist_id: u32,
    pub entry_index: u32,
    pub track_id: u32,
}

/// The fully decoded, normalized library.
#[derive(Debug, Clone, Default)]
pub struct Library {
    pub tracks: BTreeMap<u32, Track>,
    pub artists: BTreeMap<u32, Artist>,
    pub albums: BTreeMap<u32, Album>,
    pub genres: BTreeMap<u32, Named>,
    pub labels: BTreeMap<u32, Named>,
    pub keys: BTreeMap<u32, Named>,
    pub artwork: BTreeMap<u32, Named>,
    pub playlists: BTreeMap<u32, Playlist>,
    pub playlist_entries: Vec<PlaylistEntry>,
}

impl Library {
    /// Builds an empty library, pre-seeded with the sentinel zero-id rows every reference
    /// table needs so lookups never have to special-case "unset".
    pub fn new() -> Self {
        let mut library = Self::default();
        library.artists.insert(0, Artist::default());
        library.albums.insert(0, Album::default());
        library.genres.insert(0, Named::default());
        library.labels.insert(0, Named::default());
        library.keys.insert(0, Named::default());
        library.artwork.insert(0, Named::default());
        library
    }

    pub fn artist_name(&self, id: u32) -> &str {
        self.artists.get(&id).map(|a| a.name.as_str()).unwrap_or("")
    }

    pub fn album_name(&self, id: u32) -> &str {
        self.albums.get(&id).map(|a| a.name.as_str()).unwrap_or("")
    }

    pub fn genre_name(&self, id: u32) -> &str {
        self.genres.get(&id).map(|n| n.name.as_str()).unwrap_or("")
    }

    pub fn label_name(&self, id: u32) -> &str {
        self.labels.get(&id).map(|n| n.name.as_str()).unwrap_or("")
    }

    pub fn key_name(&self, id: u32) -> &str {
        self.keys.get(&id).map(|n| n.name.as_str()).unwrap_or("")
    }

    /// Entries of `playlist_id`, in ascending `entry_index` order.
    pub fn entries_of(&self, playlist_id: u32) -> Vec<&PlaylistEntry> {
        let mut entries: Vec<&PlaylistEntry> = self
            .playlist_entries
            .iter()
            .filter(|e| e.playlist_id == playlist_id)
            .collect();
        entries.sort_by_key(|e| e.entry_index);
        entries
    }

    /// The chain of ancestor folder names for `playlist_id`, root-to-parent order, joined with
    /// the playlist's own name and `/` replaced by `_`, ready to use as a file stem.
    pub fn qualified_playlist_name(&self, playlist_id: u32) -> Option<String> {
        let playlist = self.playlists.get(&playlist_id)?;
        let mut ancestors = Vec::new();
        let mut parent_id = playlist.parent_id;
        while parent_id != 0 {
            let parent = self.playlists.get(&parent_id)?;
            ancestors.push(parent.name.clone());
            parent_id = parent.parent_id;
        }
        ancestors.reverse();
        ancestors.push(playlist.name.clone());
        Some(ancestors.join("_").replace('/', "_"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sentinel_rows_have_empty_names() {
        let library = Library::new();
        assert_eq!(library.artist_name(0), "");
        assert_eq!(library.album_name(0), "");
        assert_eq!(library.genre_name(12345), "");
    }

    #[test]
    fn test_qualified_playlist_name_nests_folders() {
        let mut library = Library::new();
        library.playlists.insert(
            10,
            Playlist {
                playlist_id: 10,
                name: "F1".into(),
                parent_id: 0,
                sort_order: 0,
                is_folder: true,
            },
        );
        library.playlists.insert(
            20,
            Playlist {
                playlist_id: 20,
                name: "F2".into(),
                parent_id: 10,
                sort_order: 0,
                is_folder: true,
            },
        );
        library.playlists.insert(
            30,
            Playlist {
                playlist_id: 30,
                name: "PL".into(),
                parent_id: 20,
                sort_order: 0,
                is_folder: false,
            },
        );
        assert_eq!(library.qualified_playlist_name(30).unwrap(), "F1_F2_PL");
    }

    #[test]
    fn test_qualified_playlist_name_escapes_slash() {
        let mut library = Library::new();
        library.playlists.insert(
            1,
            Playlist {
                playlist_id: 1,
                name: "Rock/Pop".into(),
                parent_id: 0,
                sort_order: 0,
                is_folder: false,
            },
        );
        assert_eq!(library.qualified_playlist_name(1).unwrap(), "Rock_Pop");
    }

    #[test]
    fn test_entries_of_sorts_by_index() {
        let mut library = Library::new();
        library.playlist_entries.push(PlaylistEntry {
            playlist_id: 1,
            entry_index: 2,
            track_id: 20,
        });
        library.playlist_entries.push(PlaylistEntry {
            playlist_id: 1,
            entry_index: 0,
            track_id: 10,
        });
        let entries = library.entries_of(1);
        assert_eq!(entries[0].track_id, 10);
        assert_eq!(entries[1].track_id, 20);
    }
}
