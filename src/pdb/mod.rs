// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Parser for Pioneer DeviceSQL database exports (`export.pdb`).
//!
//! The file is a paged binary database: a fixed header names one table per row kind, and each
//! table is a singly-linked list of fixed-size pages. Row offsets live in a backwards-growing
//! slot table at the end of each page, guarded by a presence bitmask, because rows themselves
//! are variable-length and get appended from the front of the page body.
//!
//! Most of the file format has been reverse-engineered by Henry Betts, Fabian Lesniak and James
//! Elliott.
//!
//! - <https://github.com/Deep-Symmetry/crate-digger/blob/master/doc/Analysis.pdf>
//! - <https://djl-analysis.deepsymmetry.org/rekordbox-export-analysis/exports.html>

pub mod row;
pub mod string;

use crate::error::{Error, Result};

/// Byte size of the fixed PDB file header.
const HEADER_SIZE: u32 = 28;
/// Byte size of a fixed page header.
const PAGE_HEADER_SIZE: u32 = 40;
/// Rows per slot group at the end of a page.
const ROWS_PER_GROUP: u16 = 16;
/// Byte size of one slot group (16 row offsets + presence mask + padding, as `u16` words).
const GROUP_SIZE: u32 = 36;
/// Marks `num_rows_large` as not meaningful.
const ROW_COUNT_SENTINEL: u16 = 0x1fff;
/// Bit of the page-flags byte that marks a page as holding row data (vs. being a free page).
const PAGE_FLAG_DATA: u8 = 0x40;

/// Identifies the kind of rows held by a table and its pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageType {
    Tracks,
    Genres,
    Artists,
    Albums,
    Labels,
    Keys,
    Colors,
    PlaylistTree,
    PlaylistEntries,
    HistoryPlaylists,
    HistoryEntries,
    Artwork,
    Columns,
    History,
    /// Any table type not interpreted by this crate; its pages are walked but rows skipped.
    Unknown(u32),
}

impl From<u32> for PageType {
    fn from(value: u32) -> Self {
        match value {
            0 => PageType::Tracks,
            1 => PageType::Genres,
            2 => PageType::Artists,
            3 => PageType::Albums,
            4 => PageType::Labels,
            5 => PageType::Keys,
            6 => PageType::Colors,
            7 => PageType::PlaylistTree,
            8 => PageType::PlaylistEntries,
            11 => PageType::HistoryPlaylists,
            12 => PageType::HistoryEntries,
            13 => PageType::Artwork,
            16 => PageType::Columns,
            19 => PageType::History,
            other => PageType::Unknown(other),
        }
    }
}

/// One entry of the table-pointer array following the file header.
#[derive(Debug, Clone, Copy)]
pub struct Table {
    pub page_type: PageType,
    pub first_page: u32,
    pub last_page: u32,
}

/// The parsed file header: page size and the list of per-type tables.
#[derive(Debug, Clone)]
pub struct Header {
    pub page_size: u32,
    pub tables: Vec<Table>,
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(Error::TruncatedInput {
            context: "pdb u32 field",
        })
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(Error::TruncatedInput {
            context: "pdb u16 field",
        })
}

fn read_u8(data: &[u8], offset: usize) -> Result<u8> {
    data.get(offset).copied().ok_or(Error::TruncatedInput {
        context: "pdb u8 field",
    })
}

impl Header {
    /// Parses the file header (envelope plus table-pointer array) from the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let zeros1 = read_u32(data, 0)?;
        if zeros1 != 0 {
            return Err(Error::BadZeroField {
                context: "pdb header",
                field: "zeros1",
                value: zeros1 as u64,
            });
        }
        let page_size = read_u32(data, 4)?;
        let num_tables = read_u32(data, 8)?;
        // offset 12: next_unused_page, offset 16: unknown, offset 20: sequence — read-through,
        // not semantically used by this crate.
        let gap = read_u32(data, 24)?;
        if gap != 0 {
            return Err(Error::BadZeroField {
                context: "pdb header",
                field: "gap",
                value: gap as u64,
            });
        }

        let mut tables = Vec::with_capacity(num_tables as usize);
        for i in 0..num_tables {
            let base = HEADER_SIZE as usize + (i as usize) * 16;
            let page_type = PageType::from(read_u32(data, base)?);
            // offset +4: empty_candidate, read-through only.
            let first_page = read_u32(data, base + 8)?;
            let last_page = read_u32(data, base + 12)?;
            tables.push(Table {
                page_type,
                first_page,
                last_page,
            });
        }

        Ok(Self { page_size, tables })
    }

    /// Walks the linked list of pages belonging to `table`, yielding each page's present rows
    /// as raw `(row_offset_in_page, row_bytes)` slices for [`row::decode`] to interpret.
    pub fn read_table_rows<'a>(
        &self,
        data: &'a [u8],
        table: &Table,
    ) -> Result<Vec<&'a [u8]>> {
        let mut rows = Vec::new();
        let mut page_index = table.first_page;
        loop {
            let page_start = page_index as usize * self.page_size as usize;
            let page_bytes = data
                .get(page_start..page_start + self.page_size as usize)
                .ok_or(Error::TruncatedInput {
                    context: "pdb page",
                })?;
            let page = Page::parse(page_bytes, page_index, table.page_type)?;
            page.collect_present_rows(page_bytes, &mut rows);

            if page_index == table.last_page {
                break;
            }
            page_index = page.next_page;
        }
        Ok(rows)
    }
}

/// A parsed page header. Row bytes and the row slot table live in the same page buffer and are
/// addressed separately via [`Page::collect_present_rows`].
struct Page {
    page_index: u32,
    next_page: u32,
    num_rows_small: u8,
    num_rows_large: u16,
    page_flags: u8,
}

impl Page {
    fn parse(page_bytes: &[u8], expected_index: u32, expected_type: PageType) -> Result<Self> {
        let magic = read_u32(page_bytes, 0)?;
        if magic != 0 {
            return Err(Error::PageSelfCheckFailed {
                index: expected_index,
                reason: "leading page word was not zero".into(),
            });
        }
        let page_index = read_u32(page_bytes, 4)?;
        if page_index != expected_index {
            return Err(Error::PageSelfCheckFailed {
                index: expected_index,
                reason: format!("redundant page index {page_index} disagrees with position"),
            });
        }
        let page_type = PageType::from(read_u32(page_bytes, 8)?);
        if std::mem::discriminant(&page_type) != std::mem::discriminant(&expected_type) {
            return Err(Error::PageSelfCheckFailed {
                index: expected_index,
                reason: format!("page type {page_type:?} disagrees with table type {expected_type:?}"),
            });
        }
        let next_page = read_u32(page_bytes, 12)?;
        let num_rows_small = read_u8(page_bytes, 24)?;
        let page_flags = read_u8(page_bytes, 27)?;
        let num_rows_large = read_u16(page_bytes, 34)?;

        Ok(Self {
            page_index,
            next_page,
            num_rows_small,
            num_rows_large,
            page_flags,
        })
    }

    /// Effective row count, resolving the small/large counter ambiguity.
    fn num_rows(&self) -> u16 {
        if self.num_rows_large > self.num_rows_small as u16 && self.num_rows_large != ROW_COUNT_SENTINEL {
            self.num_rows_large
        } else {
            self.num_rows_small as u16
        }
    }

    fn num_row_groups(&self) -> u16 {
        let num_rows = self.num_rows();
        if num_rows > 0 {
            (num_rows - 1) / ROWS_PER_GROUP + 1
        } else {
            0
        }
    }

    fn is_data_page(&self) -> bool {
        self.page_flags & PAGE_FLAG_DATA != 0
    }

    /// Appends every present row's bytes (the row body, from its offset to the next row or the
    /// row-slot table, whichever comes first) onto `out`.
    fn collect_present_rows<'a>(&self, page_bytes: &'a [u8], out: &mut Vec<&'a [u8]>) {
        if !self.is_data_page() {
            return;
        }
        let num_row_groups = self.num_row_groups();
        if num_row_groups == 0 {
            return;
        }
        let page_size = page_bytes.len() as u32;
        let mut row_offsets = Vec::new();

        for g in 0..num_row_groups {
            let group_start = page_size as usize - ((g as usize) + 1) * GROUP_SIZE as usize;
            let Some(group_bytes) = page_bytes.get(group_start..group_start + GROUP_SIZE as usize)
            else {
                continue;
            };
            // 18 little-endian u16 words; word 0 is unused padding, word 1 is the presence
            // mask, words 2..17 are the 16 row offsets, all read back-to-front.
            let mut words = [0u16; 18];
            for (i, word) in words.iter_mut().enumerate() {
                *word = u16::from_le_bytes([group_bytes[i * 2], group_bytes[i * 2 + 1]]);
            }
            let presence_mask = words[1];
            let offsets = &words[2..18];

            for (i, &offset) in offsets.iter().enumerate() {
                if presence_mask & (1 << i) != 0 {
                    row_offsets.push(offset);
                }
            }
        }

        // Rows were appended group-by-group in slot order; the on-disk convention numbers
        // slots starting from the highest-indexed group, so present_rows in a page come out
        // in the same order rows were written (ascending row_offset) once reversed.
        row_offsets.reverse();

        for offset in row_offsets {
            let row_start = PAGE_HEADER_SIZE as usize + offset as usize;
            if let Some(row_bytes) = page_bytes.get(row_start..) {
                out.push(row_bytes);
            }
        }
    }
}
