// viaseal – implementation of the DKIM and ARC specifications
// Copyright © 2022–2023 David Bürgin <dbuergin@gluet.ch>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

//! MIME boundary scanner.
//!
//! Locates the start of the multipart structure in a message body: the first
//! line consisting of exactly `--` plus the boundary, as declared in the
//! message's Content-Type header.

use crate::header::HeaderFields;
use bstr::ByteSlice;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ScanState {
    // matched this many bytes of the delimiter on the current line
    Matching(usize),
    // current line cannot match, wait for the next line
    Skipping,
    Found(usize),
}

/// A streaming scanner for the first boundary delimiter line.
#[derive(Clone, Debug)]
pub struct BoundaryScanner {
    delimiter: Option<Box<[u8]>>,
    state: ScanState,
    line_start: usize,
    offset: usize,
}

impl BoundaryScanner {
    /// Creates a scanner for the given boundary. Without a boundary the
    /// structure starts at the beginning of the body.
    pub fn new(boundary: Option<&str>) -> Self {
        let delimiter = boundary
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(|b| format!("--{b}").into_bytes().into_boxed_slice());

        Self {
            delimiter,
            state: ScanState::Matching(0),
            line_start: 0,
            offset: 0,
        }
    }

    /// Creates a scanner for the boundary of the last Content-Type header.
    pub fn from_headers(headers: &HeaderFields) -> Self {
        let boundary = headers
            .get("Content-Type")
            .next_back()
            .and_then(|field| find_boundary_param(field.body()));
        Self::new(boundary.as_deref())
    }

    pub fn update(&mut self, chunk: &[u8]) {
        let Some(delimiter) = &self.delimiter else {
            return;
        };

        for &b in chunk {
            let pos = self.offset;
            self.offset += 1;

            self.state = match self.state {
                ScanState::Found(_) => return,
                ScanState::Matching(n) if n == delimiter.len() && matches!(b, b'\r' | b'\n') => {
                    ScanState::Found(self.line_start)
                }
                ScanState::Matching(n) if n < delimiter.len() && delimiter[n] == b => {
                    if n == 0 {
                        self.line_start = pos;
                    }
                    ScanState::Matching(n + 1)
                }
                // empty lines and line breaks restart matching
                ScanState::Matching(_) | ScanState::Skipping if matches!(b, b'\r' | b'\n') => {
                    ScanState::Matching(0)
                }
                ScanState::Matching(_) | ScanState::Skipping => ScanState::Skipping,
            };
        }
    }

    /// Returns the offset of the first byte of the delimiter line, if found.
    pub fn finish(&self) -> Option<usize> {
        let Some(delimiter) = &self.delimiter else {
            return Some(0);
        };

        match self.state {
            ScanState::Found(offset) => Some(offset),
            ScanState::Matching(n) if n == delimiter.len() => Some(self.line_start),
            _ => None,
        }
    }
}

// Extracts the `boundary` parameter of a Content-Type header value.
fn find_boundary_param(value: &[u8]) -> Option<String> {
    let value = value.to_str_lossy();

    value.split(';').skip(1).find_map(|param| {
        let (name, v) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let v = v.trim();
        let v = v
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(v);
        Some(v.to_owned())
    })
}
