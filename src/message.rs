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

//! Splitting a message into header and body.

use crate::header::HeaderFields;
use bstr::ByteSlice;

/// A consumer of a message: first the header, then the body in chunks.
///
/// [`Signer`][crate::signer::Signer] and
/// [`Verifier`][crate::verifier::Verifier] implement this trait; finishing
/// is specific to each.
pub trait MessageHandler {
    /// Receives the header of the message. Called exactly once, before any
    /// body chunk.
    fn message_headers(&mut self, headers: HeaderFields);

    /// Receives the next chunk of the message body.
    fn body_chunk(&mut self, chunk: &[u8]);
}

/// A segmenter that feeds raw message bytes to a [`MessageHandler`].
///
/// The header ends at the first empty line, terminated by CRLF or LF. The
/// empty line belongs to neither header nor body.
#[derive(Debug, Default)]
pub struct MessageSegmenter {
    header_block: Vec<u8>,
    in_body: bool,
}

impl MessageSegmenter {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn feed<H: MessageHandler + ?Sized>(&mut self, handler: &mut H, chunk: &[u8]) {
        if self.in_body {
            if !chunk.is_empty() {
                handler.body_chunk(chunk);
            }
            return;
        }

        // resume the search a few bytes back, the separator may span chunks
        let search_start = self.header_block.len().saturating_sub(3);
        self.header_block.extend_from_slice(chunk);

        if let Some((header_end, body_start)) = find_header_end(&self.header_block, search_start) {
            let body = self.header_block.split_off(body_start);
            self.header_block.truncate(header_end);
            self.in_body = true;

            let headers = HeaderFields::parse(&self.header_block);
            tracing::trace!(count = headers.as_ref().len(), "parsed message header");
            handler.message_headers(headers);

            if !body.is_empty() {
                handler.body_chunk(&body);
            }
        }
    }

    /// Signals the end of the message. A message without empty line consists
    /// of a header only.
    pub fn finish<H: MessageHandler + ?Sized>(self, handler: &mut H) {
        if !self.in_body {
            handler.message_headers(HeaderFields::parse(&self.header_block));
        }
    }

    /// Feeds a complete message.
    pub fn process<H: MessageHandler + ?Sized>(handler: &mut H, message: &[u8]) {
        let mut segmenter = Self::new();
        segmenter.feed(handler, message);
        segmenter.finish(handler);
    }
}

// Returns the end of the header block (including its last line break) and
// the start of the body.
fn find_header_end(bytes: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while let Some(n) = bytes[i..].find_byte(b'\n') {
        let lf = i + n;
        let rest = &bytes[(lf + 1)..];
        if rest.starts_with(b"\n") {
            return Some((lf + 1, lf + 2));
        }
        if rest.starts_with(b"\r\n") {
            return Some((lf + 1, lf + 3));
        }
        i = lf + 1;
    }
    // an empty header
    if from == 0 {
        if bytes.starts_with(b"\r\n") {
            return Some((0, 2));
        }
        if bytes.starts_with(b"\n") {
            return Some((0, 1));
        }
    }
    None
}
