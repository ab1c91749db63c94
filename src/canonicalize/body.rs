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

//! Body canonicalization.
//!
//! The canonicalizer is a byte-level state machine that can be fed chunks of
//! any size. Runs of line break bytes and whitespace are held back until it
//! is known whether they end the body, so that the digest does not depend on
//! where chunk boundaries fall.

use crate::{
    crypto::{CountingHasher, HashAlgorithm},
    parse::is_wsp_byte,
    signature::CanonicalizationAlgorithm,
};

const SP: u8 = b' ';
const CR: u8 = b'\r';
const LF: u8 = b'\n';
const CRLF: [u8; 2] = [CR, LF];

/// The outcome of body canonicalization and hashing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BodyHash {
    pub digest: Box<[u8]>,
    /// Number of raw body bytes seen.
    pub byte_length: usize,
    /// Length of the complete canonicalized body.
    pub canonicalized_length: usize,
    /// Number of canonicalized bytes that went into the digest.
    pub hashed_length: usize,
}

/// A streaming body canonicalizer with an attached digest.
pub struct BodyCanonicalizer {
    kind: CanonicalizationAlgorithm,
    hasher: CountingHasher,
    // trailing CR and LF bytes not yet known to be followed by content
    pending_breaks: Vec<u8>,
    // relaxed only: whitespace seen since the last content byte
    pending_wsp: bool,
    content_seen: bool,
    byte_length: usize,
    canonicalized_length: usize,
}

impl BodyCanonicalizer {
    /// Creates a canonicalizer; `length` limits the number of canonicalized
    /// bytes that are hashed (the *l=* tag).
    pub fn new(kind: CanonicalizationAlgorithm, hash_alg: HashAlgorithm, length: Option<usize>) -> Self {
        Self {
            kind,
            hasher: CountingHasher::new(hash_alg, length),
            pending_breaks: vec![],
            pending_wsp: false,
            content_seen: false,
            byte_length: 0,
            canonicalized_length: 0,
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.byte_length += chunk.len();

        let mut output = Vec::with_capacity(chunk.len() + 2);

        match self.kind {
            CanonicalizationAlgorithm::Simple => self.update_simple(&mut output, chunk),
            CanonicalizationAlgorithm::Relaxed => self.update_relaxed(&mut output, chunk),
        }

        self.emit(&output);
    }

    fn update_simple(&mut self, output: &mut Vec<u8>, chunk: &[u8]) {
        for &b in chunk {
            if matches!(b, CR | LF) {
                self.pending_breaks.push(b);
            } else {
                output.append(&mut self.pending_breaks);
                output.push(b);
                self.content_seen = true;
            }
        }
    }

    fn update_relaxed(&mut self, output: &mut Vec<u8>, chunk: &[u8]) {
        for &b in chunk {
            if is_wsp_byte(b) {
                self.pending_wsp = true;
            } else if matches!(b, CR | LF) {
                // whitespace at end of line is removed
                self.pending_wsp = false;
                self.pending_breaks.push(b);
            } else {
                flush_breaks_relaxed(output, &mut self.pending_breaks);
                if self.pending_wsp {
                    output.push(SP);
                    self.pending_wsp = false;
                }
                output.push(b);
                self.content_seen = true;
            }
        }
    }

    fn emit(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.canonicalized_length += bytes.len();
            self.hasher.update(bytes);
        }
    }

    /// Finishes canonicalization: trailing empty lines are dropped, and the
    /// body is terminated with CRLF.
    pub fn finish(mut self) -> BodyHash {
        match self.kind {
            // the empty body canonicalizes to a single CRLF
            CanonicalizationAlgorithm::Simple => self.emit(&CRLF),
            // the empty body stays empty
            CanonicalizationAlgorithm::Relaxed => {
                if self.content_seen {
                    self.emit(&CRLF);
                }
            }
        }

        let canonicalized_length = self.canonicalized_length;
        let byte_length = self.byte_length;
        let (digest, hashed_length) = self.hasher.finish();

        BodyHash {
            digest,
            byte_length,
            canonicalized_length,
            hashed_length,
        }
    }
}

// Line breaks are normalised to CRLF; a CR not followed by LF is content and
// stays as is.
fn flush_breaks_relaxed(output: &mut Vec<u8>, pending: &mut Vec<u8>) {
    let mut iter = pending.drain(..).peekable();
    while let Some(b) = iter.next() {
        match b {
            CR if iter.peek() == Some(&LF) => {
                iter.next();
                output.extend(CRLF);
            }
            CR => output.push(CR),
            _ => output.extend(CRLF),
        }
    }
}
