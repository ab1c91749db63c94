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

//! Computation of the message hashes.

use crate::{
    canonicalize::{self, BodyCanonicalizer, BodyHash, SigningInput},
    crypto::{self, HashAlgorithm},
    header::{HeaderField, HeaderFields},
    mime::BoundaryScanner,
    signature::CanonicalizationAlgorithm,
};
use std::collections::{HashMap, HashSet};

/// Computes the hash of the signing input for the selected headers.
pub fn compute_data_hash(
    hash_alg: HashAlgorithm,
    canon_alg: CanonicalizationAlgorithm,
    selected: &[&HeaderField],
    signature: SigningInput<'_>,
) -> Box<[u8]> {
    let input = canonicalize::signing_input(canon_alg, selected, signature);
    crypto::digest_slices(hash_alg, [input])
}

/// Identifies one body canonicalizer: body canonicalization, hash
/// algorithm, and the *l=* limit.
pub type BodyHasherKey = (CanonicalizationAlgorithm, HashAlgorithm, Option<usize>);

/// The body hash for one key, with the shared MIME structure start.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BodyHashResult {
    pub hash: BodyHash,
    pub mime_structure_start: Option<usize>,
}

pub type BodyHashResults = HashMap<BodyHasherKey, BodyHashResult>;

#[derive(Clone, Debug, Default)]
pub struct BodyHasherBuilder {
    registrations: HashSet<BodyHasherKey>,
}

impl BodyHasherBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn register_canonicalization(&mut self, key: BodyHasherKey) {
        self.registrations.insert(key);
    }

    pub fn build(self, headers: &HeaderFields) -> BodyHasher {
        let hashers = self
            .registrations
            .into_iter()
            .map(|key @ (canon, alg, len)| (key, BodyCanonicalizer::new(canon, alg, len)))
            .collect();

        BodyHasher {
            hashers,
            scanner: BoundaryScanner::from_headers(headers),
        }
    }
}

/// A set of body canonicalizers, each fed every chunk of the body.
pub struct BodyHasher {
    hashers: HashMap<BodyHasherKey, BodyCanonicalizer>,
    scanner: BoundaryScanner,
}

impl BodyHasher {
    pub fn hash_chunk(&mut self, chunk: &[u8]) {
        self.scanner.update(chunk);
        for canonicalizer in self.hashers.values_mut() {
            canonicalizer.update(chunk);
        }
    }

    pub fn finish(self) -> BodyHashResults {
        let mime_structure_start = self.scanner.finish();

        self.hashers
            .into_iter()
            .map(|(key, canonicalizer)| {
                let result = BodyHashResult {
                    hash: canonicalizer.finish(),
                    mime_structure_start,
                };
                (key, result)
            })
            .collect()
    }
}
