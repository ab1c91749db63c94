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

use crate::crypto::HashAlgorithm;
use digest::{Digest, DynDigest};
use sha1::Sha1;
use sha2::Sha256;

/// Computes the digest of the concatenation of the given slices.
pub fn digest_slices<I, T>(hash_alg: HashAlgorithm, slices: I) -> Box<[u8]>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    fn digest_all<D: Digest, I: IntoIterator<Item = T>, T: AsRef<[u8]>>(slices: I) -> Box<[u8]> {
        let mut hasher = D::new();
        for bytes in slices {
            hasher.update(bytes.as_ref());
        }
        Box::from(&hasher.finalize()[..])
    }

    match hash_alg {
        HashAlgorithm::Sha256 => digest_all::<Sha256, _, _>(slices),
        HashAlgorithm::Sha1 => digest_all::<Sha1, _, _>(slices),
    }
}

/// A hasher that digests at most a fixed number of bytes, and counts them.
pub struct CountingHasher {
    digest: Box<dyn DynDigest + Send>,
    length: Option<usize>,
    bytes_written: usize,
}

impl CountingHasher {
    pub fn new(hash_alg: HashAlgorithm, length: Option<usize>) -> Self {
        let digest: Box<dyn DynDigest + Send> = match hash_alg {
            HashAlgorithm::Sha256 => Box::new(Sha256::default()),
            HashAlgorithm::Sha1 => Box::new(Sha1::default()),
        };

        Self {
            digest,
            length,
            bytes_written: 0,
        }
    }

    /// Digests as much of the input as the length limit allows.
    pub fn update(&mut self, bytes: &[u8]) {
        let n = match self.length {
            Some(len) => bytes.len().min(len - self.bytes_written),
            None => bytes.len(),
        };

        if n > 0 {
            self.digest.update(&bytes[..n]);
            self.bytes_written += n;
        }
    }

    pub fn finish(self) -> (Box<[u8]>, usize) {
        (self.digest.finalize(), self.bytes_written)
    }
}
