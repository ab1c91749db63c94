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

//! DNS TXT lookup abstraction.

#[cfg(feature = "hickory-resolver")]
mod hickory_resolver;

use std::{future::Future, io};

/// A resolver of DNS TXT records.
///
/// Errors of kind [`io::ErrorKind::NotFound`] mean that no record exists;
/// any other error is reported as a temporary DNS failure. Timeouts are the
/// implementation's concern.
pub trait LookupTxt: Send + Sync {
    /// The answer consisting of TXT records found, each with its character
    /// strings already concatenated.
    type Answer: IntoIterator<Item = io::Result<Vec<u8>>> + Send;
    /// The future resolving to the query's answer.
    type Query<'a>: Future<Output = io::Result<Self::Answer>> + Send + 'a
    where
        Self: 'a;

    /// Looks up the domain's TXT records in DNS.
    ///
    /// The domain is passed in A-label form with a trailing dot, eg
    /// `selector._domainkey.example.com.`.
    fn lookup_txt(&self, domain: &str) -> Self::Query<'_>;
}
