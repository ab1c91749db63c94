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

//! Concurrent public key lookups.

use crate::{
    signature::SignatureType,
    verifier::{
        key::{self, KeyError, PublicKeyInfo},
        LookupTxt,
    },
};
use std::{
    collections::{HashMap, HashSet},
    io::ErrorKind,
};
use tokio::task::JoinSet;
use tracing::trace;

// Signature kind and absolute query name; the kind decides whether the key
// record's version tag is checked.
type QueryKey = (SignatureType, String);

pub type KeyResult = Result<PublicKeyInfo, KeyError>;

#[derive(Default)]
pub struct QueriesBuilder {
    lookups: HashSet<QueryKey>,
}

impl QueriesBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_lookup(&mut self, signature_type: SignatureType, name: String) {
        self.lookups.insert((signature_type, name));
    }

    /// Runs all registered lookups concurrently and waits for them to
    /// complete. Each lookup stands on its own: one failing does not affect
    /// the others.
    pub async fn spawn_all<T>(self, resolver: &T, min_key_bits: usize) -> KeyResults
    where
        T: LookupTxt + Clone + 'static,
    {
        let mut set = JoinSet::new();

        for (signature_type, name) in self.lookups {
            trace!(%signature_type, %name, "spawning key lookup");

            let resolver = resolver.clone();

            set.spawn(async move {
                let result =
                    key::resolve_public_key(&resolver, signature_type, &name, min_key_bits).await;
                ((signature_type, name), result)
            });
        }

        let mut results = HashMap::new();

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((query, result)) => {
                    if let Err(e) = &result {
                        trace!(name = %query.1, "key lookup failed: {e}");
                    }
                    results.insert(query, result);
                }
                Err(e) => {
                    trace!("key lookup task did not complete: {e}");
                }
            }
        }

        KeyResults(results)
    }
}

/// Outcomes of completed key lookups.
#[derive(Debug, Default)]
pub struct KeyResults(HashMap<QueryKey, KeyResult>);

impl KeyResults {
    /// Returns the outcome of a lookup. A lookup that never completed counts
    /// as a DNS failure.
    pub fn get(&self, signature_type: SignatureType, name: &str) -> KeyResult {
        self.0
            .get(&(signature_type, name.to_owned()))
            .cloned()
            .unwrap_or(Err(KeyError::Dns(ErrorKind::Other)))
    }
}
