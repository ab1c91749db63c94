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

use crate::{
    arc::{ArcError, ArcErrorKind},
    header::{HeaderField, HeaderFields},
    signature::{
        ChainValidationStatus, SignatureHeader, SignatureType, ARC_AUTHENTICATION_RESULTS_NAME,
        ARC_MESSAGE_SIGNATURE_NAME, ARC_SEAL_NAME,
    },
    tag_list::TagList,
};
use std::collections::BTreeMap;
use tracing::trace;

/// The maximum number of ARC sets in a chain.
pub const MAX_ARC_INSTANCES: usize = 50;

/// The three header fields of one ARC instance.
#[derive(Clone, Debug, PartialEq)]
pub struct ArcSet {
    pub instance: u32,
    pub authentication_results: HeaderField,
    pub message_signature: SignatureHeader,
    pub seal: SignatureHeader,
}

impl ArcSet {
    pub fn chain_validation(&self) -> Option<ChainValidationStatus> {
        self.seal.tags.get("cv").and_then(|cv| cv.parse().ok())
    }
}

/// A structurally valid ARC chain, ordered by instance. May be empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArcChain {
    sets: Vec<ArcSet>,
}

#[derive(Clone, Copy)]
enum Slot {
    AuthenticationResults,
    MessageSignature,
    Seal,
}

#[derive(Default)]
struct PartialSet {
    authentication_results: Option<HeaderField>,
    message_signature: Option<HeaderField>,
    seal: Option<HeaderField>,
}

impl PartialSet {
    fn slot(&mut self, slot: Slot) -> &mut Option<HeaderField> {
        match slot {
            Slot::AuthenticationResults => &mut self.authentication_results,
            Slot::MessageSignature => &mut self.message_signature,
            Slot::Seal => &mut self.seal,
        }
    }
}

impl ArcChain {
    /// Collects the ARC header fields of a message into a chain and checks
    /// its structure.
    ///
    /// Header fields without an *i=* tag are not part of any set and are
    /// ignored.
    pub fn extract(headers: &HeaderFields) -> Result<Self, ArcError> {
        let mut instances: BTreeMap<u32, PartialSet> = BTreeMap::new();

        for field in headers.as_ref() {
            let Some(slot) = slot_for(field) else {
                continue;
            };

            let Some(instance) = instance_tag(field)? else {
                trace!(name = %field.name(), "ARC header without instance tag");
                continue;
            };

            let entry = instances.entry(instance).or_default().slot(slot);
            if entry.is_some() {
                return Err(ArcError::new(ArcErrorKind::MultipleArcKeys, Some(instance)));
            }
            *entry = Some(field.clone());
        }

        if instances.len() > MAX_ARC_INSTANCES {
            return Err(ArcError::new(ArcErrorKind::InvalidArcCount, None));
        }

        let count = instances.len();
        let mut sets = Vec::with_capacity(count);

        for (expected, (instance, set)) in (1..).zip(instances) {
            if instance != expected {
                return Err(ArcError::new(ArcErrorKind::InvalidArcInstance, Some(instance)));
            }

            let (Some(authentication_results), Some(message_signature), Some(seal)) =
                (set.authentication_results, set.message_signature, set.seal)
            else {
                return Err(ArcError::new(ArcErrorKind::MissingArcHeader, Some(instance)));
            };

            let message_signature = SignatureHeader::new(SignatureType::Arc, message_signature);
            let seal = SignatureHeader::new(SignatureType::ArcSeal, seal);

            let set = ArcSet {
                instance,
                authentication_results,
                message_signature,
                seal,
            };

            let is_last = instance as usize == count;
            check_chain_validation(&set, is_last)?;

            if set.seal.tags.contains("h") {
                return Err(ArcError::new(ArcErrorKind::UnexpectedHValue, Some(instance)));
            }

            sets.push(set);
        }

        Ok(Self { sets })
    }

    pub fn sets(&self) -> &[ArcSet] {
        &self.sets
    }

    pub fn newest(&self) -> Option<&ArcSet> {
        self.sets.last()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

fn slot_for(field: &HeaderField) -> Option<Slot> {
    let name = field.name();
    if *name == ARC_SEAL_NAME {
        Some(Slot::Seal)
    } else if *name == ARC_MESSAGE_SIGNATURE_NAME {
        Some(Slot::MessageSignature)
    } else if *name == ARC_AUTHENTICATION_RESULTS_NAME {
        Some(Slot::AuthenticationResults)
    } else {
        None
    }
}

fn instance_tag(field: &HeaderField) -> Result<Option<u32>, ArcError> {
    let value = String::from_utf8_lossy(field.body());
    match TagList::parse(&value).get("i") {
        None => Ok(None),
        Some(i) => i
            .parse()
            .map(Some)
            .map_err(|_| ArcError::new(ArcErrorKind::InvalidArcInstance, None)),
    }
}

// The first seal declares `none`, later ones `pass`. The newest seal may
// declare the chain broken with `fail`.
fn check_chain_validation(set: &ArcSet, is_last: bool) -> Result<(), ArcError> {
    let expected = if set.instance == 1 {
        ChainValidationStatus::None
    } else {
        ChainValidationStatus::Pass
    };

    match set.chain_validation() {
        Some(cv) if cv == expected => Ok(()),
        Some(ChainValidationStatus::Fail) if is_last => Ok(()),
        _ => Err(ArcError::new(ArcErrorKind::InvalidCvValue, Some(set.instance))),
    }
}
