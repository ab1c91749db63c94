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
    crypto::{HashAlgorithm, KeyType},
    header::FieldName,
    signature::{
        AlgorithmSpec, Canonicalization, DomainName, Identity, Selector, SignatureType,
        ARC_SEAL_NAME, DKIM_SIGNATURE_NAME,
    },
};
use std::time::Duration;

/// The strategy for the *l=* tag.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum BodyLength {
    /// Do not limit the body length: no *l=* tag.
    #[default]
    All,
    /// Sign the body as presented, and record its canonical length in *l=*.
    MessageContent,
    /// Sign at most the given number of canonicalized body bytes.
    Exact(u64),
}

impl BodyLength {
    /// The limit to apply when hashing the body.
    pub fn limit(self) -> Option<usize> {
        match self {
            Self::All | Self::MessageContent => None,
            Self::Exact(n) => Some(usize::try_from(n).unwrap_or(usize::MAX)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Timestamp {
    #[default]
    Now,
    Exact(u64),
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum HeaderSelection {
    /// Select the headers present in the default set for the signature type.
    #[default]
    Auto,
    /// Sign the headers with exactly these names.
    Manual(Vec<FieldName>),
}

const DEFAULT_SIGNED_HEADERS: [&str; 28] = [
    "From",
    "Sender",
    "Reply-To",
    "Subject",
    "Date",
    "Message-ID",
    "To",
    "Cc",
    "MIME-Version",
    "Content-Type",
    "Content-Transfer-Encoding",
    "Content-ID",
    "Content-Description",
    "Resent-Date",
    "Resent-From",
    "Resent-Sender",
    "Resent-To",
    "Resent-Cc",
    "Resent-Message-ID",
    "In-Reply-To",
    "References",
    "List-Id",
    "List-Help",
    "List-Unsubscribe",
    "List-Subscribe",
    "List-Post",
    "List-Owner",
    "List-Archive",
];

/// Returns the default header names to sign for a signature type.
///
/// ARC message signatures additionally cover DKIM signatures and
/// *Delivered-To*.
pub fn default_signed_headers(signature_type: SignatureType) -> Vec<FieldName> {
    let extra: &[&str] = match signature_type {
        SignatureType::Dkim | SignatureType::ArcSeal => &[],
        SignatureType::Arc => &[DKIM_SIGNATURE_NAME, "Delivered-To"],
    };

    extra
        .iter()
        .chain(&DEFAULT_SIGNED_HEADERS)
        .filter_map(|name| FieldName::new(*name).ok())
        .collect()
}

/// Header names that may never appear in an ARC message signature's *h=*.
pub fn is_arc_header(name: &FieldName) -> bool {
    *name == ARC_SEAL_NAME
        || *name == crate::signature::ARC_MESSAGE_SIGNATURE_NAME
        || *name == crate::signature::ARC_AUTHENTICATION_RESULTS_NAME
}

/// A request for one signature.
pub struct SignRequest<T> {
    /// Either [`SignatureType::Dkim`] or [`SignatureType::Arc`].
    pub signature_type: SignatureType,

    /// The key to use for producing the cryptographic signature.
    pub signing_key: T,

    /// The signature algorithm. A missing key type is taken from the key.
    pub algorithm: AlgorithmSpec,
    /// The canonicalization to use in the *c=* tag.
    pub canonicalization: Canonicalization,
    /// The selection of headers to include in the *h=* tag.
    pub header_selection: HeaderSelection,
    /// The signing domain to use in the *d=* tag.
    pub domain: DomainName,
    /// The selector to use in the *s=* tag.
    pub selector: Selector,
    /// The agent or user identifier to use in the DKIM *i=* tag.
    pub identity: Option<Identity>,
    /// The strategy to use for generating the *l=* tag.
    pub body_length: BodyLength,
    /// The timestamp value to record in the *t=* tag.
    pub timestamp: Option<Timestamp>,
    /// The duration for which the signature will remain valid (*x=* tag).
    pub valid_duration: Option<Duration>,
    /// The ARC instance. By default the instance following the highest one
    /// present in the message.
    pub arc_instance: Option<u32>,
}

impl<T> SignRequest<T> {
    /// Creates a DKIM signature request with *relaxed/relaxed*
    /// canonicalization and the algorithm derived from the key.
    pub fn new(domain: DomainName, selector: Selector, signing_key: T) -> Self {
        Self {
            signature_type: SignatureType::Dkim,
            signing_key,
            algorithm: AlgorithmSpec::default(),
            canonicalization: Canonicalization::RELAXED,
            header_selection: HeaderSelection::Auto,
            domain,
            selector,
            identity: None,
            body_length: BodyLength::All,
            timestamp: Some(Timestamp::Now),
            valid_duration: None,
            arc_instance: None,
        }
    }

    /// Creates an ARC message signature request, always *rsa-sha256* with
    /// *relaxed/relaxed* canonicalization.
    pub fn arc(domain: DomainName, selector: Selector, signing_key: T) -> Self {
        Self {
            signature_type: SignatureType::Arc,
            algorithm: AlgorithmSpec::new(Some(KeyType::Rsa), HashAlgorithm::Sha256),
            ..Self::new(domain, selector, signing_key)
        }
    }
}
