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
    arc::{verify, ArcOutcome, MAX_ARC_INSTANCES},
    canonicalize::{self, BodyHash},
    crypto::SigningKey,
    header::{FieldBody, FieldName, HeaderField, HeaderFields},
    signature::{
        format::SignatureTemplate, Canonicalization, DomainName, Selector, SignatureAlgorithm,
        SignatureType, ARC_AUTHENTICATION_RESULTS_NAME,
    },
    signer::{
        self, default_signed_headers, HeaderSelection, SignerError, SigningResult, Timestamp,
    },
    util::CanonicalStr,
};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};
use tracing::debug;

/// An error that occurs when sealing a message.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SealError {
    InvalidAlgorithm,
    KeyTypeMismatch,
    /// The chain already holds the maximum number of sets.
    InvalidInstance,
    InvalidAuthenticationResults,
    SigningFailure,
}

impl SealError {
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidAlgorithm => "EINVALIDALGO",
            Self::KeyTypeMismatch => "EINVALIDTYPE",
            Self::InvalidInstance => "EINVALIDINSTANCE",
            Self::InvalidAuthenticationResults => "EINVALIDAUTHRES",
            Self::SigningFailure => "ESIGNFAIL",
        }
    }
}

impl Display for SealError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAlgorithm => write!(f, "unsupported sealing algorithm"),
            Self::KeyTypeMismatch => write!(f, "sealing algorithm does not match key type"),
            Self::InvalidInstance => write!(f, "ARC chain too long"),
            Self::InvalidAuthenticationResults => write!(f, "invalid authentication results"),
            Self::SigningFailure => write!(f, "signing failed"),
        }
    }
}

impl Error for SealError {}

impl From<SignerError> for SealError {
    fn from(error: SignerError) -> Self {
        match error {
            SignerError::InvalidAlgorithm => Self::InvalidAlgorithm,
            SignerError::KeyTypeMismatch => Self::KeyTypeMismatch,
            SignerError::InvalidInstance => Self::InvalidInstance,
            _ => Self::SigningFailure,
        }
    }
}

/// A request to add a new ARC set to a message.
pub struct SealRequest<T> {
    pub signing_key: T,
    pub domain: DomainName,
    pub selector: Selector,
    /// Must use SHA-256.
    pub algorithm: SignatureAlgorithm,
    /// The headers to cover with the ARC message signature.
    pub header_selection: HeaderSelection,
    pub timestamp: Option<Timestamp>,
    /// The authentication results to record, as the value of an
    /// Authentication-Results header starting with the authserv-id.
    pub authentication_results: String,
}

impl<T> SealRequest<T> {
    pub fn new(
        domain: DomainName,
        selector: Selector,
        signing_key: T,
        authentication_results: impl Into<String>,
    ) -> Self {
        Self {
            signing_key,
            domain,
            selector,
            algorithm: SignatureAlgorithm::RsaSha256,
            header_selection: HeaderSelection::Auto,
            timestamp: Some(Timestamp::Now),
            authentication_results: authentication_results.into(),
        }
    }
}

/// The three header fields of a new ARC set.
#[derive(Clone, Debug, PartialEq)]
pub struct ArcSealHeaders {
    pub instance: u32,
    /// The ARC-Authentication-Results header value.
    pub authentication_results: String,
    pub message_signature: SigningResult,
    pub seal: SigningResult,
}

impl ArcSealHeaders {
    /// Formats the set for prepending to the message, seal on top, each line
    /// terminated with CRLF.
    pub fn to_header_block(&self) -> String {
        format!(
            "{}\r\n{}\r\n{ARC_AUTHENTICATION_RESULTS_NAME}:{}\r\n",
            self.seal, self.message_signature, self.authentication_results
        )
    }
}

/// Seals a message with a new ARC set, the instance following the highest
/// one in `outcome`.
///
/// The chain validation status recorded in the seal mirrors the outcome of
/// the chain evaluation. `body_hash` must be the relaxed/SHA-256 body hash,
/// as computed by a verifier configured for sealing.
pub fn seal<T>(
    request: &SealRequest<T>,
    headers: &HeaderFields,
    outcome: &ArcOutcome,
    body_hash: &BodyHash,
) -> Result<ArcSealHeaders, SealError>
where
    T: AsRef<SigningKey>,
{
    let signing_key = request.signing_key.as_ref();
    let algorithm = request.algorithm;

    if !SignatureType::ArcSeal.allows_hash(algorithm.hash_algorithm()) {
        return Err(SealError::InvalidAlgorithm);
    }
    if signing_key.key_type() != algorithm.key_type() {
        return Err(SealError::KeyTypeMismatch);
    }

    let instance = outcome.next_instance();
    if instance as usize > MAX_ARC_INSTANCES {
        return Err(SealError::InvalidInstance);
    }

    let authentication_results = format!(" i={instance}; {}", request.authentication_results.trim());
    let aar_field = FieldName::new(ARC_AUTHENTICATION_RESULTS_NAME)
        .and_then(|name| {
            let body = FieldBody::new(authentication_results.clone().into_bytes())?;
            Ok(HeaderField::new(name, body))
        })
        .map_err(|_| SealError::InvalidAuthenticationResults)?;

    let timestamp = request.timestamp.map(|t| match t {
        Timestamp::Now => signer::now_unix_secs(),
        Timestamp::Exact(t) => t,
    });

    let names = match &request.header_selection {
        HeaderSelection::Auto => default_signed_headers(SignatureType::Arc),
        HeaderSelection::Manual(names) => names.clone(),
    };
    let names: Vec<_> = names.into_iter().filter(|n| !signer::is_arc_header(n)).collect();
    let selected = canonicalize::select_signing_headers(headers, &names);

    let ams_template = SignatureTemplate {
        signature_type: SignatureType::Arc,
        algorithm,
        canonicalization: Canonicalization::RELAXED,
        domain: request.domain.clone(),
        selector: request.selector.clone(),
        identity: None,
        instance: Some(instance),
        signed_headers: selected.iter().map(|f| f.name().clone()).collect(),
        body_length: None,
        timestamp,
        expiration: None,
        chain_validation: None,
        body_hash: Some(body_hash.digest.clone()),
    };

    let message_signature = signer::produce_signature(&ams_template, signing_key, &selected)?;

    let ams_field = HeaderField::from_line(message_signature.to_string().into_bytes())
        .map_err(|_| SealError::SigningFailure)?;

    let earlier = outcome.chain.as_ref().map(|c| c.sets()).unwrap_or_default();
    let sealed = verify::seal_signing_headers_with(earlier, &aar_field, &ams_field);

    let cv = outcome.chain_validation();

    let seal_template = SignatureTemplate {
        signature_type: SignatureType::ArcSeal,
        signed_headers: vec![],
        body_hash: None,
        chain_validation: Some(cv),
        ..ams_template
    };

    let seal = signer::produce_signature(&seal_template, signing_key, &sealed)?;

    debug!(instance, domain = %request.domain, cv = cv.canonical_str(), "sealed message");

    Ok(ArcSealHeaders {
        instance,
        authentication_results,
        message_signature,
        seal,
    })
}
