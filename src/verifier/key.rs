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

//! Public key resolution.

use crate::{
    crypto::{HashAlgorithm, VerifyingKey},
    record::{DkimKeyRecord, KeyRecordError},
    signature::{DomainName, Selector, SignatureType},
    verifier::LookupTxt,
};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    io::{self, ErrorKind},
};
use tracing::trace;

/// A resolved public key.
#[derive(Clone, Debug, PartialEq)]
pub struct PublicKeyInfo {
    pub key: VerifyingKey,
    /// The key as a SubjectPublicKeyInfo PEM document.
    pub public_key_pem: Option<String>,
    /// The TXT record the key was read from.
    pub record: Box<str>,
    /// The modulus length of an RSA key in bits.
    pub modulus_length: Option<usize>,
    /// Hash algorithms the record restricts the key to, from *h=*.
    pub hash_algorithms: Option<Box<[HashAlgorithm]>>,
}

impl PublicKeyInfo {
    /// Whether the key may be used with the given hash algorithm. A record
    /// without *h=* allows all algorithms.
    pub fn allows_hash(&self, hash_alg: HashAlgorithm) -> bool {
        self.hash_algorithms
            .as_ref()
            .map_or(true, |algs| algs.contains(&hash_alg))
    }
}

/// An error that occurs when resolving a public key.
#[derive(Clone, Debug, PartialEq)]
pub enum KeyError {
    NotFound,
    InvalidVersion,
    InvalidType,
    InvalidValue,
    /// The key is shorter than the configured minimum. The key is returned
    /// all the same.
    ShortKey(Box<PublicKeyInfo>),
    Dns(ErrorKind),
}

impl KeyError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "ENOTFOUND",
            Self::InvalidVersion => "EINVALIDVER",
            Self::InvalidType => "EINVALIDTYPE",
            Self::InvalidValue => "EINVALIDVAL",
            Self::ShortKey(_) => "ESHORTKEY",
            Self::Dns(_) => "EDNS",
        }
    }
}

impl Display for KeyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no key record found"),
            Self::InvalidVersion => write!(f, "unknown key version"),
            Self::InvalidType => write!(f, "unknown key type"),
            Self::InvalidValue => write!(f, "invalid public key"),
            Self::ShortKey(info) => match info.modulus_length {
                Some(n) => write!(f, "key too short ({n} bits)"),
                None => write!(f, "key too short"),
            },
            Self::Dns(kind) => write!(f, "DNS failure: {kind}"),
        }
    }
}

impl Error for KeyError {}

impl From<KeyRecordError> for KeyError {
    fn from(error: KeyRecordError) -> Self {
        match error {
            KeyRecordError::UnsupportedVersion => Self::InvalidVersion,
            KeyRecordError::UnsupportedKeyType => Self::InvalidType,
            KeyRecordError::InvalidKeyValue => Self::InvalidValue,
        }
    }
}

impl From<io::Error> for KeyError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            ErrorKind::NotFound => Self::NotFound,
            kind => Self::Dns(kind),
        }
    }
}

/// Formats the absolute query name `<selector>._domainkey.<domain>.`.
pub fn query_name(selector: &Selector, domain: &DomainName) -> String {
    format!("{}._domainkey.{}.", selector.to_ascii(), domain.to_ascii())
}

/// Looks up and parses the public key published at the given name.
///
/// Only the first TXT record of the answer is used. The *v=* tag is checked
/// for DKIM signatures only.
pub async fn resolve_public_key<T>(
    resolver: &T,
    signature_type: SignatureType,
    name: &str,
    min_key_bits: usize,
) -> Result<PublicKeyInfo, KeyError>
where
    T: LookupTxt + ?Sized,
{
    let answer = resolver.lookup_txt(name).await?;

    let txt = answer.into_iter().next().ok_or(KeyError::NotFound)??;
    let record = String::from_utf8_lossy(&txt);

    trace!(%name, %record, "resolved key record");

    let key_record = DkimKeyRecord::parse(&record, signature_type == SignatureType::Dkim)?;

    let key = VerifyingKey::from_key_data(&key_record.key_data)
        .map_err(|_| KeyError::InvalidValue)?;

    if matches!(key_record.key_type, Some(k) if k != key.key_type()) {
        return Err(KeyError::InvalidType);
    }

    let info = PublicKeyInfo {
        public_key_pem: key.to_pem(),
        modulus_length: key.key_size(),
        record: record.into(),
        hash_algorithms: key_record.hash_algorithms,
        key,
    };

    match info.modulus_length {
        Some(n) if n < min_key_bits => Err(KeyError::ShortKey(Box::new(info))),
        _ => Ok(info),
    }
}
