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

//! Signature types shared by DKIM and ARC.
//!
//! A DKIM-Signature, an ARC-Message-Signature, and an ARC-Seal are all tag
//! lists that carry a signature over a selection of header fields. They
//! differ in tag set, tag order, and which algorithms are acceptable; the
//! [`SignatureType`] captures that difference.

pub mod format;
mod names;

pub use names::{DomainName, Identity, ParseDomainError, Selector};

use crate::{
    crypto::{HashAlgorithm, KeyType},
    header::{FieldName, HeaderField},
    tag_list::{self, TagList},
    util::CanonicalStr,
};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

pub const DKIM_SIGNATURE_NAME: &str = "DKIM-Signature";
pub const ARC_MESSAGE_SIGNATURE_NAME: &str = "ARC-Message-Signature";
pub const ARC_SEAL_NAME: &str = "ARC-Seal";
pub const ARC_AUTHENTICATION_RESULTS_NAME: &str = "ARC-Authentication-Results";

/// The kind of signature header.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SignatureType {
    /// DKIM-Signature
    Dkim,
    /// ARC-Message-Signature
    Arc,
    /// ARC-Seal
    ArcSeal,
}

impl SignatureType {
    pub fn header_name(self) -> &'static str {
        match self {
            Self::Dkim => DKIM_SIGNATURE_NAME,
            Self::Arc => ARC_MESSAGE_SIGNATURE_NAME,
            Self::ArcSeal => ARC_SEAL_NAME,
        }
    }

    /// Whether the hash algorithm may be used with this kind of signature.
    /// ARC admits only SHA-256.
    pub fn allows_hash(self, hash_alg: HashAlgorithm) -> bool {
        match self {
            Self::Dkim => true,
            Self::Arc | Self::ArcSeal => hash_alg == HashAlgorithm::Sha256,
        }
    }
}

impl CanonicalStr for SignatureType {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::Dkim => "DKIM",
            Self::Arc => "ARC",
            Self::ArcSeal => "AS",
        }
    }
}

impl Display for SignatureType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

/// An error in a signing or verification configuration value.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ConfigError {
    InvalidAlgorithm,
    InvalidCanonicalization,
}

impl ConfigError {
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidAlgorithm => "EINVALIDALGO",
            Self::InvalidCanonicalization => "EINVALIDCANON",
        }
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAlgorithm => write!(f, "unsupported signing algorithm"),
            Self::InvalidCanonicalization => write!(f, "unsupported canonicalization"),
        }
    }
}

impl Error for ConfigError {}

/// A signature algorithm, as found in the *a=* tag.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SignatureAlgorithm {
    RsaSha256,
    RsaSha1,
    Ed25519Sha256,
}

impl SignatureAlgorithm {
    /// Combines a key type and hash algorithm. Ed25519 is defined only with
    /// SHA-256.
    pub fn from_parts(key_type: KeyType, hash_alg: HashAlgorithm) -> Option<Self> {
        match (key_type, hash_alg) {
            (KeyType::Rsa, HashAlgorithm::Sha256) => Some(Self::RsaSha256),
            (KeyType::Rsa, HashAlgorithm::Sha1) => Some(Self::RsaSha1),
            (KeyType::Ed25519, HashAlgorithm::Sha256) => Some(Self::Ed25519Sha256),
            (KeyType::Ed25519, HashAlgorithm::Sha1) => None,
        }
    }

    pub fn key_type(self) -> KeyType {
        match self {
            Self::RsaSha256 | Self::RsaSha1 => KeyType::Rsa,
            Self::Ed25519Sha256 => KeyType::Ed25519,
        }
    }

    pub fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            Self::RsaSha256 | Self::Ed25519Sha256 => HashAlgorithm::Sha256,
            Self::RsaSha1 => HashAlgorithm::Sha1,
        }
    }
}

impl CanonicalStr for SignatureAlgorithm {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::RsaSha256 => "rsa-sha256",
            Self::RsaSha1 => "rsa-sha1",
            Self::Ed25519Sha256 => "ed25519-sha256",
        }
    }
}

impl Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = AlgorithmSpec::from_str(s)?;
        spec.key_type
            .and_then(|k| Self::from_parts(k, spec.hash_algorithm))
            .ok_or(ConfigError::InvalidAlgorithm)
    }
}

/// A requested algorithm where the key type may be left open, to be taken
/// from the signing key.
///
/// Accepts `rsa-sha256`, `ed25519-sha256`, `rsa-sha1`, or a bare hash name
/// such as `sha256`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct AlgorithmSpec {
    pub key_type: Option<KeyType>,
    pub hash_algorithm: HashAlgorithm,
}

impl AlgorithmSpec {
    pub fn new(key_type: Option<KeyType>, hash_algorithm: HashAlgorithm) -> Self {
        Self { key_type, hash_algorithm }
    }

    /// Resolves the algorithm against the type of the key actually used.
    pub fn resolve(self, key_type: KeyType) -> Option<SignatureAlgorithm> {
        match self.key_type {
            Some(k) if k != key_type => None,
            _ => SignatureAlgorithm::from_parts(key_type, self.hash_algorithm),
        }
    }
}

impl Default for AlgorithmSpec {
    fn default() -> Self {
        Self::new(None, HashAlgorithm::Sha256)
    }
}

impl From<SignatureAlgorithm> for AlgorithmSpec {
    fn from(alg: SignatureAlgorithm) -> Self {
        Self::new(Some(alg.key_type()), alg.hash_algorithm())
    }
}

impl FromStr for AlgorithmSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key_type, hash) = match s.split_once('-') {
            Some((k, h)) => {
                let k = k.parse().map_err(|_| ConfigError::InvalidAlgorithm)?;
                (Some(k), h)
            }
            None => (None, s),
        };

        let hash_algorithm = hash.parse().map_err(|_| ConfigError::InvalidAlgorithm)?;

        if let Some(k) = key_type {
            SignatureAlgorithm::from_parts(k, hash_algorithm).ok_or(ConfigError::InvalidAlgorithm)?;
        }

        Ok(Self::new(key_type, hash_algorithm))
    }
}

/// A canonicalization algorithm.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CanonicalizationAlgorithm {
    #[default]
    Simple,
    Relaxed,
}

impl CanonicalStr for CanonicalizationAlgorithm {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Relaxed => "relaxed",
        }
    }
}

impl FromStr for CanonicalizationAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("simple") {
            Ok(Self::Simple)
        } else if s.eq_ignore_ascii_case("relaxed") {
            Ok(Self::Relaxed)
        } else {
            Err(ConfigError::InvalidCanonicalization)
        }
    }
}

/// A header/body canonicalization pair, as found in the *c=* tag.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Canonicalization {
    pub header: CanonicalizationAlgorithm,
    pub body: CanonicalizationAlgorithm,
}

impl Canonicalization {
    pub const RELAXED: Self = Self {
        header: CanonicalizationAlgorithm::Relaxed,
        body: CanonicalizationAlgorithm::Relaxed,
    };

    pub fn new(header: CanonicalizationAlgorithm, body: CanonicalizationAlgorithm) -> Self {
        Self { header, body }
    }
}

impl Display for Canonicalization {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.header.canonical_str(), self.body.canonical_str())
    }
}

impl FromStr for Canonicalization {
    type Err = ConfigError;

    /// Parses `header/body`; a missing body part defaults to *simple*.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((header, body)) => Ok(Self::new(header.parse()?, body.parse()?)),
            None => Ok(Self::new(s.parse()?, CanonicalizationAlgorithm::Simple)),
        }
    }
}

/// The ARC chain validation status, as found in the *cv=* tag.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ChainValidationStatus {
    None,
    Pass,
    Fail,
}

impl CanonicalStr for ChainValidationStatus {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pass => "pass",
            Self::Fail => "fail",
        }
    }
}

impl FromStr for ChainValidationStatus {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("none") {
            Ok(Self::None)
        } else if s.eq_ignore_ascii_case("pass") {
            Ok(Self::Pass)
        } else if s.eq_ignore_ascii_case("fail") {
            Ok(Self::Fail)
        } else {
            Err(ConfigError::InvalidAlgorithm)
        }
    }
}

/// A reason for passing over a signature header without evaluating it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DescriptorError {
    UnsupportedAlgorithm,
    UnsupportedHashAlgorithm,
    UnsupportedCanonicalization,
    MissingDomain,
    MissingSelector,
}

impl Display for DescriptorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedAlgorithm => write!(f, "unsupported signing algorithm"),
            Self::UnsupportedHashAlgorithm => write!(f, "unsupported hash algorithm"),
            Self::UnsupportedCanonicalization => write!(f, "unsupported canonicalization"),
            Self::MissingDomain => write!(f, "missing or invalid signing domain"),
            Self::MissingSelector => write!(f, "missing or invalid selector"),
        }
    }
}

impl Error for DescriptorError {}

/// A signature header found in a message, with its tag list parsed
/// leniently.
#[derive(Clone, Debug, PartialEq)]
pub struct SignatureHeader {
    pub signature_type: SignatureType,
    pub field: HeaderField,
    pub tags: TagList,
}

impl SignatureHeader {
    pub fn new(signature_type: SignatureType, field: HeaderField) -> Self {
        let value = String::from_utf8_lossy(field.body());
        let tags = TagList::parse(&value);
        Self { signature_type, field, tags }
    }

    /// Interprets the tags. Fails for signatures that cannot be evaluated.
    pub fn descriptor(&self) -> Result<SignatureDescriptor, DescriptorError> {
        let tags = &self.tags;
        let signature_type = self.signature_type;

        let (key_type, hash_alg) = tags
            .get("a")
            .and_then(|a| a.split_once('-'))
            .ok_or(DescriptorError::UnsupportedAlgorithm)?;
        let key_type: KeyType = key_type
            .parse()
            .map_err(|_| DescriptorError::UnsupportedAlgorithm)?;
        let hash_alg: HashAlgorithm = hash_alg
            .parse()
            .map_err(|_| DescriptorError::UnsupportedHashAlgorithm)?;
        if !signature_type.allows_hash(hash_alg) {
            return Err(DescriptorError::UnsupportedHashAlgorithm);
        }
        let algorithm = SignatureAlgorithm::from_parts(key_type, hash_alg)
            .ok_or(DescriptorError::UnsupportedAlgorithm)?;

        // ARC-Seal carries no c= tag and is always relaxed.
        let canonicalization = match (signature_type, tags.get_non_empty("c")) {
            (SignatureType::ArcSeal, None) => Canonicalization::RELAXED,
            (_, None) => Canonicalization::default(),
            (_, Some(c)) => c
                .parse()
                .map_err(|_| DescriptorError::UnsupportedCanonicalization)?,
        };
        if signature_type == SignatureType::ArcSeal && canonicalization != Canonicalization::RELAXED
        {
            return Err(DescriptorError::UnsupportedCanonicalization);
        }

        let domain = tags
            .get_non_empty("d")
            .and_then(|d| DomainName::new(d).ok())
            .ok_or(DescriptorError::MissingDomain)?;
        let selector = tags
            .get_non_empty("s")
            .and_then(|s| Selector::new(s).ok())
            .ok_or(DescriptorError::MissingSelector)?;

        let signed_headers = tags
            .get("h")
            .map(|h| {
                tag_list::parse_colon_separated_tag_value(h)
                    .into_iter()
                    .filter_map(|name| FieldName::new(name).ok())
                    .collect()
            })
            .unwrap_or_default();

        let body_hash = tags
            .get("bh")
            .and_then(|bh| tag_list::parse_base64_tag_value(bh).ok())
            .map(Into::into);

        // An undecodable b= tag still gets evaluated, and then fails.
        let signature_data = tags
            .get("b")
            .and_then(|b| tag_list::parse_base64_tag_value(b).ok())
            .unwrap_or_default()
            .into();

        let parse_number = |name| tags.get(name).and_then(|v| v.parse::<u64>().ok());

        let (identity, instance) = match signature_type {
            SignatureType::Dkim => (tags.get_non_empty("i").map(Box::from), None),
            _ => (None, tags.get("i").and_then(|i| i.parse().ok())),
        };

        Ok(SignatureDescriptor {
            signature_type,
            algorithm,
            canonicalization,
            domain,
            selector,
            signed_headers,
            body_hash,
            signature_data,
            body_length: parse_number("l"),
            timestamp: parse_number("t"),
            expiration: parse_number("x"),
            identity,
            instance,
        })
    }
}

/// The evaluable content of a signature header.
#[derive(Clone, Debug, PartialEq)]
pub struct SignatureDescriptor {
    pub signature_type: SignatureType,
    pub algorithm: SignatureAlgorithm,
    pub canonicalization: Canonicalization,
    pub domain: DomainName,
    pub selector: Selector,
    pub signed_headers: Box<[FieldName]>,
    pub body_hash: Option<Box<[u8]>>,
    pub signature_data: Box<[u8]>,
    pub body_length: Option<u64>,
    pub timestamp: Option<u64>,
    pub expiration: Option<u64>,
    /// The DKIM *i=* value, unparsed.
    pub identity: Option<Box<str>>,
    /// The ARC instance number.
    pub instance: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_spec_from_str() {
        assert_eq!(
            "rsa-sha256".parse(),
            Ok(AlgorithmSpec::new(Some(KeyType::Rsa), HashAlgorithm::Sha256))
        );
        assert_eq!("sha1".parse(), Ok(AlgorithmSpec::new(None, HashAlgorithm::Sha1)));
        assert_eq!(
            "ed25519-sha1".parse::<AlgorithmSpec>(),
            Err(ConfigError::InvalidAlgorithm)
        );
        assert_eq!("dsa-sha256".parse::<AlgorithmSpec>(), Err(ConfigError::InvalidAlgorithm));
        assert_eq!(ConfigError::InvalidAlgorithm.code(), "EINVALIDALGO");
    }

    #[test]
    fn algorithm_spec_resolve() {
        let spec = AlgorithmSpec::new(None, HashAlgorithm::Sha256);
        assert_eq!(spec.resolve(KeyType::Ed25519), Some(SignatureAlgorithm::Ed25519Sha256));

        let spec = AlgorithmSpec::new(Some(KeyType::Rsa), HashAlgorithm::Sha256);
        assert_eq!(spec.resolve(KeyType::Ed25519), None);
    }

    #[test]
    fn canonicalization_from_str() {
        assert_eq!(
            "relaxed".parse(),
            Ok(Canonicalization::new(
                CanonicalizationAlgorithm::Relaxed,
                CanonicalizationAlgorithm::Simple
            ))
        );
        assert_eq!("Relaxed/Relaxed".parse(), Ok(Canonicalization::RELAXED));
        assert_eq!(
            "relaxed/loose".parse::<Canonicalization>(),
            Err(ConfigError::InvalidCanonicalization)
        );
        assert_eq!(Canonicalization::RELAXED.to_string(), "relaxed/relaxed");
    }

    fn header(signature_type: SignatureType, value: &str) -> SignatureHeader {
        let line = format!("{}:{value}", signature_type.header_name());
        let field = HeaderField::from_line(line.into_bytes()).unwrap();
        SignatureHeader::new(signature_type, field)
    }

    #[test]
    fn descriptor_ok() {
        let sig = header(
            SignatureType::Dkim,
            " v=1; a=rsa-sha256; c=relaxed; d=example.com; s=sel;\r\n\
            \th=From : To; l=12; t=100; x=200; bh=YWJj; b=ZGVm",
        );

        let desc = sig.descriptor().unwrap();

        assert_eq!(desc.algorithm, SignatureAlgorithm::RsaSha256);
        assert_eq!(desc.canonicalization.body, CanonicalizationAlgorithm::Simple);
        assert_eq!(desc.domain.as_ref(), "example.com");
        assert_eq!(desc.signed_headers.len(), 2);
        assert_eq!(desc.body_length, Some(12));
        assert_eq!(desc.expiration, Some(200));
        assert_eq!(desc.body_hash.as_deref(), Some(&b"abc"[..]));
        assert_eq!(&*desc.signature_data, b"def");
    }

    #[test]
    fn descriptor_skip_rules() {
        let sig = header(SignatureType::Dkim, " a=dsa-sha256; d=example.com; s=sel");
        assert_eq!(sig.descriptor(), Err(DescriptorError::UnsupportedAlgorithm));

        let sig = header(SignatureType::Arc, " i=1; a=rsa-sha1; d=example.com; s=sel");
        assert_eq!(sig.descriptor(), Err(DescriptorError::UnsupportedHashAlgorithm));

        let sig = header(SignatureType::Dkim, " a=rsa-sha1; d=example.com; s=sel");
        assert!(sig.descriptor().is_ok());

        let sig = header(SignatureType::Dkim, " a=rsa-sha256; c=nowsp; d=example.com; s=sel");
        assert_eq!(sig.descriptor(), Err(DescriptorError::UnsupportedCanonicalization));

        let sig = header(SignatureType::Dkim, " a=rsa-sha256; s=sel");
        assert_eq!(sig.descriptor(), Err(DescriptorError::MissingDomain));

        let sig = header(SignatureType::ArcSeal, " i=2; a=rsa-sha256; cv=pass; d=example.com; s=sel");
        let desc = sig.descriptor().unwrap();
        assert_eq!(desc.canonicalization, Canonicalization::RELAXED);
        assert_eq!(desc.instance, Some(2));
    }
}
