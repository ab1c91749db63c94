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

//! ARC: Authenticated Received Chain.
//!
//! An ARC chain is a sequence of ARC sets, each added by one intermediary
//! handling the message. A set consists of three header fields sharing an
//! instance number: ARC-Authentication-Results, ARC-Message-Signature, and
//! ARC-Seal. The message signature works like a DKIM signature; the seal
//! signs the chain up to and including its own set.

mod chain;
mod seal;
pub mod trust;
mod verify;

pub use self::{
    chain::{ArcChain, ArcSet, MAX_ARC_INSTANCES},
    seal::{seal, ArcSealHeaders, SealError, SealRequest},
};
pub(crate) use self::verify::evaluate_chain;

use crate::{
    header::HeaderFields,
    signature::{
        ChainValidationStatus, DomainName, ARC_AUTHENTICATION_RESULTS_NAME,
        ARC_MESSAGE_SIGNATURE_NAME, ARC_SEAL_NAME,
    },
    tag_list::TagList,
    util::{self, CanonicalStr},
    verifier::VerificationResult,
};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

/// The kind of a broken ARC chain.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ArcErrorKind {
    MultipleArcKeys,
    InvalidArcCount,
    InvalidArcInstance,
    MissingArcHeader,
    InvalidCvValue,
    UnexpectedHValue,
    FailingArcSeal,
    InvalidArcSeal,
    FailingMessageSignature,
}

impl ArcErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::MultipleArcKeys => "multiple_arc_keys",
            Self::InvalidArcCount => "invalid_arc_count",
            Self::InvalidArcInstance => "invalid_arc_instance",
            Self::MissingArcHeader => "missing_arc_header",
            Self::InvalidCvValue => "invalid_cv_value",
            Self::UnexpectedHValue => "unexpected_h_value",
            Self::FailingArcSeal => "failing_arc_seal",
            Self::InvalidArcSeal => "invalid_arc_seal",
            Self::FailingMessageSignature => "failing_arc_message_signature",
        }
    }
}

impl Display for ArcErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultipleArcKeys => write!(f, "duplicate ARC header"),
            Self::InvalidArcCount => write!(f, "too many ARC instances"),
            Self::InvalidArcInstance => write!(f, "invalid ARC instance number"),
            Self::MissingArcHeader => write!(f, "missing ARC header"),
            Self::InvalidCvValue => write!(f, "unexpected cv value"),
            Self::UnexpectedHValue => write!(f, "unexpected h tag in ARC-Seal"),
            Self::FailingArcSeal => write!(f, "ARC-Seal did not verify"),
            Self::InvalidArcSeal => write!(f, "invalid ARC-Seal"),
            Self::FailingMessageSignature => write!(f, "ARC-Message-Signature did not verify"),
        }
    }
}

/// An error that breaks an ARC chain. Always permanent.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ArcError {
    pub kind: ArcErrorKind,
    /// The instance at which the chain broke, if known.
    pub instance: Option<u32>,
}

impl ArcError {
    pub fn new(kind: ArcErrorKind, instance: Option<u32>) -> Self {
        Self { kind, instance }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl Display for ArcError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.instance {
            Some(i) => write!(f, "{} at instance {i}", self.kind),
            None => self.kind.fmt(f),
        }
    }
}

impl Error for ArcError {}

/// The overall result of ARC chain evaluation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ArcResult {
    /// No ARC chain present.
    None,
    Pass,
    Fail,
}

impl CanonicalStr for ArcResult {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pass => "pass",
            Self::Fail => "fail",
        }
    }
}

impl Display for ArcResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

/// The outcome of ARC chain evaluation for a message.
#[derive(Clone, Debug, PartialEq)]
pub struct ArcOutcome {
    pub result: ArcResult,
    pub comment: Option<String>,
    pub error: Option<ArcError>,
    /// The chain, when it could be extracted.
    pub chain: Option<ArcChain>,
    /// The result for the newest ARC-Message-Signature.
    pub message_signature: Option<VerificationResult>,
    /// The signing domain of the newest ARC-Seal.
    pub sealer: Option<DomainName>,
    /// The highest instance number found in the message, even in a broken
    /// chain.
    pub highest_instance: u32,
}

impl ArcOutcome {
    /// The instance number for a new ARC set.
    pub fn next_instance(&self) -> u32 {
        self.highest_instance.saturating_add(1)
    }

    /// The *cv=* value for a new ARC-Seal.
    pub fn chain_validation(&self) -> ChainValidationStatus {
        match self.result {
            ArcResult::None => ChainValidationStatus::None,
            ArcResult::Pass => ChainValidationStatus::Pass,
            ArcResult::Fail => ChainValidationStatus::Fail,
        }
    }

    /// Whether the chain passed and was sealed last by an organization in the
    /// given list of organizational domains.
    pub fn is_trusted(&self, trusted_sealers: &[&str]) -> bool {
        self.result == ArcResult::Pass
            && self
                .sealer
                .as_ref()
                .is_some_and(|sealer| trust::is_trusted_sealer(sealer, trusted_sealers))
    }

    /// Formats the outcome as a method entry of an Authentication-Results
    /// header.
    pub fn info(&self) -> String {
        let mut info = format!("arc={}", self.result);
        if let Some(comment) = &self.comment {
            info.push_str(" (");
            info.push_str(comment);
            info.push(')');
        }
        info
    }

    fn with_comment(result: ArcResult, comment: Option<&str>, highest_instance: u32) -> Self {
        Self {
            result,
            comment: comment.map(util::sanitize_comment),
            error: None,
            chain: None,
            message_signature: None,
            sealer: None,
            highest_instance,
        }
    }
}

/// Returns the highest ARC instance number found in the header, or 0.
///
/// This is lenient: header fields with a missing or unparseable *i=* tag are
/// ignored, and the chain need not be valid.
pub fn highest_instance(headers: &HeaderFields) -> u32 {
    headers
        .as_ref()
        .iter()
        .filter(|f| {
            let name = f.name();
            *name == ARC_SEAL_NAME
                || *name == ARC_MESSAGE_SIGNATURE_NAME
                || *name == ARC_AUTHENTICATION_RESULTS_NAME
        })
        .filter_map(|f| {
            let value = String::from_utf8_lossy(f.body());
            TagList::parse(&value).get("i")?.parse::<u32>().ok()
        })
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_instance_lenient() {
        let headers: HeaderFields = "ARC-Seal: i=2; a=rsa-sha256; cv=pass\r\n\
            ARC-Authentication-Results: i=3; mx.example.org; spf=pass\r\n\
            ARC-Message-Signature: i=x; a=rsa-sha256\r\n\
            DKIM-Signature: i=7; a=rsa-sha256\r\n\
            From: me@example.com\r\n"
            .parse()
            .unwrap();

        assert_eq!(highest_instance(&headers), 3);

        let headers: HeaderFields = "From: me@example.com\r\n".parse().unwrap();
        assert_eq!(highest_instance(&headers), 0);
    }

    #[test]
    fn arc_error_code() {
        let error = ArcError::new(ArcErrorKind::InvalidArcInstance, Some(4));
        assert_eq!(error.code(), "invalid_arc_instance");
        assert_eq!(error.to_string(), "invalid ARC instance number at instance 4");
    }

    #[test]
    fn outcome_next_instance() {
        let outcome = ArcOutcome::with_comment(ArcResult::Fail, Some("Broken!"), 2);
        assert_eq!(outcome.next_instance(), 3);
        assert_eq!(outcome.chain_validation(), ChainValidationStatus::Fail);
        assert_eq!(outcome.info(), "arc=fail (broken)");
        assert!(!outcome.is_trusted(trust::DEFAULT_TRUSTED_SEALERS));
    }
}
