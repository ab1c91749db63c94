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
    canonicalize::{self, SigningInput},
    crypto::{self, VerificationError, VerifyingKey},
    header::HeaderFields,
    message_hash::{self, BodyHashResult, BodyHashResults, BodyHasherKey},
    signature::{SignatureDescriptor, SignatureHeader},
    verifier::{
        key::{self, KeyError, PublicKeyInfo},
        query::KeyResults,
        DkimResult, PolicyTag, VerificationResult, VerificationStatus,
    },
};
use std::fmt::Write;
use tracing::trace;

/// A signature that passed the initial checks and awaits evaluation.
pub struct VerifyTask {
    /// Index of the signature header in the message header.
    pub index: usize,
    pub header: SignatureHeader,
    pub descriptor: SignatureDescriptor,
}

pub fn body_hasher_key(sig: &SignatureDescriptor) -> BodyHasherKey {
    let limit = sig
        .body_length
        .map(|l| usize::try_from(l).unwrap_or(usize::MAX));
    (sig.canonicalization.body, sig.algorithm.hash_algorithm(), limit)
}

pub fn body_hash_matches(sig: &SignatureDescriptor, hasher_results: &BodyHashResults) -> bool {
    match (&sig.body_hash, hasher_results.get(&body_hasher_key(sig))) {
        (Some(expected), Some(computed)) => *expected == computed.hash.digest,
        _ => false,
    }
}

/// Evaluates one signature, given the body hash results and the key lookups
/// already performed.
pub fn evaluate(
    headers: &HeaderFields,
    task: &VerifyTask,
    hasher_results: &BodyHashResults,
    keys: &KeyResults,
    now: u64,
) -> VerificationResult {
    let sig = &task.descriptor;

    let body: Option<&BodyHashResult> = hasher_results.get(&body_hasher_key(sig));
    let selected = canonicalize::select_verify_headers(headers, &sig.signed_headers);

    let mut result = VerificationResult {
        status: VerificationStatus::new(DkimResult::Neutral, None),
        index: Some(task.index),
        id: Some(signature_id(&sig.signature_data)),
        signed_headers: selected.iter().map(|f| f.name().clone()).collect(),
        body: body.map(|b| b.hash.clone()),
        mime_structure_start: body.and_then(|b| b.mime_structure_start),
        signature: Some(sig.clone()),
        public_key: None,
        record: None,
        modulus_length: None,
    };

    result.status = if body_hash_matches(sig, hasher_results) {
        let name = key::query_name(&sig.selector, &sig.domain);

        match keys.get(sig.signature_type, &name) {
            Ok(info) if !info.allows_hash(sig.algorithm.hash_algorithm()) => {
                trace!(domain = %sig.domain, "hash algorithm not allowed by key record");
                let status =
                    VerificationStatus::new(DkimResult::Neutral, Some("hash algorithm not allowed"));
                result.set_key_info(info);
                status
            }
            Ok(info) => {
                let status = match perform_verification(headers, task, &info.key) {
                    Ok(()) => check_expiration(sig, now),
                    Err(e) => status_from_verification_error(e),
                };
                result.set_key_info(info);
                status
            }
            Err(e @ KeyError::ShortKey(_)) => {
                trace!(domain = %sig.domain, "public key too short");
                let status = status_from_key_error(&e);
                if let KeyError::ShortKey(info) = e {
                    result.set_key_info(*info);
                }
                status
            }
            Err(e) => status_from_key_error(&e),
        }
    } else {
        trace!(domain = %sig.domain, "body hash mismatch");
        VerificationStatus::new(DkimResult::Neutral, Some("body hash did not verify"))
    };

    if sig.body_length.is_some() {
        result.status.under_sized = body
            .map(|b| b.hash.canonicalized_length.saturating_sub(b.hash.hashed_length))
            .filter(|&n| n > 0);
    }

    result
}

/// Verifies the cryptographic signature over the signing input.
pub fn perform_verification(
    headers: &HeaderFields,
    task: &VerifyTask,
    public_key: &VerifyingKey,
) -> Result<(), VerificationError> {
    let sig = &task.descriptor;

    if public_key.key_type() != sig.algorithm.key_type() {
        return Err(VerificationError::KeyTypeMismatch);
    }

    let hash_alg = sig.algorithm.hash_algorithm();

    let selected = canonicalize::select_verify_headers(headers, &sig.signed_headers);

    let data_hash = message_hash::compute_data_hash(
        hash_alg,
        sig.canonicalization.header,
        &selected,
        SigningInput::Verbatim(&task.header.field),
    );

    match crypto::verify(public_key, hash_alg, &data_hash, &sig.signature_data) {
        Ok(()) => {
            trace!(domain = %sig.domain, "signature verification successful");
            Ok(())
        }
        Err(e) => {
            trace!(domain = %sig.domain, "signature verification failed: {e}");
            Err(e)
        }
    }
}

fn check_expiration(sig: &SignatureDescriptor, now: u64) -> VerificationStatus {
    match (sig.expiration, sig.timestamp) {
        (Some(x), Some(t)) if x < t => {
            VerificationStatus::new(DkimResult::Neutral, Some("invalid expiration"))
        }
        (Some(x), _) if x < now => VerificationStatus::new(DkimResult::Neutral, Some("expired")),
        _ => VerificationStatus::new(DkimResult::Pass, None),
    }
}

fn status_from_verification_error(error: VerificationError) -> VerificationStatus {
    match error {
        VerificationError::VerificationFailure | VerificationError::InvalidSignature => {
            VerificationStatus::new(DkimResult::Fail, Some("bad signature"))
        }
        e @ (VerificationError::InvalidKey | VerificationError::KeyTypeMismatch) => {
            VerificationStatus::new(DkimResult::Neutral, Some(&e.to_string()))
        }
    }
}

pub fn status_from_key_error(error: &KeyError) -> VerificationStatus {
    let (result, comment) = match error {
        KeyError::ShortKey(_) => {
            let mut status = VerificationStatus::new(DkimResult::Policy, None);
            status.policy = Some(PolicyTag::WEAK_KEY);
            return status;
        }
        KeyError::NotFound => (DkimResult::Neutral, "no key".into()),
        KeyError::InvalidVersion => (DkimResult::Neutral, "unknown key version".into()),
        KeyError::InvalidType => (DkimResult::Neutral, "unknown key type".into()),
        KeyError::InvalidValue => (DkimResult::Neutral, "invalid public key".into()),
        e @ KeyError::Dns(_) => (DkimResult::Temperror, e.to_string()),
    };
    VerificationStatus::new(result, Some(&comment))
}

/// Hex-encoded SHA-256 digest of the signature data.
fn signature_id(signature_data: &[u8]) -> String {
    let digest = crypto::digest_slices(crypto::HashAlgorithm::Sha256, [signature_data]);
    digest.iter().fold(String::with_capacity(64), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

impl VerificationResult {
    fn set_key_info(&mut self, info: PublicKeyInfo) {
        self.public_key = info.public_key_pem;
        self.record = Some(info.record);
        self.modulus_length = info.modulus_length;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::SignatureType;
    use std::io::ErrorKind;

    fn descriptor(value: &str) -> SignatureDescriptor {
        let line = format!("DKIM-Signature:{value}");
        let field = crate::header::HeaderField::from_line(line.into_bytes()).unwrap();
        SignatureHeader::new(SignatureType::Dkim, field).descriptor().unwrap()
    }

    #[test]
    fn check_expiration_ok() {
        let sig = descriptor(" a=rsa-sha256; d=example.com; s=sel; t=100; x=50");
        assert_eq!(check_expiration(&sig, 10).comment.as_deref(), Some("invalid expiration"));

        let sig = descriptor(" a=rsa-sha256; d=example.com; s=sel; t=100; x=200");
        assert_eq!(check_expiration(&sig, 150).result, DkimResult::Pass);
        assert_eq!(check_expiration(&sig, 250).comment.as_deref(), Some("expired"));
    }

    #[test]
    fn status_from_key_error_ok() {
        let status = status_from_key_error(&KeyError::NotFound);
        assert_eq!(status.result, DkimResult::Neutral);
        assert_eq!(status.comment.as_deref(), Some("no key"));

        let status = status_from_key_error(&KeyError::Dns(ErrorKind::TimedOut));
        assert_eq!(status.result, DkimResult::Temperror);
        assert_eq!(status.comment.as_deref(), Some("dns failure timed out"));
    }

    #[test]
    fn body_hasher_key_from_signature() {
        let sig = descriptor(" a=rsa-sha1; c=simple/relaxed; d=example.com; s=sel; l=10");
        assert_eq!(
            body_hasher_key(&sig),
            (
                crate::signature::CanonicalizationAlgorithm::Relaxed,
                crypto::HashAlgorithm::Sha1,
                Some(10)
            )
        );
    }

    #[test]
    fn signature_id_is_hex_digest() {
        assert_eq!(
            signature_id(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
