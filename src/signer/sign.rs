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
    arc,
    canonicalize::{self, SigningInput},
    crypto::{self, SigningKey},
    header::{HeaderField, HeaderFields},
    message_hash::{self, BodyHashResults},
    signature::{
        format::{self, SignatureTemplate},
        CanonicalizationAlgorithm, SignatureAlgorithm, SignatureType,
    },
    signer::{
        request::{self, BodyLength, HeaderSelection, SignRequest, Timestamp},
        SignerError, SigningResult,
    },
};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::trace;

pub fn perform_signing<T>(
    request: &SignRequest<T>,
    headers: &HeaderFields,
    hasher_results: &BodyHashResults,
) -> Result<SigningResult, SignerError>
where
    T: AsRef<SigningKey>,
{
    let signing_key = request.signing_key.as_ref();
    let signature_type = request.signature_type;

    let algorithm = resolve_algorithm(request, signing_key)?;
    if !signature_type.allows_hash(algorithm.hash_algorithm()) {
        return Err(SignerError::InvalidAlgorithm);
    }

    let instance = match signature_type {
        SignatureType::Dkim => None,
        _ => {
            let i = request
                .arc_instance
                .unwrap_or_else(|| arc::highest_instance(headers).saturating_add(1));
            if i == 0 || i as usize > arc::MAX_ARC_INSTANCES {
                return Err(SignerError::InvalidInstance);
            }
            Some(i)
        }
    };

    let names = match &request.header_selection {
        HeaderSelection::Auto => request::default_signed_headers(signature_type),
        HeaderSelection::Manual(names) => names.clone(),
    };
    let names: Vec<_> = match signature_type {
        SignatureType::Dkim => names,
        _ => names.into_iter().filter(|n| !request::is_arc_header(n)).collect(),
    };

    let selected = canonicalize::select_signing_headers(headers, &names);

    if signature_type == SignatureType::Dkim && !selected.iter().any(|f| *f.name() == "From") {
        return Err(SignerError::FromHeaderNotSigned);
    }

    let key = (
        request.canonicalization.body,
        algorithm.hash_algorithm(),
        request.body_length.limit(),
    );
    let body = &hasher_results
        .get(&key)
        .ok_or(SignerError::SigningFailure)?
        .hash;

    let body_length = match request.body_length {
        BodyLength::All => None,
        BodyLength::MessageContent | BodyLength::Exact(_) => Some(body.hashed_length as u64),
    };

    let timestamp = request.timestamp.map(|t| match t {
        Timestamp::Now => now_unix_secs(),
        Timestamp::Exact(t) => t,
    });
    let expiration = request.valid_duration.map(|duration| {
        timestamp
            .unwrap_or_else(now_unix_secs)
            .saturating_add(duration.as_secs())
    });

    let template = SignatureTemplate {
        signature_type,
        algorithm,
        canonicalization: request.canonicalization,
        domain: request.domain.clone(),
        selector: request.selector.clone(),
        identity: request.identity.clone(),
        instance,
        signed_headers: selected.iter().map(|f| f.name().clone()).collect(),
        body_length,
        timestamp,
        expiration,
        chain_validation: None,
        body_hash: Some(body.digest.clone()),
    };

    produce_signature(&template, signing_key, &selected)
}

fn resolve_algorithm<T>(
    request: &SignRequest<T>,
    signing_key: &SigningKey,
) -> Result<SignatureAlgorithm, SignerError> {
    let key_type = signing_key.key_type();
    match request.algorithm.key_type {
        Some(k) if k != key_type => Err(SignerError::KeyTypeMismatch),
        _ => request
            .algorithm
            .resolve(key_type)
            .ok_or(SignerError::InvalidAlgorithm),
    }
}

/// Formats and signs a signature header over the selected headers.
pub fn produce_signature(
    template: &SignatureTemplate,
    signing_key: &SigningKey,
    selected: &[&HeaderField],
) -> Result<SigningResult, SignerError> {
    let algorithm = template.algorithm;
    if signing_key.key_type() != algorithm.key_type() {
        return Err(SignerError::KeyTypeMismatch);
    }

    let header_canon = template.canonicalization.header;
    let fold = header_canon == CanonicalizationAlgorithm::Relaxed;

    let (mut header_value, insertion_i) = format::format_without_signature(template, fold);

    let header_name = template.signature_type.header_name();
    let hash_alg = algorithm.hash_algorithm();

    let data_hash = message_hash::compute_data_hash(
        hash_alg,
        header_canon,
        selected,
        SigningInput::Fresh(header_name, &header_value),
    );

    let signature_data = crypto::sign(signing_key, hash_alg, &data_hash).map_err(|e| {
        trace!("could not sign: {e}");
        SignerError::SigningFailure
    })?;

    format::insert_signature_data(
        template.signature_type,
        &mut header_value,
        insertion_i,
        &signature_data,
    );

    trace!(
        signature_type = %template.signature_type,
        domain = %template.domain,
        "produced signature"
    );

    Ok(SigningResult {
        signature_type: template.signature_type,
        header_name,
        header_value,
        signed_headers: template.signed_headers.clone(),
    })
}

pub fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        header::FieldName,
        signature::{Canonicalization, DomainName, Selector, SignatureHeader},
    };

    fn ed25519_key() -> SigningKey {
        SigningKey::from_pem(include_str!("../../tests/keys/ed25519.pem")).unwrap()
    }

    #[test]
    fn produce_signature_simple_canonicalization() {
        let headers: HeaderFields = "From: me@example.com\r\nTo: you@example.org\r\n".parse().unwrap();
        let names = [FieldName::new("From").unwrap(), FieldName::new("To").unwrap()];
        let selected = canonicalize::select_signing_headers(&headers, &names);

        let template = SignatureTemplate {
            signature_type: SignatureType::Dkim,
            algorithm: SignatureAlgorithm::Ed25519Sha256,
            canonicalization: Canonicalization::default(),
            domain: DomainName::new("example.com").unwrap(),
            selector: Selector::new("sel").unwrap(),
            identity: None,
            instance: None,
            signed_headers: selected.iter().map(|f| f.name().clone()).collect(),
            body_length: None,
            timestamp: Some(1),
            expiration: None,
            chain_validation: None,
            body_hash: Some(Box::new([0; 32])),
        };

        let result = produce_signature(&template, &ed25519_key(), &selected).unwrap();

        // the tag list stays on a single line
        let (tags, _) = result.header_value.split_once(" b=").unwrap();
        assert!(!tags.contains("\r\n"));
        assert_eq!(result.to_string(), format!("DKIM-Signature:{}", result.header_value));

        let field = HeaderField::from_line(result.to_string().into_bytes()).unwrap();
        let descriptor = SignatureHeader::new(SignatureType::Dkim, field).descriptor().unwrap();
        assert_eq!(descriptor.signature_data.len(), 64);
    }

    #[test]
    fn produce_signature_key_mismatch() {
        let headers: HeaderFields = "From: me@example.com\r\n".parse().unwrap();
        let selected: Vec<_> = headers.as_ref().iter().collect();

        let template = SignatureTemplate {
            signature_type: SignatureType::Dkim,
            algorithm: SignatureAlgorithm::RsaSha256,
            canonicalization: Canonicalization::RELAXED,
            domain: DomainName::new("example.com").unwrap(),
            selector: Selector::new("sel").unwrap(),
            identity: None,
            instance: None,
            signed_headers: vec![FieldName::new("From").unwrap()],
            body_length: None,
            timestamp: None,
            expiration: None,
            chain_validation: None,
            body_hash: Some(Box::new([0; 32])),
        };

        assert_eq!(
            produce_signature(&template, &ed25519_key(), &selected),
            Err(SignerError::KeyTypeMismatch)
        );
    }
}
