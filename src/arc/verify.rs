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
    arc::{self, ArcChain, ArcError, ArcErrorKind, ArcOutcome, ArcResult, ArcSet},
    canonicalize::SigningInput,
    crypto,
    header::{HeaderField, HeaderFields},
    message_hash,
    signature::{CanonicalizationAlgorithm, ChainValidationStatus, SignatureType},
    util,
    verifier::{query::KeyResults, query_name, DkimResult, VerificationResult},
};
use tracing::{debug, trace};

/// Arrives at the ARC outcome for a message: the chain structure, the seals
/// from newest to oldest, and the newest message signature.
pub(crate) fn evaluate_chain(
    headers: &HeaderFields,
    chain: Result<ArcChain, ArcError>,
    message_signature: Option<VerificationResult>,
    keys: &KeyResults,
) -> ArcOutcome {
    let highest_instance = arc::highest_instance(headers);

    let chain = match chain {
        Ok(chain) => chain,
        Err(e) => {
            debug!("ARC chain structurally invalid: {e}");
            return failed(e, None, message_signature, highest_instance);
        }
    };

    let Some(newest) = chain.newest() else {
        return ArcOutcome::with_comment(ArcResult::None, None, highest_instance);
    };

    let sealer = newest.seal.descriptor().ok().map(|d| d.domain);

    if let Err(e) = verify_seals(chain.sets(), keys) {
        debug!("ARC seal verification failed: {e}");
        let mut outcome = failed(e, Some(chain), message_signature, highest_instance);
        outcome.sealer = sealer;
        return outcome;
    }

    let newest_instance = newest.instance;
    let declared_failed = newest.chain_validation() == Some(ChainValidationStatus::Fail);
    let ams_passed = message_signature
        .as_ref()
        .is_some_and(|r| r.status.result == DkimResult::Pass);

    let mut outcome = if declared_failed {
        trace!(instance = newest_instance, "ARC chain declared failed");
        ArcOutcome::with_comment(ArcResult::Fail, Some("chain declared failed"), highest_instance)
    } else if !ams_passed {
        let e = ArcError::new(ArcErrorKind::FailingMessageSignature, Some(newest_instance));
        debug!("ARC message signature failed: {e}");
        let mut outcome = ArcOutcome::with_comment(ArcResult::Fail, Some(&e.to_string()), highest_instance);
        outcome.error = Some(e);
        outcome
    } else {
        trace!(instance = newest_instance, "ARC chain verified");
        ArcOutcome::with_comment(ArcResult::Pass, None, highest_instance)
    };

    outcome.chain = Some(chain);
    outcome.message_signature = message_signature;
    outcome.sealer = sealer;
    outcome
}

fn failed(
    error: ArcError,
    chain: Option<ArcChain>,
    message_signature: Option<VerificationResult>,
    highest_instance: u32,
) -> ArcOutcome {
    ArcOutcome {
        result: ArcResult::Fail,
        comment: Some(util::sanitize_comment(&error.to_string())),
        error: Some(error),
        chain,
        message_signature,
        sealer: None,
        highest_instance,
    }
}

/// Verifies the seals from the newest set backwards. A seal declaring the
/// chain failed ends the walk: the sets before it need not be checked.
pub(crate) fn verify_seals(sets: &[ArcSet], keys: &KeyResults) -> Result<(), ArcError> {
    for n in (1..=sets.len()).rev() {
        let prefix = &sets[..n];
        verify_seal(prefix, keys)?;

        if prefix[n - 1].chain_validation() == Some(ChainValidationStatus::Fail) {
            break;
        }
    }
    Ok(())
}

// Verifies the seal of the last set in `sets`.
fn verify_seal(sets: &[ArcSet], keys: &KeyResults) -> Result<(), ArcError> {
    let Some((current, earlier)) = sets.split_last() else {
        return Ok(());
    };
    let instance = current.instance;

    let failing = |kind| ArcError::new(kind, Some(instance));

    let sig = current
        .seal
        .descriptor()
        .map_err(|_| failing(ArcErrorKind::InvalidArcSeal))?;

    let name = query_name(&sig.selector, &sig.domain);
    let info = keys.get(SignatureType::ArcSeal, &name).map_err(|e| {
        trace!(instance, "no usable key for ARC seal: {e}");
        failing(ArcErrorKind::FailingArcSeal)
    })?;

    if info.key.key_type() != sig.algorithm.key_type()
        || !info.allows_hash(sig.algorithm.hash_algorithm())
    {
        return Err(failing(ArcErrorKind::FailingArcSeal));
    }

    let selected = seal_signing_headers(earlier, current);

    let hash_alg = sig.algorithm.hash_algorithm();
    let data_hash = message_hash::compute_data_hash(
        hash_alg,
        CanonicalizationAlgorithm::Relaxed,
        &selected,
        SigningInput::Verbatim(&current.seal.field),
    );

    crypto::verify(&info.key, hash_alg, &data_hash, &sig.signature_data).map_err(|e| {
        trace!(instance, "ARC seal did not verify: {e}");
        failing(ArcErrorKind::FailingArcSeal)
    })
}

/// The header fields covered by a seal, in signing order: all earlier sets
/// complete, then the authentication results and message signature of the
/// sealed set itself.
pub(crate) fn seal_signing_headers<'a>(
    earlier: &'a [ArcSet],
    current: &'a ArcSet,
) -> Vec<&'a HeaderField> {
    seal_signing_headers_with(
        earlier,
        &current.authentication_results,
        &current.message_signature.field,
    )
}

pub(crate) fn seal_signing_headers_with<'a>(
    earlier: &'a [ArcSet],
    authentication_results: &'a HeaderField,
    message_signature: &'a HeaderField,
) -> Vec<&'a HeaderField> {
    let mut selected = Vec::with_capacity(earlier.len() * 3 + 2);
    for set in earlier {
        selected.push(&set.authentication_results);
        selected.push(&set.message_signature.field);
        selected.push(&set.seal.field);
    }
    selected.push(authentication_results);
    selected.push(message_signature);
    selected
}
