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

//! Verifier and supporting types.

mod key;
mod lookup;
pub(crate) mod query;
mod verify;

pub use self::{
    key::{query_name, resolve_public_key, KeyError, PublicKeyInfo},
    lookup::LookupTxt,
};

use crate::{
    alignment,
    arc::{self, ArcChain, ArcError, ArcOutcome},
    canonicalize::BodyHash,
    crypto::HashAlgorithm,
    header::{FieldName, HeaderFields},
    message::MessageHandler,
    message_hash::{BodyHasher, BodyHasherBuilder, BodyHasherKey},
    signature::{
        CanonicalizationAlgorithm, SignatureDescriptor, SignatureHeader, SignatureType,
        DKIM_SIGNATURE_NAME,
    },
    util::{self, CanonicalStr},
    verifier::{
        query::QueriesBuilder,
        verify::VerifyTask,
    },
};
use std::{
    fmt::{self, Display, Formatter, Write},
    time::SystemTime,
};
use tracing::{debug, trace};

/// The body hash computed for sealing: relaxed body canonicalization,
/// SHA-256, entire body.
const SEAL_BODY_HASHER_KEY: BodyHasherKey =
    (CanonicalizationAlgorithm::Relaxed, HashAlgorithm::Sha256, None);

/// Configuration for a verifier process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Minimum acceptable RSA key size in bits. A signature made with a
    /// shorter key gets result *policy* with `dkim-rules=weak-key`.
    pub min_key_bits: usize,

    /// Only evaluate at most this number of DKIM signatures, any extra
    /// signatures are ignored.
    pub max_signatures: usize,

    /// When this flag is set, the body hash needed for sealing the message
    /// with a new ARC set is computed along the way and returned in
    /// [`VerificationOutput::seal_body_hash`].
    pub seal: bool,

    /// The `SystemTime` value to use as the instant ‘now’.
    pub fixed_system_time: Option<SystemTime>,
}

impl Config {
    fn current_timestamp(&self) -> u64 {
        self.fixed_system_time
            .unwrap_or_else(SystemTime::now)
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_key_bits: 1024,
            max_signatures: 50,
            seal: false,
            fixed_system_time: None,
        }
    }
}

/// An RFC 8601 DKIM result.
///
/// As a general rule, `Neutral` is the result for a signature that could not
/// be evaluated to the end, while `Fail`, `Policy`, and `Temperror` concern a
/// well-understood signature.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DkimResult {
    /// The *none* result. This result indicates that a message was not signed.
    None,

    /// The *pass* result. This result means that verification could be
    /// performed on a signature, and the verification was successful.
    Pass,

    /// The *fail* result. This result means that the signature was understood
    /// and verification could be performed, and the cryptographic
    /// verification failed.
    Fail,

    /// The *policy* result. The signature could be verified, but some aspect
    /// of it was unacceptable, for example a public key that is too short.
    Policy,

    /// The *neutral* result. This result means that a signature could not be
    /// entirely evaluated.
    ///
    /// Examples include: body hash mismatch, no key record, unknown key type,
    /// expired signature.
    Neutral,

    /// The *temperror* result. This result means that signature evaluation
    /// could not be performed due to a temporary reason that might be gone when
    /// evaluation is retried.
    ///
    /// Examples include: DNS lookup timeout, temporary I/O error.
    Temperror,
}

impl CanonicalStr for DkimResult {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Policy => "policy",
            Self::Neutral => "neutral",
            Self::Temperror => "temperror",
        }
    }
}

impl Display for DkimResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

/// A policy property attached to a *policy* result.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PolicyTag {
    pub property: &'static str,
    pub value: &'static str,
}

impl PolicyTag {
    pub const WEAK_KEY: Self = Self {
        property: "dkim-rules",
        value: "weak-key",
    };
}

impl Display for PolicyTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "policy.{}={}", self.property, self.value)
    }
}

/// The status of an evaluated signature.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VerificationStatus {
    pub result: DkimResult,
    /// A short, header-safe comment.
    pub comment: Option<String>,
    pub policy: Option<PolicyTag>,
    /// The signing domain, when it is aligned with the From domain.
    pub aligned: Option<String>,
    /// The number of canonicalized body bytes not covered by the signature,
    /// when the *l=* tag truncated the body.
    pub under_sized: Option<usize>,
}

impl VerificationStatus {
    pub fn new(result: DkimResult, comment: Option<&str>) -> Self {
        Self {
            result,
            comment: comment.map(util::sanitize_comment),
            policy: None,
            aligned: None,
            under_sized: None,
        }
    }
}

/// A verification result arrived at for some signature header.
#[derive(Clone, Debug, PartialEq)]
pub struct VerificationResult {
    pub status: VerificationStatus,
    /// The index of the evaluated signature header in the message header.
    pub index: Option<usize>,
    /// Hex-encoded SHA-256 digest of the signature data.
    pub id: Option<String>,
    /// The signature as read from the header.
    pub signature: Option<SignatureDescriptor>,
    /// The names of the header fields actually covered, bottom-most first.
    pub signed_headers: Vec<FieldName>,
    /// The computed body hash and body length counters.
    pub body: Option<BodyHash>,
    pub mime_structure_start: Option<usize>,
    /// The public key in PEM format.
    pub public_key: Option<String>,
    /// The DNS key record text.
    pub record: Option<Box<str>>,
    pub modulus_length: Option<usize>,
}

impl VerificationResult {
    fn not_signed() -> Self {
        Self {
            status: VerificationStatus::new(DkimResult::None, Some("message not signed")),
            index: None,
            id: None,
            signature: None,
            signed_headers: vec![],
            body: None,
            mime_structure_start: None,
            public_key: None,
            record: None,
            modulus_length: None,
        }
    }

    /// Formats this result as a method entry of an Authentication-Results
    /// header, for example `dkim=pass header.i=@example.com header.s=sel
    /// header.a=rsa-sha256 header.b=Ab1Cd2Ef`.
    pub fn info(&self) -> String {
        let status = &self.status;

        let mut info = format!("dkim={}", status.result);

        if let Some(comment) = &status.comment {
            let _ = write!(info, " ({comment})");
        }
        if let Some(policy) = &status.policy {
            let _ = write!(info, " {policy}");
        }

        if let Some(sig) = &self.signature {
            let _ = write!(
                info,
                " header.i=@{} header.s={} header.a={}",
                sig.domain.to_ascii(),
                sig.selector.to_ascii(),
                sig.algorithm,
            );
            if !sig.signature_data.is_empty() {
                let b = util::encode_base64(&sig.signature_data);
                let _ = write!(info, " header.b={}", &b[..b.len().min(8)]);
            }
        }

        info
    }
}

/// The outcome of verifying a message.
#[derive(Clone, Debug, PartialEq)]
pub struct VerificationOutput {
    /// One result per evaluated DKIM signature, in header order; never empty.
    pub results: Vec<VerificationResult>,
    pub arc: ArcOutcome,
    /// The relaxed/SHA-256 body hash, if sealing was requested.
    pub seal_body_hash: Option<BodyHash>,
}

impl VerificationOutput {
    /// Renders the results as the value of an Authentication-Results header
    /// (without the leading space).
    pub fn to_authentication_results(&self, authserv_id: &str) -> String {
        let mut value = String::from(authserv_id);
        for result in &self.results {
            value.push_str("; ");
            value.push_str(&result.info());
        }
        value.push_str("; ");
        value.push_str(&self.arc.info());
        value
    }
}

/// A verifier of DKIM and ARC signatures in an email message.
///
/// `Verifier` consumes the message through [`MessageHandler`]: first the
/// header, where the signatures to evaluate are found and the body hashers
/// are set up, then the body in chunks of any size. The async
/// [`finish`][Verifier::finish] performs the key lookups and the
/// cryptographic checks.
///
/// # Examples
///
/// ```
/// use viaseal::{
///     message::MessageSegmenter,
///     verifier::{Config, LookupTxt, Verifier},
/// };
///
/// async fn print_results<T>(resolver: &T, message: &[u8])
/// where
///     T: LookupTxt + Clone + 'static,
/// {
///     let mut verifier = Verifier::new(Config::default());
///
///     MessageSegmenter::process(&mut verifier, message);
///
///     let output = verifier.finish(resolver).await;
///
///     for result in &output.results {
///         println!("{}", result.info());
///     }
///     println!("{}", output.arc.info());
/// }
/// ```
pub struct Verifier {
    config: Config,
    headers: Option<HeaderFields>,
    tasks: Vec<VerifyTask>,
    arc_chain: Option<Result<ArcChain, ArcError>>,
    message_signature: Option<VerifyTask>,
    body_hasher: Option<BodyHasher>,
}

impl Verifier {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            headers: None,
            tasks: vec![],
            arc_chain: None,
            message_signature: None,
            body_hasher: None,
        }
    }

    /// Finishes the verification process and returns the results.
    pub async fn finish<T>(self, resolver: &T) -> VerificationOutput
    where
        T: LookupTxt + Clone + 'static,
    {
        let headers = self.headers.unwrap_or_default();
        let hasher_results = self.body_hasher.map(BodyHasher::finish).unwrap_or_default();
        let now = self.config.current_timestamp();
        let arc_chain = self.arc_chain.unwrap_or_else(|| Ok(ArcChain::default()));

        // Keys are only looked up for signatures whose body hash matches.
        let mut queries = QueriesBuilder::new();
        for task in self.tasks.iter().chain(&self.message_signature) {
            let sig = &task.descriptor;
            if verify::body_hash_matches(sig, &hasher_results) {
                queries.add_lookup(sig.signature_type, query_name(&sig.selector, &sig.domain));
            }
        }
        if let Ok(chain) = &arc_chain {
            for set in chain.sets() {
                if let Ok(seal) = set.seal.descriptor() {
                    queries.add_lookup(SignatureType::ArcSeal, query_name(&seal.selector, &seal.domain));
                }
            }
        }

        let keys = queries.spawn_all(resolver, self.config.min_key_bits).await;

        let from_domain = alignment::from_domain(&headers);

        let mut results: Vec<_> = self
            .tasks
            .iter()
            .map(|task| {
                let mut result = verify::evaluate(&headers, task, &hasher_results, &keys, now);
                if let Some(from_domain) = &from_domain {
                    result.status.aligned =
                        alignment::get_alignment(from_domain, [&task.descriptor.domain])
                            .map(|d| d.to_ascii());
                }
                result
            })
            .collect();

        let message_signature = self
            .message_signature
            .as_ref()
            .map(|task| verify::evaluate(&headers, task, &hasher_results, &keys, now));

        let arc = arc::evaluate_chain(&headers, arc_chain, message_signature, &keys);

        if results.is_empty() {
            results.push(VerificationResult::not_signed());
        }

        let seal_body_hash = if self.config.seal {
            hasher_results.get(&SEAL_BODY_HASHER_KEY).map(|r| r.hash.clone())
        } else {
            None
        };

        VerificationOutput {
            results,
            arc,
            seal_body_hash,
        }
    }
}

impl MessageHandler for Verifier {
    fn message_headers(&mut self, headers: HeaderFields) {
        let signature_fields = headers
            .as_ref()
            .iter()
            .enumerate()
            .filter(|(_, f)| *f.name() == DKIM_SIGNATURE_NAME);

        for (index, field) in signature_fields {
            if self.tasks.len() >= self.config.max_signatures {
                debug!("too many signatures, ignoring the rest");
                break;
            }

            let header = SignatureHeader::new(SignatureType::Dkim, field.clone());

            match header.descriptor() {
                Ok(descriptor) => self.tasks.push(VerifyTask { index, header, descriptor }),
                Err(e) => trace!(index, "skipping signature: {e}"),
            }
        }

        let arc_chain = ArcChain::extract(&headers);

        match &arc_chain {
            Ok(chain) => {
                self.message_signature = chain.newest().and_then(|set| {
                    let header = set.message_signature.clone();
                    let index = headers.as_ref().iter().position(|f| *f == header.field)?;
                    match header.descriptor() {
                        Ok(descriptor) => Some(VerifyTask { index, header, descriptor }),
                        Err(e) => {
                            trace!(index, "skipping ARC message signature: {e}");
                            None
                        }
                    }
                });
            }
            Err(e) => debug!("invalid ARC chain: {e}"),
        }

        let mut builder = BodyHasherBuilder::new();
        for task in self.tasks.iter().chain(&self.message_signature) {
            builder.register_canonicalization(verify::body_hasher_key(&task.descriptor));
        }
        if self.config.seal {
            builder.register_canonicalization(SEAL_BODY_HASHER_KEY);
        }

        self.body_hasher = Some(builder.build(&headers));
        self.arc_chain = Some(arc_chain);
        self.headers = Some(headers);
    }

    fn body_chunk(&mut self, chunk: &[u8]) {
        if let Some(body_hasher) = &mut self.body_hasher {
            body_hasher.hash_chunk(chunk);
        }
    }
}
