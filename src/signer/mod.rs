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

//! Signer and supporting types.

mod request;
mod sign;

pub use self::{
    request::{
        default_signed_headers, BodyLength, HeaderSelection, SignRequest, Timestamp,
    },
    sign::produce_signature,
};
pub(crate) use self::{request::is_arc_header, sign::now_unix_secs};

use crate::{
    crypto::SigningKey,
    header::{FieldName, HeaderFields},
    message::MessageHandler,
    message_hash::{BodyHasher, BodyHasherBuilder},
    signature::SignatureType,
};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};
use tracing::debug;

/// An error that occurs when using a [`Signer`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SignerError {
    /// The algorithm is not usable, for example *ed25519-sha1*, or SHA-1
    /// with ARC.
    InvalidAlgorithm,
    /// The requested algorithm does not match the signing key.
    KeyTypeMismatch,
    InvalidInstance,
    FromHeaderNotSigned,
    SigningFailure,
    EmptyRequests,
    DuplicateArcRequest,
    /// ARC seals are produced by [`arc::seal`](crate::arc::seal), not by
    /// a signer.
    InvalidSignatureType,
    MissingHeaders,
}

impl SignerError {
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidAlgorithm => "EINVALIDALGO",
            Self::KeyTypeMismatch => "EINVALIDTYPE",
            Self::InvalidInstance => "EINVALIDINSTANCE",
            Self::FromHeaderNotSigned => "EFROMNOTSIGNED",
            Self::SigningFailure => "ESIGNFAIL",
            Self::EmptyRequests => "ENOREQUESTS",
            Self::DuplicateArcRequest => "EDUPLICATEARC",
            Self::InvalidSignatureType => "EINVALIDSIGTYPE",
            Self::MissingHeaders => "ENOHEADERS",
        }
    }
}

impl Display for SignerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAlgorithm => write!(f, "unsupported signing algorithm"),
            Self::KeyTypeMismatch => write!(f, "signing algorithm does not match key type"),
            Self::InvalidInstance => write!(f, "invalid ARC instance number"),
            Self::FromHeaderNotSigned => write!(f, "From header not signed"),
            Self::SigningFailure => write!(f, "signing failed"),
            Self::EmptyRequests => write!(f, "no signature requests"),
            Self::DuplicateArcRequest => write!(f, "more than one ARC signature requested"),
            Self::InvalidSignatureType => write!(f, "signature type cannot be requested"),
            Self::MissingHeaders => write!(f, "message headers not received"),
        }
    }
}

impl Error for SignerError {}

/// A produced signature header.
#[derive(Clone, Debug, PartialEq)]
pub struct SigningResult {
    pub signature_type: SignatureType,
    pub header_name: &'static str,
    /// The header value, to be joined to the name with a bare colon.
    pub header_value: String,
    pub signed_headers: Vec<FieldName>,
}

impl Display for SigningResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.header_name, self.header_value)
    }
}

/// A signature request that could not be fulfilled.
#[derive(Clone, Debug, PartialEq)]
pub struct SigningFailure {
    /// The position of the request.
    pub index: usize,
    pub signature_type: SignatureType,
    pub error: SignerError,
}

/// The output of a [`Signer`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SignOutput {
    /// DKIM signatures, in request order.
    pub signatures: Vec<SigningResult>,
    pub arc_message_signature: Option<SigningResult>,
    pub errors: Vec<SigningFailure>,
}

impl SignOutput {
    /// Formats the produced signatures as a header block, newest on top,
    /// each line terminated with CRLF.
    pub fn to_header_block(&self) -> String {
        self.arc_message_signature
            .iter()
            .chain(self.signatures.iter().rev())
            .map(|s| format!("{s}\r\n"))
            .collect()
    }
}

/// A signer for an email message.
pub struct Signer<T> {
    requests: Vec<SignRequest<T>>,  // non-empty
    headers: Option<HeaderFields>,
    body_hasher: Option<BodyHasher>,
}

impl<T> Signer<T>
where
    T: AsRef<SigningKey>,
{
    /// Prepares a message signing process.
    pub fn new<I>(requests: I) -> Result<Self, SignerError>
    where
        I: IntoIterator<Item = SignRequest<T>>,
    {
        let requests: Vec<_> = requests.into_iter().collect();

        if requests.is_empty() {
            return Err(SignerError::EmptyRequests);
        }
        if requests
            .iter()
            .any(|r| !matches!(r.signature_type, SignatureType::Dkim | SignatureType::Arc))
        {
            return Err(SignerError::InvalidSignatureType);
        }
        if requests.iter().filter(|r| r.signature_type == SignatureType::Arc).count() > 1 {
            return Err(SignerError::DuplicateArcRequest);
        }

        Ok(Self {
            requests,
            headers: None,
            body_hasher: None,
        })
    }

    /// Finishes signing, producing one signature per request. A request that
    /// fails does not affect the others.
    pub fn finish(self) -> Result<SignOutput, SignerError> {
        let (Some(headers), Some(body_hasher)) = (self.headers, self.body_hasher) else {
            return Err(SignerError::MissingHeaders);
        };

        let hasher_results = body_hasher.finish();

        let mut output = SignOutput::default();

        for (index, request) in self.requests.iter().enumerate() {
            let signature_type = request.signature_type;

            match sign::perform_signing(request, &headers, &hasher_results) {
                Ok(result) if signature_type == SignatureType::Dkim => {
                    output.signatures.push(result);
                }
                Ok(result) => {
                    output.arc_message_signature = Some(result);
                }
                Err(error) => {
                    debug!(index, %error, "could not produce signature");
                    output.errors.push(SigningFailure {
                        index,
                        signature_type,
                        error,
                    });
                }
            }
        }

        Ok(output)
    }
}

impl<T> MessageHandler for Signer<T> {
    fn message_headers(&mut self, headers: HeaderFields) {
        let mut builder = BodyHasherBuilder::new();

        for request in &self.requests {
            builder.register_canonicalization((
                request.canonicalization.body,
                request.algorithm.hash_algorithm,
                request.body_length.limit(),
            ));
        }

        self.body_hasher = Some(builder.build(&headers));
        self.headers = Some(headers);
    }

    fn body_chunk(&mut self, chunk: &[u8]) {
        if let Some(body_hasher) = &mut self.body_hasher {
            body_hasher.hash_chunk(chunk);
        }
    }
}
