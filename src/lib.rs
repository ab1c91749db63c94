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

//! A library implementing the *DomainKeys Identified Mail* (DKIM)
//! specification described in [RFC 6376], and the *Authenticated Received
//! Chain* (ARC) specification described in [RFC 8617].
//!
//! This library provides both high-level APIs for signing, verifying and
//! sealing, as well as the lower-level building blocks these are made of.
//!
//! Messages are consumed in a streaming fashion through the
//! [`MessageHandler`][crate::message::MessageHandler] trait: the header block
//! once, then the body in chunks of any size. [`MessageSegmenter`] splits a
//! raw message into these parts.
//!
//! # Usage
//!
//! The types [`Signer`] and [`Verifier`] provide the entry points to signing
//! and verifying. After verification, [`arc::seal`] adds a new ARC set to a
//! message, reusing the body hash computed by the verifier.
//!
//! All DNS access goes through the [`LookupTxt`][crate::verifier::LookupTxt]
//! trait. Timeouts are the resolver's concern.
//!
//! # Cargo features
//!
//! The feature **`hickory-resolver`** makes an implementation of
//! [`LookupTxt`][crate::verifier::LookupTxt] available for the Hickory DNS
//! resolver.
//!
//! [RFC 6376]: https://www.rfc-editor.org/rfc/rfc6376
//! [RFC 8617]: https://www.rfc-editor.org/rfc/rfc8617

pub mod alignment;
pub mod arc;
pub mod canonicalize;
pub mod crypto;
pub mod header;
pub mod message;
pub mod message_hash;
pub mod mime;
mod parse;
pub mod record;
pub mod signature;
pub mod signer;
mod tag_list;
mod util;
pub mod verifier;

pub use crate::{
    arc::{ArcOutcome, ArcResult, SealRequest},
    crypto::SigningKey,
    header::{FieldBody, FieldName, HeaderField, HeaderFields},
    message::{MessageHandler, MessageSegmenter},
    signature::{Canonicalization, DomainName, Selector, SignatureAlgorithm},
    signer::{SignOutput, SignRequest, Signer, SignerError},
    util::{decode_base64, encode_base64, Base64Error, CanonicalStr},
    verifier::{
        Config, DkimResult, VerificationOutput, VerificationResult, VerificationStatus, Verifier,
    },
};
