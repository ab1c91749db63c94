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

//! Formatting of signature header values.
//!
//! Tags are emitted in a fixed order per signature type. The *b=* tag always
//! comes last, with an empty value: the signature data is inserted once it
//! has been computed over the formatted header.

use crate::{
    header::FieldName,
    signature::{
        Canonicalization, ChainValidationStatus, DomainName, Identity, Selector,
        SignatureAlgorithm, SignatureType,
    },
    util::{self, CanonicalStr},
};
use std::iter;

/// The line width that folding aims for.
pub const LINE_WIDTH: usize = 75;

const FOLD: &str = "\r\n ";

/// The content of a signature header about to be signed.
#[derive(Clone, Debug, PartialEq)]
pub struct SignatureTemplate {
    pub signature_type: SignatureType,
    pub algorithm: SignatureAlgorithm,
    pub canonicalization: Canonicalization,
    pub domain: DomainName,
    pub selector: Selector,
    /// The DKIM *i=* tag.
    pub identity: Option<Identity>,
    /// The ARC *i=* tag.
    pub instance: Option<u32>,
    pub signed_headers: Vec<FieldName>,
    pub body_length: Option<u64>,
    pub timestamp: Option<u64>,
    pub expiration: Option<u64>,
    pub chain_validation: Option<ChainValidationStatus>,
    pub body_hash: Option<Box<[u8]>>,
}

enum Tag<'a> {
    Plain(&'static str, String),
    Names(&'a [FieldName]),
    BodyHash(String),
}

impl SignatureTemplate {
    fn tags(&self) -> Vec<Tag<'_>> {
        let mut tags = vec![];

        let instance = || self.instance.map(|i| Tag::Plain("i", i.to_string()));
        let algorithm = || Tag::Plain("a", self.algorithm.canonical_str().into());
        let canon = || Tag::Plain("c", self.canonicalization.to_string());
        let domain = || Tag::Plain("d", self.domain.to_ascii());
        let selector = || Tag::Plain("s", self.selector.to_ascii());
        let signed_headers: &[FieldName] = &self.signed_headers;
        let headers = || (!signed_headers.is_empty()).then_some(Tag::Names(signed_headers));
        let length = || self.body_length.map(|l| Tag::Plain("l", l.to_string()));
        let timestamp = || self.timestamp.map(|t| Tag::Plain("t", t.to_string()));
        let expiration = || self.expiration.map(|x| Tag::Plain("x", x.to_string()));
        let body_hash = || self.body_hash.as_ref().map(|bh| Tag::BodyHash(util::encode_base64(bh)));

        match self.signature_type {
            SignatureType::Dkim => {
                tags.push(Tag::Plain("v", "1".into()));
                tags.push(algorithm());
                tags.push(canon());
                tags.push(domain());
                tags.extend(headers());
                tags.extend(self.identity.as_ref().map(|i| Tag::Plain("i", i.to_ascii())));
                tags.extend(length());
                tags.push(selector());
                tags.extend(timestamp());
                tags.extend(expiration());
                tags.extend(body_hash());
            }
            SignatureType::Arc => {
                tags.extend(instance());
                tags.push(algorithm());
                tags.push(canon());
                tags.push(domain());
                tags.extend(headers());
                tags.extend(length());
                tags.push(selector());
                tags.extend(timestamp());
                tags.extend(expiration());
                tags.extend(body_hash());
            }
            SignatureType::ArcSeal => {
                tags.extend(instance());
                tags.push(algorithm());
                tags.extend(timestamp());
                tags.extend(
                    self.chain_validation
                        .map(|cv| Tag::Plain("cv", cv.canonical_str().into())),
                );
                tags.push(domain());
                tags.push(selector());
            }
        }

        tags
    }
}

/// Formats the header value up to and including the empty *b=* tag.
///
/// Returns the value and the index at which to insert the signature data.
/// With `fold` unset, the tags stay on a single line, as required when the
/// header is canonicalized with *simple*.
pub fn format_without_signature(template: &SignatureTemplate, fold: bool) -> (String, usize) {
    let width = if fold { LINE_WIDTH } else { usize::MAX };

    let mut result = String::new();
    let mut i = template.signature_type.header_name().len() + 1;

    for tag in template.tags() {
        match tag {
            Tag::Plain(name, value) => format_tag_into_string(&mut result, width, &mut i, name, &value),
            Tag::Names(names) => format_signed_headers_into_string(&mut result, width, &mut i, names),
            Tag::BodyHash(value) => format_body_hash_into_string(&mut result, width, &mut i, &value),
        }
    }

    // at least one character of the value behind b=
    if i + 4 <= width {
        result.push_str(" b=");
    } else {
        result.push_str(FOLD);
        result.push_str("b=");
    }

    let insertion_i = result.len();

    (result, insertion_i)
}

/// Inserts the Base64-encoded signature data into a formatted header value.
/// The data is always folded, regardless of header canonicalization.
pub fn insert_signature_data(
    signature_type: SignatureType,
    value: &mut String,
    insertion_i: usize,
    signature_data: &[u8],
) {
    let (head, tail) = value.split_at(insertion_i);

    let mut i = match head.rfind("\r\n") {
        Some(n) => head[(n + 2)..].chars().count(),
        None => signature_type.header_name().len() + 1 + head.chars().count(),
    };

    let mut result = String::with_capacity(value.len() + signature_data.len() * 2);
    result.push_str(head);
    format_chunks_into_string(&mut result, LINE_WIDTH, &mut i, &util::encode_base64(signature_data));
    result.push_str(tail);

    *value = result;
}

fn format_tag_into_string(result: &mut String, width: usize, i: &mut usize, tag: &str, value: &str) {
    // WSP + tag + '=' + value + ';'
    let taglen = tag.len() + value.chars().count() + 3;

    if *i + taglen <= width {
        result.push(' ');
        *i += taglen;
    } else {
        result.push_str(FOLD);
        *i = taglen;
    }

    result.push_str(tag);
    result.push('=');
    result.push_str(value);
    result.push(';');
}

fn format_signed_headers_into_string(
    result: &mut String,
    width: usize,
    i: &mut usize,
    names: &[FieldName],
) {
    let mut names = names.iter().map(|n| n.as_ref());

    let Some(first_name) = names.next() else {
        return;
    };

    // WSP + 'h=' + name + ';'/':'
    let taglen = first_name.chars().count() + 4;
    if *i + taglen <= width {
        result.push(' ');
        *i += taglen;
    } else {
        result.push_str(FOLD);
        *i = taglen;
    }
    result.push_str("h=");
    result.push_str(first_name);

    for name in names {
        result.push(':');

        let len = name.chars().count() + 1;
        if *i + len <= width {
            *i += len;
        } else {
            result.push_str(FOLD);
            *i = len + 1;
        }
        result.push_str(name);
    }

    result.push(';');
}

fn format_body_hash_into_string(result: &mut String, width: usize, i: &mut usize, value: &str) {
    // WSP + 'bh=' + at least one character
    let taglen = 5;

    if *i + taglen <= width {
        result.push(' ');
        *i += taglen - 1;
    } else {
        result.push_str(FOLD);
        *i = taglen - 1;
    }
    result.push_str("bh=");

    format_chunks_into_string(result, width, i, value);

    result.push(';');
    *i += 1;
}

// `i` and `width` count characters, not bytes.
fn format_chunks_into_string(output: &mut String, width: usize, i: &mut usize, mut s: &str) {
    let first_chunk_len = width.saturating_sub(*i).min(s.chars().count());

    if first_chunk_len > 0 {
        let n = s.char_indices().nth(first_chunk_len).map_or(s.len(), |(n, _)| n);
        let first_chunk;
        (first_chunk, s) = s.split_at(n);
        output.push_str(first_chunk);
        *i += first_chunk.chars().count();
    }

    let chunk_width = width.saturating_sub(1).max(1);
    let chunks = iter::from_fn(|| {
        if s.is_empty() {
            return None;
        }
        let n = s.char_indices().nth(chunk_width).map_or(s.len(), |(n, _)| n);
        let chunk;
        (chunk, s) = s.split_at(n);
        Some(chunk)
    });

    for chunk in chunks {
        output.push_str(FOLD);
        output.push_str(chunk);
        *i = chunk.chars().count() + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{crypto::HashAlgorithm, signature::CanonicalizationAlgorithm};

    fn template(signature_type: SignatureType) -> SignatureTemplate {
        SignatureTemplate {
            signature_type,
            algorithm: SignatureAlgorithm::RsaSha256,
            canonicalization: Canonicalization::RELAXED,
            domain: DomainName::new("example.com").unwrap(),
            selector: Selector::new("sel").unwrap(),
            identity: None,
            instance: None,
            signed_headers: ["From", "To", "Subject", "Date", "Message-ID", "In-Reply-To"]
                .into_iter()
                .map(|n| FieldName::new(n).unwrap())
                .collect(),
            body_length: None,
            timestamp: Some(1700000000),
            expiration: None,
            chain_validation: None,
            body_hash: Some(crate::crypto::digest_slices(HashAlgorithm::Sha256, [b"\r\n"])),
        }
    }

    #[test]
    fn format_dkim_folded() {
        let (value, insertion_i) = format_without_signature(&template(SignatureType::Dkim), true);

        assert!(value.starts_with(" v=1; a=rsa-sha256; c=relaxed/relaxed; d=example.com;"));
        assert!(value.ends_with("b="));
        assert_eq!(insertion_i, value.len());

        let first_line_len = value.find("\r\n").unwrap() + "DKIM-Signature:".len();
        assert!(first_line_len <= LINE_WIDTH);
        for line in value.split("\r\n").skip(1) {
            assert!(line.starts_with(' ') && !line.starts_with("  "));
            assert!(line.chars().count() <= LINE_WIDTH);
        }
    }

    #[test]
    fn format_simple_unfolded_tags() {
        let mut t = template(SignatureType::Dkim);
        t.canonicalization.header = CanonicalizationAlgorithm::Simple;

        let (mut value, insertion_i) = format_without_signature(&t, false);
        assert!(!value.contains("\r\n"));

        insert_signature_data(SignatureType::Dkim, &mut value, insertion_i, &[7; 256]);

        let (tags, b) = value.split_at(insertion_i);
        assert!(tags.ends_with(" b="));
        assert!(b.starts_with("\r\n "));
        assert_eq!(b.replace("\r\n ", ""), util::encode_base64([7; 256]));
    }

    #[test]
    fn format_tag_order() {
        let mut t = template(SignatureType::ArcSeal);
        t.instance = Some(2);
        t.chain_validation = Some(ChainValidationStatus::Pass);
        t.body_hash = None;

        let (value, _) = format_without_signature(&t, false);
        assert_eq!(
            value,
            " i=2; a=rsa-sha256; t=1700000000; cv=pass; d=example.com; s=sel; b="
        );

        let mut t = template(SignatureType::Arc);
        t.instance = Some(1);
        let (value, _) = format_without_signature(&t, false);
        assert!(value.starts_with(" i=1; a=rsa-sha256; c=relaxed/relaxed; d=example.com; h=From:To:"));
        assert!(value.contains("In-Reply-To; s=sel; t=1700000000; bh="));
    }

    #[test]
    fn format_punycode_domain() {
        let mut t = template(SignatureType::Dkim);
        t.domain = DomainName::new("☕.example").unwrap();
        t.identity = Some(Identity::new("me@☕.example").unwrap());

        let (value, _) = format_without_signature(&t, false);
        assert!(value.contains(" d=xn--53h.example;"));
        assert!(value.contains(" i=me@xn--53h.example;"));
    }
}
