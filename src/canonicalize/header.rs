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

//! Header canonicalization.

use crate::{
    header::{FieldName, HeaderField, HeaderFields},
    parse::is_wsp_byte,
    signature::CanonicalizationAlgorithm,
    tag_list,
};
use bstr::ByteSlice;
use std::collections::HashSet;

const SP: u8 = b' ';
const CRLF: [u8; 2] = *b"\r\n";

/// The signature header that concludes the signing input.
#[derive(Clone, Copy, Debug)]
pub enum SigningInput<'a> {
    /// A freshly formatted header: its name and its value with an empty
    /// *b=* tag.
    Fresh(&'a str, &'a str),
    /// A header received with the message; its *b=* value is stripped.
    Verbatim(&'a HeaderField),
}

/// Canonicalizes a header field into some result vector, without line
/// terminator.
pub fn canonicalize_header(
    result: &mut Vec<u8>,
    algorithm: CanonicalizationAlgorithm,
    field: &HeaderField,
) {
    match algorithm {
        CanonicalizationAlgorithm::Simple => result.extend(field.line()),
        CanonicalizationAlgorithm::Relaxed => {
            canonicalize_relaxed(result, field.name().as_ref(), field.body())
        }
    }
}

fn canonicalize_relaxed(result: &mut Vec<u8>, name: &str, value: &[u8]) {
    fn is_space(b: u8) -> bool {
        is_wsp_byte(b) || matches!(b, b'\r' | b'\n')
    }

    result.extend(name.trim().to_ascii_lowercase().bytes());
    result.push(b':');

    let value = value.trim_with(|c| matches!(c, ' ' | '\t' | '\r' | '\n'));

    let mut compressing = false;
    for &b in value {
        if is_space(b) {
            if !compressing {
                result.push(SP);
                compressing = true;
            }
        } else {
            result.push(b);
            compressing = false;
        }
    }
}

/// Selects the headers to sign: every header whose name is in the list,
/// bottom-most first.
pub fn select_signing_headers<'a>(
    headers: &'a HeaderFields,
    names: &[FieldName],
) -> Vec<&'a HeaderField> {
    headers
        .as_ref()
        .iter()
        .rev()
        .filter(|field| names.contains(field.name()))
        .collect()
}

/// Selects the headers named in an *h=* list: for each name, the bottom-most
/// instance not already used. Names without a remaining instance select
/// nothing.
pub fn select_verify_headers<'a>(
    headers: &'a HeaderFields,
    names: &[FieldName],
) -> Vec<&'a HeaderField> {
    let fields = headers.as_ref();
    let mut used = HashSet::with_capacity(names.len());
    let mut result = Vec::with_capacity(names.len());

    for name in names {
        let next = fields
            .iter()
            .enumerate()
            .rev()
            .find(|(i, field)| field.name() == name && !used.contains(i));

        if let Some((i, field)) = next {
            used.insert(i);
            result.push(field);
        }
    }

    result
}

/// Produces the signing input: the selected headers, each terminated with
/// CRLF, followed by the signature header without its *b=* value and
/// without line terminator.
pub fn signing_input(
    algorithm: CanonicalizationAlgorithm,
    selected: &[&HeaderField],
    signature: SigningInput<'_>,
) -> Vec<u8> {
    let mut result = vec![];

    for field in selected {
        canonicalize_header(&mut result, algorithm, field);
        result.extend(CRLF);
    }

    match signature {
        SigningInput::Fresh(name, value) => match algorithm {
            CanonicalizationAlgorithm::Simple => {
                result.extend(name.bytes());
                result.push(b':');
                result.extend(value.bytes());
            }
            CanonicalizationAlgorithm::Relaxed => {
                canonicalize_relaxed(&mut result, name, value.as_bytes());
            }
        },
        SigningInput::Verbatim(field) => {
            let line = field.line();
            let name = &line[..(line.len() - field.body().len())];
            let value = tag_list::strip_b_tag_value(field.body());
            match algorithm {
                CanonicalizationAlgorithm::Simple => {
                    result.extend(name);
                    result.extend(value.iter());
                }
                CanonicalizationAlgorithm::Relaxed => {
                    canonicalize_relaxed(&mut result, field.name().as_ref(), &value);
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::BStr;

    fn names(names: &[&str]) -> Vec<FieldName> {
        names.iter().map(|n| FieldName::new(*n).unwrap()).collect()
    }

    #[test]
    fn canonicalize_header_relaxed_ok() {
        let field = HeaderField::from_line(*b"Subject \t:  Hello,\r\n\t  world \t").unwrap();

        let mut result = vec![];
        canonicalize_header(&mut result, CanonicalizationAlgorithm::Relaxed, &field);
        assert_eq!(BStr::new(&result), BStr::new(b"subject:Hello, world"));

        result.clear();
        canonicalize_header(&mut result, CanonicalizationAlgorithm::Simple, &field);
        assert_eq!(BStr::new(&result), BStr::new(b"Subject \t:  Hello,\r\n\t  world \t"));
    }

    #[test]
    fn select_verify_headers_bottom_up() {
        let headers: HeaderFields = "from: Good \t \r\n\
            to: see   me\r\n\
            Date: Fri 24\r\n\tfoo\r\n\
            To: another one\r\n"
            .parse()
            .unwrap();

        let selected = select_verify_headers(&headers, &names(&["to", "from", "to", "to", "cc"]));
        let input = signing_input(
            CanonicalizationAlgorithm::Relaxed,
            &selected,
            SigningInput::Fresh("DKIM-Signature", " a=1; b="),
        );

        assert_eq!(
            BStr::new(&input),
            BStr::new(&b"to:another one\r\nfrom:Good\r\nto:see me\r\ndkim-signature:a=1; b="[..]),
        );
    }

    #[test]
    fn select_signing_headers_all_instances() {
        let headers: HeaderFields = "Received: x\r\nTo: a\r\nFrom: b\r\nTo: c\r\n".parse().unwrap();

        let selected = select_signing_headers(&headers, &names(&["From", "To"]));
        let lines: Vec<_> = selected.iter().map(|f| f.line()).collect();

        assert_eq!(lines, [&b"To: c"[..], b"From: b", b"To: a"]);
    }

    #[test]
    fn signing_input_verbatim_strips_b() {
        let headers: HeaderFields = "From: me\r\n\
            DKIM-Signature: v=1; h=from; b=abc\r\n  def; bh=xyz\r\n"
            .parse()
            .unwrap();
        let fields = headers.as_ref();

        let simple = signing_input(
            CanonicalizationAlgorithm::Simple,
            &[&fields[0]],
            SigningInput::Verbatim(&fields[1]),
        );
        assert_eq!(
            BStr::new(&simple),
            BStr::new(&b"From: me\r\nDKIM-Signature: v=1; h=from; b=; bh=xyz"[..]),
        );

        let relaxed = signing_input(
            CanonicalizationAlgorithm::Relaxed,
            &[&fields[0]],
            SigningInput::Verbatim(&fields[1]),
        );
        assert_eq!(
            BStr::new(&relaxed),
            BStr::new(&b"from:me\r\ndkim-signature:v=1; h=from; b=; bh=xyz"[..]),
        );
    }

    #[test]
    fn signing_input_verbatim_keeps_non_utf8() {
        let headers = HeaderFields::parse(b"DKIM-Signature: v=1; i=\xe4@example.com; b=abc\r\n");
        let field = &headers.as_ref()[0];

        let simple = signing_input(
            CanonicalizationAlgorithm::Simple,
            &[],
            SigningInput::Verbatim(field),
        );
        assert_eq!(
            BStr::new(&simple),
            BStr::new(&b"DKIM-Signature: v=1; i=\xe4@example.com; b="[..]),
        );
    }
}
