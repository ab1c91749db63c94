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

//! Tag=value list parsing.
//!
//! Signature headers and key records seen in the wild are frequently not
//! well-formed tag lists. Parsing here is therefore lenient: malformed
//! segments are skipped instead of failing the whole list, and it is up to the
//! consumer to reject a list that lacks required tags.

use crate::{
    parse::{self, strip_fws},
    util::{self, Base64Error},
};
use bstr::ByteSlice;
use std::borrow::Cow;

/// A single tag with its name and value, both trimmed of folding whitespace.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TagSpec {
    pub name: Box<str>,
    pub value: Box<str>,
}

/// A parsed tag list.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TagList(Vec<TagSpec>);

impl TagList {
    /// Parses a tag list. Tag names are compared case-insensitively, stored
    /// lowercase. Segments without `=` or with an empty name are skipped.
    pub fn parse(value: &str) -> Self {
        let tags = value
            .split(';')
            .filter_map(|segment| {
                let (name, value) = segment.split_once('=')?;
                let name = parse::trim_fws(name);
                if name.is_empty() || !name.chars().all(is_tag_name_char) {
                    return None;
                }
                Some(TagSpec {
                    name: name.to_ascii_lowercase().into(),
                    value: parse::trim_fws(value).into(),
                })
            })
            .collect();

        Self(tags)
    }

    /// Returns the value of the first tag with the given (lowercase) name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|tag| &*tag.name == name)
            .map(|tag| &*tag.value)
    }

    /// Returns the value of a tag, or `None` if it is absent or empty.
    pub fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[TagSpec]> for TagList {
    fn as_ref(&self) -> &[TagSpec] {
        &self.0
    }
}

fn is_tag_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Splits a colon-separated value such as the *h=* tag, dropping empty items.
pub fn parse_colon_separated_tag_value(value: &str) -> Vec<&str> {
    value
        .split(':')
        .map(parse::trim_fws)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Decodes a Base64 tag value that may contain folding whitespace.
pub fn parse_base64_tag_value(value: &str) -> Result<Vec<u8>, Base64Error> {
    let value = parse::remove_fws(value);
    if value.is_empty() {
        return Err(Base64Error);
    }
    util::decode_base64(&value)
}

/// Empties the value of the *b=* tag in a signature header value, leaving
/// everything else (including folding) intact.
pub fn strip_b_tag_value(value: &[u8]) -> Cow<'_, [u8]> {
    let mut start = 0;

    loop {
        let end = value[start..].find_byte(b';').map_or(value.len(), |i| start + i);

        if let Some(n) = b_tag_prefix_len(&value[start..end]) {
            let mut result = Vec::with_capacity(value.len());
            result.extend_from_slice(&value[..(start + n)]);
            result.extend_from_slice(&value[end..]);
            return result.into();
        }

        if end == value.len() {
            return value.into();
        }
        start = end + 1;
    }
}

// Length of the segment prefix up to and including the `=` of a b= tag.
fn b_tag_prefix_len(segment: &[u8]) -> Option<usize> {
    let s = strip_fws(segment).unwrap_or(segment);
    let s = s.strip_prefix(b"b").or_else(|| s.strip_prefix(b"B"))?;
    let s = strip_fws(s).unwrap_or(s);
    let rest = s.strip_prefix(b"=")?;
    Some(segment.len() - rest.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_list_parse_lenient() {
        let example = " v = 1 ; a=rsa-sha256;d=example.net; s=brisbane;\r\n\
            \tc=simple; q=dns/txt; broken; =x;\r\n\
            \th=from:to:subject:date;\r\n\
            \tbh=MTIzNDU2Nzg5MDEy\r\n MzQ1Njc4OTAxMjM0NTY3ODkwMTI=;\r\n\
            \tB=dzdVyOfAKCdLXdJOc9G2q8LoXSlEniSbav+yuU4zGeeruD00lszZVoG4ZHRNiYzR";

        let tags = TagList::parse(example);

        assert_eq!(tags.get("v"), Some("1"));
        assert_eq!(tags.get("s"), Some("brisbane"));
        assert_eq!(tags.get("b").map(|v| &v[..6]), Some("dzdVyO"));
        assert_eq!(tags.get("broken"), None);
        assert_eq!(tags.as_ref().len(), 9);
        assert_eq!(
            parse_base64_tag_value(tags.get("bh").unwrap()).unwrap(),
            b"12345678901234567890123456789012"
        );
    }

    #[test]
    fn tag_list_first_wins() {
        let tags = TagList::parse("a=1; a=2; b=");
        assert_eq!(tags.get("a"), Some("1"));
        assert_eq!(tags.get("b"), Some(""));
        assert_eq!(tags.get_non_empty("b"), None);
    }

    #[test]
    fn parse_colon_separated_tag_value_ok() {
        assert_eq!(
            parse_colon_separated_tag_value("From : to:\r\n\tSubject::"),
            ["From", "to", "Subject"]
        );
        assert!(parse_colon_separated_tag_value("").is_empty());
    }

    #[test]
    fn strip_b_tag_value_ok() {
        fn strip(value: &str) -> String {
            String::from_utf8(strip_b_tag_value(value.as_bytes()).into_owned()).unwrap()
        }

        assert_eq!(strip(" a = 1 ; b = 2 ; c = 3 "), " a = 1 ; b =; c = 3 ");
        assert_eq!(strip(" a = 1 ; b = 2 ;"), " a = 1 ; b =;");
        assert_eq!(strip(" a = 1 ; b = 2 "), " a = 1 ; b =");
        assert_eq!(strip(" a = 1 ; b ="), " a = 1 ; b =");
        assert_eq!(strip(" bh=abc; b=de\r\n f"), " bh=abc; b=");
        assert_eq!(strip(" a=1"), " a=1");
    }

    #[test]
    fn strip_b_tag_value_keeps_raw_bytes() {
        let stripped = strip_b_tag_value(b" v=1; i=\xe4@example.com; b=abc\r\n def");
        assert_eq!(&*stripped, b" v=1; i=\xe4@example.com; b=");
    }
}
