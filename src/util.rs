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

//! Miscellaneous utilities.

use base64ct::{Base64, Encoding};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

/// A trait for entities that have a canonical string representation.
pub trait CanonicalStr {
    /// Returns the canonical representation as a static string slice.
    fn canonical_str(&self) -> &'static str;
}

/// An error that occurs when decoding Base64 data.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Base64Error;

impl Display for Base64Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "invalid Base64 data")
    }
}

impl Error for Base64Error {}

/// Encodes binary data as a Base64 string.
pub fn encode_base64<T: AsRef<[u8]>>(input: T) -> String {
    Base64::encode_string(input.as_ref())
}

/// Decodes a Base64 string, padded or unpadded.
///
/// Whitespace must already have been removed from the input.
pub fn decode_base64(input: &str) -> Result<Vec<u8>, Base64Error> {
    if input.len() % 4 == 0 {
        Base64::decode_vec(input).map_err(|_| Base64Error)
    } else {
        // restore padding omitted by some publishers
        let mut padded = String::with_capacity(input.len() + 3);
        padded.push_str(input);
        while padded.len() % 4 != 0 {
            padded.push('=');
        }
        Base64::decode_vec(&padded).map_err(|_| Base64Error)
    }
}

const MAX_COMMENT_LEN: usize = 128;

/// Makes a free-form message safe for use as a comment in a result header.
///
/// The result is lowercase, contains no punctuation other than a few
/// harmless characters, and is at most 128 characters long.
pub fn sanitize_comment(s: &str) -> String {
    let mut result = String::with_capacity(s.len().min(MAX_COMMENT_LEN));
    let mut pending_space = false;

    for c in s.chars() {
        if c.is_ascii_whitespace() {
            pending_space = !result.is_empty();
            continue;
        }
        if !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '@' | '/' | '=')) {
            continue;
        }
        if pending_space {
            if result.len() + 1 >= MAX_COMMENT_LEN {
                break;
            }
            result.push(' ');
            pending_space = false;
        }
        if result.len() >= MAX_COMMENT_LEN {
            break;
        }
        result.push(c.to_ascii_lowercase());
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_base64_unpadded() {
        assert_eq!(decode_base64("YWJj").unwrap(), b"abc");
        assert_eq!(decode_base64("YWI").unwrap(), b"ab");
        assert_eq!(decode_base64("YWI=").unwrap(), b"ab");
        assert_eq!(decode_base64("Y"), Err(Base64Error));
        assert_eq!(decode_base64("Y!Jj"), Err(Base64Error));
    }

    #[test]
    fn sanitize_comment_ok() {
        assert_eq!(sanitize_comment("Body hash did not verify"), "body hash did not verify");
        assert_eq!(sanitize_comment("DNS failure: (ETIMEOUT);"), "dns failure etimeout");
        assert_eq!(sanitize_comment("  a \t  b  "), "a b");
        assert_eq!(sanitize_comment(&"x".repeat(300)).len(), 128);
    }
}
