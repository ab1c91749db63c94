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

//! Representation of email header data.

use bstr::ByteSlice;
use std::{
    error::Error,
    fmt::{self, Debug, Display, Formatter},
    hash::{Hash, Hasher},
    str::FromStr,
};

/// An error that occurs when constructing header data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HeaderFieldError;

impl Display for HeaderFieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "malformed header field")
    }
}

impl Error for HeaderFieldError {}

/// A header field name.
///
/// Comparison and hashing are case-insensitive.
#[derive(Clone, Eq)]
pub struct FieldName(Box<str>);

impl FieldName {
    pub fn new(value: impl Into<Box<str>>) -> Result<Self, HeaderFieldError> {
        let value = value.into();
        if value.is_empty() {
            return Err(HeaderFieldError);
        }
        if !value.chars().all(|c| c.is_ascii_graphic() && c != ':') {
            return Err(HeaderFieldError);
        }
        Ok(Self(value))
    }
}

impl AsRef<str> for FieldName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Debug for FieldName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for FieldName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl PartialEq for FieldName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl PartialEq<&str> for FieldName {
    fn eq(&self, other: &&str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl Hash for FieldName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_ascii_lowercase().hash(state);
    }
}

/// A header field body: everything after the colon, folding included.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct FieldBody(Box<[u8]>);

impl FieldBody {
    pub fn new(value: impl Into<Box<[u8]>>) -> Result<Self, HeaderFieldError> {
        let value = value.into();
        // only folded continuation lines
        if !value
            .split_str("\r\n")
            .skip(1)
            .all(|line| line.starts_with(b" ") || line.starts_with(b"\t"))
        {
            return Err(HeaderFieldError);
        }
        // no stray CR and LF
        if !value
            .split_str("\r\n")
            .all(|line| !line.contains(&b'\r') && !line.contains(&b'\n'))
        {
            return Err(HeaderFieldError);
        }
        Ok(Self(value))
    }
}

impl AsRef<[u8]> for FieldBody {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for FieldBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldBody").field(&self.0.as_bstr()).finish()
    }
}

/// A header field, retaining its original line.
///
/// The original line is kept because *simple* header canonicalization must
/// reproduce it byte for byte, including any whitespace before the colon.
#[derive(Clone, Eq, PartialEq)]
pub struct HeaderField {
    name: FieldName,
    line: Box<[u8]>,
    colon: usize,
}

impl HeaderField {
    /// Creates a field from a name and a body, joined with a bare colon.
    pub fn new(name: FieldName, body: FieldBody) -> Self {
        let mut line = Vec::with_capacity(name.0.len() + 1 + body.0.len());
        line.extend(name.0.as_bytes());
        line.push(b':');
        line.extend(body.as_ref());
        let colon = name.0.len();
        Self {
            name,
            line: line.into(),
            colon,
        }
    }

    /// Parses a complete (possibly folded) header line without the final line
    /// terminator.
    pub fn from_line(line: impl Into<Box<[u8]>>) -> Result<Self, HeaderFieldError> {
        let line = line.into();
        let colon = line.find_byte(b':').ok_or(HeaderFieldError)?;
        let name = line[..colon]
            .to_str()
            .map_err(|_| HeaderFieldError)?
            .trim_end_matches([' ', '\t']);
        let name = FieldName::new(name)?;
        FieldBody::new(&line[(colon + 1)..])?;
        Ok(Self { name, line, colon })
    }

    pub fn name(&self) -> &FieldName {
        &self.name
    }

    /// The field body, everything after the colon.
    pub fn body(&self) -> &[u8] {
        &self.line[(self.colon + 1)..]
    }

    /// The original line, without line terminator.
    pub fn line(&self) -> &[u8] {
        &self.line
    }
}

impl Debug for HeaderField {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HeaderField").field(&self.line.as_bstr()).finish()
    }
}

/// A collection of header fields, in message order (top to bottom).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HeaderFields(Box<[HeaderField]>);

impl HeaderFields {
    pub fn new(value: impl Into<Box<[HeaderField]>>) -> Self {
        Self(value.into())
    }

    /// Parses a raw header block.
    ///
    /// Lines may be terminated by CRLF or LF. Continuation lines are joined
    /// to the preceding line with CRLF. Lines that carry no colon (and are not
    /// continuations) are skipped.
    pub fn parse(block: &[u8]) -> Self {
        let mut fields = vec![];
        let mut current: Option<Vec<u8>> = None;

        for line in block.split_str("\n") {
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            if line.starts_with(b" ") || line.starts_with(b"\t") {
                if let Some(current) = &mut current {
                    current.extend(b"\r\n");
                    current.extend(line);
                }
                continue;
            }

            if let Some(previous) = current.take() {
                push_field(&mut fields, previous);
            }

            if !line.is_empty() {
                current = Some(line.to_vec());
            }
        }

        if let Some(previous) = current {
            push_field(&mut fields, previous);
        }

        Self(fields.into())
    }

    /// Returns a new collection with the given fields added on top.
    pub fn prepend<I>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = HeaderField>,
    {
        let mut result: Vec<_> = fields.into_iter().collect();
        result.extend(self.0.iter().cloned());
        Self(result.into())
    }

    /// Returns the fields with the given name, top to bottom.
    pub fn get<'a>(&'a self, name: &'a str) -> impl DoubleEndedIterator<Item = &'a HeaderField> {
        self.0.iter().filter(move |f| *f.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn push_field(fields: &mut Vec<HeaderField>, line: Vec<u8>) {
    match HeaderField::from_line(line) {
        Ok(field) => fields.push(field),
        Err(_) => tracing::trace!("skipping malformed header line"),
    }
}

impl AsRef<[HeaderField]> for HeaderFields {
    fn as_ref(&self) -> &[HeaderField] {
        &self.0
    }
}

impl FromStr for HeaderFields {
    type Err = HeaderFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let headers = Self::parse(s.as_bytes());
        if headers.is_empty() {
            return Err(HeaderFieldError);
        }
        Ok(headers)
    }
}
