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

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    hash::{Hash, Hasher},
    str::FromStr,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseDomainError;

impl Display for ParseDomainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "could not parse domain name")
    }
}

impl Error for ParseDomainError {}

/// A domain name, as used in the *d=* tag.
///
/// The name is stored as given, U-label or A-label form; equivalence
/// comparison is case-insensitive.
#[derive(Clone, Eq)]
pub struct DomainName(Box<str>);

impl DomainName {
    pub fn new(s: &str) -> Result<Self, ParseDomainError> {
        if s.ends_with('.') || !is_valid_dns_name(s) {
            return Err(ParseDomainError);
        }
        idna::domain_to_ascii(s).map_err(|_| ParseDomainError)?;
        Ok(Self(s.into()))
    }

    /// Returns the A-label (ASCII) form of this name.
    pub fn to_ascii(&self) -> String {
        to_ascii_lenient(&self.0)
    }
}

impl FromStr for DomainName {
    type Err = ParseDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Display for DomainName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for DomainName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &self.0)
    }
}

impl AsRef<str> for DomainName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq for DomainName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Hash for DomainName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_ascii_lowercase().hash(state);
    }
}

/// A selector, as used in the *s=* tag.
#[derive(Clone, Eq)]
pub struct Selector(Box<str>);

impl Selector {
    /// Creates a new selector. Labels are checked leniently, so that
    /// selectors such as `dkim_123` are accepted.
    pub fn new(s: &str) -> Result<Self, ParseDomainError> {
        if !s.split('.').all(is_label) {
            return Err(ParseDomainError);
        }
        idna::domain_to_ascii(s).map_err(|_| ParseDomainError)?;
        Ok(Self(s.into()))
    }

    pub fn to_ascii(&self) -> String {
        to_ascii_lenient(&self.0)
    }
}

impl FromStr for Selector {
    type Err = ParseDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &self.0)
    }
}

impl AsRef<str> for Selector {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Hash for Selector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_ascii_lowercase().hash(state);
    }
}

/// An agent or user identifier, as used in the DKIM *i=* tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub local_part: Option<Box<str>>,
    pub domain_part: DomainName,
}

impl Identity {
    pub fn new(ident: &str) -> Result<Self, ParseDomainError> {
        let (local_part, domain) = ident.rsplit_once('@').ok_or(ParseDomainError)?;

        let local_part = if local_part.is_empty() {
            None
        } else if is_dot_string(local_part) {
            Some(local_part.into())
        } else {
            return Err(ParseDomainError);
        };

        let domain_part = DomainName::new(domain)?;

        Ok(Self { local_part, domain_part })
    }

    /// Formats the identity with the domain part in A-label form.
    pub fn to_ascii(&self) -> String {
        let domain = self.domain_part.to_ascii();
        match &self.local_part {
            Some(local_part) => format!("{local_part}@{domain}"),
            None => format!("@{domain}"),
        }
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(local_part) = &self.local_part {
            write!(f, "{local_part}")?;
        }
        write!(f, "@{}", self.domain_part)
    }
}

// Selectors may carry underscores, which IDNA processing rejects; such
// labels are already ASCII and are passed through.
fn to_ascii_lenient(s: &str) -> String {
    if s.is_ascii() {
        return s.to_owned();
    }
    idna::domain_to_ascii(s).unwrap_or_else(|_| s.to_owned())
}

// RFC 5322, section 3.2.3, with the internationalisation extensions of RFC 6531
fn is_dot_string(s: &str) -> bool {
    fn is_atext(c: char) -> bool {
        c.is_ascii_alphanumeric()
            || matches!(
                c,
                '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '/' | '=' | '?' | '^' | '_'
                | '`' | '{' | '|' | '}' | '~'
            )
            || !c.is_ascii()
    }

    s.len() <= 64 && s.split('.').all(|atom| !atom.is_empty() && atom.chars().all(is_atext))
}

fn is_valid_dns_name(s: &str) -> bool {
    if !matches!(s.len(), 1..=253) {
        return false;
    }

    let mut labels = s.split('.').rev();

    match labels.next() {
        Some(tld) if is_label(tld) && !tld.chars().all(|c| c.is_ascii_digit()) => {}
        _ => return false,
    }

    let mut rest = labels.peekable();
    if rest.peek().is_none() {
        return false;
    }

    rest.all(is_label)
}

// Non-ASCII labels are left to IDNA processing to accept or reject.
fn is_label(s: &str) -> bool {
    matches!(s.len(), 1..=63)
        && !s.starts_with('-')
        && !s.ends_with('-')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_') || !c.is_ascii())
}
