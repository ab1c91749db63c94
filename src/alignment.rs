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

//! Alignment of signing domains with the author domain.
//!
//! A signing domain is aligned with the domain of the From address when the
//! two are equal, or else when they share the same organizational domain
//! according to the public suffix list.

use crate::{header::HeaderFields, signature::DomainName};

/// Returns the organizational domain (public suffix plus one label) of a
/// domain in A-label form. A domain the suffix list does not cover is
/// returned as is.
pub fn organizational_domain(domain: &str) -> String {
    let domain = normalize(domain);
    match psl::domain_str(&domain) {
        Some(org) => org.to_owned(),
        None => domain,
    }
}

fn normalize(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Finds the signing domain aligned with the From domain. An exact match is
/// preferred over a match of organizational domains.
pub fn get_alignment<'a, I>(from_domain: &str, signing_domains: I) -> Option<&'a DomainName>
where
    I: IntoIterator<Item = &'a DomainName>,
{
    let from_domain = normalize(from_domain);
    let signing_domains: Vec<_> = signing_domains
        .into_iter()
        .map(|d| (d, normalize(&d.to_ascii())))
        .collect();

    if let Some((d, _)) = signing_domains.iter().find(|(_, ascii)| *ascii == from_domain) {
        return Some(*d);
    }

    let from_org = organizational_domain(&from_domain);

    signing_domains
        .iter()
        .find(|(_, ascii)| organizational_domain(ascii) == from_org)
        .map(|(d, _)| *d)
}

/// Returns the domain of the first address in the topmost From header, in
/// A-label form.
pub fn from_domain(headers: &HeaderFields) -> Option<String> {
    let from = headers.get("From").next()?;
    let value = String::from_utf8_lossy(from.body());

    let address = first_address(&value)?;
    let (_, domain) = address.rsplit_once('@')?;

    DomainName::new(domain.trim())
        .ok()
        .map(|d| d.to_ascii().to_ascii_lowercase())
}

fn first_address(value: &str) -> Option<&str> {
    let value = value.trim();

    if let Some(start) = value.find('<') {
        let rest = &value[(start + 1)..];
        let end = rest.find('>')?;
        return Some(rest[..end].trim());
    }

    let first = value.split(',').next()?;
    // drop a trailing comment, as in `me@example.com (Me)`
    let first = first.split('(').next().unwrap_or(first);
    Some(first.trim())
}
