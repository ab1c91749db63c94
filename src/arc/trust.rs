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

//! Trusted ARC sealers.

use crate::{alignment, signature::DomainName};

/// Organizational domains of well-known ARC sealers.
pub const DEFAULT_TRUSTED_SEALERS: &[&str] = &[
    "google.com",
    "microsoft.com",
    "gmail.com",
    "googlegroups.com",
    "messagingengine.com",
    "pobox.com",
    "topicbox.com",
    "umich.edu",
    "fastmail.com",
    "fastmail.fm",
    "one.com",
    "securemx.jp",
    "zone.eu",
    "teliaklm.ee",
    "forwardemail.net",
];

/// Whether the sealing domain belongs to one of the trusted organizations.
pub fn is_trusted_sealer(sealer: &DomainName, trusted_sealers: &[&str]) -> bool {
    let org = alignment::organizational_domain(&sealer.to_ascii());
    trusted_sealers.iter().any(|d| d.eq_ignore_ascii_case(&org))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trusted_sealer_by_organizational_domain() {
        let trusted = |d| is_trusted_sealer(&DomainName::new(d).unwrap(), DEFAULT_TRUSTED_SEALERS);

        assert!(trusted("google.com"));
        assert!(trusted("arc.Messagingengine.com"));
        assert!(!trusted("example.com"));
        assert!(!trusted("google.com.example.net"));
    }
}
