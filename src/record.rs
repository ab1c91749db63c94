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

//! DKIM public key record.

use crate::{
    crypto::{HashAlgorithm, KeyType},
    tag_list::{parse_base64_tag_value, parse_colon_separated_tag_value, TagList},
};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum KeyRecordError {
    UnsupportedVersion,
    UnsupportedKeyType,
    /// The *p=* tag is missing, empty (revoked), or not valid Base64.
    InvalidKeyValue,
}

impl KeyRecordError {
    pub fn code(self) -> &'static str {
        match self {
            Self::UnsupportedVersion => "EINVALIDVER",
            Self::UnsupportedKeyType => "EINVALIDTYPE",
            Self::InvalidKeyValue => "EINVALIDVAL",
        }
    }
}

impl Display for KeyRecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion => write!(f, "unsupported key record version"),
            Self::UnsupportedKeyType => write!(f, "unsupported key type"),
            Self::InvalidKeyValue => write!(f, "missing or invalid public key data"),
        }
    }
}

impl Error for KeyRecordError {}

/// A public key record, as published at `<selector>._domainkey.<domain>`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DkimKeyRecord {
    /// The key type declared with *k=*, if any.
    pub key_type: Option<KeyType>,
    /// Acceptable hash algorithms from *h=*; unknown names are dropped.
    pub hash_algorithms: Option<Box<[HashAlgorithm]>>,
    pub key_data: Box<[u8]>,
}

impl DkimKeyRecord {
    /// Parses a key record. The *v=* tag is checked only when
    /// `check_version` is set.
    pub fn parse(s: &str, check_version: bool) -> Result<Self, KeyRecordError> {
        let tags = TagList::parse(s);

        if check_version {
            if let Some(v) = tags.get("v") {
                if !v.eq_ignore_ascii_case("DKIM1") {
                    return Err(KeyRecordError::UnsupportedVersion);
                }
            }
        }

        let key_type = match tags.get_non_empty("k") {
            Some(k) => Some(k.parse().map_err(|_| KeyRecordError::UnsupportedKeyType)?),
            None => None,
        };

        let hash_algorithms = tags.get("h").map(|h| {
            parse_colon_separated_tag_value(h)
                .into_iter()
                .filter_map(|s| s.parse().ok())
                .collect()
        });

        let key_data = tags
            .get_non_empty("p")
            .and_then(|p| parse_base64_tag_value(p).ok())
            .ok_or(KeyRecordError::InvalidKeyValue)?
            .into();

        Ok(Self {
            key_type,
            hash_algorithms,
            key_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_record_ok() {
        let record = DkimKeyRecord::parse("v=DKIM1; k=ed25519; h=sha256:md5; t=y:s; p=YWJj", true).unwrap();

        assert_eq!(
            record,
            DkimKeyRecord {
                key_type: Some(KeyType::Ed25519),
                hash_algorithms: Some([HashAlgorithm::Sha256].into()),
                key_data: b"abc".to_vec().into(),
            }
        );
    }

    #[test]
    fn key_record_lenient_whitespace() {
        let s = "v=DKIM1; k=rsa; \n\t  p=YWJj\n\t ZGVm";

        let record = DkimKeyRecord::parse(s, true).unwrap();
        assert_eq!(&*record.key_data, b"abcdef");
    }

    #[test]
    fn key_record_errors() {
        assert_eq!(
            DkimKeyRecord::parse("v=DKIM2; p=YWJj", true),
            Err(KeyRecordError::UnsupportedVersion)
        );
        assert!(DkimKeyRecord::parse("v=DKIM2; p=YWJj", false).is_ok());
        assert_eq!(
            DkimKeyRecord::parse("k=dsa; p=YWJj", true),
            Err(KeyRecordError::UnsupportedKeyType)
        );
        assert_eq!(DkimKeyRecord::parse("v=DKIM1; p=", true), Err(KeyRecordError::InvalidKeyValue));
        assert_eq!(DkimKeyRecord::parse("v=DKIM1", true), Err(KeyRecordError::InvalidKeyValue));
        assert_eq!(
            DkimKeyRecord::parse("p=!!!!", true),
            Err(KeyRecordError::InvalidKeyValue)
        );
    }
}
