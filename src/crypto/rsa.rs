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

use crate::crypto::{HashAlgorithm, SigningError, VerificationError};
use rsa::{
    pkcs1::DecodeRsaPublicKey, pkcs8::DecodePublicKey, traits::PublicKeyParts, Pkcs1v15Sign,
    RsaPrivateKey, RsaPublicKey,
};
use sha1::Sha1;
use sha2::Sha256;
use tracing::trace;

pub fn get_public_key_size(k: &RsaPublicKey) -> usize {
    k.size() * 8
}

pub fn read_rsa_public_key(key_data: &[u8]) -> Result<RsaPublicKey, VerificationError> {
    // first SubjectPublicKeyInfo (de facto), then RSAPublicKey (de iure)
    RsaPublicKey::from_public_key_der(key_data)
        .or_else(|_| RsaPublicKey::from_pkcs1_der(key_data))
        .map_err(|_| VerificationError::InvalidKey)
}

pub fn verify_rsa(
    hash_alg: HashAlgorithm,
    public_key: &RsaPublicKey,
    data_hash: &[u8],
    signature_data: &[u8],
) -> Result<(), VerificationError> {
    let result = match hash_alg {
        HashAlgorithm::Sha256 => {
            public_key.verify(Pkcs1v15Sign::new::<Sha256>(), data_hash, signature_data)
        }
        HashAlgorithm::Sha1 => {
            public_key.verify(Pkcs1v15Sign::new::<Sha1>(), data_hash, signature_data)
        }
    };

    result.map_err(|e| {
        trace!("RSA verification failed: {e}");
        VerificationError::VerificationFailure
    })
}

pub fn sign_rsa(
    hash_alg: HashAlgorithm,
    private_key: &RsaPrivateKey,
    data_hash: &[u8],
) -> Result<Vec<u8>, SigningError> {
    let result = match hash_alg {
        HashAlgorithm::Sha256 => private_key.sign(Pkcs1v15Sign::new::<Sha256>(), data_hash),
        HashAlgorithm::Sha1 => private_key.sign(Pkcs1v15Sign::new::<Sha1>(), data_hash),
    };

    result.map_err(|_| SigningError::SigningFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{digest_slices, SigningKey};
    use rsa::pkcs8::DecodePrivateKey;

    const PUBLIC_KEY: &str = "-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAvXEn6j24wx68Zs5djoKQ
LFXcGUUPzvAAfrc9RKzBQG+dglfdCqZy2ZFai4SlLivvkkCU+0wXl+ExSSY5xEiQ
k7m3YQZbeIAeSWUTLe7asTri73c7nX5D7+1KKWUarMHKLeWN5F9Re8uOfWrgZdYC
20bfoptbMQLLPcbfchP9Z7epZRwdi6xeZySFO2JnwyK2kEay7VpF7YivwQzMohF2
hlQ9OshDIa2w7uudKp5jAcOVymPTi3iu6tEI/3NNkcezukVawN6bLkZf6IEE3Gap
2oD3pidf51iAfb7BBbeE36Hl3dPxAgfsSrc/v2HTRMYeeBb7fjFC50ImvxjtmFUI
xQIDAQAB
-----END PUBLIC KEY-----";

    const PRIVATE_KEY: &str = include_str!("../../tests/keys/rsa2048.pem");

    #[test]
    fn rsa_sign_and_verify() {
        let private_key = RsaPrivateKey::from_pkcs8_pem(PRIVATE_KEY).unwrap();
        let public_key = RsaPublicKey::from_public_key_pem(PUBLIC_KEY).unwrap();

        assert_eq!(get_public_key_size(&public_key), 2048);
        assert_eq!(RsaPublicKey::from(&private_key), public_key);

        for hash_alg in [HashAlgorithm::Sha256, HashAlgorithm::Sha1] {
            let data_hash = digest_slices(hash_alg, [b"abc"]);
            let signature = sign_rsa(hash_alg, &private_key, &data_hash).unwrap();

            assert_eq!(verify_rsa(hash_alg, &public_key, &data_hash, &signature), Ok(()));

            let other_hash = digest_slices(hash_alg, [b"abd"]);
            assert_eq!(
                verify_rsa(hash_alg, &public_key, &other_hash, &signature),
                Err(VerificationError::VerificationFailure)
            );
        }
    }

    #[test]
    fn read_signing_key_pem() {
        let key = SigningKey::from_pem(PRIVATE_KEY).unwrap();
        assert!(matches!(key, SigningKey::Rsa(_)));
    }
}
