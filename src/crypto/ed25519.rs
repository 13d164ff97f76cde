// dkimcheck – verification of DKIM signatures
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

use crate::crypto::VerificationError;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use pkcs8::DecodePublicKey;

pub fn read_ed25519_verifying_key(key_data: &[u8]) -> Result<VerifyingKey, VerificationError> {
    VerifyingKey::try_from(key_data)
        .or_else(|_| VerifyingKey::from_public_key_der(key_data))
        .map_err(|_| VerificationError::InvalidKey)
}

pub fn verify_ed25519(
    verifying_key: &VerifyingKey,
    msg: &[u8],
    signature_data: &[u8],
) -> Result<(), VerificationError> {
    let signature = Signature::from_slice(signature_data)
        .map_err(|_| VerificationError::InvalidSignature)?;

    verifying_key
        .verify(msg, &signature)
        .map_err(|_| VerificationError::VerificationFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::read_pem;
    use ed25519_dalek::{Signer, SigningKey};

    #[test]
    fn read_ed25519_key() {
        let public_key_pem = "-----BEGIN PUBLIC KEY-----
MCowBQYDK2VwAyEA9VXMCgG0fXGIzwV7eOxKhz+Pe6DRmOBYjyvVoVrc/Dw=
-----END PUBLIC KEY-----
";
        let spki = read_pem(public_key_pem).unwrap();

        let from_spki = read_ed25519_verifying_key(&spki).unwrap();
        let from_raw = read_ed25519_verifying_key(from_spki.as_bytes()).unwrap();

        assert_eq!(from_spki, from_raw);
        assert_eq!(
            read_ed25519_verifying_key(b"short"),
            Err(VerificationError::InvalidKey)
        );
    }

    #[test]
    fn verify_ed25519_ok() {
        let signing_key = SigningKey::from_bytes(&[7; 32]);
        let verifying_key = signing_key.verifying_key();

        let signature = signing_key.sign(b"msg").to_bytes();

        assert_eq!(verify_ed25519(&verifying_key, b"msg", &signature), Ok(()));
        assert_eq!(
            verify_ed25519(&verifying_key, b"other", &signature),
            Err(VerificationError::VerificationFailure)
        );
        assert_eq!(
            verify_ed25519(&verifying_key, b"msg", &signature[1..]),
            Err(VerificationError::InvalidSignature)
        );
    }
}
