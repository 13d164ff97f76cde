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

//! Cryptographic utilities.
//!
//! Signature verification and digest computation are consumed through the
//! [`Crypto`] trait. The verifier is given one implementation when it is
//! constructed and uses it for every message; [`RustCrypto`] is the default.
//!
//! Public keys are handed to [`Crypto::verify`] as PEM documents, obtained by
//! wrapping the Base64 data of a key record’s p= tag with [`public_key_pem`].
//! The key type named by the signature algorithm decides how the key data is
//! read. For RSA, the key data is read as SubjectPublicKeyInfo first, then as
//! RSAPublicKey. For Ed25519, the key data is read as the 32 raw key bytes
//! first, then as SubjectPublicKeyInfo.

mod ed25519;
mod hash;
mod rsa;

pub use self::{
    ed25519::{read_ed25519_verifying_key, verify_ed25519},
    hash::digest,
    rsa::{get_public_key_size, read_rsa_public_key, verify_rsa},
};

use crate::util::{self, CanonicalStr};
use ::rsa::RsaPublicKey;
use ed25519_dalek::VerifyingKey as Ed25519VerifyingKey;
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};
use tracing::trace;

const PEM_LINE_WIDTH: usize = 64;

/// A provider of the cryptographic operations needed for verification.
pub trait Crypto {
    /// Verifies `signature` over `data` with a public key given in PEM format.
    ///
    /// The key must be of type `key_type`. `data` is the signed data itself,
    /// not its hash; the implementation hashes it with `hash_alg` as required
    /// by the key type.
    fn verify(
        &self,
        signature: &[u8],
        data: &[u8],
        public_key_pem: &str,
        key_type: KeyType,
        hash_alg: HashAlgorithm,
    ) -> bool;

    /// Computes the digest of `data`.
    fn digest(&self, data: &[u8], hash_alg: HashAlgorithm) -> Box<[u8]>;
}

/// The default [`Crypto`] implementation, using the RustCrypto crates.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RustCrypto {
    /// Minimum acceptable RSA key size in bits; smaller keys never verify.
    pub min_key_bits: usize,
}

impl Default for RustCrypto {
    fn default() -> Self {
        Self { min_key_bits: 1024 }
    }
}

impl Crypto for RustCrypto {
    fn verify(
        &self,
        signature: &[u8],
        data: &[u8],
        public_key_pem: &str,
        key_type: KeyType,
        hash_alg: HashAlgorithm,
    ) -> bool {
        let result = read_pem(public_key_pem)
            .and_then(|key_data| VerifyingKey::from_key_data(key_type, &key_data))
            .and_then(|public_key| {
                if let Some(bits) = public_key.key_size() {
                    if bits < self.min_key_bits {
                        return Err(VerificationError::InsufficientKeySize);
                    }
                }
                let data_hash = digest(hash_alg, data);
                public_key.verify(hash_alg, &data_hash, signature)
            });

        match result {
            Ok(()) => true,
            Err(e) => {
                trace!("public key verification failed: {e}");
                false
            }
        }
    }

    fn digest(&self, data: &[u8], hash_alg: HashAlgorithm) -> Box<[u8]> {
        digest(hash_alg, data)
    }
}

/// Wraps Base64-encoded public key data in a PEM document.
pub fn public_key_pem(key_base64: &str) -> String {
    let key_base64: String = key_base64.chars().filter(|c| !c.is_whitespace()).collect();

    let mut pem = String::from("-----BEGIN PUBLIC KEY-----\n");
    for line in key_base64.as_bytes().chunks(PEM_LINE_WIDTH) {
        // Base64 is ASCII
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END PUBLIC KEY-----");
    pem
}

/// Reads the binary content of a PEM document.
pub fn read_pem(pem: &str) -> Result<Vec<u8>, VerificationError> {
    let body: String = pem
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("-----"))
        .collect();

    util::decode_base64(&body).map_err(|_| VerificationError::InvalidKey)
}

/// A public key used for verification.
#[derive(Debug)]
pub enum VerifyingKey {
    Rsa(RsaPublicKey),
    Ed25519(Ed25519VerifyingKey),
}

impl VerifyingKey {
    /// Reads key data as a key of the given type.
    pub fn from_key_data(key_type: KeyType, key_data: &[u8]) -> Result<Self, VerificationError> {
        match key_type {
            KeyType::Rsa => read_rsa_public_key(key_data).map(Self::Rsa),
            KeyType::Ed25519 => read_ed25519_verifying_key(key_data).map(Self::Ed25519),
        }
    }

    pub fn key_size(&self) -> Option<usize> {
        match self {
            Self::Rsa(public_key) => Some(get_public_key_size(public_key)),
            Self::Ed25519(_) => None,
        }
    }

    fn verify(
        &self,
        hash_alg: HashAlgorithm,
        data_hash: &[u8],
        signature_data: &[u8],
    ) -> Result<(), VerificationError> {
        match self {
            Self::Rsa(pk) => verify_rsa(hash_alg, pk, data_hash, signature_data),
            Self::Ed25519(pk) => verify_ed25519(pk, data_hash, signature_data),
        }
    }
}

/// A key type.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum KeyType {
    Rsa,
    Ed25519,
}

impl CanonicalStr for KeyType {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::Rsa => "rsa",
            Self::Ed25519 => "ed25519",
        }
    }
}

/// A hash algorithm.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
}

impl CanonicalStr for HashAlgorithm {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationError {
    InvalidKey,
    InsufficientKeySize,
    InvalidSignature,
    VerificationFailure,
}

impl Display for VerificationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey => write!(f, "invalid key data"),
            Self::InsufficientKeySize => write!(f, "key too small"),
            Self::InvalidSignature => write!(f, "invalid signature data"),
            Self::VerificationFailure => write!(f, "signature verification failed"),
        }
    }
}

impl Error for VerificationError {}
