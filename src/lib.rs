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

//! A library for verifying *DomainKeys Identified Mail* (DKIM) signatures, as
//! described in [RFC 4871] and its successor [RFC 6376].
//!
//! Given a raw email message, the [`Verifier`] locates all *DKIM-Signature*
//! headers, looks up the signing domain’s public key records in DNS, and
//! checks the body hash and the signature over the canonicalized headers of
//! each one. The outcome is a [`ResultSet`] with one or more *pass* or
//! *permfail* entries per signature.
//!
//! The building blocks of this process are available as modules of their own:
//! message splitting (`message`), canonicalization (`canonicalize`), signature
//! and key record parsing (`signature`, `record`), key lookup (`resolver`), and
//! cryptography (`crypto`).
//!
//! # Usage
//!
//! Construct a [`RawMessage`], then call [`Verifier::validate`]. DNS and
//! cryptography are supplied to the verifier through the traits
//! [`LookupTxt`] and [`Crypto`]; [`RustCrypto`] is the default cryptography
//! provider.
//!
//! # Cargo features
//!
//! The feature **`hickory-resolver`** makes an implementation of
//! [`LookupTxt`] available for the synchronous Hickory DNS resolver.
//!
//! [RFC 4871]: https://www.rfc-editor.org/rfc/rfc4871
//! [RFC 6376]: https://www.rfc-editor.org/rfc/rfc6376

pub mod canonicalize;
pub mod crypto;
pub mod message;
pub mod record;
pub mod resolver;
pub mod signature;
pub mod tag_list;
mod util;
pub mod verifier;

pub use crate::{
    canonicalize::CanonicalizationError,
    crypto::{Crypto, RustCrypto},
    message::{HeaderBlock, MessageOverrides, RawMessage},
    record::DkimKeyRecord,
    resolver::{KeyCache, LookupTxt},
    signature::{DkimSignature, SignatureAlgorithm},
    util::{decode_base64, encode_base64, Base64Error, CanonicalStr},
    verifier::{
        Config, ResultEntry, ResultSet, VerificationStatus, Verifier, VerifierError,
    },
};

use std::{
    error,
    fmt::{self, Display, Formatter},
};

/// An error that prevents verification of a message as a whole.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// The raw message is empty.
    EmptyMessage,
    /// An empty set of header fields was to be canonicalized.
    Canonicalization(CanonicalizationError),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "message is empty"),
            Self::Canonicalization(error) => error.fmt(f),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::EmptyMessage => None,
            Self::Canonicalization(error) => Some(error),
        }
    }
}

impl From<CanonicalizationError> for Error {
    fn from(error: CanonicalizationError) -> Self {
        Self::Canonicalization(error)
    }
}
