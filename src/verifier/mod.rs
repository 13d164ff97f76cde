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

//! Verifier and supporting types.

mod header;
mod verify;

use crate::{
    crypto::{Crypto, RustCrypto},
    message::RawMessage,
    resolver::{KeyCache, LookupTxt},
    signature::{DkimSignatureError, DKIM_SIGNATURE_NAME},
    util::CanonicalStr,
    Error,
};
use std::{
    collections::{btree_map, BTreeMap},
    error,
    fmt::{self, Display, Formatter},
    time::{Duration, SystemTime},
};
use tracing::{debug, trace};

/// Configuration for a verifier process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Only validate at most this number of signatures, any extra signatures
    /// are ignored. By default all signatures are validated.
    pub max_signatures: usize,

    /// When this flag is set, an expired DKIM signature (x=) will not
    /// validate; the expiration check then runs right after the version check.
    pub fail_if_expired: bool,

    /// Tolerance applied to the expiration time, to allow for clock drift.
    /// Resolution is in seconds.
    pub time_tolerance: Duration,

    /// The `SystemTime` value to use as the instant ‘now’.
    pub fixed_system_time: Option<SystemTime>,
}

impl Config {
    fn current_timestamp(&self) -> u64 {
        self.fixed_system_time
            .unwrap_or_else(SystemTime::now)
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_signatures: usize::MAX,
            fail_if_expired: false,
            time_tolerance: Duration::from_secs(30),
            fixed_system_time: None,
        }
    }
}

/// The domain and position of a public key record that a result refers to.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct KeyRef {
    pub domain: Box<str>,
    /// Zero-based position of the record in the lookup answer.
    pub index: usize,
}

impl Display for KeyRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({} key #{})", self.domain, self.index)
    }
}

/// A cause of a *permfail* result.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum VerifierError {
    DkimSignatureFormat(DkimSignatureError),
    SignatureExpired,
    UnknownQueryMethod,
    KeyLookup,
    NoKeyFound,
    BodyHashMismatch,
    MissingKeyData(KeyRef),
    KeyRevoked(KeyRef),
    KeyVersionMismatch(KeyRef),
    KeyHashMismatch(KeyRef),
    KeyTypeMismatch(KeyRef),
    VerificationFailure(KeyRef),
}

impl Display for VerifierError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::DkimSignatureFormat(error) => error.fmt(f),
            Self::SignatureExpired => write!(f, "signature expired"),
            Self::UnknownQueryMethod => {
                write!(f, "Public key unavailable (unknown q= query format)")
            }
            Self::KeyLookup => write!(f, "Public key unavailable (DNS query failed)"),
            Self::NoKeyFound => write!(f, "Public key unavailable (no key records found)"),
            Self::BodyHashMismatch => {
                write!(f, "Computed body hash does not match signature body hash")
            }
            Self::MissingKeyData(key) => {
                write!(f, "Public key record does not contain public-key data {key}")
            }
            Self::KeyRevoked(key) => write!(
                f,
                "Public key record public-key data is empty; key may have been revoked {key}"
            ),
            Self::KeyVersionMismatch(key) => {
                write!(f, "Public key version does not match signature version {key}")
            }
            Self::KeyHashMismatch(key) => write!(
                f,
                "Public key hash algorithm does not match signature hash algorithm {key}"
            ),
            Self::KeyTypeMismatch(key) => {
                write!(f, "Public key type does not match signature key type {key}")
            }
            Self::VerificationFailure(key) => write!(f, "signature did not verify {key}"),
        }
    }
}

impl error::Error for VerifierError {}

/// The status of one verification result entry.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum VerificationStatus {
    /// A *pass* result.
    Pass,
    /// A *permfail* result, with failure cause attached.
    PermFail(VerifierError),
}

impl CanonicalStr for VerificationStatus {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::PermFail(_) => "permfail",
        }
    }
}

/// One verification result entry.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ResultEntry {
    pub status: VerificationStatus,
}

impl ResultEntry {
    pub fn pass() -> Self {
        Self { status: VerificationStatus::Pass }
    }

    pub fn permfail(error: VerifierError) -> Self {
        Self { status: VerificationStatus::PermFail(error) }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self.status, VerificationStatus::Pass)
    }

    /// The human-readable reason for this result.
    pub fn reason(&self) -> String {
        match &self.status {
            VerificationStatus::Pass => "Success!".into(),
            VerificationStatus::PermFail(error) => error.to_string(),
        }
    }
}

impl Display for ResultEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status.canonical_str(), self.reason())
    }
}

/// The results of verifying a message, keyed by the zero-based position of
/// each *DKIM-Signature* header among the signature headers of the message.
///
/// Each signature has at least one entry.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResultSet(BTreeMap<usize, Vec<ResultEntry>>);

impl ResultSet {
    pub fn get(&self, index: usize) -> Option<&[ResultEntry]> {
        self.0.get(&index).map(|entries| &entries[..])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if any signature has a pass entry.
    pub fn any_pass(&self) -> bool {
        self.0.values().flatten().any(ResultEntry::is_pass)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, usize, Vec<ResultEntry>> {
        self.0.iter()
    }
}

impl IntoIterator for ResultSet {
    type Item = (usize, Vec<ResultEntry>);
    type IntoIter = btree_map::IntoIter<usize, Vec<ResultEntry>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = (&'a usize, &'a Vec<ResultEntry>);
    type IntoIter = btree_map::Iter<'a, usize, Vec<ResultEntry>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A verifier of DKIM signatures in an email message.
///
/// The verifier is set up once with a DNS resolver, a cryptography provider,
/// and a configuration, and can then validate any number of messages. Each
/// signature of a message is processed in turn, in document order:
///
/// 1. the signature header is parsed, and required tags, version, algorithm,
///    and canonicalization are checked
/// 2. the query method is checked, and the key records are looked up
/// 3. the signed headers are canonicalized, and the body hash is compared
/// 4. the signature is verified with every key record found
///
/// Problems in steps 1 and 2 end processing of that signature with a single
/// *permfail* entry. A body hash mismatch is recorded but does not stop key
/// verification, and every key record contributes its own entry.
///
/// # Examples
///
/// ```
/// use dkimcheck::{RawMessage, Verifier};
/// use std::io::{self, ErrorKind};
///
/// // A resolver that never finds anything.
/// let resolver = |_: &str| -> io::Result<Vec<io::Result<Vec<u8>>>> {
///     Err(ErrorKind::NotFound.into())
/// };
///
/// let verifier = Verifier::new(resolver);
///
/// let msg = RawMessage::new(*b"From: me@example.com\r\n\r\nHello!\r\n")?;
///
/// let results = verifier.validate(&msg)?;
///
/// assert!(results.is_empty());
/// # Ok::<_, dkimcheck::Error>(())
/// ```
pub struct Verifier<T, C = RustCrypto> {
    resolver: T,
    crypto: C,
    config: Config,
}

impl<T: LookupTxt> Verifier<T> {
    /// Creates a verifier using the default cryptography provider and the
    /// default configuration.
    pub fn new(resolver: T) -> Self {
        Self::with_config(resolver, Config::default())
    }

    /// Creates a verifier using the default cryptography provider.
    pub fn with_config(resolver: T, config: Config) -> Self {
        Self::with_crypto(resolver, RustCrypto::default(), config)
    }
}

impl<T: LookupTxt, C: Crypto> Verifier<T, C> {
    pub fn with_crypto(resolver: T, crypto: C, config: Config) -> Self {
        Self {
            resolver,
            crypto,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &T {
        &self.resolver
    }

    /// Validates all DKIM signatures of a message.
    ///
    /// Key records are looked up at most once per domain and selector during
    /// this call.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures that prevent verification of the
    /// message as a whole; all problems with individual signatures are
    /// reported in the result set.
    pub fn validate(&self, msg: &RawMessage) -> Result<ResultSet, Error> {
        let mut cache = KeyCache::new();
        self.validate_with_cache(msg, &mut cache)
    }

    /// Validates all DKIM signatures of a message, using and filling the given
    /// key cache.
    pub fn validate_with_cache(
        &self,
        msg: &RawMessage,
        cache: &mut KeyCache,
    ) -> Result<ResultSet, Error> {
        let sig_headers = msg.extract_header(DKIM_SIGNATURE_NAME);

        debug!(count = sig_headers.len(), "found DKIM-Signature headers");

        if sig_headers.len() > self.config.max_signatures {
            trace!(max = self.config.max_signatures, "ignoring extra signatures");
        }

        let mut results = BTreeMap::new();

        for (index, header) in sig_headers.iter().enumerate().take(self.config.max_signatures) {
            trace!(index, "verifying signature");

            let entries = verify::verify_signature(
                &self.resolver,
                &self.crypto,
                &self.config,
                msg,
                header,
                cache,
            )?;

            debug!(index, entries = entries.len(), "signature processed");

            results.insert(index, entries);
        }

        Ok(ResultSet(results))
    }
}
