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

//! DKIM signature.

use crate::{
    crypto::{HashAlgorithm, KeyType},
    tag_list::{parse_colon_separated_tag_value, TagList},
    util::{self, CanonicalStr},
};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

/// The name of the DKIM-Signature header field.
pub const DKIM_SIGNATURE_NAME: &str = "DKIM-Signature";

/// The only supported query method, and the default when q= is absent.
pub const QUERY_METHOD_DNS_TXT: &str = "dns/txt";

/// Tags that must be present in every DKIM signature, in the order they are
/// checked.
pub const REQUIRED_TAGS: [&str; 7] = ["v", "a", "b", "bh", "d", "h", "s"];

const KNOWN_TAGS: [&str; 14] = [
    "v", "a", "b", "bh", "c", "d", "h", "i", "l", "q", "s", "t", "x", "z",
];

/// A signature algorithm.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SignatureAlgorithm {
    /// The historic *rsa-sha1* signature algorithm.
    RsaSha1,
    /// The *rsa-sha256* signature algorithm.
    RsaSha256,
    /// The *ed25519-sha256* signature algorithm.
    Ed25519Sha256,
}

impl SignatureAlgorithm {
    /// Returns this signature algorithm’s key type.
    pub fn key_type(self) -> KeyType {
        match self {
            Self::RsaSha1 | Self::RsaSha256 => KeyType::Rsa,
            Self::Ed25519Sha256 => KeyType::Ed25519,
        }
    }

    /// Returns this signature algorithm’s hash algorithm.
    pub fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            Self::RsaSha1 => HashAlgorithm::Sha1,
            Self::RsaSha256 | Self::Ed25519Sha256 => HashAlgorithm::Sha256,
        }
    }
}

impl CanonicalStr for SignatureAlgorithm {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::RsaSha1 => "rsa-sha1",
            Self::RsaSha256 => "rsa-sha256",
            Self::Ed25519Sha256 => "ed25519-sha256",
        }
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("rsa-sha256") {
            Ok(Self::RsaSha256)
        } else if s.eq_ignore_ascii_case("ed25519-sha256") {
            Ok(Self::Ed25519Sha256)
        } else if s.eq_ignore_ascii_case("rsa-sha1") {
            Ok(Self::RsaSha1)
        } else {
            Err(())
        }
    }
}

/// A canonicalization algorithm.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum CanonicalizationAlgorithm {
    /// The *simple* canonicalization algorithm.
    #[default]
    Simple,
    /// The *relaxed* canonicalization algorithm.
    Relaxed,
}

impl CanonicalStr for CanonicalizationAlgorithm {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Relaxed => "relaxed",
        }
    }
}

impl FromStr for CanonicalizationAlgorithm {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("simple") {
            Ok(Self::Simple)
        } else if s.eq_ignore_ascii_case("relaxed") {
            Ok(Self::Relaxed)
        } else {
            Err(())
        }
    }
}

/// A pair of header/body canonicalization algorithms, as given in the c= tag.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Canonicalization {
    pub header: CanonicalizationAlgorithm,
    pub body: CanonicalizationAlgorithm,
}

impl FromStr for Canonicalization {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // a lone algorithm applies to the header only, the body stays simple
        match s.split_once('/') {
            Some((header, body)) => Ok(Self {
                header: header.parse()?,
                body: body.parse()?,
            }),
            None => Ok(Self {
                header: s.parse()?,
                body: CanonicalizationAlgorithm::Simple,
            }),
        }
    }
}

impl Display for Canonicalization {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.header.canonical_str(), self.body.canonical_str())
    }
}

/// An error that occurs when a DKIM-Signature header cannot be used.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum DkimSignatureError {
    Utf8Encoding,
    MissingTag(&'static str),
    IncompatibleVersion(Box<str>),
    UnsupportedAlgorithm(Box<str>),
    UnsupportedCanonicalization(Box<str>),
    InvalidSignatureData,
    InvalidBodyLength,
}

impl Display for DkimSignatureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Utf8Encoding => write!(f, "signature header is not valid UTF-8"),
            Self::MissingTag(tag) => write!(f, "signature missing required tag: {tag}"),
            Self::IncompatibleVersion(v) => write!(f, "incompatible version: {v}"),
            Self::UnsupportedAlgorithm(a) => write!(f, "unsupported signature algorithm: {a}"),
            Self::UnsupportedCanonicalization(c) => {
                write!(f, "unsupported canonicalization: {c}")
            }
            Self::InvalidSignatureData => write!(f, "signature data (b=) is not valid Base64"),
            Self::InvalidBodyLength => write!(f, "invalid body length (l=)"),
        }
    }
}

impl Error for DkimSignatureError {}

/// A DKIM signature, as parsed from one DKIM-Signature header.
///
/// Only signatures with all required tags and version 1 can be constructed.
/// Tags not known to this library are kept in `extra_tags`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DkimSignature {
    pub algorithm: SignatureAlgorithm,
    /// The b= tag value, decoded.
    pub signature_data: Box<[u8]>,
    /// The bh= tag value, as given (Base64 without whitespace).
    pub body_hash: Box<str>,
    pub canonicalization: Canonicalization,
    pub domain: Box<str>,
    pub signed_headers: Box<[Box<str>]>,
    pub identity: Option<Box<str>>,
    pub body_length: Option<usize>,
    pub query_method: Box<str>,
    pub selector: Box<str>,
    pub timestamp: Option<u64>,
    pub expiration: Option<u64>,
    pub copied_headers: Option<Box<str>>,
    pub extra_tags: TagList,
}

impl DkimSignature {
    /// The signature version; only version 1 is supported.
    pub const VERSION: &'static str = "1";

    /// Builds a signature from its tag list.
    ///
    /// Required tags are checked first, in the order of [`REQUIRED_TAGS`], and
    /// the version second; the first problem found is reported.
    pub fn from_tag_list(tags: &TagList) -> Result<Self, DkimSignatureError> {
        for tag in REQUIRED_TAGS {
            if !tags.contains(tag) {
                return Err(DkimSignatureError::MissingTag(tag));
            }
        }

        let required = |name| tags.get(name).unwrap_or_default();

        let version = required("v");
        if version != Self::VERSION {
            return Err(DkimSignatureError::IncompatibleVersion(version.into()));
        }

        let a = required("a");
        let algorithm = a
            .parse()
            .map_err(|_| DkimSignatureError::UnsupportedAlgorithm(a.into()))?;

        let canonicalization = match tags.get("c") {
            None | Some("") => Default::default(),
            Some(c) => c
                .parse()
                .map_err(|_| DkimSignatureError::UnsupportedCanonicalization(c.into()))?,
        };

        let signature_data = util::decode_base64(required("b"))
            .map_err(|_| DkimSignatureError::InvalidSignatureData)?
            .into();

        let body_length = match tags.get("l") {
            None => None,
            Some(l) => Some(l.parse().map_err(|_| DkimSignatureError::InvalidBodyLength)?),
        };

        let signed_headers = parse_colon_separated_tag_value(required("h"))
            .into_iter()
            .filter(|name| !name.is_empty())
            .map(Into::into)
            .collect();

        let query_method = match tags.get("q") {
            None | Some("") => QUERY_METHOD_DNS_TXT,
            Some(q) => q,
        };

        Ok(Self {
            algorithm,
            signature_data,
            body_hash: required("bh").into(),
            canonicalization,
            domain: required("d").into(),
            signed_headers,
            identity: tags.get("i").map(Into::into),
            body_length,
            query_method: query_method.into(),
            selector: required("s").into(),
            timestamp: tags.get("t").and_then(|t| t.parse().ok()),
            expiration: tags.get("x").and_then(|x| x.parse().ok()),
            copied_headers: tags.get("z").map(Into::into),
            extra_tags: tags.clone().without(&KNOWN_TAGS),
        })
    }
}

impl FromStr for DkimSignature {
    type Err = DkimSignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag_list(&TagList::parse_compact(s))
    }
}

/// Returns a copy of a DKIM-Signature header field with the value of its b=
/// tag removed, keeping the tag name and `=`.
///
/// This is the form in which the signature header itself is included in the
/// signed data.
pub fn strip_signature_data(header: &str) -> String {
    fn b_tag_prefix_len(s: &str) -> Option<usize> {
        let rest = s.trim_start().strip_prefix('b')?;
        let rest = rest.trim_start().strip_prefix('=')?;
        Some(s.len() - rest.len())
    }

    // Tags start after the field name's colon, and after each semicolon.
    let mut start = match header.find(':') {
        Some(i) => i + 1,
        None => return header.into(),
    };

    loop {
        let end = header[start..].find(';').map_or(header.len(), |i| start + i);

        if let Some(n) = b_tag_prefix_len(&header[start..end]) {
            let mut result = String::with_capacity(header.len());
            result.push_str(&header[..(start + n)]);
            result.push_str(&header[end..]);
            return result;
        }

        if end == header.len() {
            return header.into();
        }
        start = end + 1;
    }
}
