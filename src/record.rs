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

//! DKIM public key record.
//!
//! Key records are read leniently: every tag-value piece of the TXT record is
//! kept, and validation against a particular signature is left to the
//! verifier. A record without a usable p= tag is still a record; it counts as
//! one (revoked or broken) key when verifying.

use crate::{
    crypto::{HashAlgorithm, KeyType},
    tag_list::{parse_colon_separated_tag_value, TagList},
    util::CanonicalStr,
};
use std::{convert::Infallible, str::FromStr};

const KNOWN_TAGS: [&str; 8] = ["v", "g", "h", "k", "n", "p", "s", "t"];

/// A DKIM public key record, as published in a DNS TXT record.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DkimKeyRecord {
    /// The v= tag, for example `DKIM1`.
    pub version: Option<Box<str>>,
    /// The g= tag (historic granularity).
    pub granularity: Option<Box<str>>,
    /// The h= tag, a list of acceptable hash algorithm names.
    pub hash_algorithms: Option<Box<[Box<str>]>>,
    /// The k= tag.
    pub key_type: Option<Box<str>>,
    pub notes: Option<Box<str>>,
    /// The p= tag with all whitespace removed; empty for a revoked key.
    pub key_data: Option<Box<str>>,
    pub service_types: Option<Box<[Box<str>]>>,
    pub flags: Box<[Box<str>]>,
    pub extra_tags: TagList,
}

impl DkimKeyRecord {
    /// The version that key records for version 1 signatures carry.
    pub const VERSION: &'static str = "DKIM1";

    pub fn from_tag_list(tags: &TagList) -> Self {
        let list = |value: &str| -> Box<[Box<str>]> {
            parse_colon_separated_tag_value(value)
                .into_iter()
                .map(Into::into)
                .collect()
        };

        Self {
            version: tags.get("v").map(Into::into),
            granularity: tags.get("g").map(Into::into),
            hash_algorithms: tags.get("h").map(list),
            key_type: tags.get("k").map(Into::into),
            notes: tags.get("n").map(Into::into),
            key_data: tags.get("p").map(|p| {
                p.chars()
                    .filter(|c| !c.is_whitespace())
                    .collect::<String>()
                    .into()
            }),
            service_types: tags.get("s").map(list),
            flags: tags.get("t").map(list).unwrap_or_default(),
            extra_tags: tags.clone().without(&KNOWN_TAGS),
        }
    }

    /// Parses the text of a TXT record.
    pub fn parse(s: &str) -> Self {
        Self::from_tag_list(&TagList::parse(s))
    }

    /// Returns true if the p= tag is present but empty.
    pub fn is_revoked(&self) -> bool {
        matches!(self.key_data.as_deref(), Some(""))
    }

    /// Returns true if the record carries the testing flag `y`.
    pub fn is_testing(&self) -> bool {
        self.flags.iter().any(|f| f.eq_ignore_ascii_case("y"))
    }

    /// Returns true if the h= tag is absent, or lists the given hash
    /// algorithm.
    pub fn allows_hash_algorithm(&self, hash_alg: HashAlgorithm) -> bool {
        match &self.hash_algorithms {
            None => true,
            Some(algs) => algs
                .iter()
                .any(|a| a.eq_ignore_ascii_case(hash_alg.canonical_str())),
        }
    }

    /// Returns true if the k= tag is absent or names the given key type.
    pub fn allows_key_type(&self, key_type: KeyType) -> bool {
        match &self.key_type {
            None => true,
            Some(k) => k.eq_ignore_ascii_case(key_type.canonical_str()),
        }
    }
}

impl FromStr for DkimKeyRecord {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dkim_key_record_parse_ok() {
        let record = DkimKeyRecord::parse("v=DKIM1; k=rsa; h=sha1:sha256; t=y:s; p=YWJj\r\n\tZGVm; x=1");

        assert_eq!(record.version.as_deref(), Some("DKIM1"));
        assert_eq!(record.key_data.as_deref(), Some("YWJjZGVm"));
        assert!(record.allows_hash_algorithm(HashAlgorithm::Sha1));
        assert!(record.allows_hash_algorithm(HashAlgorithm::Sha256));
        assert!(record.allows_key_type(KeyType::Rsa));
        assert!(!record.allows_key_type(KeyType::Ed25519));
        assert!(record.is_testing());
        assert!(!record.is_revoked());
        assert_eq!(record.extra_tags.get("x"), Some("1"));
    }

    #[test]
    fn dkim_key_record_defaults() {
        let record = DkimKeyRecord::parse("p=YWJj");

        assert_eq!(record.version, None);
        assert!(record.allows_hash_algorithm(HashAlgorithm::Sha1));
        assert!(record.allows_key_type(KeyType::Ed25519));
        assert!(!record.is_testing());
        assert!(record.extra_tags.is_empty());
    }

    #[test]
    fn dkim_key_record_revoked_and_missing_key() {
        let revoked = DkimKeyRecord::parse("v=DKIM1; p=");
        assert!(revoked.is_revoked());

        let missing: DkimKeyRecord = "v=DKIM1; k=rsa".parse().unwrap();
        assert_eq!(missing.key_data, None);
        assert!(!missing.is_revoked());
    }

    #[test]
    fn dkim_key_record_hash_mismatch() {
        let record = DkimKeyRecord::parse("h=sha256; p=YWJj");

        assert!(!record.allows_hash_algorithm(HashAlgorithm::Sha1));
    }

    #[test]
    fn dkim_key_record_last_duplicate_wins() {
        let record = DkimKeyRecord::parse("p=first; k=rsa; p=second");

        assert_eq!(record.key_data.as_deref(), Some("second"));
    }
}
