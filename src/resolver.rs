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

//! Public key lookup in DNS.

#[cfg(feature = "hickory-resolver")]
mod hickory_resolver;

use crate::record::DkimKeyRecord;
use std::{
    borrow::Cow,
    collections::HashMap,
    io::{self, ErrorKind},
    rc::Rc,
};
use tracing::trace;

/// A trait for entities that perform DNS resolution of TXT records.
///
/// Lookups are synchronous; the verifier blocks on each query. Implementations
/// are provided for closures of the form `Fn(&str) -> io::Result<A>`, and, with
/// feature `hickory-resolver`, for the Hickory DNS `Resolver`.
pub trait LookupTxt {
    /// The answer consisting of TXT records found.
    ///
    /// Each item is the text of one TXT record, with its character strings
    /// already concatenated.
    type Answer: IntoIterator<Item = io::Result<Vec<u8>>>;

    /// Looks up the domain’s TXT records in DNS.
    ///
    /// The domain is passed in A-label (ASCII) form, for example
    /// `selector._domainkey.example.com`.
    fn lookup_txt(&self, domain: &str) -> io::Result<Self::Answer>;
}

impl<F, A> LookupTxt for F
where
    F: Fn(&str) -> io::Result<A>,
    A: IntoIterator<Item = io::Result<Vec<u8>>>,
{
    type Answer = A;

    fn lookup_txt(&self, domain: &str) -> io::Result<Self::Answer> {
        self(domain)
    }
}

/// Returns the DNS name at which the key for the given domain and selector is
/// published, in A-label form.
pub fn key_query_name(domain: &str, selector: &str) -> io::Result<String> {
    let name = format!("{selector}._domainkey.{domain}");

    if name.is_ascii() {
        Ok(name)
    } else {
        idna::domain_to_ascii(&name).map_err(|_| ErrorKind::InvalidInput.into())
    }
}

/// Looks up and parses all key records published for a domain and selector.
///
/// Every TXT record in the answer yields one key record, in the order the
/// resolver gave them, so that key positions match the answer. Invalid UTF-8
/// is replaced; a record that fails to resolve individually becomes an empty
/// record without key data. An error is returned only when the lookup as a
/// whole fails.
pub fn fetch_public_key<T: LookupTxt + ?Sized>(
    resolver: &T,
    domain: &str,
    selector: &str,
) -> io::Result<Vec<DkimKeyRecord>> {
    let name = key_query_name(domain, selector)?;

    trace!(%name, "looking up key records");

    let txts = resolver.lookup_txt(&name)?;

    let mut records = vec![];

    for txt in txts {
        let record = match txt {
            Ok(txt) => {
                let s = String::from_utf8_lossy(&txt);
                if let Cow::Owned(_) = s {
                    trace!(%name, "TXT record is not valid UTF-8");
                }
                DkimKeyRecord::parse(&s)
            }
            Err(e) => {
                trace!(%name, "unusable TXT record: {e}");
                DkimKeyRecord::default()
            }
        };

        records.push(record);
    }

    trace!(%name, count = records.len(), "key records retrieved");

    Ok(records)
}

/// A cache of key records, keyed by domain and selector.
///
/// The cache is owned by the caller of the verification. A fresh cache is used
/// for each call to [`Verifier::validate`][crate::Verifier::validate]; pass one
/// explicitly to [`Verifier::validate_with_cache`][crate::Verifier::validate_with_cache]
/// to share lookups between calls. Only successful lookups are cached.
#[derive(Debug, Default)]
pub struct KeyCache {
    entries: HashMap<(Box<str>, Box<str>), Rc<[DkimKeyRecord]>>,
}

impl KeyCache {
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the cached records for the domain and selector, performing the
    /// lookup if they are not cached yet.
    pub fn get_or_fetch<T: LookupTxt + ?Sized>(
        &mut self,
        resolver: &T,
        domain: &str,
        selector: &str,
    ) -> io::Result<Rc<[DkimKeyRecord]>> {
        let key = (domain.to_ascii_lowercase().into(), selector.to_ascii_lowercase().into());

        if let Some(records) = self.entries.get(&key) {
            trace!(%domain, %selector, "using cached key records");
            return Ok(records.clone());
        }

        let records: Rc<[DkimKeyRecord]> = fetch_public_key(resolver, domain, selector)?.into();

        self.entries.insert(key, records.clone());

        Ok(records)
    }

    pub fn get(&self, domain: &str, selector: &str) -> Option<&[DkimKeyRecord]> {
        let key = (domain.to_ascii_lowercase().into(), selector.to_ascii_lowercase().into());
        self.entries.get(&key).map(|r| &r[..])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
