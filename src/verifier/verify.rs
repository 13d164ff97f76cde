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

use crate::{
    canonicalize::{self, CanonicalizationError},
    crypto::{self, Crypto},
    message::{HeaderBlock, RawMessage},
    record::DkimKeyRecord,
    resolver::{KeyCache, LookupTxt},
    signature::{DkimSignature, DkimSignatureError, QUERY_METHOD_DNS_TXT},
    util,
    verifier::{header, Config, KeyRef, ResultEntry, VerifierError},
};
use std::{io::ErrorKind, str};
use tracing::{debug, trace};

/// Runs all verification steps for one signature header, and returns its
/// result entries (at least one).
pub fn verify_signature<T, C>(
    resolver: &T,
    crypto: &C,
    config: &Config,
    msg: &RawMessage,
    sig_header: &HeaderBlock,
    cache: &mut KeyCache,
) -> Result<Vec<ResultEntry>, CanonicalizationError>
where
    T: LookupTxt + ?Sized,
    C: Crypto + ?Sized,
{
    // well-formed DKIM-Signature contain only UTF-8
    let field = match str::from_utf8(sig_header.as_ref()) {
        Ok(field) => field,
        Err(_) => {
            trace!("signature header is not UTF-8");
            return Ok(vec![signature_format_failure(DkimSignatureError::Utf8Encoding)]);
        }
    };

    let value = field.split_once(':').map_or("", |(_, value)| value);

    let sig = match value.parse::<DkimSignature>() {
        Ok(sig) => sig,
        Err(e) => {
            trace!("unusable signature header: {e}");
            return Ok(vec![signature_format_failure(e)]);
        }
    };

    trace!(domain = %sig.domain, selector = %sig.selector, "signature parsed");

    if config.fail_if_expired && is_expired(&sig, config) {
        trace!("signature expired");
        return Ok(vec![ResultEntry::permfail(VerifierError::SignatureExpired)]);
    }

    if !sig.query_method.eq_ignore_ascii_case(QUERY_METHOD_DNS_TXT) {
        trace!(query_method = %sig.query_method, "unsupported query method");
        return Ok(vec![ResultEntry::permfail(VerifierError::UnknownQueryMethod)]);
    }

    let keys = match cache.get_or_fetch(resolver, &sig.domain, &sig.selector) {
        Ok(keys) if keys.is_empty() => {
            trace!("no key records found");
            return Ok(vec![ResultEntry::permfail(VerifierError::NoKeyFound)]);
        }
        Ok(keys) => keys,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            trace!("no key records found");
            return Ok(vec![ResultEntry::permfail(VerifierError::NoKeyFound)]);
        }
        Err(e) => {
            trace!("key record lookup failed: {e}");
            return Ok(vec![ResultEntry::permfail(VerifierError::KeyLookup)]);
        }
    };

    let hash_alg = sig.algorithm.hash_algorithm();

    let blocks = header::signed_header_blocks(msg, &sig, field);
    let canon_headers = canonicalize::canonicalize_headers(sig.canonicalization.header, &blocks)?;

    let mut results = vec![];

    let canon_body = canonicalize::canonicalize_body(
        sig.canonicalization.body,
        msg.extract_body(),
        sig.body_length,
    );
    let body_hash = util::encode_base64(crypto.digest(&canon_body, hash_alg));

    if body_hash.as_str() == &*sig.body_hash {
        trace!("body hash matched");
    } else {
        trace!(computed = %body_hash, "body hash mismatch");
        results.push(ResultEntry::permfail(VerifierError::BodyHashMismatch));
    }

    for (index, key) in keys.iter().enumerate() {
        let key_ref = KeyRef {
            domain: sig.domain.clone(),
            index,
        };

        verify_with_key(crypto, &sig, key, key_ref, &canon_headers, &mut results);
    }

    debug!(domain = %sig.domain, keys = keys.len(), "signature verification finished");

    Ok(results)
}

fn signature_format_failure(error: DkimSignatureError) -> ResultEntry {
    ResultEntry::permfail(VerifierError::DkimSignatureFormat(error))
}

fn is_expired(sig: &DkimSignature, config: &Config) -> bool {
    match sig.expiration {
        Some(expiration) => {
            let now = config.current_timestamp();
            let tolerance = config.time_tolerance.as_secs();
            expiration.saturating_add(tolerance) < now
        }
        None => false,
    }
}

// Appends this key’s entries to `results`: any number of key mismatch
// entries, followed by exactly one final entry.
fn verify_with_key<C: Crypto + ?Sized>(
    crypto: &C,
    sig: &DkimSignature,
    key: &DkimKeyRecord,
    key_ref: KeyRef,
    canon_headers: &[u8],
    results: &mut Vec<ResultEntry>,
) {
    let key_data = match key.key_data.as_deref() {
        None => {
            trace!(index = key_ref.index, "key record without p= tag");
            results.push(ResultEntry::permfail(VerifierError::MissingKeyData(key_ref)));
            return;
        }
        Some("") => {
            trace!(index = key_ref.index, "key revoked");
            results.push(ResultEntry::permfail(VerifierError::KeyRevoked(key_ref)));
            return;
        }
        Some(key_data) => key_data,
    };

    if let Some(version) = &key.version {
        let expected = format!("DKIM{}", DkimSignature::VERSION);
        if &**version != expected {
            results.push(ResultEntry::permfail(VerifierError::KeyVersionMismatch(key_ref.clone())));
        }
    }

    let hash_alg = sig.algorithm.hash_algorithm();
    let key_type = sig.algorithm.key_type();

    if !key.allows_hash_algorithm(hash_alg) {
        results.push(ResultEntry::permfail(VerifierError::KeyHashMismatch(key_ref.clone())));
    }

    if !key.allows_key_type(key_type) {
        results.push(ResultEntry::permfail(VerifierError::KeyTypeMismatch(key_ref.clone())));
    }

    let pem = crypto::public_key_pem(key_data);

    if crypto.verify(&sig.signature_data, canon_headers, &pem, key_type, hash_alg) {
        trace!(index = key_ref.index, "signature verified");
        results.push(ResultEntry::pass());
    } else {
        trace!(index = key_ref.index, "signature did not verify");
        results.push(ResultEntry::permfail(VerifierError::VerificationFailure(key_ref)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{HashAlgorithm, KeyType};
    use std::{
        cell::RefCell,
        io,
        time::{Duration, SystemTime},
    };

    // Accepts exactly one signature value, and records what was verified.
    #[derive(Default)]
    struct MockCrypto {
        calls: RefCell<Vec<(Vec<u8>, String)>>,
    }

    impl Crypto for MockCrypto {
        fn verify(
            &self,
            signature: &[u8],
            data: &[u8],
            pem: &str,
            _: KeyType,
            _: HashAlgorithm,
        ) -> bool {
            self.calls.borrow_mut().push((data.to_vec(), pem.to_owned()));
            signature == b"good"
        }

        fn digest(&self, data: &[u8], hash_alg: HashAlgorithm) -> Box<[u8]> {
            crypto::digest(hash_alg, data)
        }
    }

    fn no_lookup(_: &str) -> io::Result<Vec<io::Result<Vec<u8>>>> {
        panic!("unexpected key lookup")
    }

    fn lookup(name: &str) -> io::Result<Vec<io::Result<Vec<u8>>>> {
        match name {
            "sel._domainkey.example.com" => Ok(vec![
                Ok(b"v=DKIM1; p=YWJj".to_vec()),
                Ok(b"v=DKIM1; k=rsa; p=".to_vec()),
                Ok(b"v=DKIM2; h=sha1; k=ed25519; p=ZGVm".to_vec()),
                Ok(b"k=rsa; n=no key".to_vec()),
            ]),
            "none._domainkey.example.com" => Ok(vec![]),
            _ => Err(ErrorKind::NotFound.into()),
        }
    }

    fn message(sig_tags: &str) -> (RawMessage, HeaderBlock) {
        let header = format!("DKIM-Signature: {sig_tags}");
        let raw = format!("{header}\r\nFrom: me\r\n\r\nbody\r\n");
        let msg = RawMessage::new(raw.into_bytes()).unwrap();
        (msg, HeaderBlock::new(header.into_bytes()))
    }

    // bh= of the canonical body "body\r\n" under sha256
    const BODY_HASH: &str = "Ck5SoRNWUpSR4X0COv7R5ub2pUTtl6xz4dTFz++ji4M=";

    fn sig_tags(extra: &str) -> String {
        format!(
            "v=1; a=rsa-sha256; d=example.com; s=sel; h=From; bh={BODY_HASH}; b=Z29vZA==; {extra}"
        )
    }

    fn reasons(results: &[ResultEntry]) -> Vec<String> {
        results.iter().map(ResultEntry::reason).collect()
    }

    #[test]
    fn missing_tag_aborts_before_lookup() {
        let (msg, header) = message("v=1; a=rsa-sha256; d=example.com; s=sel; h=From; b=Z29vZA==");
        let crypto = MockCrypto::default();

        let results = verify_signature(
            &no_lookup,
            &crypto,
            &Config::default(),
            &msg,
            &header,
            &mut KeyCache::new(),
        )
        .unwrap();

        assert_eq!(reasons(&results), ["signature missing required tag: bh"]);
        assert!(crypto.calls.borrow().is_empty());
    }

    #[test]
    fn unknown_query_method_aborts() {
        let (msg, header) = message(&sig_tags("q=dns/unknown"));

        let results = verify_signature(
            &no_lookup,
            &MockCrypto::default(),
            &Config::default(),
            &msg,
            &header,
            &mut KeyCache::new(),
        )
        .unwrap();

        assert_eq!(results, [ResultEntry::permfail(VerifierError::UnknownQueryMethod)]);
    }

    #[test]
    fn expired_signature() {
        let (msg, header) = message(&sig_tags("x=1000"));
        let config = Config {
            fail_if_expired: true,
            fixed_system_time: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1031)),
            ..Default::default()
        };

        let results = verify_signature(
            &no_lookup,
            &MockCrypto::default(),
            &config,
            &msg,
            &header,
            &mut KeyCache::new(),
        )
        .unwrap();

        assert_eq!(results, [ResultEntry::permfail(VerifierError::SignatureExpired)]);
    }

    #[test]
    fn expiration_ignored_by_default() {
        let (msg, header) = message(&sig_tags("x=1000; s=none"));

        let results = verify_signature(
            &lookup,
            &MockCrypto::default(),
            &Config::default(),
            &msg,
            &header,
            &mut KeyCache::new(),
        )
        .unwrap();

        assert_eq!(results, [ResultEntry::permfail(VerifierError::NoKeyFound)]);
    }

    #[test]
    fn lookup_failures() {
        let failing = |_: &str| -> io::Result<Vec<io::Result<Vec<u8>>>> {
            Err(ErrorKind::TimedOut.into())
        };
        let (msg, header) = message(&sig_tags(""));

        let results = verify_signature(
            &failing,
            &MockCrypto::default(),
            &Config::default(),
            &msg,
            &header,
            &mut KeyCache::new(),
        )
        .unwrap();
        assert_eq!(reasons(&results), ["Public key unavailable (DNS query failed)"]);

        let (msg, header) = message(&sig_tags("s=unknown"));

        let results = verify_signature(
            &lookup,
            &MockCrypto::default(),
            &Config::default(),
            &msg,
            &header,
            &mut KeyCache::new(),
        )
        .unwrap();
        assert_eq!(reasons(&results), ["Public key unavailable (no key records found)"]);
    }

    #[test]
    fn every_key_contributes_entries() {
        let (msg, header) = message(&sig_tags(""));
        let crypto = MockCrypto::default();

        let results = verify_signature(
            &lookup,
            &crypto,
            &Config::default(),
            &msg,
            &header,
            &mut KeyCache::new(),
        )
        .unwrap();

        assert_eq!(
            reasons(&results),
            [
                "Success!",
                "Public key record public-key data is empty; key may have been revoked (example.com key #1)",
                "Public key version does not match signature version (example.com key #2)",
                "Public key hash algorithm does not match signature hash algorithm (example.com key #2)",
                "Public key type does not match signature key type (example.com key #2)",
                "Success!",
                "Public key record does not contain public-key data (example.com key #3)",
            ]
        );

        let calls = crypto.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, "-----BEGIN PUBLIC KEY-----\nYWJj\n-----END PUBLIC KEY-----");
        assert_eq!(
            calls[0].0,
            format!("From: me\r\nDKIM-Signature: {}", sig_tags("").replace("b=Z29vZA==", "b=")).into_bytes()
        );
    }

    #[test]
    fn body_hash_mismatch_does_not_abort() {
        let (msg, header) = message(&sig_tags("l=2"));
        let crypto = MockCrypto::default();

        let results = verify_signature(
            &lookup,
            &crypto,
            &Config::default(),
            &msg,
            &header,
            &mut KeyCache::new(),
        )
        .unwrap();

        assert_eq!(results[0], ResultEntry::permfail(VerifierError::BodyHashMismatch));
        assert!(results[1].is_pass());
        assert_eq!(crypto.calls.borrow().len(), 2);
    }

    #[test]
    fn non_utf8_signature_header() {
        let msg = RawMessage::new(*b"DKIM-Signature: v=1; d=\xff\r\n\r\n").unwrap();
        let header = HeaderBlock::new(*b"DKIM-Signature: v=1; d=\xff");

        let results = verify_signature(
            &no_lookup,
            &MockCrypto::default(),
            &Config::default(),
            &msg,
            &header,
            &mut KeyCache::new(),
        )
        .unwrap();

        assert_eq!(
            results,
            [ResultEntry::permfail(VerifierError::DkimSignatureFormat(
                DkimSignatureError::Utf8Encoding
            ))]
        );
    }
}
