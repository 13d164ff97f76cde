#![allow(dead_code)]

use dkimcheck::{
    canonicalize,
    crypto::{self, HashAlgorithm},
    message::{self, HeaderBlock},
    signature::{Canonicalization, SignatureAlgorithm},
    tag_list::{parse_colon_separated_tag_value, TagList},
    LookupTxt,
};
use rsa::{pkcs8::DecodePrivateKey, Pkcs1v15Sign, RsaPrivateKey};
use std::{
    cell::Cell,
    fs,
    io::{self, ErrorKind},
    rc::Rc,
};

pub type LookupOutput = Vec<io::Result<Vec<u8>>>;

/// A resolver backed by a function, counting the lookups performed.
#[derive(Clone)]
pub struct MockLookup {
    f: Rc<dyn Fn(&str) -> io::Result<LookupOutput>>,
    lookups: Rc<Cell<usize>>,
}

impl MockLookup {
    pub fn new(f: impl Fn(&str) -> io::Result<LookupOutput> + 'static) -> Self {
        Self {
            f: Rc::new(f),
            lookups: Default::default(),
        }
    }

    /// A resolver that answers queries for one name with the given records,
    /// and with `NotFound` for all other names.
    pub fn with_records<I, S>(name: &str, records: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.to_owned();
        let records: Vec<String> = records.into_iter().map(Into::into).collect();

        Self::new(move |query| {
            if query == name {
                Ok(records.iter().map(|r| Ok(r.clone().into_bytes())).collect())
            } else {
                Err(ErrorKind::NotFound.into())
            }
        })
    }

    pub fn lookups(&self) -> usize {
        self.lookups.get()
    }
}

impl LookupTxt for MockLookup {
    type Answer = LookupOutput;

    fn lookup_txt(&self, domain: &str) -> io::Result<Self::Answer> {
        self.lookups.set(self.lookups.get() + 1);
        (self.f)(domain)
    }
}

pub enum SigningKey {
    Rsa(RsaPrivateKey),
    Ed25519(ed25519_dalek::SigningKey),
}

impl SigningKey {
    fn sign(&self, hash_alg: HashAlgorithm, data_hash: &[u8]) -> Vec<u8> {
        use ed25519_dalek::Signer;

        match self {
            Self::Rsa(k) => {
                let scheme = match hash_alg {
                    HashAlgorithm::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
                    HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
                };
                k.sign(scheme, data_hash).unwrap()
            }
            Self::Ed25519(k) => k.sign(data_hash).to_bytes().to_vec(),
        }
    }
}

pub fn read_public_key_file_base64(file_name: &str) -> io::Result<String> {
    let s = fs::read_to_string(file_name)?;
    let mut key_base64: Vec<_> = s.lines().skip(1).collect();
    key_base64.pop();
    Ok(key_base64.join(""))
}

pub fn read_signing_key(file_name: &str) -> io::Result<SigningKey> {
    let s = fs::read_to_string(file_name)?;
    Ok(SigningKey::Rsa(RsaPrivateKey::from_pkcs8_pem(&s).unwrap()))
}

pub fn ed25519_signing_key() -> SigningKey {
    SigningKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(&[7; 32]))
}

/// The key record for `ed25519_signing_key`.
pub fn ed25519_key_record() -> String {
    let key = ed25519_dalek::SigningKey::from_bytes(&[7; 32]).verifying_key();
    format!("v=DKIM1; k=ed25519; p={}", dkimcheck::encode_base64(key.as_bytes()))
}

pub fn rsa_key_record() -> String {
    let base64 = read_public_key_file_base64("tests/keys/rsa2048pub.pem").unwrap();
    format!("v=DKIM1; k=rsa; p={base64}")
}

/// Signs a message and returns it with the new *DKIM-Signature* header field
/// prepended.
///
/// `tags` are the signature tags without bh= and b=; `headers` is the header
/// section, each line ending in CRLF.
pub fn sign(key: &SigningKey, tags: &str, headers: &str, body: &str) -> String {
    let tag_list = TagList::parse(tags);

    let algorithm: SignatureAlgorithm = tag_list.get("a").unwrap().parse().unwrap();
    let hash_alg = algorithm.hash_algorithm();
    let canon: Canonicalization = tag_list.get("c").unwrap_or("simple/simple").parse().unwrap();
    let body_len = tag_list.get("l").map(|l| l.parse().unwrap());

    let canon_body = canonicalize::canonicalize_body(canon.body, body.as_bytes(), body_len);
    let bh = dkimcheck::encode_base64(crypto::digest(hash_alg, &canon_body));

    let field = format!("DKIM-Signature: {tags}; bh={bh}; b=");

    let mut blocks = vec![];
    let mut seen: Vec<String> = vec![];
    for name in parse_colon_separated_tag_value(tag_list.get("h").unwrap()) {
        if !seen.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            seen.push(name.to_owned());
            blocks.extend(message::extract_header(headers.as_bytes(), name));
        }
    }
    blocks.push(HeaderBlock::new(field.clone().into_bytes()));

    let canon_headers = canonicalize::canonicalize_headers(canon.header, &blocks).unwrap();
    let data_hash = crypto::digest(hash_alg, &canon_headers);

    let b = dkimcheck::encode_base64(key.sign(hash_alg, &data_hash));

    format!("{field}{b}\r\n{headers}\r\n{body}")
}

pub fn make_headers() -> String {
    "Received: from mail.example.com by mx.example.org\r\n\
     \twith ESMTPS id 4Qm; Thu, 22 Jun 2023 14:03:29 +0200\r\n\
     From: Joe SixPack <joe@example.com>\r\n\
     To: Suzie Q <suzie@example.org>\r\n\
     Subject: Is dinner ready?\r\n\
     Date: Fri, 11 Jul 2003 21:00:37 -0700 (PDT)\r\n\
     Message-ID: <20030712040037.46341.5F8J@example.com>\r\n"
        .into()
}

pub fn make_body() -> String {
    "Hi.\r\n\
     \r\n\
     We lost the game. Are you hungry yet?\r\n\
     \r\n\
     Joe.\r\n"
        .into()
}
