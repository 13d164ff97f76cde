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

//! Canonicalization utilities.

use crate::{message::HeaderBlock, signature::CanonicalizationAlgorithm};
use bstr::ByteSlice;
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

const SP: u8 = b' ';
const LF: u8 = b'\n';
const CRLF: &[u8] = b"\r\n";

/// An error that occurs when canonicalizing an empty set of header fields.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct CanonicalizationError;

impl Display for CanonicalizationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "attempted to canonicalize empty header list")
    }
}

impl Error for CanonicalizationError {}

/// Produces the header canonicalization result for some header fields.
///
/// The canonicalized fields are joined with CRLF; there is no CRLF after the
/// last field.
pub fn canonicalize_headers(
    algorithm: CanonicalizationAlgorithm,
    headers: &[HeaderBlock],
) -> Result<Vec<u8>, CanonicalizationError> {
    if headers.is_empty() {
        return Err(CanonicalizationError);
    }

    let mut result = vec![];

    for (i, header) in headers.iter().enumerate() {
        if i > 0 {
            result.extend(CRLF);
        }
        canonicalize_header(&mut result, algorithm, header.as_ref());
    }

    Ok(result)
}

/// Canonicalizes a header field into some result vector.
pub fn canonicalize_header(
    result: &mut Vec<u8>,
    algorithm: CanonicalizationAlgorithm,
    header: &[u8],
) {
    match algorithm {
        CanonicalizationAlgorithm::Simple => {
            result.extend(header);
        }
        CanonicalizationAlgorithm::Relaxed => {
            let (name, value) = match header.find_byte(b':') {
                Some(i) => (&header[..i], &header[(i + 1)..]),
                None => (header, &[][..]),
            };

            result.extend(name.trim_with(is_space).to_ascii_lowercase());
            result.push(b':');
            canonicalize_header_relaxed(result, value);
        }
    }
}

fn canonicalize_header_relaxed(canon_headers: &mut Vec<u8>, value: &[u8]) {
    let value = value.trim_with(is_space);

    let mut compressing = false;
    for &b in value {
        if is_space(b.into()) {
            if !compressing {
                canon_headers.push(SP);
                compressing = true;
            }
        } else {
            canon_headers.push(b);
            compressing = false;
        }
    }
}

/// Produces the body canonicalization result for a message body.
///
/// Line endings are first normalised to LF, so that both CRLF and bare LF
/// input are accepted. The result always ends in exactly one CRLF; an empty
/// body becomes a single CRLF. If `max_len` is given, the result is cut off
/// after that many bytes.
pub fn canonicalize_body(
    algorithm: CanonicalizationAlgorithm,
    body: &[u8],
    max_len: Option<usize>,
) -> Vec<u8> {
    let normalized = body.replace(CRLF, [LF]);

    let mut text = match algorithm {
        CanonicalizationAlgorithm::Simple => normalized,
        CanonicalizationAlgorithm::Relaxed => relax_body(&normalized),
    };

    // trailing empty lines
    while text.last() == Some(&LF) {
        text.pop();
    }

    let mut result = text.replace([LF], CRLF);
    result.extend(CRLF);

    if let Some(len) = max_len {
        result.truncate(len);
    }

    result
}

fn relax_body(body: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(body.len());

    for (i, line) in body.split(|&b| b == LF).enumerate() {
        if i > 0 {
            result.push(LF);
        }

        let mut compressing = false;
        for &b in line.trim_end_with(is_wsp) {
            if is_wsp(b.into()) {
                if !compressing {
                    result.push(SP);
                    compressing = true;
                }
            } else {
                result.push(b);
                compressing = false;
            }
        }
    }

    result
}

fn is_wsp(c: char) -> bool {
    matches!(c, ' ' | '\t')
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n' | '\x0b' | '\x0c')
}
