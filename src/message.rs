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

//! Representation of a raw email message and its header and body sections.
//!
//! The boundary between header and body is the first blank line, that is, the
//! first line that is empty or consists only of whitespace. Everything up to
//! that line is header, everything after the line terminator of that line is
//! body, byte for byte. A message without a blank line has an empty body.

use crate::Error;
use bstr::ByteSlice;
use std::fmt::{self, Debug, Formatter};

const CRLF: &[u8] = b"\r\n";

/// Explicit header and body data that take precedence over the sections found
/// in the raw message.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MessageOverrides {
    /// A header section to search for header fields instead of the raw
    /// message. Line endings may be CRLF or LF.
    pub headers: Option<Box<[u8]>>,
    /// A body to use verbatim instead of splitting the raw message.
    pub body: Option<Box<[u8]>>,
}

/// A raw, non-empty email message.
#[derive(Clone, Eq, PartialEq)]
pub struct RawMessage {
    raw: Box<[u8]>,
    overrides: MessageOverrides,
}

impl RawMessage {
    /// Creates a new message from its raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyMessage`] if the input is empty.
    pub fn new(raw: impl Into<Box<[u8]>>) -> Result<Self, Error> {
        Self::with_overrides(raw, Default::default())
    }

    /// Creates a new message from its raw bytes, with overrides for the header
    /// or body section.
    pub fn with_overrides(
        raw: impl Into<Box<[u8]>>,
        overrides: MessageOverrides,
    ) -> Result<Self, Error> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(Error::EmptyMessage);
        }
        Ok(Self { raw, overrides })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Returns every occurrence of the named header field, in message order.
    pub fn extract_header(&self, name: &str) -> Vec<HeaderBlock> {
        let source = self.overrides.headers.as_deref().unwrap_or(&self.raw);
        extract_header(source, name)
    }

    /// Returns the message body.
    pub fn extract_body(&self) -> &[u8] {
        match &self.overrides.body {
            Some(body) => body,
            None => split_body(&self.raw),
        }
    }
}

impl Debug for RawMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawMessage")
            .field("raw", &self.raw.as_bstr())
            .field("overrides", &self.overrides)
            .finish()
    }
}

/// The original text of one header field, including any folded continuation
/// lines joined with CRLF. There is no trailing CRLF.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct HeaderBlock(Box<[u8]>);

impl HeaderBlock {
    pub fn new(text: impl Into<Box<[u8]>>) -> Self {
        Self(text.into())
    }

    /// The field name, that is, the text before the first colon with trailing
    /// whitespace removed.
    pub fn name(&self) -> &[u8] {
        match self.split_colon() {
            Some((name, _)) => name.trim_end_with(is_wsp),
            None => &self.0,
        }
    }

    /// The field body following the first colon; empty if there is no colon.
    pub fn value(&self) -> &[u8] {
        match self.split_colon() {
            Some((_, value)) => value,
            None => &[],
        }
    }

    fn split_colon(&self) -> Option<(&[u8], &[u8])> {
        let i = self.0.find_byte(b':')?;
        Some((&self.0[..i], &self.0[(i + 1)..]))
    }
}

impl AsRef<[u8]> for HeaderBlock {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for HeaderBlock {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HeaderBlock").field(&self.0.as_bstr()).finish()
    }
}

/// Collects all occurrences of the named header field from a header section.
///
/// The name is matched case-insensitively and must be followed by a colon
/// (optionally preceded by whitespace). Lines starting with whitespace continue
/// the field being collected. Collection stops at the first blank line.
pub fn extract_header(source: &[u8], name: &str) -> Vec<HeaderBlock> {
    let mut blocks = vec![];
    let mut current: Option<Vec<&[u8]>> = None;

    for line in lines(source) {
        let blank = is_blank(line);

        if let Some(parts) = current.as_mut() {
            if !blank && line.first().copied().map_or(false, |b| is_wsp(b.into())) {
                parts.push(line);
                continue;
            }
            blocks.push(HeaderBlock::new(parts.join(CRLF)));
            current = None;
        }

        if blank {
            break;
        }

        if is_field_start(line, name) {
            current = Some(vec![line]);
        }
    }

    if let Some(parts) = current {
        blocks.push(HeaderBlock::new(parts.join(CRLF)));
    }

    blocks
}

/// Returns the body of a raw message: everything after the first blank line.
pub fn split_body(source: &[u8]) -> &[u8] {
    let mut offset = 0;

    for line in source.split(|&b| b == b'\n') {
        offset += line.len() + 1;
        if is_blank(strip_cr(line)) {
            return source.get(offset..).unwrap_or_default();
        }
    }

    &[]
}

// Lines without their LF or CRLF terminator.
fn lines(source: &[u8]) -> impl Iterator<Item = &[u8]> {
    source.split(|&b| b == b'\n').map(strip_cr)
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|&b| is_wsp(b.into()))
}

fn is_field_start(line: &[u8], name: &str) -> bool {
    if name.is_empty() || line.len() <= name.len() {
        return false;
    }
    let (prefix, rest) = line.split_at(name.len());
    prefix.eq_ignore_ascii_case(name.as_bytes()) && rest.trim_start_with(is_wsp).starts_with(b":")
}

fn is_wsp(c: char) -> bool {
    matches!(c, ' ' | '\t')
}
