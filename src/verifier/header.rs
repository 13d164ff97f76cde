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
    message::{HeaderBlock, RawMessage},
    signature::{strip_signature_data, DkimSignature},
};
use tracing::trace;

/// Collects the header fields covered by a signature, in the order in which
/// they enter the signed data.
///
/// Each distinct name in h= contributes all of its occurrences in message
/// order; names are compared case-insensitively and repeated names are only
/// looked up once. The signature header itself comes last, with its b= tag
/// value removed.
pub fn signed_header_blocks(
    msg: &RawMessage,
    sig: &DkimSignature,
    sig_field: &str,
) -> Vec<HeaderBlock> {
    let mut seen: Vec<&str> = vec![];
    let mut blocks = vec![];

    for name in sig.signed_headers.iter() {
        if seen.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            continue;
        }
        seen.push(name);

        let found = msg.extract_header(name);
        trace!(%name, count = found.len(), "collected signed header");
        blocks.extend(found);
    }

    blocks.push(HeaderBlock::new(strip_signature_data(sig_field).into_bytes()));

    blocks
}
