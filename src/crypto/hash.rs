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

use crate::crypto::HashAlgorithm;
use ::digest::Digest;
use sha1::Sha1;
use sha2::Sha256;

/// Computes the digest of some data.
pub fn digest(hash_alg: HashAlgorithm, data: &[u8]) -> Box<[u8]> {
    match hash_alg {
        HashAlgorithm::Sha256 => Box::from(&Sha256::digest(data)[..]),
        HashAlgorithm::Sha1 => Box::from(&Sha1::digest(data)[..]),
    }
}
