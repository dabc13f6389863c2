// Copyright (C) 2013-2020 Blockstack PBC, a public benefit corporation
// Copyright (C) 2020-2024 Stacks Open Internet Foundation
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::fmt::Write;

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::util::HexError;

pub struct Hash160(pub [u8; 20]);
impl_array_newtype!(Hash160, u8, 20);
impl_array_hexstring_fmt!(Hash160);
impl_byte_array_newtype!(Hash160, u8, 20);
impl_byte_array_serde!(Hash160);
pub const HASH160_ENCODED_SIZE: u32 = 20;

pub struct Sha256Sum(pub [u8; 32]);
impl_array_newtype!(Sha256Sum, u8, 32);
impl_array_hexstring_fmt!(Sha256Sum);
impl_byte_array_newtype!(Sha256Sum, u8, 32);
impl_byte_array_serde!(Sha256Sum);

pub struct DoubleSha256(pub [u8; 32]);
impl_array_newtype!(DoubleSha256, u8, 32);
impl_array_hexstring_fmt!(DoubleSha256);
impl_byte_array_newtype!(DoubleSha256, u8, 32);

impl Hash160 {
    /// ripemd160(sha256(data)), as used for standard principals
    pub fn from_data(data: &[u8]) -> Hash160 {
        let sha2_result = Sha256::digest(data);
        let mut ret = [0u8; 20];
        ret.copy_from_slice(Ripemd160::digest(sha2_result).as_slice());
        Hash160(ret)
    }
}

impl Sha256Sum {
    pub fn from_data(data: &[u8]) -> Sha256Sum {
        let mut ret = [0u8; 32];
        ret.copy_from_slice(Sha256::digest(data).as_slice());
        Sha256Sum(ret)
    }

    /// Hash the concatenation of several byte strings without joining them first
    pub fn from_parts(parts: &[&[u8]]) -> Sha256Sum {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        let mut ret = [0u8; 32];
        ret.copy_from_slice(hasher.finalize().as_slice());
        Sha256Sum(ret)
    }

    pub fn zero() -> Sha256Sum {
        Sha256Sum([0u8; 32])
    }
}

impl Default for Sha256Sum {
    fn default() -> Self {
        Sha256Sum::zero()
    }
}

impl DoubleSha256 {
    pub fn from_data(data: &[u8]) -> DoubleSha256 {
        let mut ret = [0u8; 32];
        ret.copy_from_slice(Sha256::digest(Sha256::digest(data)).as_slice());
        DoubleSha256(ret)
    }
}

/// Convert a hexadecimal-encoded string to its corresponding bytes
pub fn hex_bytes(s: &str) -> Result<Vec<u8>, HexError> {
    if s.len() % 2 != 0 {
        return Err(HexError::BadLength(s.len()));
    }
    let digits: Vec<char> = s.chars().collect();
    digits
        .chunks(2)
        .map(|pair| {
            let hi = pair[0].to_digit(16).ok_or(HexError::BadCharacter(pair[0]))?;
            let lo = pair[1].to_digit(16).ok_or(HexError::BadCharacter(pair[1]))?;
            Ok((hi * 0x10 + lo) as u8)
        })
        .collect()
}

/// Convert a slice of u8 to a hex string
pub fn to_hex(s: &[u8]) -> String {
    s.iter().fold(String::with_capacity(s.len() * 2), |mut r, b| {
        // writing to a String cannot fail
        let _ = write!(r, "{:02x}", b);
        r
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        assert_eq!(hex_bytes("00ff7f").unwrap(), vec![0x00, 0xff, 0x7f]);
        assert_eq!(to_hex(&[0x00, 0xff, 0x7f]), "00ff7f");
        assert_eq!(hex_bytes("ABcd").unwrap(), vec![0xab, 0xcd]);
    }

    #[test]
    fn hex_rejects_garbage() {
        assert_eq!(hex_bytes("abc"), Err(HexError::BadLength(3)));
        assert_eq!(hex_bytes("zz"), Err(HexError::BadCharacter('z')));
        assert_eq!(
            Hash160::from_hex("0011"),
            Err(HexError::BadLength(4)),
            "hex of the wrong width is rejected"
        );
    }

    #[test]
    fn sha256_vectors() {
        assert_eq!(
            Sha256Sum::from_data(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            Sha256Sum::from_parts(&[b"hello ", b"world"]),
            Sha256Sum::from_data(b"hello world")
        );
    }

    #[test]
    fn hash160_vector() {
        // hash160 of the empty string
        assert_eq!(
            Hash160::from_data(b"").to_hex(),
            "b472a266d0bd89c13706a4132ccfb16f7c3b9fcb"
        );
    }
}
