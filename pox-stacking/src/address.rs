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

use std::fmt;

use pox_common::util::hash::{hex_bytes, to_hex};
use pox_common::util::HexError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::signed_structured_data::{TupleData, Value};

/// Highest address version a reward address may carry
pub const MAX_ADDRESS_VERSION: u8 = 6;
/// Versions up to this one carry a 20-byte hash; above it, 32 bytes
pub const MAX_ADDRESS_VERSION_BUFF_20: u8 = 4;

/// Reward address on the burnchain, kept as the opaque `(version, hashbytes)`
/// pair it is committed with. Versions 0-4 are the legacy hash modes
/// (p2pkh, p2sh, p2sh-p2wpkh, p2sh-p2wsh, p2wpkh); 5 and 6 are p2wsh and p2tr.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoxAddress {
    pub version: u8,
    #[serde(serialize_with = "hashbytes_serialize", deserialize_with = "hashbytes_deserialize")]
    pub hashbytes: Vec<u8>,
}

fn hashbytes_serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&to_hex(bytes))
}

fn hashbytes_deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
    let hex = String::deserialize(d)?;
    hex_bytes(&hex).map_err(serde::de::Error::custom)
}

impl PoxAddress {
    pub fn new(version: u8, hashbytes: Vec<u8>) -> PoxAddress {
        PoxAddress { version, hashbytes }
    }

    pub fn from_hex(version: u8, hashbytes_hex: &str) -> Result<PoxAddress, HexError> {
        Ok(PoxAddress::new(version, hex_bytes(hashbytes_hex)?))
    }

    /// p2pkh of the all-zeroes hash
    pub fn standard_burn_address() -> PoxAddress {
        PoxAddress::new(0, vec![0u8; 20])
    }

    pub fn is_valid(&self) -> bool {
        match self.version {
            0..=MAX_ADDRESS_VERSION_BUFF_20 => self.hashbytes.len() == 20,
            v if v <= MAX_ADDRESS_VERSION => self.hashbytes.len() == 32,
            _ => false,
        }
    }

    /// `{ version: (buff 1), hashbytes: (buff 32) }`
    pub fn as_clarity_tuple(&self) -> TupleData {
        let mut tuple = TupleData::default();
        tuple.insert("version", Value::Buffer(vec![self.version]));
        tuple.insert("hashbytes", Value::Buffer(self.hashbytes.clone()));
        tuple
    }
}

impl fmt::Display for PoxAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02x}:{}", self.version, to_hex(&self.hashbytes))
    }
}
