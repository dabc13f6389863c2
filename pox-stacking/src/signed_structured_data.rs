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

//! SIP-018 signed structured data: the Clarity consensus encoding of the
//! handful of value types a signer message needs, plus the message hashing
//! and signing helpers built on it.

use std::collections::BTreeMap;

use pox_common::util::hash::Sha256Sum;
use pox_common::util::secp256k1::{MessageSignature, Secp256k1Error, Secp256k1PrivateKey};

/// Message prefix for signed structured data. "SIP018" in ascii
pub const STRUCTURED_DATA_PREFIX: [u8; 6] = [0x53, 0x49, 0x50, 0x30, 0x31, 0x38];

const TYPE_PREFIX_UINT: u8 = 0x01;
const TYPE_PREFIX_BUFFER: u8 = 0x02;
const TYPE_PREFIX_TUPLE: u8 = 0x0c;
const TYPE_PREFIX_STRING_ASCII: u8 = 0x0d;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("string-ascii may only hold printable ASCII")]
    NonAsciiString,
    #[error("tuple field name {0:?} is empty or longer than 128 bytes")]
    BadFieldName(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    UInt(u128),
    Buffer(Vec<u8>),
    StringASCII(Vec<u8>),
    Tuple(TupleData),
}

/// Tuple fields, kept sorted by name as the consensus encoding requires.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TupleData {
    data_map: BTreeMap<String, Value>,
}

impl TupleData {
    pub fn from_data(data: Vec<(&str, Value)>) -> Result<TupleData, ValueError> {
        let mut data_map = BTreeMap::new();
        for (name, value) in data {
            if name.is_empty() || name.len() > 128 {
                return Err(ValueError::BadFieldName(name.to_string()));
            }
            data_map.insert(name.to_string(), value);
        }
        Ok(TupleData { data_map })
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data_map.get(name)
    }

    pub(crate) fn insert(&mut self, name: &'static str, value: Value) {
        self.data_map.insert(name.to_string(), value);
    }
}

impl From<TupleData> for Value {
    fn from(t: TupleData) -> Value {
        Value::Tuple(t)
    }
}

impl Value {
    pub fn string_ascii_from_bytes(bytes: Vec<u8>) -> Result<Value, ValueError> {
        if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            Ok(Value::StringASCII(bytes))
        } else {
            Err(ValueError::NonAsciiString)
        }
    }

    /// Appends the consensus serialization of this value to `w`.
    pub fn serialize_write(&self, w: &mut Vec<u8>) {
        match self {
            Value::UInt(v) => {
                w.push(TYPE_PREFIX_UINT);
                w.extend_from_slice(&v.to_be_bytes());
            }
            Value::Buffer(bytes) => {
                w.push(TYPE_PREFIX_BUFFER);
                w.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                w.extend_from_slice(bytes);
            }
            Value::StringASCII(bytes) => {
                w.push(TYPE_PREFIX_STRING_ASCII);
                w.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                w.extend_from_slice(bytes);
            }
            Value::Tuple(tuple) => {
                w.push(TYPE_PREFIX_TUPLE);
                w.extend_from_slice(&(tuple.data_map.len() as u32).to_be_bytes());
                for (name, value) in tuple.data_map.iter() {
                    // field names are bounded to 128 bytes by TupleData::from_data
                    w.push(name.len() as u8);
                    w.extend_from_slice(name.as_bytes());
                    value.serialize_write(w);
                }
            }
        }
    }

    pub fn serialize_to_vec(&self) -> Vec<u8> {
        let mut bytes = vec![];
        self.serialize_write(&mut bytes);
        bytes
    }
}

pub fn structured_data_hash(value: &Value) -> Sha256Sum {
    Sha256Sum::from_data(&value.serialize_to_vec())
}

/// Generate a message hash for signing structured Clarity data.
/// Reference [SIP018](https://github.com/stacksgov/sips/blob/main/sips/sip-018/sip-018-signed-structured-data.md) for more information.
pub fn structured_data_message_hash(structured_data: &Value, domain: &Value) -> Sha256Sum {
    Sha256Sum::from_parts(&[
        STRUCTURED_DATA_PREFIX.as_ref(),
        structured_data_hash(domain).as_bytes(),
        structured_data_hash(structured_data).as_bytes(),
    ])
}

/// Sign structured Clarity data with a given private key.
pub fn sign_structured_data(
    structured_data: &Value,
    domain: &Value,
    private_key: &Secp256k1PrivateKey,
) -> Result<MessageSignature, Secp256k1Error> {
    let msg_hash = structured_data_message_hash(structured_data, domain);
    private_key.sign(msg_hash.as_bytes())
}

pub fn make_structured_data_domain(
    name: &str,
    version: &str,
    chain_id: u32,
) -> Result<Value, ValueError> {
    Ok(Value::Tuple(TupleData::from_data(vec![
        ("name", Value::string_ascii_from_bytes(name.into())?),
        ("version", Value::string_ascii_from_bytes(version.into())?),
        ("chain-id", Value::UInt(chain_id.into())),
    ])?))
}

pub mod pox4 {
    use pox_common::define_named_enum;

    use super::{
        structured_data_message_hash, MessageSignature, Secp256k1Error, Secp256k1PrivateKey,
        Sha256Sum, TupleData, Value,
    };
    use crate::address::PoxAddress;

    pub const POX_4_SIGNER_DOMAIN_NAME: &str = "pox-4-signer";
    pub const POX_4_SIGNER_DOMAIN_VERSION: &str = "1.0.0";

    define_named_enum!(Pox4SignatureTopic {
        StackStx("stack-stx"),
        AggregationCommit("agg-commit"),
        AggregationIncrease("agg-increase"),
        StackExtend("stack-extend"),
        StackIncrease("stack-increase"),
    });

    // topic names and the domain strings are fixed printable ASCII
    fn ascii(s: &'static str) -> Value {
        Value::StringASCII(s.as_bytes().to_vec())
    }

    pub fn make_pox_4_signed_data_domain(chain_id: u32) -> Value {
        Value::Tuple(TupleData {
            data_map: [
                ("name".to_string(), ascii(POX_4_SIGNER_DOMAIN_NAME)),
                ("version".to_string(), ascii(POX_4_SIGNER_DOMAIN_VERSION)),
                ("chain-id".to_string(), Value::UInt(chain_id.into())),
            ]
            .into_iter()
            .collect(),
        })
    }

    pub fn make_pox_4_signer_key_message_hash(
        pox_addr: &PoxAddress,
        reward_cycle: u128,
        topic: &Pox4SignatureTopic,
        chain_id: u32,
        period: u128,
        max_amount: u128,
        auth_id: u128,
    ) -> Sha256Sum {
        let domain_tuple = make_pox_4_signed_data_domain(chain_id);
        let data_tuple = Value::Tuple(TupleData {
            data_map: [
                ("pox-addr".to_string(), pox_addr.as_clarity_tuple().into()),
                ("reward-cycle".to_string(), Value::UInt(reward_cycle)),
                ("period".to_string(), Value::UInt(period)),
                ("topic".to_string(), ascii(topic.get_name_str())),
                ("auth-id".to_string(), Value::UInt(auth_id)),
                ("max-amount".to_string(), Value::UInt(max_amount)),
            ]
            .into_iter()
            .collect(),
        });
        structured_data_message_hash(&data_tuple, &domain_tuple)
    }

    /// Produce the 65-byte RSV signature a signer hands to a stacker.
    #[allow(clippy::too_many_arguments)]
    pub fn make_pox_4_signer_key_signature(
        pox_addr: &PoxAddress,
        signer_key: &Secp256k1PrivateKey,
        reward_cycle: u128,
        topic: &Pox4SignatureTopic,
        chain_id: u32,
        period: u128,
        max_amount: u128,
        auth_id: u128,
    ) -> Result<MessageSignature, Secp256k1Error> {
        let msg_hash = make_pox_4_signer_key_message_hash(
            pox_addr,
            reward_cycle,
            topic,
            chain_id,
            period,
            max_amount,
            auth_id,
        );
        signer_key.sign(msg_hash.as_bytes())
    }
}

#[cfg(test)]
mod test {
    use pox_common::consts::CHAIN_ID_TESTNET;
    use pox_common::util::hash::to_hex;

    use super::pox4::*;
    use super::*;
    use crate::address::PoxAddress;

    #[test]
    fn test_structured_data_serialization() {
        // Test against test vectors from SIP018
        let data = Value::string_ascii_from_bytes("Hello World".into()).unwrap();
        let msg_hash = structured_data_hash(&data);
        assert_eq!(
            to_hex(msg_hash.as_bytes()),
            "5297eef9765c466d945ad1cb2c81b30b9fed6c165575dc9226e9edf78b8cd9e8"
        );
    }

    #[test]
    fn test_message_prefix() {
        assert_eq!(to_hex(STRUCTURED_DATA_PREFIX.as_ref()), "534950303138");
    }

    #[test]
    fn test_structured_data_message_hash() {
        let domain = make_structured_data_domain("Test App", "1.0.0", 1).unwrap();
        let data = Value::string_ascii_from_bytes("Hello World".into()).unwrap();
        let msg_hash = structured_data_message_hash(&data, &domain);
        assert_eq!(
            to_hex(msg_hash.as_bytes()),
            "1bfdab6d4158313ce34073fbb8d6b0fc32c154d439def12247a0f44bb2225259"
        );
    }

    #[test]
    fn test_sign_structured_data() {
        let sk = Secp256k1PrivateKey::from_hex(
            "753b7cc01a1a2e86221266a154af739463fce51219d97e4f856cd7200c3bd2a601",
        )
        .unwrap();
        let domain = make_structured_data_domain("Test App", "1.0.0", 1).unwrap();
        let data = Value::string_ascii_from_bytes("Hello World".into()).unwrap();
        let signature = sign_structured_data(&data, &domain, &sk).unwrap();
        assert_eq!(
            to_hex(&signature.to_rsv()),
            "8b94e45701d857c9f1d1d70e8b2ca076045dae4920fb0160be0642a68cd78de072ab527b5c5277a593baeb2a8b657c216b99f7abb5d14af35b4bf12ba6460ba401"
        );
    }

    #[test]
    fn test_pox4_message_hash_fixture() {
        let pox_addr = PoxAddress::standard_burn_address();
        let msg_hash = make_pox_4_signer_key_message_hash(
            &pox_addr,
            1,
            &Pox4SignatureTopic::StackStx,
            CHAIN_ID_TESTNET,
            12,
            u128::MAX,
            111,
        );
        assert_eq!(
            to_hex(msg_hash.as_bytes()),
            "ec5b88aa81a96a6983c26cdba537a13d253425348ffc0ba6b07130869b025a2d"
        );
    }

    #[test]
    fn test_topic_names() {
        assert_eq!(
            Pox4SignatureTopic::lookup_by_name("agg-commit"),
            Some(Pox4SignatureTopic::AggregationCommit)
        );
        assert_eq!(Pox4SignatureTopic::StackExtend.to_string(), "stack-extend");
        assert_eq!(Pox4SignatureTopic::lookup_by_name("stack-everything"), None);
    }

    #[test]
    fn test_value_encoding() {
        assert_eq!(
            to_hex(&Value::UInt(1).serialize_to_vec()),
            "0100000000000000000000000000000001"
        );
        assert_eq!(
            to_hex(&Value::Buffer(vec![0xab]).serialize_to_vec()),
            "0200000001ab"
        );
        let tuple = TupleData::from_data(vec![("b", Value::UInt(0)), ("a", Value::Buffer(vec![]))])
            .unwrap();
        // fields are written in name order
        assert_eq!(
            to_hex(&Value::Tuple(tuple).serialize_to_vec()),
            "0c000000020161020000000001620100000000000000000000000000000000"
        );
        assert_eq!(
            Value::string_ascii_from_bytes(vec![0xff]),
            Err(ValueError::NonAsciiString)
        );
    }
}
