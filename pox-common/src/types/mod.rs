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

//! Account identities: c32 addresses and the principals built on them.

use std::fmt;
use std::str::FromStr;

use crate::address::c32::{c32_address, c32_address_decode};
use crate::address::{
    Error as AddressError, C32_ADDRESS_VERSION_MAINNET_SINGLESIG,
    C32_ADDRESS_VERSION_TESTNET_SINGLESIG,
};
use crate::util::hash::Hash160;
use crate::util::secp256k1::Secp256k1PublicKey;

pub const CONTRACT_MAX_NAME_LENGTH: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StacksAddress {
    pub version: u8,
    pub bytes: Hash160,
}

impl StacksAddress {
    pub fn new(version: u8, bytes: Hash160) -> StacksAddress {
        StacksAddress { version, bytes }
    }

    fn singlesig_version(mainnet: bool) -> u8 {
        if mainnet {
            C32_ADDRESS_VERSION_MAINNET_SINGLESIG
        } else {
            C32_ADDRESS_VERSION_TESTNET_SINGLESIG
        }
    }

    /// Single-sig address that owns the given compressed public key.
    pub fn p2pkh(mainnet: bool, pubkey: &Secp256k1PublicKey) -> StacksAddress {
        StacksAddress::p2pkh_from_compressed(mainnet, &pubkey.to_bytes_compressed())
    }

    pub fn p2pkh_from_compressed(mainnet: bool, pubkey: &[u8; 33]) -> StacksAddress {
        StacksAddress {
            version: StacksAddress::singlesig_version(mainnet),
            bytes: Hash160::from_data(pubkey),
        }
    }

    /// The all-zeroes address nobody holds a key for.
    pub fn burn_address(mainnet: bool) -> StacksAddress {
        StacksAddress {
            version: StacksAddress::singlesig_version(mainnet),
            bytes: Hash160([0u8; 20]),
        }
    }

    pub fn is_mainnet(&self) -> bool {
        self.version == C32_ADDRESS_VERSION_MAINNET_SINGLESIG
            || self.version == crate::address::C32_ADDRESS_VERSION_MAINNET_MULTISIG
    }

    pub fn from_string(s: &str) -> Result<StacksAddress, AddressError> {
        let (version, bytes) = c32_address_decode(s)?;
        let bytes = Hash160::from_bytes(&bytes).ok_or(AddressError::InvalidPayloadLength)?;
        Ok(StacksAddress { version, bytes })
    }
}

impl fmt::Display for StacksAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match c32_address(self.version, self.bytes.as_bytes()) {
            Ok(addr) => write!(f, "{}", addr),
            Err(_) => write!(f, "<invalid address v{} {}>", self.version, self.bytes),
        }
    }
}

/// Either an account address, or a contract published by one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum PrincipalData {
    Standard(StacksAddress),
    Contract(StacksAddress, String),
}

fn check_contract_name(name: &str) -> Result<(), AddressError> {
    let mut chars = name.chars();
    let starts_alpha = chars.next().map_or(false, |c| c.is_ascii_alphabetic());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if starts_alpha && rest_ok && name.len() <= CONTRACT_MAX_NAME_LENGTH {
        Ok(())
    } else {
        Err(AddressError::InvalidContractName(name.to_string()))
    }
}

impl PrincipalData {
    pub fn parse(literal: &str) -> Result<PrincipalData, AddressError> {
        match literal.split_once('.') {
            Some((addr, name)) => {
                check_contract_name(name)?;
                Ok(PrincipalData::Contract(
                    StacksAddress::from_string(addr)?,
                    name.to_string(),
                ))
            }
            None => Ok(PrincipalData::Standard(StacksAddress::from_string(literal)?)),
        }
    }

    pub fn contract(issuer: StacksAddress, name: &str) -> Result<PrincipalData, AddressError> {
        check_contract_name(name)?;
        Ok(PrincipalData::Contract(issuer, name.to_string()))
    }

    pub fn address(&self) -> &StacksAddress {
        match self {
            PrincipalData::Standard(addr) | PrincipalData::Contract(addr, _) => addr,
        }
    }

    pub fn is_contract(&self) -> bool {
        matches!(self, PrincipalData::Contract(..))
    }
}

impl From<StacksAddress> for PrincipalData {
    fn from(addr: StacksAddress) -> Self {
        PrincipalData::Standard(addr)
    }
}

impl fmt::Display for PrincipalData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PrincipalData::Standard(addr) => write!(f, "{}", addr),
            PrincipalData::Contract(addr, name) => write!(f, "{}.{}", addr, name),
        }
    }
}

impl FromStr for PrincipalData {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PrincipalData::parse(s)
    }
}

impl From<PrincipalData> for String {
    fn from(p: PrincipalData) -> String {
        p.to_string()
    }
}

impl TryFrom<String> for PrincipalData {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        PrincipalData::parse(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::secp256k1::Secp256k1PrivateKey;

    #[test]
    fn principal_parse_display() {
        let standard = PrincipalData::parse("ST000000000000000000002AMW42H").unwrap();
        assert_eq!(
            standard,
            PrincipalData::Standard(StacksAddress::burn_address(false))
        );
        assert_eq!(standard.to_string(), "ST000000000000000000002AMW42H");

        let contract =
            PrincipalData::parse("SP000000000000000000002Q6VF78.pox-fast-pool-v2").unwrap();
        assert!(contract.is_contract());
        assert_eq!(contract.address(), &StacksAddress::burn_address(true));
        assert_eq!(
            contract.to_string(),
            "SP000000000000000000002Q6VF78.pox-fast-pool-v2"
        );
    }

    #[test]
    fn principal_parse_rejects_bad_names() {
        assert_eq!(
            PrincipalData::parse("SP000000000000000000002Q6VF78.9lives"),
            Err(AddressError::InvalidContractName("9lives".into()))
        );
        assert!(PrincipalData::parse("SP000000000000000000002Q6VF78.").is_err());
        assert!(PrincipalData::parse("not-an-address").is_err());
    }

    #[test]
    fn p2pkh_is_hash160_of_compressed_key() {
        let sk = Secp256k1PrivateKey::from_seed(b"p2pkh");
        let pk = Secp256k1PublicKey::from_private(&sk);
        let addr = StacksAddress::p2pkh(false, &pk);
        assert_eq!(addr.version, C32_ADDRESS_VERSION_TESTNET_SINGLESIG);
        assert_eq!(addr.bytes, Hash160::from_data(&pk.to_bytes_compressed()));
        assert!(!addr.is_mainnet());
        assert!(StacksAddress::p2pkh(true, &pk).is_mainnet());
    }

    #[test]
    fn principal_serde_as_string() {
        let p = PrincipalData::Standard(StacksAddress::burn_address(true));
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"SP000000000000000000002Q6VF78\"");
        let back: PrincipalData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
