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

mod pox_4_tests;

use pox_common::consts::CHAIN_ID_TESTNET;
use pox_common::types::{PrincipalData, StacksAddress};
use pox_common::util::hash::Hash160;
use pox_common::util::secp256k1::{Secp256k1PrivateKey, Secp256k1PublicKey};

use crate::address::PoxAddress;
use crate::balances::MemoryStxLedger;
use crate::config::{Network, PoxConfig, PoxVersion};
use crate::contract::PoxContract;
use crate::signed_structured_data::pox4::{make_pox_4_signer_key_signature, Pox4SignatureTopic};
use crate::signer_auth::SignerArgs;

/// 100M STX, what every test account starts with
pub const INITIAL_BALANCE: u128 = 100_000_000 * 1_000_000;
/// Accounts funded in every test ledger, so that the liquid supply is
/// 1B STX and the testnet stacking minimum is 125,000 STX
pub const FUNDED_ACCOUNTS: u128 = 10;
pub const STACKING_THRESHOLD: u128 = 125_000_000_000;
pub const CYCLE_LENGTH: u64 = 1050;

pub struct TestStacker {
    pub privk: Secp256k1PrivateKey,
    pub principal: PrincipalData,
    pub pox_addr: PoxAddress,
}

impl TestStacker {
    pub fn new(seed: &str) -> TestStacker {
        let privk = Secp256k1PrivateKey::from_seed(seed.as_bytes());
        let pubkey = Secp256k1PublicKey::from_private(&privk);
        let addr = StacksAddress::p2pkh(false, &pubkey);
        TestStacker {
            pox_addr: PoxAddress::new(0, addr.bytes.as_bytes().to_vec()),
            principal: addr.into(),
            privk,
        }
    }

    pub fn signer_key(&self) -> [u8; 33] {
        Secp256k1PublicKey::from_private(&self.privk).to_bytes_compressed()
    }

    /// Sign an authorization for `pox_addr` with this stacker's key.
    #[allow(clippy::too_many_arguments)]
    pub fn sign(
        &self,
        pox_addr: &PoxAddress,
        topic: Pox4SignatureTopic,
        reward_cycle: u64,
        period: u64,
        max_amount: u128,
        auth_id: u128,
    ) -> SignerArgs {
        let signature = make_pox_4_signer_key_signature(
            pox_addr,
            &self.privk,
            reward_cycle.into(),
            &topic,
            CHAIN_ID_TESTNET,
            period.into(),
            max_amount,
            auth_id,
        )
        .unwrap();
        SignerArgs::signed(
            &signature,
            &Secp256k1PublicKey::from_private(&self.privk),
            max_amount,
            auth_id,
        )
    }
}

/// The reward address the pox-3 scenarios stack to
pub fn fixed_pox_addr() -> PoxAddress {
    PoxAddress::from_hex(0, "7321b74e2b6a7e949e6c4ad313035b1665095017").unwrap()
}

pub fn test_config(pox_version: PoxVersion) -> PoxConfig {
    PoxConfig::new(Network::Testnet, pox_version)
}

/// A ledger at burn height 0 in which each of `stackers` holds
/// `INITIAL_BALANCE`, topped up to `FUNDED_ACCOUNTS` funded accounts.
pub fn test_ledger(config: PoxConfig, stackers: &[&TestStacker]) -> PoxContract<MemoryStxLedger> {
    let mut balances = MemoryStxLedger::new();
    for stacker in stackers {
        balances.credit(&stacker.principal, INITIAL_BALANCE);
    }
    let faucet: PrincipalData = StacksAddress::new(26, Hash160([0xfa; 20])).into();
    let remaining = FUNDED_ACCOUNTS.saturating_sub(stackers.len() as u128);
    balances.credit(&faucet, remaining * INITIAL_BALANCE);
    PoxContract::new(config, balances)
}
