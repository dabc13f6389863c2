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

//! Synthetic events for successful stacking calls, shaped like the
//! `print` events downstream indexers consume from the pox contracts.

use pox_common::define_named_enum;
use pox_common::types::PrincipalData;
use pox_common::util::hash::to_hex;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};

use crate::address::PoxAddress;
use crate::balances::StxAccount;

define_named_enum!(PoxEventName {
    StackStx("stack-stx"),
    StackExtend("stack-extend"),
    StackIncrease("stack-increase"),
    DelegateStx("delegate-stx"),
    RevokeDelegateStx("revoke-delegate-stx"),
    DelegateStackStx("delegate-stack-stx"),
    DelegateStackExtend("delegate-stack-extend"),
    DelegateStackIncrease("delegate-stack-increase"),
    StackAggregationCommit("stack-aggregation-commit"),
    StackAggregationIncrease("stack-aggregation-increase"),
    SetSignerKeyAuthorization("set-signer-key-authorization"),
});

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PoxEvent {
    pub name: PoxEventName,
    /// Principal whose account the call acted on. For aggregation commits
    /// this is the operator.
    pub stacker: PrincipalData,
    /// Account state after the call
    pub balance: u128,
    pub locked: u128,
    pub burnchain_unlock_height: u64,
    pub data: JsonValue,
}

impl PoxEvent {
    pub fn new(
        name: PoxEventName,
        stacker: &PrincipalData,
        account: &StxAccount,
        data: JsonValue,
    ) -> PoxEvent {
        PoxEvent {
            name,
            stacker: stacker.clone(),
            balance: account.locked.saturating_add(account.unlocked),
            locked: account.locked,
            burnchain_unlock_height: account.unlock_height,
            data,
        }
    }

    pub fn to_json(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::to_value(self)
    }
}

pub fn pox_addr_json(pox_addr: &PoxAddress) -> JsonValue {
    json!({
        "version": to_hex(&[pox_addr.version]),
        "hashbytes": to_hex(&pox_addr.hashbytes),
    })
}

pub fn signer_key_json(signer_key: Option<&[u8; 33]>) -> JsonValue {
    match signer_key {
        Some(key) => JsonValue::String(to_hex(key)),
        None => JsonValue::Null,
    }
}

#[cfg(test)]
mod tests {
    use pox_common::types::StacksAddress;
    use pox_common::util::hash::Hash160;

    use super::*;

    #[test]
    fn event_json_shape() {
        let stacker: PrincipalData = StacksAddress::new(26, Hash160([0; 20])).into();
        let account = StxAccount {
            locked: 90,
            unlocked: 10,
            unlock_height: 3150,
        };
        let event = PoxEvent::new(
            PoxEventName::StackStx,
            &stacker,
            &account,
            json!({
                "lock-amount": 90u128,
                "pox-addr": pox_addr_json(&PoxAddress::standard_burn_address()),
                "signer-key": signer_key_json(None),
            }),
        );
        let json = event.to_json().unwrap();
        assert_eq!(json["name"], "stack-stx");
        assert_eq!(json["stacker"], "ST000000000000000000002AMW42H");
        assert_eq!(json["balance"], 100);
        assert_eq!(json["locked"], 90);
        assert_eq!(json["burnchain-unlock-height"], 3150);
        assert_eq!(json["data"]["pox-addr"]["version"], "00");
        assert!(json["data"]["signer-key"].is_null());
    }
}
