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

//! A pool front end: whitelisted members hand their STX to one operator,
//! which locks them and commits the pool's aggregate in a single call.

use hashbrown::HashMap;
use pox_common::types::PrincipalData;
use pox_common::{debug, info};
use slog::{slog_debug, slog_info};

use crate::balances::StxBalances;
use crate::config::PoolConfig;
use crate::contract::PoxContract;
use crate::errors::{PoolError, StackingError};
use crate::signer_auth::SignerArgs;
use crate::stacking::LockReceipt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolDelegateReceipt {
    /// The member's lock, made by the pool operator
    pub lock_result: LockReceipt,
    /// Whether the aggregation commit met the stacking threshold
    pub commit_result: bool,
}

pub struct PoolWrapper {
    config: PoolConfig,
    whitelist: HashMap<PrincipalData, bool>,
}

impl PoolWrapper {
    pub fn new(config: PoolConfig) -> PoolWrapper {
        PoolWrapper {
            config,
            whitelist: HashMap::new(),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn set_whitelisted(
        &mut self,
        caller: &PrincipalData,
        principal: &PrincipalData,
        allowed: bool,
    ) -> Result<bool, PoolError> {
        if *caller != self.config.admin {
            debug!("Rejected whitelist update";
                   "caller" => %caller,
                   "principal" => %principal);
            return Err(PoolError::NotAdmin);
        }
        self.whitelist.insert(principal.clone(), allowed);
        info!("Updated pool whitelist";
              "principal" => %principal,
              "allowed" => allowed);
        Ok(true)
    }

    pub fn is_whitelisted(&self, principal: &PrincipalData) -> bool {
        self.whitelist.get(principal).copied().unwrap_or(false)
    }

    fn signer_args(&self) -> Option<SignerArgs> {
        self.config
            .signer_key
            .as_ref()
            .map(|key| SignerArgs::unsigned(key, self.config.max_amount, self.config.auth_id))
    }

    /// Delegate `amount_ustx` of the caller's STX to the pool, lock what the
    /// caller can spare, and commit the pool's total for the next cycle.
    ///
    /// The grant to the pool operator stands even if locking fails.
    pub fn delegate_stx<B: StxBalances>(
        &self,
        pox: &mut PoxContract<B>,
        caller: &PrincipalData,
        amount_ustx: u128,
    ) -> Result<PoolDelegateReceipt, PoolError> {
        if !self.is_whitelisted(caller) {
            debug!("Rejected pool delegation from non-whitelisted principal";
                   "caller" => %caller);
            return Err(PoolError::NotWhitelisted);
        }
        let operator = &self.config.operator;
        let pox_addr = &self.config.pox_addr;
        pox.delegate_stx(caller, operator, Some(amount_ustx), None, Some(pox_addr))?;

        let signer = self.signer_args();
        let receipt = pox.transaction(|pox| -> Result<PoolDelegateReceipt, StackingError> {
            let account = pox.stx_account(caller);
            let allowed = amount_ustx.min(account.locked.saturating_add(account.unlocked));
            let lock_amount = if allowed > self.config.fee_buffer_ustx {
                allowed - self.config.fee_buffer_ustx
            } else {
                allowed
            };
            let start_burn_ht = pox.burn_block_height();
            let lock_receipt = pox.delegate_stack_stx(
                operator,
                caller,
                lock_amount,
                pox_addr,
                start_burn_ht,
                self.config.lock_period,
            )?;
            let (_, next_cycle) = pox.next_cycle()?;
            let commit_result =
                match pox.aggregation_commit(operator, pox_addr, next_cycle, signer.as_ref()) {
                    Ok(_) => true,
                    Err(StackingError::ThresholdNotMet { amount, minimum }) => {
                        info!("Pool total does not meet the stacking minimum yet";
                              "reward_cycle" => next_cycle,
                              "amount" => amount,
                              "minimum" => minimum);
                        false
                    }
                    Err(e) => return Err(e),
                };
            Ok(PoolDelegateReceipt {
                lock_result: lock_receipt,
                commit_result,
            })
        })?;
        info!("Pool member delegated STX";
              "member" => %caller,
              "amount_ustx" => amount_ustx,
              "commit_result" => receipt.commit_result);
        Ok(receipt)
    }
}
