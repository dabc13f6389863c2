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

//! Direct stacking: a principal locks its own STX for its own reward address.

use pox_common::types::PrincipalData;
use pox_common::{error, info};
use serde_json::json;
use slog::{slog_error, slog_info};

use crate::address::PoxAddress;
use crate::balances::StxBalances;
use crate::contract::{finish, PoxContract};
use crate::errors::StackingError;
use crate::events::{pox_addr_json, signer_key_json, PoxEventName};
use crate::signed_structured_data::pox4::Pox4SignatureTopic;
use crate::signer_auth::{AuthRequest, SignerArgs};
use crate::state::StackingState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockReceipt {
    pub stacker: PrincipalData,
    pub lock_amount: u128,
    pub unlock_burn_height: u64,
    pub signer_key: Option<[u8; 33]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendReceipt {
    pub stacker: PrincipalData,
    pub unlock_burn_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncreaseReceipt {
    pub stacker: PrincipalData,
    pub total_locked: u128,
}

impl<B: StxBalances> PoxContract<B> {
    /// Lock `amount_ustx` of the stacker's STX for `lock_period` reward
    /// cycles, starting with the next one.
    pub fn stack_stx(
        &mut self,
        stacker: &PrincipalData,
        amount_ustx: u128,
        pox_addr: &PoxAddress,
        start_burn_ht: u64,
        lock_period: u64,
        signer: Option<&SignerArgs>,
    ) -> Result<LockReceipt, StackingError> {
        let result = self.transaction(|pox| {
            pox.inner_stack_stx(
                stacker,
                amount_ustx,
                pox_addr,
                start_burn_ht,
                lock_period,
                signer,
            )
        });
        if let Ok(receipt) = &result {
            info!("Stacked STX";
                  "stacker" => %stacker,
                  "lock_amount" => receipt.lock_amount,
                  "pox_addr" => %pox_addr,
                  "unlock_burn_height" => receipt.unlock_burn_height);
        }
        finish("stack-stx", result)
    }

    fn inner_stack_stx(
        &mut self,
        stacker: &PrincipalData,
        amount_ustx: u128,
        pox_addr: &PoxAddress,
        start_burn_ht: u64,
        lock_period: u64,
        signer: Option<&SignerArgs>,
    ) -> Result<LockReceipt, StackingError> {
        let cur_cycle = self.current_cycle()?;
        self.check_start_burn_height(start_burn_ht, cur_cycle)?;
        if self.data.has_active_grant(stacker, self.burn_block_height) {
            return Err(StackingError::AlreadyDelegated);
        }
        if self.is_stacking(stacker) {
            return Err(StackingError::AlreadyStacking);
        }
        self.check_unlocked_balance(stacker, amount_ustx)?;
        self.check_lock_args(amount_ustx, pox_addr, lock_period)?;
        let minimum = self.get_stacking_minimum();
        if amount_ustx < minimum {
            return Err(StackingError::AmountTooLow {
                amount: amount_ustx,
                minimum,
            });
        }

        let grant = self.verify_signer(
            &AuthRequest {
                topic: Pox4SignatureTopic::StackStx,
                reward_cycle: cur_cycle,
                period: lock_period,
                pox_addr,
                amount: amount_ustx,
            },
            signer,
            stacker,
        )?;
        let signer_key = grant.as_ref().map(|g| g.signer_key);

        let first_reward_cycle = cur_cycle
            .checked_add(1)
            .ok_or(StackingError::ArithmeticOverflow)?;
        let unlock_height = self.unlock_height_for(first_reward_cycle, lock_period)?;
        let reward_set_indexes = self.add_pox_addr_to_reward_cycles(
            pox_addr,
            first_reward_cycle,
            lock_period,
            amount_ustx,
            stacker,
            signer_key,
        )?;
        self.lock_stx(stacker, amount_ustx, unlock_height)?;
        self.data.insert_stacking_state(
            stacker.clone(),
            StackingState {
                amount_ustx,
                pox_addr: pox_addr.clone(),
                first_reward_cycle,
                lock_period,
                unlock_height,
                reward_set_indexes,
                delegated_to: None,
                signer_key,
            },
        );
        self.consume_signer_auth(grant);

        self.emit(
            PoxEventName::StackStx,
            stacker,
            json!({
                "lock-amount": amount_ustx,
                "unlock-burn-height": unlock_height,
                "pox-addr": pox_addr_json(pox_addr),
                "start-burn-height": start_burn_ht,
                "lock-period": lock_period,
                "signer-key": signer_key_json(signer_key.as_ref()),
                "start-cycle-id": first_reward_cycle,
                "end-cycle-id": first_reward_cycle.saturating_add(lock_period),
            }),
        );
        Ok(LockReceipt {
            stacker: stacker.clone(),
            lock_amount: amount_ustx,
            unlock_burn_height: unlock_height,
            signer_key,
        })
    }

    /// Re-base an unexpired lock on the current cycle and compute the period
    /// it would span once extended by `extend_count` cycles.
    pub(crate) fn extended_lock_span(
        &self,
        state: &StackingState,
        cur_cycle: u64,
        extend_count: u64,
    ) -> Result<(u64, u64, u64), StackingError> {
        if extend_count == 0 {
            return Err(StackingError::InvalidPeriod(extend_count));
        }
        let first_extend_cycle = self
            .config
            .pox_constants
            .block_height_to_reward_cycle(state.unlock_height)?;
        let first_reward_cycle = cur_cycle.max(state.first_reward_cycle);
        let lock_period = first_extend_cycle
            .checked_add(extend_count)
            .and_then(|end| end.checked_sub(first_reward_cycle))
            .ok_or(StackingError::ArithmeticOverflow)?;
        if !self.config.pox_constants.is_valid_lock_period(lock_period) {
            return Err(StackingError::InvalidPeriod(lock_period));
        }
        Ok((first_extend_cycle, first_reward_cycle, lock_period))
    }

    /// Push the end of the stacker's lock out by `extend_count` reward cycles.
    pub fn stack_extend(
        &mut self,
        stacker: &PrincipalData,
        extend_count: u64,
        pox_addr: &PoxAddress,
        signer: Option<&SignerArgs>,
    ) -> Result<ExtendReceipt, StackingError> {
        let result = self.transaction(|pox| {
            pox.inner_stack_extend(stacker, extend_count, pox_addr, signer)
        });
        if let Ok(receipt) = &result {
            info!("Extended STX lock";
                  "stacker" => %stacker,
                  "extend_count" => extend_count,
                  "unlock_burn_height" => receipt.unlock_burn_height);
        }
        finish("stack-extend", result)
    }

    fn inner_stack_extend(
        &mut self,
        stacker: &PrincipalData,
        extend_count: u64,
        pox_addr: &PoxAddress,
        signer: Option<&SignerArgs>,
    ) -> Result<ExtendReceipt, StackingError> {
        let cur_cycle = self.current_cycle()?;
        let state = self
            .data
            .stacking_state(stacker)
            .cloned()
            .ok_or(StackingError::NotStacking)?;
        if !state.is_active(self.burn_block_height) {
            return Err(StackingError::AlreadyExpired {
                unlock_height: state.unlock_height,
                burn_height: self.burn_block_height,
            });
        }
        if state.delegated_to.is_some() {
            return Err(StackingError::StackingIsDelegated);
        }
        if self.data.has_active_grant(stacker, self.burn_block_height) {
            return Err(StackingError::AlreadyDelegated);
        }
        if !pox_addr.is_valid() {
            return Err(StackingError::InvalidPoxAddress);
        }
        let (first_extend_cycle, first_reward_cycle, lock_period) =
            self.extended_lock_span(&state, cur_cycle, extend_count)?;

        let grant = self.verify_signer(
            &AuthRequest {
                topic: Pox4SignatureTopic::StackExtend,
                reward_cycle: cur_cycle,
                period: extend_count,
                pox_addr,
                amount: state.amount_ustx,
            },
            signer,
            stacker,
        )?;
        let signer_key = grant.as_ref().map(|g| g.signer_key).or(state.signer_key);

        let new_indexes = self.add_pox_addr_to_reward_cycles(
            pox_addr,
            first_extend_cycle,
            extend_count,
            state.amount_ustx,
            stacker,
            signer_key,
        )?;
        let skip = (first_reward_cycle - state.first_reward_cycle) as usize;
        let mut reward_set_indexes: Vec<u128> = state
            .reward_set_indexes
            .get(skip..)
            .unwrap_or_default()
            .to_vec();
        reward_set_indexes.extend(new_indexes);

        let unlock_height = self.unlock_height_for(first_extend_cycle, extend_count)?;
        self.lock_stx(stacker, state.amount_ustx, unlock_height)?;
        self.data.insert_stacking_state(
            stacker.clone(),
            StackingState {
                pox_addr: pox_addr.clone(),
                first_reward_cycle,
                lock_period,
                unlock_height,
                reward_set_indexes,
                signer_key,
                ..state
            },
        );
        self.consume_signer_auth(grant);

        self.emit(
            PoxEventName::StackExtend,
            stacker,
            json!({
                "extend-count": extend_count,
                "unlock-burn-height": unlock_height,
                "pox-addr": pox_addr_json(pox_addr),
                "signer-key": signer_key_json(signer_key.as_ref()),
                "start-cycle-id": first_extend_cycle,
                "end-cycle-id": first_extend_cycle.saturating_add(extend_count),
            }),
        );
        Ok(ExtendReceipt {
            stacker: stacker.clone(),
            unlock_burn_height: unlock_height,
        })
    }

    /// Lock `increase_by` more uSTX for the remaining cycles of the stacker's lock.
    pub fn stack_increase(
        &mut self,
        stacker: &PrincipalData,
        increase_by: u128,
        signer: Option<&SignerArgs>,
    ) -> Result<IncreaseReceipt, StackingError> {
        let result =
            self.transaction(|pox| pox.inner_stack_increase(stacker, increase_by, signer));
        if let Ok(receipt) = &result {
            info!("Increased STX lock";
                  "stacker" => %stacker,
                  "increase_by" => increase_by,
                  "total_locked" => receipt.total_locked);
        }
        finish("stack-increase", result)
    }

    fn inner_stack_increase(
        &mut self,
        stacker: &PrincipalData,
        increase_by: u128,
        signer: Option<&SignerArgs>,
    ) -> Result<IncreaseReceipt, StackingError> {
        let (cur_cycle, next_cycle) = self.next_cycle()?;
        let state = self
            .get_stacker_info(stacker)
            .cloned()
            .ok_or(StackingError::IncreaseNotLocked)?;
        if state.delegated_to.is_some() {
            return Err(StackingError::StackingIsDelegated);
        }
        if increase_by == 0 {
            return Err(StackingError::InvalidAmount);
        }
        self.check_unlocked_balance(stacker, increase_by)?;
        let total_locked = state
            .amount_ustx
            .checked_add(increase_by)
            .ok_or(StackingError::ArithmeticOverflow)?;

        let grant = self.verify_signer(
            &AuthRequest {
                topic: Pox4SignatureTopic::StackIncrease,
                reward_cycle: cur_cycle,
                period: state.lock_period,
                pox_addr: &state.pox_addr,
                amount: total_locked,
            },
            signer,
            stacker,
        )?;
        let signer_key = grant.as_ref().map(|g| g.signer_key).or(state.signer_key);

        let start_cycle = next_cycle.max(state.first_reward_cycle);
        for reward_cycle in start_cycle..state.end_reward_cycle() {
            let offset = (reward_cycle - state.first_reward_cycle) as usize;
            let entry = state
                .reward_set_indexes
                .get(offset)
                .copied()
                .and_then(|index| self.reward_set_entry_mut(reward_cycle, index));
            let Some(entry) = entry else {
                error!("Stacker has no reward set entry for a locked cycle";
                       "stacker" => %stacker,
                       "reward_cycle" => reward_cycle);
                return Err(StackingError::NotStacking);
            };
            entry.total_ustx = entry
                .total_ustx
                .checked_add(increase_by)
                .ok_or(StackingError::ArithmeticOverflow)?;
            if grant.is_some() {
                entry.signer = signer_key;
            }
            self.add_to_cycle_total(reward_cycle, increase_by)?;
        }

        self.lock_stx(stacker, total_locked, state.unlock_height)?;
        self.data.insert_stacking_state(
            stacker.clone(),
            StackingState {
                amount_ustx: total_locked,
                signer_key,
                ..state.clone()
            },
        );
        self.consume_signer_auth(grant);

        self.emit(
            PoxEventName::StackIncrease,
            stacker,
            json!({
                "increase-by": increase_by,
                "total-locked": total_locked,
                "pox-addr": pox_addr_json(&state.pox_addr),
                "signer-key": signer_key_json(signer_key.as_ref()),
                "start-cycle-id": start_cycle,
                "end-cycle-id": state.end_reward_cycle(),
            }),
        );
        Ok(IncreaseReceipt {
            stacker: stacker.clone(),
            total_locked,
        })
    }
}
