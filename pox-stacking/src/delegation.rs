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

//! Delegated stacking: a stacker grants an operator the right to lock its
//! STX, and the operator pools those locks into partial-stacked totals that
//! it later commits with an aggregation commit.

use pox_common::info;
use pox_common::types::PrincipalData;
use serde_json::json;
use slog::slog_info;

use crate::address::PoxAddress;
use crate::balances::StxBalances;
use crate::contract::{finish, PoxContract};
use crate::errors::StackingError;
use crate::events::{pox_addr_json, PoxEventName};
use crate::stacking::{ExtendReceipt, IncreaseReceipt, LockReceipt};
use crate::state::{DelegationGrant, PartialStackedKey, StackingState};

impl<B: StxBalances> PoxContract<B> {
    /// Grant `operator` the right to lock up to `amount_ceiling` of the
    /// caller's STX. Replaces any earlier grant to the same operator.
    pub fn delegate_stx(
        &mut self,
        stacker: &PrincipalData,
        operator: &PrincipalData,
        amount_ceiling: Option<u128>,
        until_burn_ht: Option<u64>,
        pox_addr: Option<&PoxAddress>,
    ) -> Result<bool, StackingError> {
        let result = self.transaction(|pox| -> Result<bool, StackingError> {
            if let Some(addr) = pox_addr {
                if !addr.is_valid() {
                    return Err(StackingError::InvalidPoxAddress);
                }
            }
            if !pox.config.delegation.allow_while_stacking && pox.is_stacking(stacker) {
                return Err(StackingError::AlreadyStacking);
            }
            pox.data.insert_delegation(
                stacker.clone(),
                operator.clone(),
                DelegationGrant {
                    amount_ceiling,
                    until_burn_ht,
                    pox_addr: pox_addr.cloned(),
                },
            );
            pox.emit(
                PoxEventName::DelegateStx,
                stacker,
                json!({
                    "amount-ustx": amount_ceiling,
                    "delegate-to": operator.to_string(),
                    "unlock-burn-height": until_burn_ht,
                    "pox-addr": pox_addr.map(pox_addr_json),
                }),
            );
            Ok(true)
        });
        if result.is_ok() {
            info!("Delegated STX";
                  "stacker" => %stacker,
                  "operator" => %operator,
                  "amount_ceiling" => ?amount_ceiling,
                  "until_burn_ht" => ?until_burn_ht);
        }
        finish("delegate-stx", result)
    }

    /// Remove every grant the caller has made, returning the operators that
    /// held an active one. Locks already made under a grant stay in place.
    pub fn revoke_delegate_stx(
        &mut self,
        stacker: &PrincipalData,
    ) -> Result<Vec<PrincipalData>, StackingError> {
        let result = self.transaction(|pox| -> Result<Vec<PrincipalData>, StackingError> {
            let burn_block_height = pox.burn_block_height;
            let mut revoked: Vec<PrincipalData> = pox
                .data
                .remove_delegations(stacker)
                .into_iter()
                .filter(|(_, grant)| grant.is_active(burn_block_height))
                .map(|(operator, _)| operator)
                .collect();
            if revoked.is_empty() {
                return Err(StackingError::DelegationAlreadyRevoked);
            }
            revoked.sort();
            let operators: Vec<String> = revoked.iter().map(|op| op.to_string()).collect();
            pox.emit(
                PoxEventName::RevokeDelegateStx,
                stacker,
                json!({ "delegate-to": operators }),
            );
            Ok(revoked)
        });
        if let Ok(revoked) = &result {
            info!("Revoked STX delegation";
                  "stacker" => %stacker,
                  "operators" => revoked.len());
        }
        finish("revoke-delegate-stx", result)
    }

    pub fn get_delegation_info(
        &self,
        stacker: &PrincipalData,
        operator: &PrincipalData,
    ) -> Option<&DelegationGrant> {
        self.data
            .active_grant(stacker, operator, self.burn_block_height)
    }

    pub fn get_partial_stacked_by_cycle(
        &self,
        pox_addr: &PoxAddress,
        reward_cycle: u64,
        operator: &PrincipalData,
    ) -> u128 {
        let key = PartialStackedKey {
            pox_addr: pox_addr.clone(),
            reward_cycle,
            operator: operator.clone(),
        };
        self.data.partial_stacked(&key).unwrap_or(0)
    }

    /// The operator's grant from `stacker`, or `PermissionDenied`.
    fn delegation_grant(
        &self,
        stacker: &PrincipalData,
        operator: &PrincipalData,
    ) -> Result<DelegationGrant, StackingError> {
        self.data
            .active_grant(stacker, operator, self.burn_block_height)
            .cloned()
            .ok_or(StackingError::PermissionDenied)
    }

    /// The stacker's unexpired lock, which must be managed by `operator`.
    fn delegated_stacker_state(
        &self,
        stacker: &PrincipalData,
        operator: &PrincipalData,
    ) -> Result<StackingState, StackingError> {
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
        if state.delegated_to.as_ref() != Some(operator) {
            return Err(StackingError::PermissionDenied);
        }
        Ok(state)
    }

    fn add_partial_stacked(
        &mut self,
        pox_addr: &PoxAddress,
        first_reward_cycle: u64,
        end_reward_cycle: u64,
        operator: &PrincipalData,
        amount_ustx: u128,
    ) -> Result<(), StackingError> {
        for reward_cycle in first_reward_cycle..end_reward_cycle {
            let key = PartialStackedKey {
                pox_addr: pox_addr.clone(),
                reward_cycle,
                operator: operator.clone(),
            };
            self.data
                .add_partial_stacked(key, amount_ustx)
                .ok_or(StackingError::ArithmeticOverflow)?;
        }
        Ok(())
    }

    /// Lock a delegator's STX as its operator. The amount counts towards the
    /// operator's partial-stacked totals until it is committed.
    pub fn delegate_stack_stx(
        &mut self,
        operator: &PrincipalData,
        stacker: &PrincipalData,
        amount_ustx: u128,
        pox_addr: &PoxAddress,
        start_burn_ht: u64,
        lock_period: u64,
    ) -> Result<LockReceipt, StackingError> {
        let result = self.transaction(|pox| {
            pox.inner_delegate_stack_stx(
                operator,
                stacker,
                amount_ustx,
                pox_addr,
                start_burn_ht,
                lock_period,
            )
        });
        if let Ok(receipt) = &result {
            info!("Locked delegated STX";
                  "operator" => %operator,
                  "stacker" => %stacker,
                  "lock_amount" => receipt.lock_amount,
                  "unlock_burn_height" => receipt.unlock_burn_height);
        }
        finish("delegate-stack-stx", result)
    }

    fn inner_delegate_stack_stx(
        &mut self,
        operator: &PrincipalData,
        stacker: &PrincipalData,
        amount_ustx: u128,
        pox_addr: &PoxAddress,
        start_burn_ht: u64,
        lock_period: u64,
    ) -> Result<LockReceipt, StackingError> {
        let (cur_cycle, first_reward_cycle) = self.next_cycle()?;
        let grant = self.delegation_grant(stacker, operator)?;
        if !grant.allows_amount(amount_ustx) {
            return Err(StackingError::DelegationTooMuchLocked);
        }
        if !grant.allows_pox_addr(pox_addr) {
            return Err(StackingError::DelegationPoxAddrRequired);
        }
        let unlock_height = self.unlock_height_for(first_reward_cycle, lock_period)?;
        if !grant.allows_unlock_height(unlock_height) {
            return Err(StackingError::DelegationExpiresDuringLock);
        }
        self.check_start_burn_height(start_burn_ht, cur_cycle)?;
        self.check_lock_args(amount_ustx, pox_addr, lock_period)?;
        if self.is_stacking(stacker) {
            return Err(StackingError::AlreadyStacking);
        }
        self.check_unlocked_balance(stacker, amount_ustx)?;

        self.add_partial_stacked(
            pox_addr,
            first_reward_cycle,
            first_reward_cycle.saturating_add(lock_period),
            operator,
            amount_ustx,
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
                reward_set_indexes: vec![],
                delegated_to: Some(operator.clone()),
                signer_key: None,
            },
        );

        self.emit(
            PoxEventName::DelegateStackStx,
            stacker,
            json!({
                "lock-amount": amount_ustx,
                "unlock-burn-height": unlock_height,
                "pox-addr": pox_addr_json(pox_addr),
                "start-burn-height": start_burn_ht,
                "lock-period": lock_period,
                "delegator": operator.to_string(),
                "start-cycle-id": first_reward_cycle,
                "end-cycle-id": first_reward_cycle.saturating_add(lock_period),
            }),
        );
        Ok(LockReceipt {
            stacker: stacker.clone(),
            lock_amount: amount_ustx,
            unlock_burn_height: unlock_height,
            signer_key: None,
        })
    }

    /// Extend a delegator's lock as its operator.
    pub fn delegate_stack_extend(
        &mut self,
        operator: &PrincipalData,
        stacker: &PrincipalData,
        pox_addr: &PoxAddress,
        extend_count: u64,
    ) -> Result<ExtendReceipt, StackingError> {
        let result = self.transaction(|pox| {
            pox.inner_delegate_stack_extend(operator, stacker, pox_addr, extend_count)
        });
        if let Ok(receipt) = &result {
            info!("Extended delegated STX lock";
                  "operator" => %operator,
                  "stacker" => %stacker,
                  "extend_count" => extend_count,
                  "unlock_burn_height" => receipt.unlock_burn_height);
        }
        finish("delegate-stack-extend", result)
    }

    fn inner_delegate_stack_extend(
        &mut self,
        operator: &PrincipalData,
        stacker: &PrincipalData,
        pox_addr: &PoxAddress,
        extend_count: u64,
    ) -> Result<ExtendReceipt, StackingError> {
        let cur_cycle = self.current_cycle()?;
        let state = self.delegated_stacker_state(stacker, operator)?;
        let grant = self.delegation_grant(stacker, operator)?;
        if !grant.allows_pox_addr(pox_addr) {
            return Err(StackingError::DelegationPoxAddrRequired);
        }
        if !pox_addr.is_valid() {
            return Err(StackingError::InvalidPoxAddress);
        }
        let (first_extend_cycle, first_reward_cycle, lock_period) =
            self.extended_lock_span(&state, cur_cycle, extend_count)?;
        let unlock_height = self.unlock_height_for(first_extend_cycle, extend_count)?;
        if !grant.allows_unlock_height(unlock_height) {
            return Err(StackingError::DelegationExpiresDuringLock);
        }
        if !grant.allows_amount(state.amount_ustx) {
            return Err(StackingError::DelegationTooMuchLocked);
        }

        self.add_partial_stacked(
            pox_addr,
            first_extend_cycle,
            first_extend_cycle.saturating_add(extend_count),
            operator,
            state.amount_ustx,
        )?;
        self.lock_stx(stacker, state.amount_ustx, unlock_height)?;
        self.data.insert_stacking_state(
            stacker.clone(),
            StackingState {
                pox_addr: pox_addr.clone(),
                first_reward_cycle,
                lock_period,
                unlock_height,
                ..state
            },
        );

        self.emit(
            PoxEventName::DelegateStackExtend,
            stacker,
            json!({
                "extend-count": extend_count,
                "unlock-burn-height": unlock_height,
                "pox-addr": pox_addr_json(pox_addr),
                "delegator": operator.to_string(),
                "start-cycle-id": first_extend_cycle,
                "end-cycle-id": first_extend_cycle.saturating_add(extend_count),
            }),
        );
        Ok(ExtendReceipt {
            stacker: stacker.clone(),
            unlock_burn_height: unlock_height,
        })
    }

    /// Lock `increase_by` more of a delegator's STX as its operator.
    pub fn delegate_stack_increase(
        &mut self,
        operator: &PrincipalData,
        stacker: &PrincipalData,
        pox_addr: &PoxAddress,
        increase_by: u128,
    ) -> Result<IncreaseReceipt, StackingError> {
        let result = self.transaction(|pox| {
            pox.inner_delegate_stack_increase(operator, stacker, pox_addr, increase_by)
        });
        if let Ok(receipt) = &result {
            info!("Increased delegated STX lock";
                  "operator" => %operator,
                  "stacker" => %stacker,
                  "increase_by" => increase_by,
                  "total_locked" => receipt.total_locked);
        }
        finish("delegate-stack-increase", result)
    }

    fn inner_delegate_stack_increase(
        &mut self,
        operator: &PrincipalData,
        stacker: &PrincipalData,
        pox_addr: &PoxAddress,
        increase_by: u128,
    ) -> Result<IncreaseReceipt, StackingError> {
        let (_, next_cycle) = self.next_cycle()?;
        let state = self
            .get_stacker_info(stacker)
            .cloned()
            .ok_or(StackingError::IncreaseNotLocked)?;
        if state.delegated_to.as_ref() != Some(operator) {
            return Err(StackingError::PermissionDenied);
        }
        let grant = self.delegation_grant(stacker, operator)?;
        if increase_by == 0 {
            return Err(StackingError::InvalidAmount);
        }
        if !pox_addr.is_valid() {
            return Err(StackingError::InvalidPoxAddress);
        }
        if *pox_addr != state.pox_addr || !grant.allows_pox_addr(pox_addr) {
            return Err(StackingError::DelegationPoxAddrRequired);
        }
        let total_locked = state
            .amount_ustx
            .checked_add(increase_by)
            .ok_or(StackingError::ArithmeticOverflow)?;
        if !grant.allows_amount(total_locked) {
            return Err(StackingError::DelegationTooMuchLocked);
        }
        if !grant.allows_unlock_height(state.unlock_height) {
            return Err(StackingError::DelegationExpiresDuringLock);
        }
        self.check_unlocked_balance(stacker, increase_by)?;

        let start_cycle = next_cycle.max(state.first_reward_cycle);
        self.add_partial_stacked(
            pox_addr,
            start_cycle,
            state.end_reward_cycle(),
            operator,
            increase_by,
        )?;
        self.lock_stx(stacker, total_locked, state.unlock_height)?;
        let end_cycle = state.end_reward_cycle();
        self.data.insert_stacking_state(
            stacker.clone(),
            StackingState {
                amount_ustx: total_locked,
                ..state
            },
        );

        self.emit(
            PoxEventName::DelegateStackIncrease,
            stacker,
            json!({
                "increase-by": increase_by,
                "total-locked": total_locked,
                "pox-addr": pox_addr_json(pox_addr),
                "delegator": operator.to_string(),
                "start-cycle-id": start_cycle,
                "end-cycle-id": end_cycle,
            }),
        );
        Ok(IncreaseReceipt {
            stacker: stacker.clone(),
            total_locked,
        })
    }
}
