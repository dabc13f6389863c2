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

//! The stacking contract: keyed state, transactions and read-only queries.

use pox_common::types::PrincipalData;
use pox_common::util::hash::Sha256Sum;
use pox_common::{debug, error, info, trace};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use slog::{slog_debug, slog_error, slog_info, slog_trace};

use crate::address::PoxAddress;
use crate::balances::{StxAccount, StxBalances, StxLock};
use crate::burnchain::CycleError;
use crate::config::PoxConfig;
use crate::errors::{AuthError, StackingError};
use crate::events::{pox_addr_json, signer_key_json, PoxEvent, PoxEventName};
use crate::signed_structured_data::pox4::{
    make_pox_4_signer_key_message_hash, Pox4SignatureTopic,
};
use crate::signer_auth::{
    parse_signer_key, signer_key_principal, AuthGrant, AuthRequest, SignerArgs,
    SignerAuthMessage, SignerKeyVerifier,
};
use crate::state::{PoxData, RewardSetEntry, StackingState};

/// Snapshot of the stacking parameters, as `get-pox-info` reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PoxInfo {
    pub min_amount_ustx: u128,
    pub reward_cycle_id: u64,
    pub prepare_cycle_length: u32,
    pub first_burnchain_block_height: u64,
    pub reward_cycle_length: u32,
    pub total_liquid_supply_ustx: u128,
}

pub struct PoxContract<B: StxBalances> {
    pub(crate) config: PoxConfig,
    pub(crate) balances: B,
    pub(crate) data: PoxData,
    pub(crate) burn_block_height: u64,
    events: Vec<PoxEvent>,
    event_batches: Vec<Vec<PoxEvent>>,
    /// Locks as they were before each `set_lock`, per open transaction
    lock_journals: Vec<Vec<(PrincipalData, StxLock)>>,
}

/// Log a rejected call and hand the result back.
pub(crate) fn finish<T>(
    function_name: &str,
    result: Result<T, StackingError>,
) -> Result<T, StackingError> {
    if let Err(e) = &result {
        debug!("Rejected PoX call";
               "function_name" => function_name,
               "code" => e.code(),
               "error" => %e);
    }
    result
}

impl<B: StxBalances> PoxContract<B> {
    pub fn new(config: PoxConfig, balances: B) -> PoxContract<B> {
        info!("Instantiated PoX ledger";
              "network" => %config.network,
              "pox_version" => %config.pox_version,
              "reward_cycle_length" => config.pox_constants.reward_cycle_length);
        let burn_block_height = config.pox_constants.first_block_height;
        PoxContract {
            config,
            balances,
            data: PoxData::default(),
            burn_block_height,
            events: vec![],
            event_batches: vec![],
            lock_journals: vec![],
        }
    }

    pub fn config(&self) -> &PoxConfig {
        &self.config
    }

    pub fn balances(&self) -> &B {
        &self.balances
    }

    /// Direct access to the balance collaborator, outside of any transaction.
    pub fn balances_mut(&mut self) -> &mut B {
        &mut self.balances
    }

    pub fn burn_block_height(&self) -> u64 {
        self.burn_block_height
    }

    pub fn set_burn_block_height(&mut self, burn_block_height: u64) {
        trace!("Set burn block height"; "burn_block_height" => burn_block_height);
        self.burn_block_height = burn_block_height;
    }

    pub fn advance_burn_blocks(&mut self, count: u64) {
        self.set_burn_block_height(self.burn_block_height.saturating_add(count));
    }

    pub fn current_reward_cycle(&self) -> Result<u64, CycleError> {
        self.config
            .pox_constants
            .block_height_to_reward_cycle(self.burn_block_height)
    }

    /// Smallest amount a direct stacker, or an operator's first commit, must lock.
    pub fn get_stacking_minimum(&self) -> u128 {
        self.config.min_amount_ustx.unwrap_or_else(|| {
            self.balances.get_total_liquid_ustx() / self.config.stacking_threshold_divisor
        })
    }

    pub fn get_pox_info(&self) -> Result<PoxInfo, CycleError> {
        let constants = &self.config.pox_constants;
        Ok(PoxInfo {
            min_amount_ustx: self.get_stacking_minimum(),
            reward_cycle_id: self.current_reward_cycle()?,
            prepare_cycle_length: constants.prepare_length,
            first_burnchain_block_height: constants.first_block_height,
            reward_cycle_length: constants.reward_cycle_length,
            total_liquid_supply_ustx: self.balances.get_total_liquid_ustx(),
        })
    }

    pub fn get_total_ustx_stacked(&self, reward_cycle: u64) -> u128 {
        self.data.cycle_total(reward_cycle)
    }

    /// The principal's lock, unless it has already expired.
    pub fn get_stacker_info(&self, stacker: &PrincipalData) -> Option<&StackingState> {
        self.data
            .stacking_state(stacker)
            .filter(|state| state.is_active(self.burn_block_height))
    }

    pub fn get_reward_set_size(&self, reward_cycle: u64) -> u128 {
        self.data.reward_set_len(reward_cycle) as u128
    }

    pub fn get_reward_set_pox_address(
        &self,
        reward_cycle: u64,
        index: u128,
    ) -> Option<&RewardSetEntry> {
        let index = usize::try_from(index).ok()?;
        self.data.reward_set_entry(reward_cycle, index)
    }

    pub fn stx_account(&self, principal: &PrincipalData) -> StxAccount {
        self.balances
            .get_balance(principal)
            .stx_account(self.burn_block_height)
    }

    /// Drain the events of every committed call so far.
    pub fn take_events(&mut self) -> Vec<PoxEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn get_signer_key_message_hash(
        &self,
        pox_addr: &PoxAddress,
        reward_cycle: u64,
        topic: Pox4SignatureTopic,
        period: u64,
        max_amount: u128,
        auth_id: u128,
    ) -> Sha256Sum {
        make_pox_4_signer_key_message_hash(
            pox_addr,
            reward_cycle.into(),
            &topic,
            self.config.to_chain_id(),
            period.into(),
            max_amount,
            auth_id,
        )
    }

    /// Let a signer key approve (or withdraw approval of) one exact message
    /// ahead of time, so that it can be used without a signature.
    #[allow(clippy::too_many_arguments)]
    pub fn set_signer_key_authorization(
        &mut self,
        caller: &PrincipalData,
        pox_addr: &PoxAddress,
        period: u64,
        reward_cycle: u64,
        topic: Pox4SignatureTopic,
        signer_key: &[u8],
        allowed: bool,
        max_amount: u128,
        auth_id: u128,
    ) -> Result<bool, StackingError> {
        let result = self.transaction(|pox| -> Result<bool, StackingError> {
            let signer_key = parse_signer_key(signer_key)?;
            if *caller != signer_key_principal(pox.config.is_mainnet(), &signer_key) {
                return Err(AuthError::NotAllowed.into());
            }
            if period == 0 {
                return Err(StackingError::InvalidPeriod(period));
            }
            if !pox_addr.is_valid() {
                return Err(StackingError::InvalidPoxAddress);
            }
            let message = SignerAuthMessage {
                pox_addr: pox_addr.clone(),
                reward_cycle,
                topic,
                period,
                signer_key,
                max_amount,
                auth_id,
            };
            pox.data.insert_signer_key_authorization(message, allowed);
            pox.emit(
                PoxEventName::SetSignerKeyAuthorization,
                caller,
                json!({
                    "pox-addr": pox_addr_json(pox_addr),
                    "period": period,
                    "reward-cycle": reward_cycle,
                    "topic": topic.get_name_str(),
                    "signer-key": signer_key_json(Some(&signer_key)),
                    "allowed": allowed,
                    "max-amount": max_amount,
                    "auth-id": auth_id,
                }),
            );
            Ok(allowed)
        });
        if result.is_ok() {
            info!("Set signer key authorization";
                  "caller" => %caller,
                  "topic" => %topic,
                  "reward_cycle" => reward_cycle,
                  "allowed" => allowed);
        }
        finish("set-signer-key-authorization", result)
    }

    /// Run `f` atomically: if it fails, the store, the balance locks and the
    /// events it produced are all restored. Transactions nest.
    pub fn transaction<F, T, E>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
    {
        self.begin();
        let result = f(self);
        if result.is_ok() {
            self.commit();
        } else {
            self.roll_back();
        }
        result
    }

    fn begin(&mut self) {
        self.data.nest();
        self.event_batches.push(vec![]);
        self.lock_journals.push(vec![]);
    }

    fn commit(&mut self) {
        trace!("Calling commit"; "depth" => self.data.depth());
        self.data.commit();
        if let Some(mut batch) = self.event_batches.pop() {
            match self.event_batches.last_mut() {
                Some(parent) => parent.append(&mut batch),
                None => self.events.append(&mut batch),
            }
        }
        if let Some(mut journal) = self.lock_journals.pop() {
            if let Some(parent) = self.lock_journals.last_mut() {
                parent.append(&mut journal);
            }
        }
    }

    fn roll_back(&mut self) {
        trace!("Calling roll_back"; "depth" => self.data.depth());
        self.data.rollback();
        self.event_batches.pop();
        let journal = self.lock_journals.pop().unwrap_or_default();
        for (principal, lock) in journal.into_iter().rev() {
            if let Err(e) = self.balances.set_lock(&principal, lock) {
                error!("Failed to restore STX lock during rollback";
                       "principal" => %principal,
                       "amount_locked" => lock.amount_locked,
                       "error" => %e);
            }
        }
    }

    pub(crate) fn current_cycle(&self) -> Result<u64, StackingError> {
        Ok(self.current_reward_cycle()?)
    }

    /// First burn height at which a lock covering `lock_period` cycles from
    /// `first_reward_cycle` is over.
    pub(crate) fn unlock_height_for(
        &self,
        first_reward_cycle: u64,
        lock_period: u64,
    ) -> Result<u64, StackingError> {
        let end_cycle = first_reward_cycle
            .checked_add(lock_period)
            .ok_or(StackingError::ArithmeticOverflow)?;
        self.config
            .pox_constants
            .reward_cycle_to_block_height(end_cycle)
            .ok_or(StackingError::ArithmeticOverflow)
    }

    /// The cycle after the current one, where new locks begin.
    pub(crate) fn next_cycle(&self) -> Result<(u64, u64), StackingError> {
        let cur_cycle = self.current_cycle()?;
        let next_cycle = cur_cycle
            .checked_add(1)
            .ok_or(StackingError::ArithmeticOverflow)?;
        Ok((cur_cycle, next_cycle))
    }

    pub(crate) fn check_start_burn_height(
        &self,
        start_burn_ht: u64,
        cur_cycle: u64,
    ) -> Result<(), StackingError> {
        match self
            .config
            .pox_constants
            .block_height_to_reward_cycle(start_burn_ht)
        {
            Ok(start_cycle) if start_cycle == cur_cycle => Ok(()),
            _ => Err(StackingError::InvalidStartBurnHeight(start_burn_ht)),
        }
    }

    /// Argument checks shared by every new lock.
    pub(crate) fn check_lock_args(
        &self,
        amount_ustx: u128,
        pox_addr: &PoxAddress,
        lock_period: u64,
    ) -> Result<(), StackingError> {
        if !self.config.pox_constants.is_valid_lock_period(lock_period) {
            return Err(StackingError::InvalidPeriod(lock_period));
        }
        if !pox_addr.is_valid() {
            return Err(StackingError::InvalidPoxAddress);
        }
        if amount_ustx == 0 {
            return Err(StackingError::InvalidAmount);
        }
        Ok(())
    }

    /// Whether the principal holds an unexpired lock of any kind.
    pub(crate) fn is_stacking(&self, principal: &PrincipalData) -> bool {
        self.get_stacker_info(principal).is_some() || self.stx_account(principal).locked > 0
    }

    pub(crate) fn check_unlocked_balance(
        &self,
        principal: &PrincipalData,
        amount_ustx: u128,
    ) -> Result<(), StackingError> {
        let available = self.stx_account(principal).unlocked;
        if amount_ustx > available {
            return Err(StackingError::InsufficientBalance {
                needed: amount_ustx,
                available,
            });
        }
        Ok(())
    }

    /// Check a signer authorization when the contract generation requires one.
    pub(crate) fn verify_signer(
        &self,
        request: &AuthRequest,
        signer: Option<&SignerArgs>,
        caller: &PrincipalData,
    ) -> Result<Option<AuthGrant>, StackingError> {
        if !self.config.pox_version.requires_signer_key() {
            return Ok(None);
        }
        let args = signer.ok_or(AuthError::MissingSignerKey)?;
        let verifier = SignerKeyVerifier {
            chain_id: self.config.to_chain_id(),
            mainnet: self.config.is_mainnet(),
            settings: &self.config.signer_auth,
            used: self.data.used_signer_key_authorizations(),
            authorizations: self.data.signer_key_authorizations(),
        };
        Ok(Some(verifier.verify(request, args, caller)?))
    }

    pub(crate) fn consume_signer_auth(&mut self, grant: Option<AuthGrant>) {
        if let Some(replay_key) = grant.and_then(|g| g.replay_key) {
            self.data.insert_used_signer_key_authorization(replay_key);
        }
    }

    pub(crate) fn add_to_cycle_total(
        &mut self,
        reward_cycle: u64,
        amount_ustx: u128,
    ) -> Result<u128, StackingError> {
        self.data
            .add_to_cycle_total(reward_cycle, amount_ustx)
            .ok_or(StackingError::ArithmeticOverflow)
    }

    /// Append an entry to a cycle's reward set, returning its index.
    pub(crate) fn append_reward_set_entry(
        &mut self,
        reward_cycle: u64,
        entry: RewardSetEntry,
    ) -> u128 {
        self.data.push_reward_set_entry(reward_cycle, entry) as u128
    }

    pub(crate) fn reward_set_entry_mut(
        &mut self,
        reward_cycle: u64,
        index: u128,
    ) -> Option<&mut RewardSetEntry> {
        let index = usize::try_from(index).ok()?;
        self.data.reward_set_entry_mut(reward_cycle, index)
    }

    /// One reward set entry per cycle of the lock, all counted in the cycle totals.
    pub(crate) fn add_pox_addr_to_reward_cycles(
        &mut self,
        pox_addr: &PoxAddress,
        first_reward_cycle: u64,
        num_cycles: u64,
        amount_ustx: u128,
        stacker: &PrincipalData,
        signer: Option<[u8; 33]>,
    ) -> Result<Vec<u128>, StackingError> {
        let mut indexes = Vec::with_capacity(num_cycles as usize);
        let end_reward_cycle = first_reward_cycle
            .checked_add(num_cycles)
            .ok_or(StackingError::ArithmeticOverflow)?;
        for reward_cycle in first_reward_cycle..end_reward_cycle {
            let index = self.append_reward_set_entry(
                reward_cycle,
                RewardSetEntry {
                    pox_addr: pox_addr.clone(),
                    total_ustx: amount_ustx,
                    stacker: Some(stacker.clone()),
                    signer,
                },
            );
            self.add_to_cycle_total(reward_cycle, amount_ustx)?;
            indexes.push(index);
        }
        Ok(indexes)
    }

    /// Set the principal's balance lock, remembering the old one for rollback.
    pub(crate) fn lock_stx(
        &mut self,
        principal: &PrincipalData,
        amount_ustx: u128,
        unlock_height: u64,
    ) -> Result<(), StackingError> {
        let previous = self.balances.get_balance(principal).lock;
        self.balances
            .set_lock(principal, StxLock::new(amount_ustx, unlock_height))?;
        if let Some(journal) = self.lock_journals.last_mut() {
            journal.push((principal.clone(), previous));
        }
        Ok(())
    }

    pub(crate) fn emit(&mut self, name: PoxEventName, stacker: &PrincipalData, data: JsonValue) {
        let event = PoxEvent::new(name, stacker, &self.stx_account(stacker), data);
        match self.event_batches.last_mut() {
            Some(batch) => batch.push(event),
            None => self.events.push(event),
        }
    }
}
