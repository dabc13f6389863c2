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

//! The keyed store behind the stacking contract.

use hashbrown::{HashMap, HashSet};
use pox_common::types::PrincipalData;

use crate::address::PoxAddress;
use crate::signer_auth::{ReplayKey, SignerAuthMessage};

/// What a principal has locked, and where its rewards go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackingState {
    pub amount_ustx: u128,
    pub pox_addr: PoxAddress,
    pub first_reward_cycle: u64,
    pub lock_period: u64,
    pub unlock_height: u64,
    /// One reward set index per covered cycle, starting at `first_reward_cycle`.
    /// Empty for delegated locks, whose operator commits on their behalf.
    pub reward_set_indexes: Vec<u128>,
    pub delegated_to: Option<PrincipalData>,
    pub signer_key: Option<[u8; 33]>,
}

impl StackingState {
    pub fn is_active(&self, burn_block_height: u64) -> bool {
        burn_block_height < self.unlock_height
    }

    /// First cycle the lock no longer covers.
    pub fn end_reward_cycle(&self) -> u64 {
        self.first_reward_cycle.saturating_add(self.lock_period)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardSetEntry {
    pub pox_addr: PoxAddress,
    pub total_ustx: u128,
    /// None for entries committed by an operator on behalf of delegators
    pub stacker: Option<PrincipalData>,
    pub signer: Option<[u8; 33]>,
}

/// What a stacker lets an operator do with its STX.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationGrant {
    pub amount_ceiling: Option<u128>,
    pub until_burn_ht: Option<u64>,
    pub pox_addr: Option<PoxAddress>,
}

impl DelegationGrant {
    pub fn is_active(&self, burn_block_height: u64) -> bool {
        self.until_burn_ht
            .map_or(true, |until| burn_block_height < until)
    }

    pub fn allows_amount(&self, amount_ustx: u128) -> bool {
        self.amount_ceiling.map_or(true, |ceiling| amount_ustx <= ceiling)
    }

    pub fn allows_pox_addr(&self, pox_addr: &PoxAddress) -> bool {
        self.pox_addr.as_ref().map_or(true, |required| required == pox_addr)
    }

    pub fn allows_unlock_height(&self, unlock_height: u64) -> bool {
        self.until_burn_ht.map_or(true, |until| unlock_height <= until)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartialStackedKey {
    pub pox_addr: PoxAddress,
    pub reward_cycle: u64,
    pub operator: PrincipalData,
}

/// An operator's committed aggregate for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggedPartialStacked {
    pub reward_set_index: u128,
    pub total_ustx: u128,
}

/// Prior value of one key, as it was before a write inside a transaction.
#[derive(Debug, Clone)]
enum PoxDataEdit {
    StackingState(PrincipalData, Option<StackingState>),
    CycleTotal(u64, Option<u128>),
    RewardSetPush(u64),
    RewardSetEntry(u64, usize, RewardSetEntry),
    Delegation((PrincipalData, PrincipalData), Option<DelegationGrant>),
    PartialStacked(PartialStackedKey, Option<u128>),
    LoggedPartialStacked(PartialStackedKey, Option<LoggedPartialStacked>),
    UsedAuthorization(ReplayKey),
    SignerKeyAuthorization(SignerAuthMessage, Option<bool>),
}

fn restore<K, V>(map: &mut HashMap<K, V>, key: K, prior: Option<V>)
where
    K: std::hash::Hash + Eq,
{
    match prior {
        Some(value) => map.insert(key, value),
        None => map.remove(&key),
    };
}

/// The contract's keyed maps. Every write goes through a method that logs
/// the key's prior value in the innermost open transaction, so that a
/// rollback undoes exactly the keys that transaction touched.
#[derive(Debug, Default)]
pub struct PoxData {
    stacking_state: HashMap<PrincipalData, StackingState>,
    reward_cycle_total_stacked: HashMap<u64, u128>,
    reward_cycle_pox_address_list: HashMap<u64, Vec<RewardSetEntry>>,
    /// keyed by (stacker, operator)
    delegation_state: HashMap<(PrincipalData, PrincipalData), DelegationGrant>,
    partial_stacked_by_cycle: HashMap<PartialStackedKey, u128>,
    logged_partial_stacked_by_cycle: HashMap<PartialStackedKey, LoggedPartialStacked>,
    used_signer_key_authorizations: HashSet<ReplayKey>,
    signer_key_authorizations: HashMap<SignerAuthMessage, bool>,
    /// One edit log per open transaction, innermost last
    edit_stack: Vec<Vec<PoxDataEdit>>,
}

impl PoxData {
    pub fn active_grant(
        &self,
        stacker: &PrincipalData,
        operator: &PrincipalData,
        burn_block_height: u64,
    ) -> Option<&DelegationGrant> {
        self.delegation_state
            .get(&(stacker.clone(), operator.clone()))
            .filter(|grant| grant.is_active(burn_block_height))
    }

    pub fn has_active_grant(&self, stacker: &PrincipalData, burn_block_height: u64) -> bool {
        self.delegation_state
            .iter()
            .any(|((s, _), grant)| s == stacker && grant.is_active(burn_block_height))
    }

    pub fn reward_set_len(&self, reward_cycle: u64) -> usize {
        self.reward_cycle_pox_address_list
            .get(&reward_cycle)
            .map_or(0, Vec::len)
    }

    pub fn stacking_state(&self, stacker: &PrincipalData) -> Option<&StackingState> {
        self.stacking_state.get(stacker)
    }

    pub fn cycle_total(&self, reward_cycle: u64) -> u128 {
        self.reward_cycle_total_stacked
            .get(&reward_cycle)
            .copied()
            .unwrap_or(0)
    }

    pub fn reward_set_entry(&self, reward_cycle: u64, index: usize) -> Option<&RewardSetEntry> {
        self.reward_cycle_pox_address_list
            .get(&reward_cycle)?
            .get(index)
    }

    pub fn partial_stacked(&self, key: &PartialStackedKey) -> Option<u128> {
        self.partial_stacked_by_cycle.get(key).copied()
    }

    pub fn logged_partial_stacked(&self, key: &PartialStackedKey) -> Option<LoggedPartialStacked> {
        self.logged_partial_stacked_by_cycle.get(key).copied()
    }

    pub fn used_signer_key_authorizations(&self) -> &HashSet<ReplayKey> {
        &self.used_signer_key_authorizations
    }

    pub fn signer_key_authorizations(&self) -> &HashMap<SignerAuthMessage, bool> {
        &self.signer_key_authorizations
    }

    /// Number of open transactions.
    pub fn depth(&self) -> usize {
        self.edit_stack.len()
    }

    pub fn nest(&mut self) {
        self.edit_stack.push(Vec::new());
    }

    /// Keep the innermost transaction's writes, handing its edit log to the
    /// enclosing transaction if there is one.
    pub fn commit(&mut self) {
        let Some(mut edits) = self.edit_stack.pop() else {
            return;
        };
        if let Some(parent) = self.edit_stack.last_mut() {
            parent.append(&mut edits);
        }
    }

    /// Undo the innermost transaction's writes, newest first.
    pub fn rollback(&mut self) {
        let Some(edits) = self.edit_stack.pop() else {
            return;
        };
        for edit in edits.into_iter().rev() {
            self.undo(edit);
        }
    }

    fn undo(&mut self, edit: PoxDataEdit) {
        match edit {
            PoxDataEdit::StackingState(key, prior) => restore(&mut self.stacking_state, key, prior),
            PoxDataEdit::CycleTotal(key, prior) => {
                restore(&mut self.reward_cycle_total_stacked, key, prior)
            }
            PoxDataEdit::RewardSetPush(reward_cycle) => {
                if let Some(list) = self.reward_cycle_pox_address_list.get_mut(&reward_cycle) {
                    list.pop();
                    if list.is_empty() {
                        self.reward_cycle_pox_address_list.remove(&reward_cycle);
                    }
                }
            }
            PoxDataEdit::RewardSetEntry(reward_cycle, index, prior) => {
                if let Some(entry) = self
                    .reward_cycle_pox_address_list
                    .get_mut(&reward_cycle)
                    .and_then(|list| list.get_mut(index))
                {
                    *entry = prior;
                }
            }
            PoxDataEdit::Delegation(key, prior) => restore(&mut self.delegation_state, key, prior),
            PoxDataEdit::PartialStacked(key, prior) => {
                restore(&mut self.partial_stacked_by_cycle, key, prior)
            }
            PoxDataEdit::LoggedPartialStacked(key, prior) => {
                restore(&mut self.logged_partial_stacked_by_cycle, key, prior)
            }
            PoxDataEdit::UsedAuthorization(key) => {
                self.used_signer_key_authorizations.remove(&key);
            }
            PoxDataEdit::SignerKeyAuthorization(key, prior) => {
                restore(&mut self.signer_key_authorizations, key, prior)
            }
        }
    }

    fn log_edit(&mut self, edit: PoxDataEdit) {
        if let Some(edits) = self.edit_stack.last_mut() {
            edits.push(edit);
        }
    }

    pub fn insert_stacking_state(&mut self, stacker: PrincipalData, state: StackingState) {
        let prior = self.stacking_state.insert(stacker.clone(), state);
        self.log_edit(PoxDataEdit::StackingState(stacker, prior));
    }

    /// Add to a cycle's stacked total, returning the new total, or `None` on overflow.
    pub fn add_to_cycle_total(&mut self, reward_cycle: u64, amount_ustx: u128) -> Option<u128> {
        let prior = self.reward_cycle_total_stacked.get(&reward_cycle).copied();
        let total = prior.unwrap_or(0).checked_add(amount_ustx)?;
        self.reward_cycle_total_stacked.insert(reward_cycle, total);
        self.log_edit(PoxDataEdit::CycleTotal(reward_cycle, prior));
        Some(total)
    }

    /// Append to a cycle's reward set, returning the new entry's index.
    pub fn push_reward_set_entry(&mut self, reward_cycle: u64, entry: RewardSetEntry) -> usize {
        let list = self
            .reward_cycle_pox_address_list
            .entry(reward_cycle)
            .or_default();
        list.push(entry);
        let index = list.len() - 1;
        self.log_edit(PoxDataEdit::RewardSetPush(reward_cycle));
        index
    }

    /// Mutable access to a reward set entry. The entry's current value is
    /// logged first, so whatever the caller changes can be rolled back.
    pub fn reward_set_entry_mut(
        &mut self,
        reward_cycle: u64,
        index: usize,
    ) -> Option<&mut RewardSetEntry> {
        let prior = self.reward_set_entry(reward_cycle, index)?.clone();
        self.log_edit(PoxDataEdit::RewardSetEntry(reward_cycle, index, prior));
        self.reward_cycle_pox_address_list
            .get_mut(&reward_cycle)?
            .get_mut(index)
    }

    pub fn insert_delegation(
        &mut self,
        stacker: PrincipalData,
        operator: PrincipalData,
        grant: DelegationGrant,
    ) {
        let key = (stacker, operator);
        let prior = self.delegation_state.insert(key.clone(), grant);
        self.log_edit(PoxDataEdit::Delegation(key, prior));
    }

    /// Drop every grant `stacker` has made, returning each operator with
    /// the grant it held.
    pub fn remove_delegations(
        &mut self,
        stacker: &PrincipalData,
    ) -> Vec<(PrincipalData, DelegationGrant)> {
        let keys: Vec<_> = self
            .delegation_state
            .keys()
            .filter(|(s, _)| s == stacker)
            .cloned()
            .collect();
        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(grant) = self.delegation_state.remove(&key) {
                self.log_edit(PoxDataEdit::Delegation(key.clone(), Some(grant.clone())));
                removed.push((key.1, grant));
            }
        }
        removed
    }

    /// Add to an operator's uncommitted total, returning the new total, or
    /// `None` on overflow.
    pub fn add_partial_stacked(
        &mut self,
        key: PartialStackedKey,
        amount_ustx: u128,
    ) -> Option<u128> {
        let prior = self.partial_stacked_by_cycle.get(&key).copied();
        let total = prior.unwrap_or(0).checked_add(amount_ustx)?;
        self.partial_stacked_by_cycle.insert(key.clone(), total);
        self.log_edit(PoxDataEdit::PartialStacked(key, prior));
        Some(total)
    }

    pub fn remove_partial_stacked(&mut self, key: &PartialStackedKey) -> Option<u128> {
        let prior = self.partial_stacked_by_cycle.remove(key)?;
        self.log_edit(PoxDataEdit::PartialStacked(key.clone(), Some(prior)));
        Some(prior)
    }

    pub fn insert_logged_partial_stacked(
        &mut self,
        key: PartialStackedKey,
        logged: LoggedPartialStacked,
    ) {
        let prior = self.logged_partial_stacked_by_cycle.insert(key.clone(), logged);
        self.log_edit(PoxDataEdit::LoggedPartialStacked(key, prior));
    }

    /// Mark an authorization as spent. Returns false if it already was.
    pub fn insert_used_signer_key_authorization(&mut self, replay_key: ReplayKey) -> bool {
        if !self.used_signer_key_authorizations.insert(replay_key.clone()) {
            return false;
        }
        self.log_edit(PoxDataEdit::UsedAuthorization(replay_key));
        true
    }

    pub fn insert_signer_key_authorization(&mut self, message: SignerAuthMessage, allowed: bool) {
        let prior = self.signer_key_authorizations.insert(message.clone(), allowed);
        self.log_edit(PoxDataEdit::SignerKeyAuthorization(message, prior));
    }
}

#[cfg(test)]
mod tests {
    use pox_common::types::StacksAddress;
    use pox_common::util::hash::Hash160;

    use super::*;

    #[test]
    fn grant_constraints() {
        let grant = DelegationGrant {
            amount_ceiling: Some(100),
            until_burn_ht: Some(500),
            pox_addr: Some(PoxAddress::standard_burn_address()),
        };
        assert!(grant.is_active(499));
        assert!(!grant.is_active(500));
        assert!(grant.allows_amount(100));
        assert!(!grant.allows_amount(101));
        assert!(grant.allows_unlock_height(500));
        assert!(!grant.allows_unlock_height(501));
        assert!(grant.allows_pox_addr(&PoxAddress::standard_burn_address()));
        assert!(!grant.allows_pox_addr(&PoxAddress::new(1, vec![0; 20])));

        let open = DelegationGrant {
            amount_ceiling: None,
            until_burn_ht: None,
            pox_addr: None,
        };
        assert!(open.is_active(u64::MAX));
        assert!(open.allows_amount(u128::MAX));
        assert!(open.allows_pox_addr(&PoxAddress::new(6, vec![1; 32])));
    }

    fn stacker(byte: u8) -> PrincipalData {
        StacksAddress::new(26, Hash160([byte; 20])).into()
    }

    fn entry(total_ustx: u128) -> RewardSetEntry {
        RewardSetEntry {
            pox_addr: PoxAddress::standard_burn_address(),
            total_ustx,
            stacker: None,
            signer: None,
        }
    }

    fn lock(amount_ustx: u128) -> StackingState {
        StackingState {
            amount_ustx,
            pox_addr: PoxAddress::standard_burn_address(),
            first_reward_cycle: 1,
            lock_period: 2,
            unlock_height: 3150,
            reward_set_indexes: vec![0, 0],
            delegated_to: None,
            signer_key: None,
        }
    }

    #[test]
    fn rollback_restores_only_the_touched_keys() {
        let alice = stacker(1);
        let bob = stacker(2);
        let mut data = PoxData::default();

        // written outside of any transaction, so never undone
        data.insert_stacking_state(alice.clone(), lock(100));
        data.push_reward_set_entry(1, entry(100));
        assert_eq!(data.add_to_cycle_total(1, 100), Some(100));
        assert_eq!(data.depth(), 0);

        data.nest();
        data.insert_stacking_state(bob.clone(), lock(50));
        data.push_reward_set_entry(1, entry(50));
        data.push_reward_set_entry(2, entry(50));
        data.reward_set_entry_mut(1, 0).unwrap().total_ustx = 175;
        data.add_to_cycle_total(1, 125);

        data.nest();
        data.insert_stacking_state(alice.clone(), lock(999));
        data.reward_set_entry_mut(1, 0).unwrap().total_ustx = 999;
        data.commit();
        assert_eq!(data.depth(), 1);
        assert_eq!(data.stacking_state(&alice).unwrap().amount_ustx, 999);

        data.rollback();
        assert_eq!(data.depth(), 0);
        assert_eq!(data.stacking_state(&alice), Some(&lock(100)));
        assert_eq!(data.stacking_state(&bob), None);
        assert_eq!(data.reward_set_len(1), 1);
        assert_eq!(data.reward_set_len(2), 0);
        assert_eq!(data.reward_set_entry(1, 0), Some(&entry(100)));
        assert_eq!(data.cycle_total(1), 100);
        assert_eq!(data.cycle_total(2), 0);
    }

    #[test]
    fn rolled_back_grants_and_partials_come_back() {
        let alice = stacker(1);
        let operator = stacker(2);
        let key = PartialStackedKey {
            pox_addr: PoxAddress::standard_burn_address(),
            reward_cycle: 4,
            operator: operator.clone(),
        };
        let grant = DelegationGrant {
            amount_ceiling: Some(10),
            until_burn_ht: None,
            pox_addr: None,
        };
        let mut data = PoxData::default();
        data.insert_delegation(alice.clone(), operator.clone(), grant.clone());
        data.add_partial_stacked(key.clone(), 7);

        data.nest();
        let removed = data.remove_delegations(&alice);
        assert_eq!(removed, vec![(operator.clone(), grant.clone())]);
        assert_eq!(data.remove_partial_stacked(&key), Some(7));
        data.insert_logged_partial_stacked(
            key.clone(),
            LoggedPartialStacked {
                reward_set_index: 0,
                total_ustx: 7,
            },
        );
        assert_eq!(data.add_partial_stacked(key.clone(), u128::MAX), Some(u128::MAX));
        assert_eq!(data.add_partial_stacked(key.clone(), 1), None);
        data.rollback();

        assert_eq!(data.active_grant(&alice, &operator, 0), Some(&grant));
        assert_eq!(data.partial_stacked(&key), Some(7));
        assert_eq!(data.logged_partial_stacked(&key), None);
    }
}
