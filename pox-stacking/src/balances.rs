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

//! The token-balance collaborator the ledger locks and unlocks STX through.

use hashbrown::HashMap;
use pox_common::types::PrincipalData;
use pox_common::{debug, info};
use serde::Serialize;
use slog::{slog_debug, slog_info};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u128, available: u128 },
}

impl BalanceError {
    pub fn code(&self) -> i128 {
        match self {
            BalanceError::InsufficientFunds { .. } => 1,
        }
    }
}

/// A lock on part of an account. Nothing is locked once the burnchain
/// reaches `unlock_height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StxLock {
    pub amount_locked: u128,
    pub unlock_height: u64,
}

impl StxLock {
    pub fn new(amount_locked: u128, unlock_height: u64) -> StxLock {
        StxLock {
            amount_locked,
            unlock_height,
        }
    }

    pub fn none() -> StxLock {
        StxLock::default()
    }
}

/// Stored balance of one principal, as last written. The lock it carries
/// may already have expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StxBalance {
    pub amount_unlocked: u128,
    pub lock: StxLock,
}

/// Balance of one principal as seen at a given burn height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StxAccount {
    pub locked: u128,
    pub unlocked: u128,
    pub unlock_height: u64,
}

impl StxBalance {
    pub fn has_locked_tokens(&self, burn_block_height: u64) -> bool {
        self.lock.amount_locked > 0 && burn_block_height < self.lock.unlock_height
    }

    pub fn get_total_balance(&self) -> u128 {
        self.amount_unlocked.saturating_add(self.lock.amount_locked)
    }

    /// Expired locks are folded back into the unlocked amount.
    pub fn stx_account(&self, burn_block_height: u64) -> StxAccount {
        if self.has_locked_tokens(burn_block_height) {
            StxAccount {
                locked: self.lock.amount_locked,
                unlocked: self.amount_unlocked,
                unlock_height: self.lock.unlock_height,
            }
        } else {
            StxAccount {
                locked: 0,
                unlocked: self.get_total_balance(),
                unlock_height: 0,
            }
        }
    }
}

pub trait StxBalances {
    fn get_balance(&self, principal: &PrincipalData) -> StxBalance;

    /// Replace the principal's lock. The locked amount is carved out of the
    /// account's total balance, whether or not the previous lock has expired.
    fn set_lock(&mut self, principal: &PrincipalData, lock: StxLock) -> Result<(), BalanceError>;

    /// Total uSTX in existence that could be stacked.
    fn get_total_liquid_ustx(&self) -> u128;
}

/// In-memory balance table.
#[derive(Debug, Clone, Default)]
pub struct MemoryStxLedger {
    balances: HashMap<PrincipalData, StxBalance>,
    liquid_ustx: u128,
}

impl MemoryStxLedger {
    pub fn new() -> MemoryStxLedger {
        MemoryStxLedger::default()
    }

    /// Mint `amount` uSTX into the principal's unlocked balance.
    pub fn credit(&mut self, principal: &PrincipalData, amount: u128) {
        let balance = self.balances.entry(principal.clone()).or_default();
        balance.amount_unlocked = balance.amount_unlocked.saturating_add(amount);
        self.liquid_ustx = self.liquid_ustx.saturating_add(amount);
    }

    /// Move unlocked uSTX between principals. Locks that have expired at
    /// `burn_block_height` are released first.
    pub fn transfer(
        &mut self,
        from: &PrincipalData,
        to: &PrincipalData,
        amount: u128,
        burn_block_height: u64,
    ) -> Result<(), BalanceError> {
        let sender = self.get_balance(from);
        let available = sender.stx_account(burn_block_height).unlocked;
        if amount > available {
            debug!("Rejected STX transfer";
                   "sender" => %from,
                   "amount" => amount,
                   "available" => available);
            return Err(BalanceError::InsufficientFunds {
                needed: amount,
                available,
            });
        }

        let mut sender = sender;
        if !sender.has_locked_tokens(burn_block_height) && sender.lock.amount_locked > 0 {
            info!("Auto-unlocked STX";
                  "principal" => %from,
                  "amount" => sender.lock.amount_locked,
                  "unlock_height" => sender.lock.unlock_height);
            sender.amount_unlocked = sender.get_total_balance();
            sender.lock = StxLock::none();
        }
        sender.amount_unlocked -= amount;
        self.balances.insert(from.clone(), sender);

        let recipient = self.balances.entry(to.clone()).or_default();
        recipient.amount_unlocked = recipient.amount_unlocked.saturating_add(amount);
        Ok(())
    }
}

impl StxBalances for MemoryStxLedger {
    fn get_balance(&self, principal: &PrincipalData) -> StxBalance {
        self.balances.get(principal).copied().unwrap_or_default()
    }

    fn set_lock(&mut self, principal: &PrincipalData, lock: StxLock) -> Result<(), BalanceError> {
        let balance = self.get_balance(principal);
        let total = balance.get_total_balance();
        if lock.amount_locked > total {
            return Err(BalanceError::InsufficientFunds {
                needed: lock.amount_locked,
                available: total,
            });
        }
        self.balances.insert(
            principal.clone(),
            StxBalance {
                amount_unlocked: total - lock.amount_locked,
                lock,
            },
        );
        Ok(())
    }

    fn get_total_liquid_ustx(&self) -> u128 {
        self.liquid_ustx
    }
}
