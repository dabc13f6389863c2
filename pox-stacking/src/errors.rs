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

use crate::balances::BalanceError;
use crate::burnchain::CycleError;

/// Broad class of a rejected call, independent of the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range arguments
    Validation,
    /// The call does not fit the current ledger state
    State,
    /// Missing or invalid signer authorization, or a caller acting for someone else
    Auth,
    /// Administrative or whitelist check failed
    Permission,
    /// A balance, ceiling or threshold would be exceeded
    Capacity,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Signer key authorization is required")]
    MissingSignerKey,
    #[error("Signer key is not a valid compressed secp256k1 public key")]
    InvalidSignerKey,
    #[error("Signature does not match the signer key")]
    BadSignature,
    #[error("Failed to recover a public key from the signature")]
    SignatureRecoveryFailed,
    #[error("Amount {amount} exceeds the authorized maximum {max_amount}")]
    AmountTooHigh { amount: u128, max_amount: u128 },
    #[error("Signer authorization was already used")]
    AlreadyUsed,
    #[error("Caller is not allowed to act without a signer signature")]
    NotAllowed,
}

impl AuthError {
    pub fn code(&self) -> i128 {
        match self {
            AuthError::NotAllowed => 19,
            AuthError::MissingSignerKey | AuthError::InvalidSignerKey => 32,
            AuthError::BadSignature => 35,
            AuthError::SignatureRecoveryFailed => 36,
            AuthError::AmountTooHigh { .. } => 38,
            AuthError::AlreadyUsed => 39,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StackingError {
    #[error("Insufficient unlocked balance: need {needed}, have {available}")]
    InsufficientBalance { needed: u128, available: u128 },
    #[error("Invalid lock period {0}")]
    InvalidPeriod(u64),
    #[error("Reward cycle {reward_cycle} is not in the future (current cycle {current_cycle})")]
    RewardCycleAlreadyStarted {
        reward_cycle: u64,
        current_cycle: u64,
    },
    #[error("Principal is already stacking")]
    AlreadyStacking,
    #[error("Principal is not stacking")]
    NotStacking,
    #[error("Nothing to commit for this pox address and reward cycle")]
    NothingToCommit,
    #[error("Caller is not permitted to stack on behalf of this principal")]
    PermissionDenied,
    #[error("Amount {amount} is below the stacking minimum {minimum}")]
    AmountTooLow { amount: u128, minimum: u128 },
    #[error("Aggregate amount {amount} does not meet the stacking minimum {minimum}")]
    ThresholdNotMet { amount: u128, minimum: u128 },
    #[error("Invalid pox address")]
    InvalidPoxAddress,
    #[error("Invalid amount")]
    InvalidAmount,
    #[error("Principal has delegated its stacking rights")]
    AlreadyDelegated,
    #[error("Delegation expires before the lock would end")]
    DelegationExpiresDuringLock,
    #[error("Amount exceeds the delegated ceiling")]
    DelegationTooMuchLocked,
    #[error("Pox address does not match the one required by the delegation")]
    DelegationPoxAddrRequired,
    #[error("Start burn height {0} is not in the current reward cycle")]
    InvalidStartBurnHeight(u64),
    #[error("Lock already expired at burn height {unlock_height} (now {burn_height})")]
    AlreadyExpired { unlock_height: u64, burn_height: u64 },
    #[error("Principal has no active lock to increase")]
    IncreaseNotLocked,
    #[error("Principal's lock is managed by a delegate")]
    StackingIsDelegated,
    #[error("No active delegation to revoke")]
    DelegationAlreadyRevoked,
    #[error("Arithmetic overflow")]
    ArithmeticOverflow,
    #[error("Signer authorization: {0}")]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Cycle(#[from] CycleError),
}

impl StackingError {
    /// The numeric error code reported for this failure.
    pub fn code(&self) -> i128 {
        use StackingError::*;
        match self {
            InsufficientBalance { .. } => 1,
            InvalidPeriod(_) | RewardCycleAlreadyStarted { .. } => 2,
            AlreadyStacking => 3,
            NotStacking | NothingToCommit => 4,
            PermissionDenied => 9,
            AmountTooLow { .. } | ThresholdNotMet { .. } => 11,
            InvalidPoxAddress => 13,
            InvalidAmount => 18,
            AlreadyDelegated => 20,
            DelegationExpiresDuringLock => 21,
            DelegationTooMuchLocked => 22,
            DelegationPoxAddrRequired => 23,
            InvalidStartBurnHeight(_) | Cycle(_) => 24,
            AlreadyExpired { .. } => 26,
            IncreaseNotLocked => 27,
            StackingIsDelegated => 30,
            DelegationAlreadyRevoked => 34,
            ArithmeticOverflow => 255,
            Auth(e) => e.code(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        use StackingError::*;
        match self {
            InvalidPeriod(_)
            | RewardCycleAlreadyStarted { .. }
            | InvalidPoxAddress
            | InvalidAmount
            | InvalidStartBurnHeight(_)
            | Cycle(_) => ErrorKind::Validation,
            AlreadyStacking
            | NotStacking
            | NothingToCommit
            | AlreadyDelegated
            | AlreadyExpired { .. }
            | IncreaseNotLocked
            | StackingIsDelegated
            | DelegationAlreadyRevoked
            | ArithmeticOverflow => ErrorKind::State,
            PermissionDenied | Auth(_) => ErrorKind::Auth,
            InsufficientBalance { .. }
            | AmountTooLow { .. }
            | ThresholdNotMet { .. }
            | DelegationExpiresDuringLock
            | DelegationTooMuchLocked
            | DelegationPoxAddrRequired => ErrorKind::Capacity,
        }
    }
}

impl From<BalanceError> for StackingError {
    fn from(e: BalanceError) -> Self {
        match e {
            BalanceError::InsufficientFunds { needed, available } => {
                StackingError::InsufficientBalance { needed, available }
            }
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Caller is not the pool admin")]
    NotAdmin,
    #[error("Principal is not whitelisted by the pool")]
    NotWhitelisted,
    #[error(transparent)]
    Stacking(#[from] StackingError),
}

impl PoolError {
    pub fn code(&self) -> i128 {
        match self {
            PoolError::NotAdmin => 401,
            PoolError::NotWhitelisted => 403,
            PoolError::Stacking(e) => e.code(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolError::NotAdmin | PoolError::NotWhitelisted => ErrorKind::Permission,
            PoolError::Stacking(e) => e.kind(),
        }
    }
}
