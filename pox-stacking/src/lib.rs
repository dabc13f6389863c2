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

//! Proof-of-Transfer stacking ledger.
//!
//! [`PoxContract`] keeps the stacking state a pox boot contract would:
//! per-principal locks, per-cycle reward sets and totals, delegation grants
//! and operator aggregates. STX balances live behind the [`StxBalances`]
//! collaborator, and the burn block height is set by whoever drives the
//! ledger. [`PoolWrapper`] is a pool front end built on top of it.

#![allow(clippy::result_large_err)]

pub mod address;
pub mod aggregation;
pub mod balances;
pub mod burnchain;
pub mod config;
pub mod contract;
pub mod delegation;
pub mod errors;
pub mod events;
pub mod pool;
pub mod signed_structured_data;
pub mod signer_auth;
pub mod stacking;
pub mod state;

#[cfg(test)]
mod tests;

pub use crate::address::PoxAddress;
pub use crate::aggregation::CommitReceipt;
pub use crate::balances::{MemoryStxLedger, StxAccount, StxBalances};
pub use crate::burnchain::PoxConstants;
pub use crate::config::{PoxConfig, PoxVersion};
pub use crate::contract::{PoxContract, PoxInfo};
pub use crate::errors::{AuthError, ErrorKind, PoolError, StackingError};
pub use crate::pool::{PoolDelegateReceipt, PoolWrapper};
pub use crate::stacking::{ExtendReceipt, IncreaseReceipt, LockReceipt};
