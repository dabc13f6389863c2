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

//! Burn-height and reward-cycle arithmetic.

use serde::{Deserialize, Serialize};

pub const MAINNET_REWARD_CYCLE_LENGTH: u32 = 2100;
pub const MAINNET_PREPARE_LENGTH: u32 = 100;
pub const TESTNET_REWARD_CYCLE_LENGTH: u32 = 1050;
pub const TESTNET_PREPARE_LENGTH: u32 = 50;

/// Longest lock, in reward cycles, that a single stacker may hold.
pub const MAX_POX_REWARD_CYCLES: u64 = 12;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CycleError {
    #[error("Burn height {height} precedes the first burnchain block height {first_block_height}")]
    InvalidHeight { height: u64, first_block_height: u64 },
    #[error("Reward cycle length must be positive")]
    ZeroCycleLength,
    #[error("Prepare phase of {prepare_length} blocks does not fit a cycle of {reward_cycle_length}")]
    PrepareTooLong {
        prepare_length: u32,
        reward_cycle_length: u32,
    },
}

/// Shape of the reward-cycle schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoxConstants {
    pub first_block_height: u64,
    /// Length of a reward cycle, in burn blocks
    pub reward_cycle_length: u32,
    /// Trailing blocks of each cycle during which the next reward set is chosen
    pub prepare_length: u32,
    /// Maximum number of reward cycles a lock may cover
    pub max_lock_period: u64,
}

impl PoxConstants {
    pub fn new(
        first_block_height: u64,
        reward_cycle_length: u32,
        prepare_length: u32,
        max_lock_period: u64,
    ) -> Result<PoxConstants, CycleError> {
        if reward_cycle_length == 0 {
            return Err(CycleError::ZeroCycleLength);
        }
        if prepare_length >= reward_cycle_length {
            return Err(CycleError::PrepareTooLong {
                prepare_length,
                reward_cycle_length,
            });
        }
        Ok(PoxConstants {
            first_block_height,
            reward_cycle_length,
            prepare_length,
            max_lock_period,
        })
    }

    pub fn mainnet_default() -> PoxConstants {
        PoxConstants {
            first_block_height: 0,
            reward_cycle_length: MAINNET_REWARD_CYCLE_LENGTH,
            prepare_length: MAINNET_PREPARE_LENGTH,
            max_lock_period: MAX_POX_REWARD_CYCLES,
        }
    }

    pub fn testnet_default() -> PoxConstants {
        PoxConstants {
            first_block_height: 0,
            reward_cycle_length: TESTNET_REWARD_CYCLE_LENGTH,
            prepare_length: TESTNET_PREPARE_LENGTH,
            max_lock_period: MAX_POX_REWARD_CYCLES,
        }
    }

    fn cycle_length(&self) -> u64 {
        u64::from(self.reward_cycle_length)
    }

    pub fn block_height_to_reward_cycle(&self, block_height: u64) -> Result<u64, CycleError> {
        if block_height < self.first_block_height {
            return Err(CycleError::InvalidHeight {
                height: block_height,
                first_block_height: self.first_block_height,
            });
        }
        Ok((block_height - self.first_block_height) / self.cycle_length())
    }

    /// First burn height of the given reward cycle, or `None` past `u64::MAX`.
    pub fn reward_cycle_to_block_height(&self, reward_cycle: u64) -> Option<u64> {
        reward_cycle
            .checked_mul(self.cycle_length())
            .and_then(|offset| self.first_block_height.checked_add(offset))
    }

    pub fn is_reward_cycle_start(&self, burn_height: u64) -> bool {
        burn_height >= self.first_block_height
            && (burn_height - self.first_block_height) % self.cycle_length() == 0
    }

    pub fn is_in_prepare_phase(&self, burn_height: u64) -> bool {
        if burn_height < self.first_block_height {
            return false;
        }
        let offset = (burn_height - self.first_block_height) % self.cycle_length();
        offset >= u64::from(self.reward_cycle_length - self.prepare_length)
    }

    /// Number of blocks per cycle that carry reward slots.
    pub fn reward_slots(&self) -> u64 {
        u64::from(self.reward_cycle_length - self.prepare_length)
    }

    pub fn is_valid_lock_period(&self, lock_period: u64) -> bool {
        lock_period >= 1 && lock_period <= self.max_lock_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_cycle_boundaries() {
        let pox = PoxConstants::testnet_default();
        assert_eq!(pox.block_height_to_reward_cycle(0), Ok(0));
        assert_eq!(pox.block_height_to_reward_cycle(1049), Ok(0));
        assert_eq!(pox.block_height_to_reward_cycle(1050), Ok(1));
        assert_eq!(pox.block_height_to_reward_cycle(3150), Ok(3));
        assert_eq!(pox.reward_cycle_to_block_height(3), Some(3150));
        assert!(pox.is_reward_cycle_start(2100));
        assert!(!pox.is_reward_cycle_start(2101));
    }

    #[test]
    fn heights_before_first_block_are_invalid() {
        let pox = PoxConstants::new(666050, 2100, 100, 12).unwrap();
        assert_eq!(
            pox.block_height_to_reward_cycle(666049),
            Err(CycleError::InvalidHeight {
                height: 666049,
                first_block_height: 666050
            })
        );
        assert_eq!(pox.block_height_to_reward_cycle(666050), Ok(0));
        assert_eq!(pox.reward_cycle_to_block_height(1), Some(668150));
        assert!(!pox.is_in_prepare_phase(0));
    }

    #[test]
    fn prepare_phase_is_the_tail_of_each_cycle() {
        let pox = PoxConstants::testnet_default();
        assert!(!pox.is_in_prepare_phase(999));
        assert!(pox.is_in_prepare_phase(1000));
        assert!(pox.is_in_prepare_phase(1049));
        assert!(!pox.is_in_prepare_phase(1050));
        assert_eq!(pox.reward_slots(), 1000);
    }

    #[test]
    fn cycle_heights_past_u64_max_are_none() {
        let pox = PoxConstants::testnet_default();
        let last = u64::MAX / 1050;
        assert_eq!(pox.reward_cycle_to_block_height(last), Some(last * 1050));
        assert_eq!(pox.reward_cycle_to_block_height(last + 1), None);
        assert_eq!(pox.reward_cycle_to_block_height(u64::MAX), None);

        let offset = PoxConstants::new(u64::MAX - 10, 1050, 50, 12).unwrap();
        assert_eq!(offset.reward_cycle_to_block_height(0), Some(u64::MAX - 10));
        assert_eq!(offset.reward_cycle_to_block_height(1), None);
    }

    #[test]
    fn malformed_schedules_are_rejected() {
        assert_eq!(
            PoxConstants::new(0, 0, 0, 12),
            Err(CycleError::ZeroCycleLength)
        );
        assert_eq!(
            PoxConstants::new(0, 100, 100, 12),
            Err(CycleError::PrepareTooLong {
                prepare_length: 100,
                reward_cycle_length: 100
            })
        );
        assert_eq!(
            PoxConstants::new(0, 1050, 50, 12),
            Ok(PoxConstants::testnet_default())
        );
    }

    #[test]
    fn lock_period_bounds() {
        let pox = PoxConstants::mainnet_default();
        assert!(!pox.is_valid_lock_period(0));
        assert!(pox.is_valid_lock_period(1));
        assert!(pox.is_valid_lock_period(12));
        assert!(!pox.is_valid_lock_period(13));
    }
}
