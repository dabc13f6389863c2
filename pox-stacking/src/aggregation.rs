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
use crate::state::{LoggedPartialStacked, PartialStackedKey, RewardSetEntry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub reward_cycle: u64,
    pub pox_addr: PoxAddress,
    /// Amount added to the reward set by this call
    pub committed_ustx: u128,
    /// The operator's committed total for this address and cycle
    pub total_committed: u128,
    pub reward_set_index: u128,
}

impl<B: StxBalances> PoxContract<B> {
    /// Commit the operator's partial-stacked total for `reward_cycle` to the
    /// reward set. The first commit must meet the stacking minimum; later
    /// ones add to the same reward set entry.
    pub fn aggregation_commit(
        &mut self,
        operator: &PrincipalData,
        pox_addr: &PoxAddress,
        reward_cycle: u64,
        signer: Option<&SignerArgs>,
    ) -> Result<CommitReceipt, StackingError> {
        let result = self.transaction(|pox| {
            pox.inner_aggregation_commit(operator, pox_addr, reward_cycle, signer)
        });
        if let Ok(receipt) = &result {
            info!("Committed aggregated STX";
                  "operator" => %operator,
                  "pox_addr" => %pox_addr,
                  "reward_cycle" => reward_cycle,
                  "committed_ustx" => receipt.committed_ustx,
                  "total_committed" => receipt.total_committed,
                  "reward_set_index" => receipt.reward_set_index);
        }
        finish("stack-aggregation-commit", result)
    }

    fn inner_aggregation_commit(
        &mut self,
        operator: &PrincipalData,
        pox_addr: &PoxAddress,
        reward_cycle: u64,
        signer: Option<&SignerArgs>,
    ) -> Result<CommitReceipt, StackingError> {
        let cur_cycle = self.current_cycle()?;
        if reward_cycle <= cur_cycle {
            return Err(StackingError::RewardCycleAlreadyStarted {
                reward_cycle,
                current_cycle: cur_cycle,
            });
        }
        if !pox_addr.is_valid() {
            return Err(StackingError::InvalidPoxAddress);
        }

        let key = PartialStackedKey {
            pox_addr: pox_addr.clone(),
            reward_cycle,
            operator: operator.clone(),
        };
        let pending = self.data.partial_stacked(&key).unwrap_or(0);
        let logged = self.data.logged_partial_stacked(&key);

        if pending == 0 {
            // nothing new since the last commit
            let logged = logged.ok_or(StackingError::NothingToCommit)?;
            return Ok(CommitReceipt {
                reward_cycle,
                pox_addr: pox_addr.clone(),
                committed_ustx: 0,
                total_committed: logged.total_ustx,
                reward_set_index: logged.reward_set_index,
            });
        }

        let (topic, total_committed) = match logged {
            None => {
                let minimum = self.get_stacking_minimum();
                if pending < minimum {
                    return Err(StackingError::ThresholdNotMet {
                        amount: pending,
                        minimum,
                    });
                }
                (Pox4SignatureTopic::AggregationCommit, pending)
            }
            Some(logged) => (
                Pox4SignatureTopic::AggregationIncrease,
                logged
                    .total_ustx
                    .checked_add(pending)
                    .ok_or(StackingError::ArithmeticOverflow)?,
            ),
        };

        let grant = self.verify_signer(
            &AuthRequest {
                topic,
                reward_cycle,
                period: 1,
                pox_addr,
                amount: total_committed,
            },
            signer,
            operator,
        )?;
        let signer_key = grant.as_ref().map(|g| g.signer_key);

        let reward_set_index = match logged {
            None => self.append_reward_set_entry(
                reward_cycle,
                RewardSetEntry {
                    pox_addr: pox_addr.clone(),
                    total_ustx: pending,
                    stacker: None,
                    signer: signer_key,
                },
            ),
            Some(logged) => {
                let Some(entry) = self.reward_set_entry_mut(reward_cycle, logged.reward_set_index)
                else {
                    error!("Committed aggregate has no reward set entry";
                           "operator" => %operator,
                           "reward_cycle" => reward_cycle,
                           "reward_set_index" => logged.reward_set_index);
                    return Err(StackingError::NothingToCommit);
                };
                entry.total_ustx = total_committed;
                if signer_key.is_some() {
                    entry.signer = signer_key;
                }
                logged.reward_set_index
            }
        };
        self.add_to_cycle_total(reward_cycle, pending)?;
        self.data.remove_partial_stacked(&key);
        self.data.insert_logged_partial_stacked(
            key,
            LoggedPartialStacked {
                reward_set_index,
                total_ustx: total_committed,
            },
        );
        self.consume_signer_auth(grant);

        let event_name = match topic {
            Pox4SignatureTopic::AggregationIncrease => PoxEventName::StackAggregationIncrease,
            _ => PoxEventName::StackAggregationCommit,
        };
        self.emit(
            event_name,
            operator,
            json!({
                "pox-addr": pox_addr_json(pox_addr),
                "reward-cycle": reward_cycle,
                "amount-ustx": pending,
                "total-ustx": total_committed,
                "reward-cycle-index": reward_set_index,
                "signer-key": signer_key_json(signer_key.as_ref()),
            }),
        );
        Ok(CommitReceipt {
            reward_cycle,
            pox_addr: pox_addr.clone(),
            committed_ustx: pending,
            total_committed,
            reward_set_index,
        })
    }
}
