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

//! Signer key authorizations for pox-4 operations.
//!
//! A stacker proves that a signer agreed to back its reward address either
//! with a signature over the SIP-018 message for the operation, or by a
//! pre-set authorization the signer recorded earlier. Checking is pure;
//! recording an authorization as used happens only once the operation
//! succeeds.

use hashbrown::{HashMap, HashSet};
use pox_common::types::{PrincipalData, StacksAddress};
use pox_common::util::hash::Sha256Sum;
use pox_common::util::secp256k1::{secp256k1_recover, MessageSignature, Secp256k1PublicKey};

use crate::address::PoxAddress;
use crate::config::{ReplayKeyScope, SignerAuthConfig};
use crate::errors::AuthError;
use crate::signed_structured_data::pox4::{
    make_pox_4_signer_key_message_hash, Pox4SignatureTopic,
};

/// Signer fields a caller passes to a pox-4 operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerArgs {
    /// 65-byte RSV signature, if the caller has one
    pub signer_sig: Option<Vec<u8>>,
    pub signer_key: Vec<u8>,
    pub max_amount: u128,
    pub auth_id: u128,
}

impl SignerArgs {
    pub fn signed(
        signature: &MessageSignature,
        signer_key: &Secp256k1PublicKey,
        max_amount: u128,
        auth_id: u128,
    ) -> SignerArgs {
        SignerArgs {
            signer_sig: Some(signature.to_rsv()),
            signer_key: signer_key.to_bytes_compressed().to_vec(),
            max_amount,
            auth_id,
        }
    }

    pub fn unsigned(signer_key: &[u8; 33], max_amount: u128, auth_id: u128) -> SignerArgs {
        SignerArgs {
            signer_sig: None,
            signer_key: signer_key.to_vec(),
            max_amount,
            auth_id,
        }
    }
}

/// Everything a signer key signs over.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignerAuthMessage {
    pub pox_addr: PoxAddress,
    pub reward_cycle: u64,
    pub topic: Pox4SignatureTopic,
    pub period: u64,
    pub signer_key: [u8; 33],
    pub max_amount: u128,
    pub auth_id: u128,
}

impl SignerAuthMessage {
    pub fn message_hash(&self, chain_id: u32) -> Sha256Sum {
        make_pox_4_signer_key_message_hash(
            &self.pox_addr,
            self.reward_cycle.into(),
            &self.topic,
            chain_id,
            self.period.into(),
            self.max_amount,
            self.auth_id,
        )
    }
}

/// How a consumed authorization is remembered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReplayKey {
    Message(SignerAuthMessage),
    AuthId { signer_key: [u8; 33], auth_id: u128 },
}

impl ReplayKey {
    pub fn new(scope: ReplayKeyScope, message: &SignerAuthMessage) -> ReplayKey {
        match scope {
            ReplayKeyScope::Message => ReplayKey::Message(message.clone()),
            ReplayKeyScope::AuthId => ReplayKey::AuthId {
                signer_key: message.signer_key,
                auth_id: message.auth_id,
            },
        }
    }
}

/// A verified authorization. `replay_key` is what must be recorded as used
/// once the operation commits; None when the authorization may be reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub signer_key: [u8; 33],
    pub replay_key: Option<ReplayKey>,
}

/// The fields of a signer authorization that the operation itself fixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest<'a> {
    pub topic: Pox4SignatureTopic,
    pub reward_cycle: u64,
    pub period: u64,
    pub pox_addr: &'a PoxAddress,
    /// Amount the operation locks or commits, checked against `max_amount`
    pub amount: u128,
}

pub struct SignerKeyVerifier<'a> {
    pub chain_id: u32,
    pub mainnet: bool,
    pub settings: &'a SignerAuthConfig,
    pub used: &'a HashSet<ReplayKey>,
    pub authorizations: &'a HashMap<SignerAuthMessage, bool>,
}

pub fn parse_signer_key(signer_key: &[u8]) -> Result<[u8; 33], AuthError> {
    let key = <[u8; 33]>::try_from(signer_key).map_err(|_| AuthError::InvalidSignerKey)?;
    Secp256k1PublicKey::from_slice(&key).map_err(|_| AuthError::InvalidSignerKey)?;
    Ok(key)
}

/// The principal that owns a signer key, and may use it without a signature.
pub fn signer_key_principal(mainnet: bool, signer_key: &[u8; 33]) -> PrincipalData {
    StacksAddress::p2pkh_from_compressed(mainnet, signer_key).into()
}

impl<'a> SignerKeyVerifier<'a> {
    pub fn verify(
        &self,
        request: &AuthRequest,
        args: &SignerArgs,
        caller: &PrincipalData,
    ) -> Result<AuthGrant, AuthError> {
        let signer_key = parse_signer_key(&args.signer_key)?;
        if request.amount > args.max_amount {
            return Err(AuthError::AmountTooHigh {
                amount: request.amount,
                max_amount: args.max_amount,
            });
        }

        let message = SignerAuthMessage {
            pox_addr: request.pox_addr.clone(),
            reward_cycle: request.reward_cycle,
            topic: request.topic,
            period: request.period,
            signer_key,
            max_amount: args.max_amount,
            auth_id: args.auth_id,
        };

        match args.signer_sig.as_ref() {
            Some(signature) => {
                let msg_hash = message.message_hash(self.chain_id);
                let recovered = secp256k1_recover(msg_hash.as_bytes(), signature)
                    .map_err(|_| AuthError::SignatureRecoveryFailed)?;
                if recovered != signer_key {
                    return Err(AuthError::BadSignature);
                }
            }
            None => {
                if *caller == signer_key_principal(self.mainnet, &signer_key) {
                    return Ok(AuthGrant {
                        signer_key,
                        replay_key: None,
                    });
                }
                if self.authorizations.get(&message) != Some(&true) {
                    return Err(AuthError::NotAllowed);
                }
            }
        }

        if self.settings.reuse_unlimited && args.max_amount == u128::MAX {
            return Ok(AuthGrant {
                signer_key,
                replay_key: None,
            });
        }
        let replay_key = ReplayKey::new(self.settings.replay_key, &message);
        if self.used.contains(&replay_key) {
            return Err(AuthError::AlreadyUsed);
        }
        Ok(AuthGrant {
            signer_key,
            replay_key: Some(replay_key),
        })
    }
}
