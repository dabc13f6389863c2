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

use std::fmt::{Debug, Display};
use std::fs;
use std::path::PathBuf;

use pox_common::consts::{CHAIN_ID_MAINNET, CHAIN_ID_TESTNET, MICROSTACKS_PER_STACKS};
use pox_common::types::{PrincipalData, StacksAddress};
use pox_common::util::hash::to_hex;
use pox_common::util::secp256k1::{Secp256k1PublicKey, COMPRESSED_PUBLIC_KEY_SIZE};
use serde::Deserialize;

use crate::address::PoxAddress;
use crate::burnchain::{PoxConstants, MAX_POX_REWARD_CYCLES};

const MAINNET_STACKING_THRESHOLD_DIVISOR: u128 = 20_000;
const TESTNET_STACKING_THRESHOLD_DIVISOR: u128 = 8_000;
const DEFAULT_POOL_LOCK_PERIOD: u64 = 1;
const DEFAULT_POOL_FEE_BUFFER_USTX: u128 = MICROSTACKS_PER_STACKS;

#[derive(thiserror::Error, Debug)]
/// An error occurred parsing the provided configuration
pub enum ConfigError {
    /// Error occurred reading config file
    #[error("{0}")]
    InvalidConfig(String),
    /// An error occurred parsing the TOML data
    #[error("{0}")]
    ParseError(String),
    /// A field was malformed
    #[error("identifier={0}, value={1}")]
    BadField(String, String),
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
/// The Stacks network to use.
pub enum Network {
    /// The mainnet network
    Mainnet,
    /// The testnet network
    Testnet,
    /// The mocknet network
    Mocknet,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Testnet => write!(f, "testnet"),
            Self::Mocknet => write!(f, "mocknet"),
        }
    }
}

impl Network {
    /// Check if the network is Mainnet or not
    pub const fn is_mainnet(&self) -> bool {
        match self {
            Self::Mainnet => true,
            Self::Testnet | Self::Mocknet => false,
        }
    }

    const fn default_chain_id(&self) -> u32 {
        match self {
            Self::Mainnet => CHAIN_ID_MAINNET,
            Self::Testnet | Self::Mocknet => CHAIN_ID_TESTNET,
        }
    }

    fn default_pox_constants(&self) -> PoxConstants {
        match self {
            Self::Mainnet => PoxConstants::mainnet_default(),
            Self::Testnet | Self::Mocknet => PoxConstants::testnet_default(),
        }
    }

    const fn default_threshold_divisor(&self) -> u128 {
        match self {
            Self::Mainnet => MAINNET_STACKING_THRESHOLD_DIVISOR,
            Self::Testnet | Self::Mocknet => TESTNET_STACKING_THRESHOLD_DIVISOR,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
/// Which stacking contract generation the ledger emulates.
pub enum PoxVersion {
    /// Locks need no signer authorization
    #[serde(rename = "pox-3")]
    Pox3,
    /// Locks and commits must carry a signer key authorization
    #[serde(rename = "pox-4")]
    Pox4,
}

impl PoxVersion {
    pub const fn requires_signer_key(&self) -> bool {
        matches!(self, PoxVersion::Pox4)
    }

    pub const fn contract_name(&self) -> &'static str {
        match self {
            PoxVersion::Pox3 => "pox-3",
            PoxVersion::Pox4 => "pox-4",
        }
    }
}

impl std::fmt::Display for PoxVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.contract_name())
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
/// What a consumed signer authorization is remembered by.
pub enum ReplayKeyScope {
    /// The whole signed message: topic, cycle, period, pox address, max amount and auth id
    Message,
    /// Only the signer key and auth id
    AuthId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerAuthConfig {
    pub replay_key: ReplayKeyScope,
    /// When set, authorizations with an unlimited max amount are never consumed
    pub reuse_unlimited: bool,
}

impl Default for SignerAuthConfig {
    fn default() -> Self {
        SignerAuthConfig {
            replay_key: ReplayKeyScope::Message,
            reuse_unlimited: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationConfig {
    /// Whether a principal with an active lock may still grant a delegation
    pub allow_while_stacking: bool,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        DelegationConfig {
            allow_while_stacking: true,
        }
    }
}

/// Settings of the pool wrapper façade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// The only principal allowed to edit the whitelist
    pub admin: PrincipalData,
    /// Principal the pool stacks and commits as
    pub operator: PrincipalData,
    pub pox_addr: PoxAddress,
    pub lock_period: u64,
    /// Left unlocked on each member's account to pay fees
    pub fee_buffer_ustx: u128,
    /// Signer key used for aggregation commits under pox-4
    pub signer_key: Option<[u8; 33]>,
    pub max_amount: u128,
    pub auth_id: u128,
}

/// The parsed ledger configuration
#[derive(Clone)]
pub struct PoxConfig {
    /// The network to use. One of "mainnet", "testnet" or "mocknet".
    pub network: Network,
    /// An optional custom Chain ID
    pub chain_id: Option<u32>,
    pub pox_version: PoxVersion,
    pub pox_constants: PoxConstants,
    /// Fixed stacking minimum; derived from the liquid supply when unset
    pub min_amount_ustx: Option<u128>,
    pub stacking_threshold_divisor: u128,
    pub signer_auth: SignerAuthConfig,
    pub delegation: DelegationConfig,
    pub pool: Option<PoolConfig>,
}

#[derive(Deserialize, Debug, Default)]
struct RawSignerAuth {
    replay_key: Option<ReplayKeyScope>,
    reuse_unlimited: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
struct RawDelegation {
    allow_while_stacking: Option<bool>,
}

/// A uSTX amount or similar u128 field. TOML integers stop at `i64::MAX`,
/// so larger values are written as decimal strings.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum RawAmount {
    Int(u64),
    Str(String),
}

impl RawAmount {
    fn parse(self, field: &str) -> Result<u128, ConfigError> {
        match self {
            RawAmount::Int(value) => Ok(u128::from(value)),
            RawAmount::Str(value) => value
                .trim()
                .parse::<u128>()
                .map_err(|_| ConfigError::BadField(field.into(), value)),
        }
    }
}

fn parse_amount(field: &str, raw: Option<RawAmount>) -> Result<Option<u128>, ConfigError> {
    raw.map(|raw| raw.parse(field)).transpose()
}

#[derive(Deserialize, Debug)]
struct RawPool {
    admin: String,
    operator: String,
    pox_addr_version: u8,
    pox_addr_hashbytes: String,
    lock_period: Option<u64>,
    fee_buffer_ustx: Option<RawAmount>,
    signer_key: Option<String>,
    max_amount: Option<RawAmount>,
    auth_id: Option<RawAmount>,
}

/// Internal struct for loading up the config file
#[derive(Deserialize, Debug)]
struct RawConfigFile {
    /// The network to use. One of "mainnet", "testnet" or "mocknet".
    pub network: Network,
    /// An optional custom Chain ID
    pub chain_id: Option<u32>,
    /// "pox-3" or "pox-4" (the default)
    pub pox_version: Option<PoxVersion>,
    pub first_burnchain_block_height: Option<u64>,
    pub reward_cycle_length: Option<u32>,
    pub prepare_cycle_length: Option<u32>,
    pub max_lock_period: Option<u64>,
    pub min_amount_ustx: Option<RawAmount>,
    pub stacking_threshold_divisor: Option<RawAmount>,
    pub signer_auth: Option<RawSignerAuth>,
    pub delegation: Option<RawDelegation>,
    pub pool: Option<RawPool>,
}

impl RawConfigFile {
    /// load the config from a string
    pub fn load_from_str(data: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(data).map_err(|e| ConfigError::ParseError(format!("{e:?}")))?;
        Ok(config)
    }
}

impl TryFrom<&PathBuf> for RawConfigFile {
    type Error = ConfigError;

    fn try_from(path: &PathBuf) -> Result<Self, Self::Error> {
        Self::load_from_str(&fs::read_to_string(path).map_err(|e| {
            ConfigError::InvalidConfig(format!("failed to read config file: {e:?}"))
        })?)
    }
}

fn parse_principal(field: &str, value: &str) -> Result<PrincipalData, ConfigError> {
    PrincipalData::parse(value).map_err(|_| ConfigError::BadField(field.into(), value.into()))
}

fn parse_signer_key(value: &str) -> Result<[u8; 33], ConfigError> {
    let bad_field = || ConfigError::BadField("pool.signer_key".into(), value.into());
    let pubkey = Secp256k1PublicKey::from_hex(value).map_err(|_| bad_field())?;
    if !pubkey.compressed() || value.len() != COMPRESSED_PUBLIC_KEY_SIZE * 2 {
        return Err(bad_field());
    }
    Ok(pubkey.to_bytes_compressed())
}

impl RawPool {
    fn into_pool_config(
        self,
        network: Network,
        pox_version: PoxVersion,
        pox_constants: &PoxConstants,
    ) -> Result<PoolConfig, ConfigError> {
        let admin = parse_principal("pool.admin", &self.admin)?;
        let operator = parse_principal("pool.operator", &self.operator)?;
        let pox_addr = PoxAddress::from_hex(self.pox_addr_version, &self.pox_addr_hashbytes)
            .ok()
            .filter(PoxAddress::is_valid)
            .ok_or_else(|| {
                ConfigError::BadField(
                    "pool.pox_addr_hashbytes".into(),
                    self.pox_addr_hashbytes.clone(),
                )
            })?;
        let lock_period = self.lock_period.unwrap_or(DEFAULT_POOL_LOCK_PERIOD);
        if !pox_constants.is_valid_lock_period(lock_period) {
            return Err(ConfigError::BadField(
                "pool.lock_period".into(),
                lock_period.to_string(),
            ));
        }
        let fee_buffer_ustx = parse_amount("pool.fee_buffer_ustx", self.fee_buffer_ustx)?
            .unwrap_or(DEFAULT_POOL_FEE_BUFFER_USTX);
        let max_amount = parse_amount("pool.max_amount", self.max_amount)?.unwrap_or(u128::MAX);
        let auth_id = parse_amount("pool.auth_id", self.auth_id)?.unwrap_or(0);
        let signer_key = self.signer_key.as_deref().map(parse_signer_key).transpose()?;
        if pox_version.requires_signer_key() {
            // the pool commits without a signature, as the signer key's own principal
            let Some(key) = signer_key.as_ref() else {
                return Err(ConfigError::InvalidConfig(format!(
                    "pool.signer_key is required under {pox_version}"
                )));
            };
            let signer_principal =
                PrincipalData::from(StacksAddress::p2pkh_from_compressed(network.is_mainnet(), key));
            if operator != signer_principal {
                return Err(ConfigError::BadField("pool.operator".into(), self.operator));
            }
        }
        Ok(PoolConfig {
            admin,
            operator,
            pox_addr,
            lock_period,
            fee_buffer_ustx,
            signer_key,
            max_amount,
            auth_id,
        })
    }
}

impl TryFrom<RawConfigFile> for PoxConfig {
    type Error = ConfigError;

    /// Attempt to decode the raw config file's primitive types into our types.
    fn try_from(raw_data: RawConfigFile) -> Result<Self, Self::Error> {
        let network = raw_data.network;
        let defaults = network.default_pox_constants();

        let reward_cycle_length = raw_data
            .reward_cycle_length
            .unwrap_or(defaults.reward_cycle_length);
        if reward_cycle_length == 0 {
            return Err(ConfigError::BadField(
                "reward_cycle_length".into(),
                reward_cycle_length.to_string(),
            ));
        }
        let prepare_length = raw_data
            .prepare_cycle_length
            .unwrap_or(defaults.prepare_length);
        if prepare_length >= reward_cycle_length {
            return Err(ConfigError::BadField(
                "prepare_cycle_length".into(),
                prepare_length.to_string(),
            ));
        }
        let max_lock_period = raw_data.max_lock_period.unwrap_or(MAX_POX_REWARD_CYCLES);
        if max_lock_period == 0 {
            return Err(ConfigError::BadField(
                "max_lock_period".into(),
                max_lock_period.to_string(),
            ));
        }
        let pox_constants = PoxConstants::new(
            raw_data
                .first_burnchain_block_height
                .unwrap_or(defaults.first_block_height),
            reward_cycle_length,
            prepare_length,
            max_lock_period,
        )
        .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        let stacking_threshold_divisor =
            parse_amount("stacking_threshold_divisor", raw_data.stacking_threshold_divisor)?
                .unwrap_or_else(|| network.default_threshold_divisor());
        let min_amount_ustx = parse_amount("min_amount_ustx", raw_data.min_amount_ustx)?;
        if stacking_threshold_divisor == 0 {
            return Err(ConfigError::BadField(
                "stacking_threshold_divisor".into(),
                "0".into(),
            ));
        }

        let pox_version = raw_data.pox_version.unwrap_or(PoxVersion::Pox4);
        let raw_signer_auth = raw_data.signer_auth.unwrap_or_default();
        let signer_auth = SignerAuthConfig {
            replay_key: raw_signer_auth
                .replay_key
                .unwrap_or(ReplayKeyScope::Message),
            reuse_unlimited: raw_signer_auth.reuse_unlimited.unwrap_or(false),
        };
        let delegation = DelegationConfig {
            allow_while_stacking: raw_data
                .delegation
                .unwrap_or_default()
                .allow_while_stacking
                .unwrap_or(true),
        };
        let pool = raw_data
            .pool
            .map(|p| p.into_pool_config(network, pox_version, &pox_constants))
            .transpose()?;

        Ok(Self {
            network,
            chain_id: raw_data.chain_id,
            pox_version,
            pox_constants,
            min_amount_ustx,
            stacking_threshold_divisor,
            signer_auth,
            delegation,
            pool,
        })
    }
}

impl TryFrom<&PathBuf> for PoxConfig {
    type Error = ConfigError;
    fn try_from(path: &PathBuf) -> Result<Self, ConfigError> {
        let config_file = RawConfigFile::try_from(path)?;
        Self::try_from(config_file)
    }
}

impl PoxConfig {
    /// Defaults for the given network and contract generation, with no pool.
    pub fn new(network: Network, pox_version: PoxVersion) -> PoxConfig {
        PoxConfig {
            network,
            chain_id: None,
            pox_version,
            pox_constants: network.default_pox_constants(),
            min_amount_ustx: None,
            stacking_threshold_divisor: network.default_threshold_divisor(),
            signer_auth: SignerAuthConfig::default(),
            delegation: DelegationConfig::default(),
            pool: None,
        }
    }

    /// load the config from a string and parse it
    pub fn load_from_str(data: &str) -> Result<Self, ConfigError> {
        RawConfigFile::load_from_str(data)?.try_into()
    }

    /// load the config from a file and parse it
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        Self::try_from(&PathBuf::from(path))
    }

    pub fn is_mainnet(&self) -> bool {
        self.network.is_mainnet()
    }

    /// Get the chain ID for the network
    pub fn to_chain_id(&self) -> u32 {
        self.chain_id
            .unwrap_or_else(|| self.network.default_chain_id())
    }

    /// Return a string with non-sensitive configuration
    /// information for logging purposes
    pub fn config_to_log_string(&self) -> String {
        let min_amount = match self.min_amount_ustx {
            Some(amount) => amount.to_string(),
            None => format!("liquid supply / {}", self.stacking_threshold_divisor),
        };
        let pool = match &self.pool {
            Some(pool) => format!(
                "{} (pox addr {}, signer key {})",
                pool.operator,
                pool.pox_addr,
                pool.signer_key
                    .map(|k| to_hex(&k))
                    .unwrap_or_else(|| "None".into())
            ),
            None => "None".to_string(),
        };
        format!(
            r#"
Network: {network}
Chain ID: 0x{chain_id:x}
PoX version: {pox_version}
First burnchain block height: {first_height}
Reward cycle length: {cycle_len}
Prepare phase length: {prepare_len}
Max lock period: {max_lock}
Stacking minimum: {min_amount}
Replay key: {replay_key:?}
Pool: {pool}
"#,
            network = self.network,
            chain_id = self.to_chain_id(),
            pox_version = self.pox_version,
            first_height = self.pox_constants.first_block_height,
            cycle_len = self.pox_constants.reward_cycle_length,
            prepare_len = self.pox_constants.prepare_length,
            max_lock = self.pox_constants.max_lock_period,
            replay_key = self.signer_auth.replay_key,
        )
    }
}

impl Display for PoxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.config_to_log_string())
    }
}

impl Debug for PoxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.config_to_log_string())
    }
}
