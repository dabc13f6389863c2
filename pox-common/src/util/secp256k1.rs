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

use secp256k1::ecdsa::{
    RecoverableSignature as LibSecp256k1RecoverableSignature, RecoveryId as LibSecp256k1RecoveryId,
};
use secp256k1::{
    Message as LibSecp256k1Message, PublicKey as LibSecp256k1PublicKey, Secp256k1,
    SecretKey as LibSecp256k1PrivateKey,
};

use crate::util::hash::{hex_bytes, to_hex, Sha256Sum};

// per-thread Secp256k1 context
thread_local!(static _secp256k1: Secp256k1<secp256k1::All> = Secp256k1::new());

pub const MESSAGE_SIGNATURE_ENCODED_SIZE: u32 = 65;
pub const COMPRESSED_PUBLIC_KEY_SIZE: usize = 33;

/// A recoverable signature laid out as recovery id followed by r and s (VRS).
pub struct MessageSignature(pub [u8; 65]);
impl_array_newtype!(MessageSignature, u8, 65);
impl_array_hexstring_fmt!(MessageSignature);
impl_byte_array_newtype!(MessageSignature, u8, 65);
impl_byte_array_serde!(MessageSignature);

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum Secp256k1Error {
    #[error("Invalid key")]
    InvalidKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid message")]
    InvalidMessage,
    #[error("Invalid recovery ID")]
    InvalidRecoveryId,
    #[error("Recovery failed")]
    RecoveryFailed,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Secp256k1PublicKey {
    key: LibSecp256k1PublicKey,
    compressed: bool,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Secp256k1PrivateKey {
    key: LibSecp256k1PrivateKey,
    compress_public: bool,
}

impl MessageSignature {
    fn from_secp256k1_recoverable(sig: &LibSecp256k1RecoverableSignature) -> MessageSignature {
        let (recid, bytes) = sig.serialize_compact();
        let mut ret_bytes = [0u8; 65];
        // recovery ids are always in 0..=3
        ret_bytes[0] = recid.to_i32() as u8;
        ret_bytes[1..=64].copy_from_slice(&bytes[..64]);
        MessageSignature(ret_bytes)
    }

    fn to_secp256k1_recoverable(&self) -> Option<LibSecp256k1RecoverableSignature> {
        let recid = LibSecp256k1RecoveryId::from_i32(i32::from(self.0[0])).ok()?;
        LibSecp256k1RecoverableSignature::from_compact(&self.0[1..], recid).ok()
    }

    /// Converts from VRS to RSV.
    pub fn to_rsv(&self) -> Vec<u8> {
        [&self.0[1..], &self.0[0..1]].concat()
    }

    /// Converts from RSV to VRS.
    pub fn from_rsv(rsv: &[u8]) -> Option<MessageSignature> {
        if rsv.len() != 65 {
            return None;
        }
        let mut ret_bytes = [0u8; 65];
        ret_bytes[0] = rsv[64];
        ret_bytes[1..].copy_from_slice(&rsv[..64]);
        Some(MessageSignature(ret_bytes))
    }
}

impl Secp256k1PublicKey {
    pub fn from_hex(hex_string: &str) -> Result<Secp256k1PublicKey, Secp256k1Error> {
        let data = hex_bytes(hex_string).map_err(|_e| Secp256k1Error::InvalidKey)?;
        Secp256k1PublicKey::from_slice(&data[..])
    }

    pub fn from_slice(data: &[u8]) -> Result<Secp256k1PublicKey, Secp256k1Error> {
        let key =
            LibSecp256k1PublicKey::from_slice(data).map_err(|_e| Secp256k1Error::InvalidKey)?;
        Ok(Secp256k1PublicKey {
            key,
            compressed: data.len() == COMPRESSED_PUBLIC_KEY_SIZE,
        })
    }

    pub fn from_private(privk: &Secp256k1PrivateKey) -> Secp256k1PublicKey {
        _secp256k1.with(|ctx| Secp256k1PublicKey {
            key: LibSecp256k1PublicKey::from_secret_key(ctx, &privk.key),
            compressed: privk.compress_public,
        })
    }

    pub fn to_hex(&self) -> String {
        if self.compressed {
            to_hex(&self.key.serialize())
        } else {
            to_hex(&self.key.serialize_uncompressed())
        }
    }

    pub fn to_bytes_compressed(&self) -> [u8; 33] {
        self.key.serialize()
    }

    pub fn compressed(&self) -> bool {
        self.compressed
    }

    /// Recover the compressed public key that produced `sig` over `data_hash`.
    pub fn recover_to_pubkey(
        data_hash: &[u8],
        sig: &MessageSignature,
    ) -> Result<Secp256k1PublicKey, Secp256k1Error> {
        let rsv = sig.to_rsv();
        let pubkey_bytes = secp256k1_recover(data_hash, &rsv)?;
        Secp256k1PublicKey::from_slice(&pubkey_bytes)
    }

    pub fn verify(&self, data_hash: &[u8], sig: &MessageSignature) -> Result<bool, Secp256k1Error> {
        let msg = LibSecp256k1Message::from_slice(data_hash)
            .map_err(|_e| Secp256k1Error::InvalidMessage)?;
        let recoverable = sig
            .to_secp256k1_recoverable()
            .ok_or(Secp256k1Error::InvalidSignature)?;
        let standard = recoverable.to_standard();
        Ok(_secp256k1.with(|ctx| ctx.verify_ecdsa(&msg, &standard, &self.key).is_ok()))
    }
}

impl Secp256k1PrivateKey {
    /// Create a secp256k1 private key from some seed bytes.
    ///
    /// The seed is re-hashed with sha256 until it lands on a valid scalar.
    /// The returned private key's compress_public flag will be `true`.
    pub fn from_seed(seed: &[u8]) -> Secp256k1PrivateKey {
        let mut re_hashed_seed = Vec::from(seed);
        loop {
            if let Ok(mut sk) = Secp256k1PrivateKey::from_slice(&re_hashed_seed[..]) {
                sk.compress_public = true;
                return sk;
            }
            re_hashed_seed = Sha256Sum::from_data(&re_hashed_seed[..])
                .as_bytes()
                .to_vec();
        }
    }

    pub fn from_hex(hex_string: &str) -> Result<Secp256k1PrivateKey, Secp256k1Error> {
        let data = hex_bytes(hex_string).map_err(|_e| Secp256k1Error::InvalidKey)?;
        Secp256k1PrivateKey::from_slice(&data[..])
    }

    /// 32 bytes, or 33 bytes ending in 0x01 to mark a compressed public key
    pub fn from_slice(data: &[u8]) -> Result<Secp256k1PrivateKey, Secp256k1Error> {
        let compress_public = match data.len() {
            32 => false,
            33 if data[32] == 0x01 => true,
            _ => return Err(Secp256k1Error::InvalidKey),
        };
        let key = LibSecp256k1PrivateKey::from_slice(&data[0..32])
            .map_err(|_e| Secp256k1Error::InvalidKey)?;
        Ok(Secp256k1PrivateKey {
            key,
            compress_public,
        })
    }

    pub fn compress_public(&self) -> bool {
        self.compress_public
    }

    pub fn to_hex(&self) -> String {
        let mut bytes = self.key.secret_bytes().to_vec();
        if self.compress_public {
            bytes.push(1);
        }
        to_hex(&bytes)
    }

    pub fn sign(&self, data_hash: &[u8]) -> Result<MessageSignature, Secp256k1Error> {
        let msg = LibSecp256k1Message::from_slice(data_hash)
            .map_err(|_e| Secp256k1Error::InvalidMessage)?;
        let sig = _secp256k1.with(|ctx| ctx.sign_ecdsa_recoverable(&msg, &self.key));
        Ok(MessageSignature::from_secp256k1_recoverable(&sig))
    }
}

/// Recovers a public key from a message hash and an RSV-encoded recoverable signature.
/// The returned public key is in compressed format (33 bytes).
pub fn secp256k1_recover(
    message_arr: &[u8],
    serialized_signature_arr: &[u8],
) -> Result<[u8; 33], Secp256k1Error> {
    let msg = LibSecp256k1Message::from_slice(message_arr)
        .map_err(|_e| Secp256k1Error::InvalidMessage)?;
    if serialized_signature_arr.len() != 65 {
        return Err(Secp256k1Error::InvalidSignature);
    }
    let recid = LibSecp256k1RecoveryId::from_i32(i32::from(serialized_signature_arr[64]))
        .map_err(|_e| Secp256k1Error::InvalidRecoveryId)?;
    let sig = LibSecp256k1RecoverableSignature::from_compact(&serialized_signature_arr[..64], recid)
        .map_err(|_e| Secp256k1Error::InvalidSignature)?;
    let pubkey = _secp256k1
        .with(|ctx| ctx.recover_ecdsa(&msg, &sig))
        .map_err(|_e| Secp256k1Error::RecoveryFailed)?;
    Ok(pubkey.serialize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_seed() {
        let sk = Secp256k1PrivateKey::from_seed(&[2; 32]);
        let pubk = Secp256k1PublicKey::from_private(&sk);

        let sk2 = Secp256k1PrivateKey::from_seed(&[2; 32]);
        let pubk2 = Secp256k1PublicKey::from_private(&sk2);

        assert_eq!(sk.to_hex(), sk2.to_hex());
        assert_eq!(pubk.to_hex(), pubk2.to_hex());
        assert!(pubk.compressed());
        assert_eq!(pubk.to_hex().len(), 66);
    }

    #[test]
    fn test_private_key_hex_compression_marker() {
        let hex = "753b7cc01a1a2e86221266a154af739463fce51219d97e4f856cd7200c3bd2a601";
        let sk = Secp256k1PrivateKey::from_hex(hex).unwrap();
        assert!(sk.compress_public());
        assert_eq!(sk.to_hex(), hex);

        let uncompressed = Secp256k1PrivateKey::from_hex(&hex[..64]).unwrap();
        assert!(!uncompressed.compress_public());

        assert_eq!(
            Secp256k1PrivateKey::from_hex(&format!("{}02", &hex[..64])),
            Err(Secp256k1Error::InvalidKey)
        );
    }

    #[test]
    fn test_sign_verify_recover() {
        let privk = Secp256k1PrivateKey::from_seed(b"sign-verify-recover");
        let pubk = Secp256k1PublicKey::from_private(&privk);
        let msg_hash = Sha256Sum::from_data(b"hello world");

        let sig = privk.sign(msg_hash.as_bytes()).unwrap();
        assert!(pubk.verify(msg_hash.as_bytes(), &sig).unwrap());

        let recovered = Secp256k1PublicKey::recover_to_pubkey(msg_hash.as_bytes(), &sig).unwrap();
        assert_eq!(recovered, pubk);

        let rsv = sig.to_rsv();
        assert_eq!(rsv[64], sig.0[0]);
        assert_eq!(MessageSignature::from_rsv(&rsv), Some(sig));
        assert_eq!(
            secp256k1_recover(msg_hash.as_bytes(), &rsv).unwrap(),
            pubk.to_bytes_compressed()
        );
    }

    #[test]
    fn test_verify_with_different_key() {
        let privk = Secp256k1PrivateKey::from_seed(b"signer");
        let other = Secp256k1PublicKey::from_private(&Secp256k1PrivateKey::from_seed(b"other"));
        let msg_hash = Sha256Sum::from_data(b"hello world");

        let sig = privk.sign(msg_hash.as_bytes()).unwrap();
        assert!(!other.verify(msg_hash.as_bytes(), &sig).unwrap());
    }

    #[test]
    fn test_recover_rejects_malformed_input() {
        let msg_hash = Sha256Sum::from_data(b"hello world");
        assert_eq!(
            secp256k1_recover(&msg_hash.as_bytes()[..31], &[0u8; 65]),
            Err(Secp256k1Error::InvalidMessage)
        );
        assert_eq!(
            secp256k1_recover(msg_hash.as_bytes(), &[0u8; 64]),
            Err(Secp256k1Error::InvalidSignature)
        );
        let mut bad_recid = [1u8; 65];
        bad_recid[64] = 7;
        assert_eq!(
            secp256k1_recover(msg_hash.as_bytes(), &bad_recid),
            Err(Secp256k1Error::InvalidRecoveryId)
        );
    }
}
