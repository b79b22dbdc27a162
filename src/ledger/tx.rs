//! Legacy (EIP-155) transaction encoding and signing.
//!
//! Both networks accept legacy transactions, which keeps the signer down to
//! RLP plus one recoverable secp256k1 signature.

use anyhow::{Context, Result};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};
use std::fmt;

use super::abi::{keccak256, Address};

/// Keeper key used to authorize ledger writes.
#[derive(Clone)]
pub struct Signer {
    key: SigningKey,
    address: Address,
}

impl Signer {
    /// Parse a hex secret key, with or without `0x`.
    pub fn from_hex(secret: &str) -> Result<Self> {
        let trimmed = secret.trim().trim_start_matches("0x");
        let bytes = hex::decode(trimmed).context("secret key is not valid hex")?;
        let key = SigningKey::from_slice(&bytes).context("secret key is not a valid secp256k1 scalar")?;

        let point = k256::PublicKey::from(key.verifying_key()).to_encoded_point(false);
        let hash = keccak256(&point.as_bytes()[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash[12..]);

        Ok(Self {
            key,
            address: Address(address),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").field("address", &self.address).finish_non_exhaustive()
    }
}

/// Unsigned legacy transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTransaction {
    /// RLP payload hashed for the EIP-155 signature.
    pub fn signing_payload(&self) -> Vec<u8> {
        rlp::encode_list(&[
            rlp::encode_uint(self.nonce as u128),
            rlp::encode_uint(self.gas_price),
            rlp::encode_uint(self.gas_limit as u128),
            rlp::encode_bytes(self.to.as_bytes()),
            rlp::encode_uint(self.value),
            rlp::encode_bytes(&self.data),
            rlp::encode_uint(self.chain_id as u128),
            rlp::encode_uint(0),
            rlp::encode_uint(0),
        ])
    }

    /// Sign and return the raw transaction bytes for `eth_sendRawTransaction`.
    pub fn sign(&self, signer: &Signer) -> Result<Vec<u8>> {
        let digest = Keccak256::new().chain_update(self.signing_payload());
        let (sig, recid) = signer
            .key
            .sign_digest_recoverable(digest)
            .context("failed to sign transaction")?;
        let (r, s) = sig.split_bytes();
        let v = recid.to_byte() as u128 + self.chain_id as u128 * 2 + 35;

        Ok(rlp::encode_list(&[
            rlp::encode_uint(self.nonce as u128),
            rlp::encode_uint(self.gas_price),
            rlp::encode_uint(self.gas_limit as u128),
            rlp::encode_bytes(self.to.as_bytes()),
            rlp::encode_uint(self.value),
            rlp::encode_bytes(&self.data),
            rlp::encode_uint(v),
            rlp::encode_bytes(rlp::strip_leading_zeros(&r)),
            rlp::encode_bytes(rlp::strip_leading_zeros(&s)),
        ]))
    }
}

mod rlp {
    pub fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        &bytes[start..]
    }

    fn length_prefix(len: usize, short_base: u8, long_base: u8) -> Vec<u8> {
        if len <= 55 {
            vec![short_base + len as u8]
        } else {
            let len_bytes = (len as u64).to_be_bytes();
            let len_bytes = strip_leading_zeros(&len_bytes);
            let mut out = vec![long_base + len_bytes.len() as u8];
            out.extend_from_slice(len_bytes);
            out
        }
    }

    pub fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
        if bytes.len() == 1 && bytes[0] < 0x80 {
            return vec![bytes[0]];
        }
        let mut out = length_prefix(bytes.len(), 0x80, 0xb7);
        out.extend_from_slice(bytes);
        out
    }

    pub fn encode_uint(value: u128) -> Vec<u8> {
        let bytes = value.to_be_bytes();
        encode_bytes(strip_leading_zeros(&bytes))
    }

    pub fn encode_list(items: &[Vec<u8>]) -> Vec<u8> {
        let payload: Vec<u8> = items.concat();
        let mut out = length_prefix(payload.len(), 0xc0, 0xf7);
        out.extend_from_slice(&payload);
        out
    }
}
