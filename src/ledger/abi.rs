//! Minimal Solidity ABI codec for the keeper's contract calls.
//!
//! Only static 32-byte types are needed: `uint256`, `int256`, `bool`,
//! `uint8` and `address`.

use anyhow::{anyhow, Context, Result};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

const WORD: usize = 32;

/// 20-byte EVM account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(hex_part).with_context(|| format!("invalid address hex: {}", s))?;
        let array: [u8; 20] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| anyhow!("address must be 20 bytes, got {}", b.len()))?;
        Ok(Address(array))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Keccak-256 hash.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// First four bytes of keccak-256 of the canonical signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Static call argument.
#[derive(Debug, Clone, Copy)]
pub enum Token {
    Uint(u128),
    Address(Address),
}

impl Token {
    fn encode_word(&self) -> [u8; WORD] {
        let mut word = [0u8; WORD];
        match self {
            Token::Uint(value) => word[16..].copy_from_slice(&value.to_be_bytes()),
            Token::Address(addr) => word[12..].copy_from_slice(addr.as_bytes()),
        }
        word
    }
}

/// Calldata for `signature` with `args`.
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + args.len() * WORD);
    data.extend_from_slice(&selector(signature));
    for arg in args {
        data.extend_from_slice(&arg.encode_word());
    }
    data
}

/// Split return data into `count` words.
pub fn decode_words(data: &[u8], count: usize) -> Result<Vec<[u8; WORD]>> {
    if data.len() < count * WORD {
        anyhow::bail!(
            "return data too short: {} bytes, expected {}",
            data.len(),
            count * WORD
        );
    }

    Ok(data
        .chunks_exact(WORD)
        .take(count)
        .map(|chunk| {
            let mut word = [0u8; WORD];
            word.copy_from_slice(chunk);
            word
        })
        .collect())
}

/// `uint256` that must fit in 128 bits.
pub fn decode_uint(word: &[u8; WORD]) -> Result<u128> {
    if word[..16].iter().any(|b| *b != 0) {
        anyhow::bail!("uint256 value 0x{} exceeds 128 bits", hex::encode(word));
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(low))
}

/// Two's complement `int256` that must fit in 128 bits.
pub fn decode_int(word: &[u8; WORD]) -> Result<i128> {
    let negative = word[16] & 0x80 != 0;
    let fill = if negative { 0xff } else { 0x00 };
    if word[..16].iter().any(|b| *b != fill) {
        anyhow::bail!("int256 value 0x{} exceeds 128 bits", hex::encode(word));
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(i128::from_be_bytes(low))
}

pub fn decode_bool(word: &[u8; WORD]) -> Result<bool> {
    match decode_uint(word)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(anyhow!("invalid bool word {}", other)),
    }
}

pub fn decode_u8(word: &[u8; WORD]) -> Result<u8> {
    u8::try_from(decode_uint(word)?).map_err(|_| anyhow!("uint8 out of range"))
}
