//! Just enough Solidity ABI to read the factory, tournament and group
//! contracts: event topics, call selectors, static words, strings and
//! dynamic arrays.

use anyhow::{anyhow, bail, Context, Result};
use betcache_types::Address;
use sha3::{Digest, Keccak256};

pub const WORD: usize = 32;

pub type Word = [u8; WORD];

pub fn keccak256(data: &[u8]) -> Word {
    let mut out = [0u8; WORD];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// `topic0` for an event signature.
pub fn event_topic(signature: &str) -> Word {
    keccak256(signature.as_bytes())
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn uint_word(value: u64) -> Word {
    let mut word = [0u8; WORD];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Calldata for a function taking only static arguments.
pub fn encode_call(signature: &str, args: &[Word]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + args.len() * WORD);
    data.extend_from_slice(&selector(signature));
    for arg in args {
        data.extend_from_slice(arg);
    }
    data
}

pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>> {
    hex::decode(s.trim_start_matches("0x")).map_err(|e| anyhow!("invalid hex data: {}", e))
}

/// Parses a JSON-RPC hex quantity such as `"0x1b4"`.
pub fn parse_quantity(s: &str) -> Result<u64> {
    let digits = s.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16).map_err(|e| anyhow!("failed to parse quantity {}: {}", s, e))
}

pub fn parse_quantity_u128(s: &str) -> Result<u128> {
    let digits = s.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| anyhow!("failed to parse quantity {}: {}", s, e))
}

pub fn parse_word(s: &str) -> Result<Word> {
    let bytes = parse_hex_bytes(s)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("expected 32-byte word, got {} bytes", bytes.len()))
}

pub fn word_to_u64(word: &Word) -> Result<u64> {
    if word[..24].iter().any(|b| *b != 0) {
        bail!("uint256 value does not fit in u64");
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(tail))
}

/// Reads head/tail encoded ABI data (event data or call return data).
pub struct AbiDecoder<'a> {
    data: &'a [u8],
}

impl<'a> AbiDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn word_at(&self, offset: usize) -> Result<Word> {
        let end = offset
            .checked_add(WORD)
            .ok_or_else(|| anyhow!("ABI offset overflow"))?;
        let slice = self
            .data
            .get(offset..end)
            .ok_or_else(|| {
                anyhow!("ABI data too short: need {} bytes, have {}", end, self.data.len())
            })?;
        let mut word = [0u8; WORD];
        word.copy_from_slice(slice);
        Ok(word)
    }

    /// The `index`-th head word.
    pub fn word(&self, index: usize) -> Result<Word> {
        self.word_at(index * WORD)
    }

    pub fn uint(&self, index: usize) -> Result<u64> {
        word_to_u64(&self.word(index)?)
    }

    pub fn address(&self, index: usize) -> Result<Address> {
        Ok(Address::from_word(&self.word(index)?))
    }

    pub fn boolean(&self, index: usize) -> Result<bool> {
        Ok(self.uint(index)? != 0)
    }

    fn tail_offset(&self, index: usize) -> Result<usize> {
        let offset = self.uint(index)?;
        usize::try_from(offset).context("ABI offset does not fit in usize")
    }

    /// Dynamic `string` whose offset is stored in head word `index`.
    pub fn string(&self, index: usize) -> Result<String> {
        let offset = self.tail_offset(index)?;
        let len = usize::try_from(word_to_u64(&self.word_at(offset)?)?)
            .context("string length does not fit in usize")?;
        let start = offset + WORD;
        let bytes = self
            .data
            .get(start..start + len)
            .ok_or_else(|| anyhow!("ABI string out of bounds"))?;
        String::from_utf8(bytes.to_vec()).context("ABI string is not valid UTF-8")
    }

    /// Element count of the dynamic array whose offset is in head word `index`.
    pub fn array_len(&self, index: usize) -> Result<u64> {
        let offset = self.tail_offset(index)?;
        word_to_u64(&self.word_at(offset)?)
    }

    /// Dynamic `uint256[]` whose offset is stored in head word `index`.
    pub fn uint_array(&self, index: usize) -> Result<Vec<u64>> {
        let offset = self.tail_offset(index)?;
        let len = word_to_u64(&self.word_at(offset)?)? as usize;
        (0..len)
            .map(|i| word_to_u64(&self.word_at(offset + WORD * (i + 1))?))
            .collect()
    }
}
