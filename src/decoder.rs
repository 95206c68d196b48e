//! Transaction Decoder
//!
//! Reduces node transactions to the fields contract discovery needs and derives
//! the address a creation transaction deploys to.

use alloy::consensus::Transaction as _;
use alloy::primitives::{Address, Bytes, Selector, TxHash};
use alloy::rpc::types::Transaction;
use thiserror::Error;

use crate::filter::extract_selector;

/// Errors that can occur during decoding
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// Transaction fields used for contract discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    /// Transaction hash
    pub hash: TxHash,
    /// Sender address
    pub from: Address,
    /// Recipient address (None for contract creation)
    pub to: Option<Address>,
    /// Sender's nonce at the time of sending
    pub nonce: u64,
    /// Transaction input data (calldata or init code)
    pub input: Bytes,
}

impl ChainTransaction {
    /// First 4 bytes of the input, if there are at least 4
    pub fn selector(&self) -> Option<Selector> {
        extract_selector(&self.input)
    }

    /// Address a creation by this sender at this nonce deploys to
    pub fn created_address(&self) -> Address {
        contract_address(self.from, self.nonce)
    }

    /// Whether this transaction has no recipient
    pub fn is_creation(&self) -> bool {
        self.to.is_none()
    }
}

impl From<&Transaction> for ChainTransaction {
    fn from(tx: &Transaction) -> Self {
        let envelope = tx.inner.inner();
        Self {
            hash: *envelope.tx_hash(),
            from: tx.inner.signer(),
            to: envelope.to(),
            nonce: envelope.nonce(),
            input: envelope.input().clone(),
        }
    }
}

/// Compute the CREATE address for `sender` at `nonce`.
///
/// The address is the low 20 bytes of keccak256(rlp([sender, nonce])).
pub fn contract_address(sender: Address, nonce: u64) -> Address {
    sender.create(nonce)
}

/// Canonical lowercase hex form of an address, with 0x prefix
pub fn format_address(address: Address) -> String {
    format!("{:#x}", address)
}

/// Parse an address regardless of hex case
pub fn parse_address(raw: &str) -> Result<Address, DecodeError> {
    let bytes = hex_to_bytes(raw.trim())?;
    if bytes.len() != 20 {
        return Err(DecodeError::InvalidAddress(raw.to_string()));
    }
    Ok(Address::from_slice(&bytes))
}

/// Parse a hex string to bytes (with or without 0x prefix)
pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>, DecodeError> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    hex::decode(hex_str).map_err(|e| DecodeError::InvalidHex(e.to_string()))
}
