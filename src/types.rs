//! Shared data types used across the UTXO store, coin selection, the
//! transaction codec, the token engine, and the indexer client.

use serde::{Deserialize, Serialize};

/// Token protocol tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    Slp,
    Alp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Slp => write!(f, "SLP"),
            Protocol::Alp => write!(f, "ALP"),
        }
    }
}

/// A 32-byte transaction id, displayed/encoded as hex.
pub type Txid = [u8; 32];

/// An outpoint: the transaction id and output index a UTXO was created at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Outpoint {
    pub txid: Txid,
    pub vout: u32,
}

/// The token attribute a UTXO may carry. When present, the UTXO's value is
/// (by construction) the dust-carrier amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAttribute {
    pub token_id: [u8; 32],
    pub protocol: Protocol,
    pub token_type: u8,
    pub amount_atoms: u128,
}

/// An unspent transaction output as observed via the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub outpoint: Outpoint,
    /// -1 means mempool/unconfirmed.
    pub block_height: i64,
    pub is_coinbase: bool,
    pub value_sats: u64,
    pub script_pubkey: Vec<u8>,
    pub token: Option<TokenAttribute>,
}

impl Utxo {
    pub fn is_confirmed(&self) -> bool {
        self.block_height != -1
    }

    pub fn is_pure_xec(&self) -> bool {
        self.token.is_none()
    }
}

/// Aggregate confirmed/unconfirmed/total balance, in satoshis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub confirmed_sats: u64,
    pub unconfirmed_sats: u64,
}

impl Balance {
    pub fn total_sats(&self) -> u64 {
        self.confirmed_sats + self.unconfirmed_sats
    }
}

/// A summary of a transaction touching a given address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSummary {
    pub txid: Txid,
    pub block_height: Option<i64>,
    pub timestamp: Option<i64>,
}

/// Token metadata, fetched by token_id and cached. Immutable once observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub token_id: [u8; 32],
    pub protocol: Protocol,
    pub ticker: String,
    pub name: String,
    pub decimals: u8,
    pub url: Option<String>,
    /// Presence indicates a live mint baton.
    pub mint_authority_pubkey: Option<Vec<u8>>,
    pub first_seen: Option<i64>,
}

/// A recipient output: address plus value.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub address: String,
    pub value_sats: u64,
}

/// A single entry returned by `list_tokens`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalanceEntry {
    pub token_id: [u8; 32],
    pub protocol: Protocol,
    pub ticker: String,
    pub name: String,
    pub decimals: u8,
    pub total_atoms: u128,
    pub utxo_count: usize,
}
