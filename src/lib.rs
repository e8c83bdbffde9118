//! XEC wallet
//!
//! A minimal self-custodial wallet library for the eCash (XEC) UTXO
//! blockchain: BIP39/BIP32 key derivation, CashAddr encoding, a
//! Chronik-compatible indexer client, coin selection, transaction signing,
//! SLP/ALP token sends, and UTXO consolidation planning, behind a two-phase
//! `Wallet::new`/`initialize` facade.
//!
//! ## Security model
//!
//! - Private keys never leave the process; the facade signs transactions
//!   locally and only ever sends raw signed hex to the indexer.
//! - Indexer endpoints are treated as untrusted: failover across a pool,
//!   fail-closed UTXO validation, no trust in a single response.
//! - Error messages are sanitized before leaving the crate so a caller can
//!   safely log them without leaking key material.

pub mod coin_select;
pub mod config;
pub mod consolidate;
pub mod crypto;
pub mod error;
pub mod indexer;
pub mod keys;
pub mod secmem;
pub mod storage;
pub mod token;
pub mod txcodec;
pub mod types;
pub mod utxo;
pub mod wallet;
pub mod xec_ops;

pub use config::{Network, WalletConfig};
pub use error::{Result, WalletError};
pub use indexer::{ChronikClient, HistoryOrder, IndexerClient};
pub use keys::Identity;
pub use storage::MnemonicEnvelope;
pub use token::{TokenEngine, TokenRecipient};
pub use types::{
    Balance, Outpoint, Protocol, Recipient, TokenAttribute, TokenBalanceEntry, TokenMetadata,
    TxSummary, Utxo,
};
pub use utxo::{SpendableOptions, UtxoStore};
pub use wallet::{Wallet, WalletSecret};
