//! Wallet facade
//!
//! Two-phase lifecycle: `Wallet::new` derives the spending identity
//! synchronously and returns a facade whose UTXO store is still empty;
//! `initialize` then populates it from the indexer. Every operation that
//! needs UTXOs surfaces `NotInitialized` until that has run at least once.
//! Every error returned from here has passed through `error::sanitize`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::coin_select;
use crate::config::WalletConfig;
use crate::consolidate::{self, ConsolidationAnalysis, ConsolidationPlan, XecSender};
use crate::error::{self, Result, WalletError};
use crate::indexer::{HistoryOrder, IndexerClient};
use crate::keys::Identity;
use crate::token::{TokenEngine, TokenRecipient};
use crate::txcodec;
use crate::types::{Balance, Recipient, TokenBalanceEntry, TokenMetadata, TxSummary, Utxo};
use crate::utxo::{SpendableOptions, UtxoStore};
use crate::xec_ops;

/// The secret a wallet is constructed from.
pub enum WalletSecret {
    Mnemonic { phrase: String, passphrase: String, path: String },
    Wif(String),
    PrivateKeyBytes([u8; 32]),
}

pub struct Wallet<I: IndexerClient> {
    identity: Identity,
    indexer: Arc<I>,
    store: UtxoStore<I>,
    tokens: TokenEngine<I>,
    config: WalletConfig,
}

impl<I: IndexerClient> Wallet<I> {
    /// Phase one: derive the spending identity. Returns synchronously; no
    /// indexer I/O has happened yet.
    pub fn new(secret: WalletSecret, indexer: Arc<I>, config: WalletConfig) -> Result<Self> {
        let identity = match secret {
            WalletSecret::Mnemonic { phrase, passphrase, path } => {
                Identity::from_mnemonic(&phrase, &passphrase, &path, config.network)
                    .map_err(sanitize_error)?
            }
            WalletSecret::Wif(wif) => Identity::from_wif(&wif).map_err(sanitize_error)?,
            WalletSecret::PrivateKeyBytes(bytes) => {
                Identity::from_private_key_bytes(bytes, config.network).map_err(sanitize_error)?
            }
        };

        let store = UtxoStore::new(
            Arc::clone(&indexer),
            config.cache_ttl,
            config.dust_attack_threshold_sats,
        );
        let tokens = TokenEngine::new(Arc::clone(&indexer));

        Ok(Self { identity, indexer, store, tokens, config })
    }

    /// Phase two: populate the UTXO store from the indexer. Safe to call
    /// again later as a manual refresh.
    pub async fn initialize(&self) -> Result<()> {
        self.store.init(&self.identity.address, false).await.map_err(sanitize_error)
    }

    pub fn address(&self) -> &str {
        &self.identity.address
    }

    pub fn mnemonic(&self) -> Option<&str> {
        self.identity.mnemonic()
    }

    pub fn to_wif(&self) -> String {
        self.identity.to_wif()
    }

    pub fn balance(&self) -> Result<Balance> {
        self.store.balance(&self.identity.address).map_err(sanitize_error)
    }

    pub fn spendable_xec(&self, opts: SpendableOptions) -> Result<Vec<Utxo>> {
        self.store.spendable_xec(&self.identity.address, opts).map_err(sanitize_error)
    }

    pub async fn refresh(&self) -> Result<()> {
        self.store.refresh(&self.identity.address).await.map_err(sanitize_error)
    }

    pub async fn transactions(&self, order: HistoryOrder) -> Result<Vec<TxSummary>> {
        self.indexer
            .get_transactions(&self.identity.address, order)
            .await
            .map_err(sanitize_error)
    }

    /// Pay one or more recipients, optionally attaching an `OP_RETURN` memo.
    pub async fn send_xec(
        &self,
        recipients: &[Recipient],
        op_return: Option<Vec<Vec<u8>>>,
    ) -> Result<String> {
        xec_ops::send_xec(&self.identity, &self.store, &self.indexer, &self.config, recipients, op_return)
            .await
            .map_err(sanitize_error)
    }

    /// Sweep every spendable pure-XEC UTXO to `destination_address`.
    pub async fn send_all_xec(&self, destination_address: &str) -> Result<String> {
        xec_ops::send_all_xec(&self.identity, &self.store, &self.indexer, &self.config, destination_address)
            .await
            .map_err(sanitize_error)
    }

    /// Write a memo to the chain via `OP_RETURN`, change returned to self.
    pub async fn send_op_return(&self, chunks: Vec<Vec<u8>>) -> Result<String> {
        xec_ops::send_op_return(&self.identity, &self.store, &self.indexer, &self.config, chunks)
            .await
            .map_err(sanitize_error)
    }

    pub async fn get_token_data(&self, token_id: &[u8; 32]) -> Result<TokenMetadata> {
        self.tokens.get_token_data(token_id).await.map_err(sanitize_error)
    }

    pub fn get_token_balance(&self, token_id: &[u8; 32]) -> Result<u128> {
        let utxos = self.store.all_utxos(&self.identity.address).map_err(sanitize_error)?;
        Ok(self.tokens.get_token_balance(&utxos, token_id))
    }

    pub async fn list_tokens(&self) -> Result<Vec<TokenBalanceEntry>> {
        let utxos = self.store.all_utxos(&self.identity.address).map_err(sanitize_error)?;
        self.tokens.list_tokens(&utxos).await.map_err(sanitize_error)
    }

    pub async fn send_tokens(
        &self,
        token_id: &[u8; 32],
        recipients: &[TokenRecipient],
    ) -> Result<String> {
        self.tokens
            .send_tokens(&self.identity, &self.store, &self.config, token_id, recipients)
            .await
            .map_err(sanitize_error)
    }

    pub async fn burn_tokens(&self, token_id: &[u8; 32], amount_atoms: u128) -> Result<String> {
        self.tokens
            .burn_tokens(&self.identity, &self.store, &self.config, token_id, amount_atoms)
            .await
            .map_err(sanitize_error)
    }

    pub async fn burn_all_tokens(&self, token_id: &[u8; 32]) -> Result<String> {
        self.tokens
            .burn_all_tokens(&self.identity, &self.store, &self.config, token_id)
            .await
            .map_err(sanitize_error)
    }

    pub fn analyze_consolidation(&self) -> Result<ConsolidationAnalysis> {
        let utxos = self.spendable_xec(SpendableOptions::default())?;
        Ok(consolidate::analyze(&utxos, &self.config))
    }

    pub fn plan_consolidation(&self) -> Result<ConsolidationPlan> {
        let utxos = self.spendable_xec(SpendableOptions::default())?;
        Ok(consolidate::plan(&utxos, &self.config))
    }

    /// Plan and execute consolidation in one call.
    pub async fn consolidate(&self) -> Result<Vec<String>> {
        let plan = self.plan_consolidation()?;
        consolidate::start(&plan, self).await.map_err(sanitize_error)
    }
}

#[async_trait]
impl<I: IndexerClient> XecSender for Wallet<I> {
    async fn consolidate_batch(&self, inputs: &[Utxo]) -> Result<String> {
        let total_input: u64 = inputs.iter().map(|u| u.value_sats).sum();
        let fee = coin_select::estimate_fee(inputs.len(), 1, self.config.sats_per_byte);
        let send_value = total_input.saturating_sub(fee);
        let output = txcodec::p2pkh_output(&self.identity.hash160, send_value);

        let raw_tx = txcodec::build_and_sign_tx(&self.identity, inputs, &[output])?;
        let rawhex = hex::encode(&raw_tx);
        let txid = self.indexer.broadcast(&rawhex).await?;
        self.store.invalidate(&self.identity.address);
        Ok(txid)
    }
}

/// Elides secret-shaped substrings from every string-carrying error variant
/// before it reaches the caller.
fn sanitize_error(err: WalletError) -> WalletError {
    match err {
        WalletError::InvalidInput(msg) => WalletError::InvalidInput(error::sanitize(&msg)),
        WalletError::UnknownToken(msg) => WalletError::UnknownToken(error::sanitize(&msg)),
        WalletError::ProtocolMismatch { expected, found } => WalletError::ProtocolMismatch {
            expected: error::sanitize(&expected),
            found: error::sanitize(&found),
        },
        WalletError::NetworkError(msg) => WalletError::NetworkError(error::sanitize(&msg)),
        WalletError::BroadcastRejected(msg) => WalletError::BroadcastRejected(error::sanitize(&msg)),
        other => other,
    }
}
