//! Token engine
//!
//! Auto-detects SLP vs ALP from cached metadata, selects matching token
//! UTXOs largest-atoms-first, and routes the protocol-specific data output
//! through a single `send_tokens`/`burn_tokens`/`list_tokens` facade.

pub mod alp;
pub mod slp;

use std::collections::HashMap;
use std::sync::Arc;

use crate::coin_select;
use crate::config::{WalletConfig, DUST_LIMIT_SATS};
use crate::error::{Result, WalletError};
use crate::indexer::IndexerClient;
use crate::keys::Identity;
use crate::txcodec;
use crate::types::{Protocol, TokenBalanceEntry, TokenMetadata, Utxo};
use crate::utxo::{SpendableOptions, UtxoStore};
use crate::xec_ops::recipient_hash160;

/// A token recipient: address plus the atom amount to carry.
#[derive(Debug, Clone)]
pub struct TokenRecipient {
    pub address: String,
    pub amount_atoms: u128,
}

pub struct TokenEngine<I: IndexerClient> {
    indexer: Arc<I>,
}

impl<I: IndexerClient> TokenEngine<I> {
    pub fn new(indexer: Arc<I>) -> Self {
        Self { indexer }
    }

    /// Cached metadata lookup by token_id.
    pub async fn get_token_data(&self, token_id: &[u8; 32]) -> Result<TokenMetadata> {
        self.indexer.token_info(&hex::encode(token_id)).await
    }

    /// Aggregate every distinct token_id held across `utxos` into one
    /// balance entry each, fetching metadata for each distinct token.
    pub async fn list_tokens(&self, utxos: &[Utxo]) -> Result<Vec<TokenBalanceEntry>> {
        let mut grouped: HashMap<[u8; 32], (Protocol, u128, usize)> = HashMap::new();
        for utxo in utxos {
            if let Some(attr) = &utxo.token {
                let entry = grouped.entry(attr.token_id).or_insert((attr.protocol, 0, 0));
                entry.1 += attr.amount_atoms;
                entry.2 += 1;
            }
        }

        let mut out = Vec::with_capacity(grouped.len());
        for (token_id, (protocol, total_atoms, utxo_count)) in grouped {
            let metadata = self.get_token_data(&token_id).await?;
            out.push(TokenBalanceEntry {
                token_id,
                protocol,
                ticker: metadata.ticker,
                name: metadata.name,
                decimals: metadata.decimals,
                total_atoms,
                utxo_count,
            });
        }
        Ok(out)
    }

    /// Sum of atoms across `utxos` matching `token_id`, from the already
    /// cached UTXO set (no indexer round-trip).
    pub fn get_token_balance(&self, utxos: &[Utxo], token_id: &[u8; 32]) -> u128 {
        utxos
            .iter()
            .filter_map(|u| u.token.as_ref())
            .filter(|t| &t.token_id == token_id)
            .map(|t| t.amount_atoms)
            .sum()
    }

    /// Send `recipients` worth of `token_id`, selecting token UTXOs
    /// largest-atoms-first and pure-XEC UTXOs to cover the dust carriers and
    /// network fee.
    pub async fn send_tokens(
        &self,
        identity: &Identity,
        store: &UtxoStore<I>,
        config: &WalletConfig,
        token_id: &[u8; 32],
        recipients: &[TokenRecipient],
    ) -> Result<String> {
        if recipients.is_empty() {
            return Err(WalletError::invalid_input("no token recipients supplied"));
        }
        let requested_atoms: u128 = recipients.iter().map(|r| r.amount_atoms).sum();
        let (selected_token_inputs, change_atoms) =
            select_token_inputs(store, &identity.address, token_id, requested_atoms)?;

        let mut amounts: Vec<u128> = recipients.iter().map(|r| r.amount_atoms).collect();
        if change_atoms > 0 {
            amounts.push(change_atoms);
        }

        let metadata = self.get_token_data(token_id).await?;
        let data_output = build_data_output(metadata.protocol, token_id, &amounts, None)?;

        let mut outputs = vec![data_output];
        for recipient in recipients {
            let hash160 = recipient_hash160(&recipient.address)?;
            outputs.push(txcodec::p2pkh_output(&hash160, DUST_LIMIT_SATS));
        }
        if change_atoms > 0 {
            outputs.push(txcodec::p2pkh_output(&identity.hash160, DUST_LIMIT_SATS));
        }

        self.fund_sign_and_broadcast(identity, store, config, selected_token_inputs, outputs).await
    }

    /// Burn `amount_atoms` of `token_id`; any atoms not burned are returned
    /// to this wallet as a change carrier.
    pub async fn burn_tokens(
        &self,
        identity: &Identity,
        store: &UtxoStore<I>,
        config: &WalletConfig,
        token_id: &[u8; 32],
        amount_atoms: u128,
    ) -> Result<String> {
        let (selected_token_inputs, change_atoms) =
            select_token_inputs(store, &identity.address, token_id, amount_atoms)?;

        let metadata = self.get_token_data(token_id).await?;
        let data_output = build_data_output(metadata.protocol, token_id, &[], Some(amount_atoms))?;

        let mut outputs = vec![data_output];
        if change_atoms > 0 {
            outputs.push(txcodec::p2pkh_output(&identity.hash160, DUST_LIMIT_SATS));
        }

        self.fund_sign_and_broadcast(identity, store, config, selected_token_inputs, outputs).await
    }

    /// Burn every UTXO this wallet holds for `token_id`, leaving no change
    /// carrier.
    pub async fn burn_all_tokens(
        &self,
        identity: &Identity,
        store: &UtxoStore<I>,
        config: &WalletConfig,
        token_id: &[u8; 32],
    ) -> Result<String> {
        let token_inputs = store.spendable_token(&identity.address, token_id)?;
        let total_atoms: u128 = token_inputs
            .iter()
            .filter_map(|u| u.token.as_ref())
            .map(|t| t.amount_atoms)
            .sum();
        if total_atoms == 0 {
            return Err(WalletError::InsufficientTokenBalance { needed: 1, available: 0 });
        }
        self.burn_tokens(identity, store, config, token_id, total_atoms).await
    }

    async fn fund_sign_and_broadcast(
        &self,
        identity: &Identity,
        store: &UtxoStore<I>,
        config: &WalletConfig,
        selected_token_inputs: Vec<Utxo>,
        mut outputs: Vec<txcodec::TxOutput>,
    ) -> Result<String> {
        let base_output_count = outputs.len();
        let xec_candidates = store.spendable_xec(&identity.address, SpendableOptions::default())?;
        if xec_candidates.is_empty() {
            return Err(WalletError::NoPureXecUtxos);
        }
        let selection = coin_select::select(0, &xec_candidates, config.sats_per_byte, base_output_count)?;
        if selection.change > 0 {
            outputs.push(txcodec::p2pkh_output(&identity.hash160, selection.change));
        }

        let mut all_inputs = selected_token_inputs;
        all_inputs.extend(selection.selected);

        let raw_tx = txcodec::build_and_sign_tx(identity, &all_inputs, &outputs)?;
        let rawhex = hex::encode(&raw_tx);
        let txid = self.indexer.broadcast(&rawhex).await?;

        store.invalidate(&identity.address);
        Ok(txid)
    }
}

/// Select matching token UTXOs largest-atoms-first until the running total
/// covers `requested_atoms`. Returns the selected inputs and the leftover
/// (change) atom amount.
fn select_token_inputs<I: IndexerClient>(
    store: &UtxoStore<I>,
    address: &str,
    token_id: &[u8; 32],
    requested_atoms: u128,
) -> Result<(Vec<Utxo>, u128)> {
    let mut candidates = store.spendable_token(address, token_id)?;
    candidates.sort_by(|a, b| {
        let a_amt = a.token.as_ref().map(|t| t.amount_atoms).unwrap_or(0);
        let b_amt = b.token.as_ref().map(|t| t.amount_atoms).unwrap_or(0);
        b_amt.cmp(&a_amt)
    });

    let mut selected = Vec::new();
    let mut total_atoms: u128 = 0;
    for utxo in candidates {
        if total_atoms >= requested_atoms {
            break;
        }
        total_atoms += utxo.token.as_ref().map(|t| t.amount_atoms).unwrap_or(0);
        selected.push(utxo);
    }
    if total_atoms < requested_atoms {
        return Err(WalletError::InsufficientTokenBalance {
            needed: requested_atoms,
            available: total_atoms,
        });
    }
    Ok((selected, total_atoms - requested_atoms))
}

fn build_data_output(
    protocol: Protocol,
    token_id: &[u8; 32],
    send_amounts_atoms: &[u128],
    burn_amount_atoms: Option<u128>,
) -> Result<txcodec::TxOutput> {
    match (protocol, burn_amount_atoms) {
        (Protocol::Slp, None) => {
            let chunks = slp::send_chunks(token_id, send_amounts_atoms)?;
            txcodec::op_return_output(&chunks)
        }
        (Protocol::Slp, Some(amount)) => {
            let chunks = slp::burn_chunks(token_id, amount)?;
            txcodec::op_return_output(&chunks)
        }
        (Protocol::Alp, None) => {
            let section = alp::send_section(token_id, send_amounts_atoms)?;
            alp::empp_output(&[section])
        }
        (Protocol::Alp, Some(amount)) => {
            let section = alp::burn_section(token_id, amount)?;
            alp::empp_output(&[section])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::indexer::HistoryOrder;
    use crate::types::{Balance, Outpoint, TokenAttribute, TxSummary};
    use async_trait::async_trait;
    use std::time::Duration;

    struct FakeIndexer {
        utxos: Vec<Utxo>,
        metadata: TokenMetadata,
    }

    #[async_trait]
    impl IndexerClient for FakeIndexer {
        async fn get_balance(&self, _address: &str) -> Result<Balance> {
            unimplemented!()
        }
        async fn get_utxos(&self, _address: &str) -> Result<Vec<Utxo>> {
            Ok(self.utxos.clone())
        }
        async fn get_transactions(
            &self,
            _address: &str,
            _order: HistoryOrder,
        ) -> Result<Vec<TxSummary>> {
            Ok(vec![])
        }
        async fn get_tx_batch(&self, _txids: &[String]) -> Result<Vec<Vec<u8>>> {
            Ok(vec![])
        }
        async fn broadcast(&self, _rawhex: &str) -> Result<String> {
            Ok("cafef00d".to_string())
        }
        async fn token_info(&self, _token_id: &str) -> Result<TokenMetadata> {
            Ok(self.metadata.clone())
        }
        async fn get_xec_usd(&self) -> Result<f64> {
            Ok(0.0)
        }
        fn invalidate_cache(&self, _address: &str) {}
    }

    fn token_utxo(identity: &Identity, token_id: [u8; 32], amount_atoms: u128) -> Utxo {
        Utxo {
            outpoint: Outpoint { txid: [5u8; 32], vout: 0 },
            block_height: 800_000,
            is_coinbase: false,
            value_sats: DUST_LIMIT_SATS,
            script_pubkey: txcodec::p2pkh_script_pubkey(&identity.hash160),
            token: Some(TokenAttribute { token_id, protocol: Protocol::Slp, token_type: 1, amount_atoms }),
        }
    }

    fn xec_utxo(identity: &Identity, value_sats: u64) -> Utxo {
        Utxo {
            outpoint: Outpoint { txid: [6u8; 32], vout: 0 },
            block_height: 800_000,
            is_coinbase: false,
            value_sats,
            script_pubkey: txcodec::p2pkh_script_pubkey(&identity.hash160),
            token: None,
        }
    }

    #[tokio::test]
    async fn flct_send_six_of_ten_leaves_four_as_change() {
        let sender = Identity::from_private_key_bytes([0x51u8; 32], Network::Mainnet).unwrap();
        let recipient = Identity::from_private_key_bytes([0x52u8; 32], Network::Mainnet).unwrap();
        let token_id = [0x99u8; 32];

        let metadata = TokenMetadata {
            token_id,
            protocol: Protocol::Slp,
            ticker: "FLCT".to_string(),
            name: "Falcon Token".to_string(),
            decimals: 0,
            url: None,
            mint_authority_pubkey: None,
            first_seen: None,
        };

        let utxos = vec![token_utxo(&sender, token_id, 10), xec_utxo(&sender, 100_000)];
        let indexer = Arc::new(FakeIndexer { utxos, metadata });
        let store = UtxoStore::new(Arc::clone(&indexer), Duration::from_secs(30), 546);
        store.init(&sender.address, false).await.unwrap();

        let engine = TokenEngine::new(Arc::clone(&indexer));
        let config = WalletConfig::default();

        let txid = engine
            .send_tokens(
                &sender,
                &store,
                &config,
                &token_id,
                &[TokenRecipient { address: recipient.address.clone(), amount_atoms: 6 }],
            )
            .await
            .unwrap();

        assert_eq!(txid, "cafef00d");
    }

    #[tokio::test]
    async fn insufficient_token_balance_is_reported() {
        let sender = Identity::from_private_key_bytes([0x53u8; 32], Network::Mainnet).unwrap();
        let recipient = Identity::from_private_key_bytes([0x54u8; 32], Network::Mainnet).unwrap();
        let token_id = [0x88u8; 32];

        let metadata = TokenMetadata {
            token_id,
            protocol: Protocol::Slp,
            ticker: "FLCT".to_string(),
            name: "Falcon Token".to_string(),
            decimals: 0,
            url: None,
            mint_authority_pubkey: None,
            first_seen: None,
        };

        let utxos = vec![token_utxo(&sender, token_id, 3), xec_utxo(&sender, 100_000)];
        let indexer = Arc::new(FakeIndexer { utxos, metadata });
        let store = UtxoStore::new(Arc::clone(&indexer), Duration::from_secs(30), 546);
        store.init(&sender.address, false).await.unwrap();

        let engine = TokenEngine::new(Arc::clone(&indexer));
        let config = WalletConfig::default();

        let err = engine
            .send_tokens(
                &sender,
                &store,
                &config,
                &token_id,
                &[TokenRecipient { address: recipient.address.clone(), amount_atoms: 6 }],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, WalletError::InsufficientTokenBalance { needed: 6, available: 3 }));
    }

    #[tokio::test]
    async fn burn_all_tokens_leaves_no_carrier() {
        let sender = Identity::from_private_key_bytes([0x55u8; 32], Network::Mainnet).unwrap();
        let token_id = [0x77u8; 32];

        let metadata = TokenMetadata {
            token_id,
            protocol: Protocol::Slp,
            ticker: "FLCT".to_string(),
            name: "Falcon Token".to_string(),
            decimals: 0,
            url: None,
            mint_authority_pubkey: None,
            first_seen: None,
        };

        let utxos = vec![token_utxo(&sender, token_id, 10), xec_utxo(&sender, 100_000)];
        let indexer = Arc::new(FakeIndexer { utxos, metadata });
        let store = UtxoStore::new(Arc::clone(&indexer), Duration::from_secs(30), 546);
        store.init(&sender.address, false).await.unwrap();

        let engine = TokenEngine::new(Arc::clone(&indexer));
        let config = WalletConfig::default();

        let txid = engine.burn_all_tokens(&sender, &store, &config, &token_id).await.unwrap();
        assert_eq!(txid, "cafef00d");
    }
}
