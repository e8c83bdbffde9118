//! XEC operations
//!
//! Plain-payment wallet operations: send to one or more recipients, sweep
//! the full spendable balance, or attach a memo via `OP_RETURN`. These only
//! ever touch pure-XEC UTXOs, and invalidate the sender's UTXO cache once a
//! broadcast succeeds so the next read reflects the spend.

use std::sync::Arc;

use crate::coin_select;
use crate::config::{WalletConfig, DUST_LIMIT_SATS};
use crate::crypto::cashaddr;
use crate::error::{Result, WalletError};
use crate::indexer::IndexerClient;
use crate::keys::Identity;
use crate::txcodec::{self, TxOutput};
use crate::types::Recipient;
use crate::utxo::{SpendableOptions, UtxoStore};

pub(crate) fn recipient_hash160(address: &str) -> Result<[u8; 20]> {
    let (_, _, hash) = cashaddr::decode(address)?;
    hash.try_into()
        .map_err(|_| WalletError::invalid_input("recipient address is not a P2PKH hash"))
}

/// Pay one or more recipients, optionally attaching an `OP_RETURN` memo.
pub async fn send_xec<I: IndexerClient>(
    identity: &Identity,
    store: &UtxoStore<I>,
    indexer: &Arc<I>,
    config: &WalletConfig,
    recipients: &[Recipient],
    op_return: Option<Vec<Vec<u8>>>,
) -> Result<String> {
    if recipients.is_empty() {
        return Err(WalletError::invalid_input("no recipients supplied"));
    }
    let target_value: u64 = recipients.iter().map(|r| r.value_sats).sum();

    let candidates = store.spendable_xec(&identity.address, SpendableOptions::default())?;
    if candidates.is_empty() {
        return Err(WalletError::NoPureXecUtxos);
    }

    let mut outputs: Vec<TxOutput> = Vec::with_capacity(recipients.len() + 1);
    for recipient in recipients {
        let hash160 = recipient_hash160(&recipient.address)?;
        outputs.push(txcodec::p2pkh_output(&hash160, recipient.value_sats));
    }
    let mut base_output_count = recipients.len();
    if let Some(chunks) = &op_return {
        outputs.push(txcodec::op_return_output(chunks)?);
        base_output_count += 1;
    }

    let selection =
        coin_select::select(target_value, &candidates, config.sats_per_byte, base_output_count)?;
    if selection.change > 0 {
        outputs.push(txcodec::p2pkh_output(&identity.hash160, selection.change));
    }

    broadcast_and_invalidate(identity, store, indexer, &selection.selected, &outputs).await
}

/// Sweep every spendable pure-XEC UTXO to a single destination address,
/// paying the network fee out of the swept amount rather than leaving change.
pub async fn send_all_xec<I: IndexerClient>(
    identity: &Identity,
    store: &UtxoStore<I>,
    indexer: &Arc<I>,
    config: &WalletConfig,
    destination_address: &str,
) -> Result<String> {
    let candidates = store.spendable_xec(&identity.address, SpendableOptions::default())?;
    if candidates.is_empty() {
        return Err(WalletError::NoPureXecUtxos);
    }

    let total_input: u64 = candidates.iter().map(|u| u.value_sats).sum();
    let fee = coin_select::estimate_fee(candidates.len(), 1, config.sats_per_byte);
    if total_input <= fee {
        return Err(WalletError::InsufficientFunds { needed: fee, available: total_input });
    }
    let send_value = total_input - fee;
    if send_value < DUST_LIMIT_SATS {
        return Err(WalletError::DustOutput(send_value));
    }

    let hash160 = recipient_hash160(destination_address)?;
    let output = txcodec::p2pkh_output(&hash160, send_value);

    broadcast_and_invalidate(identity, store, indexer, &candidates, &[output]).await
}

/// Write a memo to the chain via a zero-value `OP_RETURN` output, with any
/// leftover funds returned to this wallet as change.
pub async fn send_op_return<I: IndexerClient>(
    identity: &Identity,
    store: &UtxoStore<I>,
    indexer: &Arc<I>,
    config: &WalletConfig,
    chunks: Vec<Vec<u8>>,
) -> Result<String> {
    let candidates = store.spendable_xec(&identity.address, SpendableOptions::default())?;
    if candidates.is_empty() {
        return Err(WalletError::NoPureXecUtxos);
    }

    let op_return_output = txcodec::op_return_output(&chunks)?;
    let selection = coin_select::select(0, &candidates, config.sats_per_byte, 1)?;

    let mut outputs = vec![op_return_output];
    if selection.change > 0 {
        outputs.push(txcodec::p2pkh_output(&identity.hash160, selection.change));
    }

    broadcast_and_invalidate(identity, store, indexer, &selection.selected, &outputs).await
}

async fn broadcast_and_invalidate<I: IndexerClient>(
    identity: &Identity,
    store: &UtxoStore<I>,
    indexer: &Arc<I>,
    inputs: &[crate::types::Utxo],
    outputs: &[TxOutput],
) -> Result<String> {
    let raw_tx = txcodec::build_and_sign_tx(identity, inputs, outputs)?;
    let rawhex = hex::encode(&raw_tx);
    let txid = indexer.broadcast(&rawhex).await?;
    store.invalidate(&identity.address);
    Ok(txid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::indexer::HistoryOrder;
    use crate::types::{Balance, Outpoint, TokenMetadata, TxSummary, Utxo};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeIndexer {
        utxos: Vec<Utxo>,
        invalidated: AtomicUsize,
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
            Ok("feedface".to_string())
        }
        async fn token_info(&self, _token_id: &str) -> Result<TokenMetadata> {
            unimplemented!()
        }
        async fn get_xec_usd(&self) -> Result<f64> {
            Ok(0.0)
        }
        fn invalidate_cache(&self, _address: &str) {
            self.invalidated.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pure_utxo(identity: &Identity, value: u64) -> Utxo {
        Utxo {
            outpoint: Outpoint { txid: [9u8; 32], vout: 0 },
            block_height: 800_000,
            is_coinbase: false,
            value_sats: value,
            script_pubkey: txcodec::p2pkh_script_pubkey(&identity.hash160),
            token: None,
        }
    }

    async fn setup(utxos: Vec<Utxo>) -> (Identity, Arc<FakeIndexer>, UtxoStore<FakeIndexer>) {
        let identity = Identity::from_private_key_bytes([0x33u8; 32], Network::Mainnet).unwrap();
        let indexer = Arc::new(FakeIndexer { utxos, invalidated: AtomicUsize::new(0) });
        let store = UtxoStore::new(Arc::clone(&indexer), Duration::from_secs(30), 546);
        store.init(&identity.address, false).await.unwrap();
        (identity, indexer, store)
    }

    #[tokio::test]
    async fn send_xec_happy_path() {
        let sender = Identity::from_private_key_bytes([0x33u8; 32], Network::Mainnet).unwrap();
        let recipient = Identity::from_private_key_bytes([0x44u8; 32], Network::Mainnet).unwrap();
        let config = WalletConfig::default();
        let (identity, indexer, store) = setup(vec![pure_utxo(&sender, 100_000)]).await;

        let txid = send_xec(
            &identity,
            &store,
            &indexer,
            &config,
            &[Recipient { address: recipient.address.clone(), value_sats: 10_000 }],
            None,
        )
        .await
        .unwrap();

        assert_eq!(txid, "feedface");
        assert_eq!(indexer.invalidated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_xec_with_no_pure_utxos_errors() {
        let recipient = Identity::from_private_key_bytes([0x44u8; 32], Network::Mainnet).unwrap();
        let config = WalletConfig::default();
        let (identity, indexer, store) = setup(vec![]).await;

        let err = send_xec(
            &identity,
            &store,
            &indexer,
            &config,
            &[Recipient { address: recipient.address.clone(), value_sats: 10_000 }],
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, WalletError::NoPureXecUtxos));
    }

    #[tokio::test]
    async fn send_all_xec_sweeps_minus_fee() {
        let sender = Identity::from_private_key_bytes([0x33u8; 32], Network::Mainnet).unwrap();
        let recipient = Identity::from_private_key_bytes([0x44u8; 32], Network::Mainnet).unwrap();
        let config = WalletConfig::default();
        let (identity, indexer, store) = setup(vec![pure_utxo(&sender, 100_000)]).await;

        let txid = send_all_xec(&identity, &store, &indexer, &config, &recipient.address)
            .await
            .unwrap();
        assert_eq!(txid, "feedface");
    }
}
