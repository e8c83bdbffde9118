//! Consolidation planner
//!
//! Decides whether merging fragmented pure-XEC UTXOs is worth the immediate
//! fee, batches them into capped-size groups, and executes each batch
//! through a narrow `XecSender` abstraction rather than the whole wallet
//! facade — this breaks the cyclic reference a direct facade dependency
//! would otherwise create.

use async_trait::async_trait;

use crate::coin_select;
use crate::config::{WalletConfig, DUST_LIMIT_SATS};
use crate::error::Result;
use crate::types::Utxo;

const ASSUMED_FUTURE_TX_COUNT: f64 = 2.0;
const P2PKH_INPUT_BYTES: f64 = 148.0;
const MIN_UTXO_COUNT_TO_CONSIDER: usize = 5;
const MIN_BELOW_THRESHOLD_TO_CONSIDER: usize = 5;

/// The narrow send capability the consolidation planner depends on.
#[async_trait]
pub trait XecSender: Send + Sync {
    /// Spend `inputs` back to this wallet's own address in a single
    /// transaction, returning the broadcast txid.
    async fn consolidate_batch(&self, inputs: &[Utxo]) -> Result<String>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeBands {
    pub dust: usize,
    pub small: usize,
    pub medium: usize,
    pub large: usize,
}

#[derive(Debug, Clone)]
pub struct ConsolidationAnalysis {
    pub utxo_count: usize,
    pub total_value_sats: u64,
    pub bands: SizeBands,
    pub should_consolidate: bool,
    pub projected_savings_sats: i64,
}

#[derive(Debug, Clone)]
pub struct ConsolidationBatch {
    pub inputs: Vec<Utxo>,
    pub total_input_sats: u64,
    pub projected_output_sats: u64,
    pub projected_fee_sats: u64,
}

#[derive(Debug, Clone)]
pub struct ConsolidationPlan {
    pub batches: Vec<ConsolidationBatch>,
}

fn record_band(bands: &mut SizeBands, value_sats: u64, threshold_sats: u64) {
    if value_sats < crate::config::DUST_LIMIT_SATS {
        bands.dust += 1;
    } else if value_sats < threshold_sats / 10 {
        bands.small += 1;
    } else if value_sats < threshold_sats {
        bands.medium += 1;
    } else {
        bands.large += 1;
    }
}

/// Inspect pure-XEC UTXOs and decide whether consolidating them now is
/// economically justified.
///
/// `should_consolidate` requires: at least 5 UTXOs total, at least 5 below
/// `config.consolidation_threshold_sats`, and a positive projected saving
/// over `config.max_consolidation_inputs`-sized batches.
pub fn analyze(utxos: &[Utxo], config: &WalletConfig) -> ConsolidationAnalysis {
    let utxo_count = utxos.len();
    let total_value_sats: u64 = utxos.iter().map(|u| u.value_sats).sum();

    let mut bands = SizeBands::default();
    let mut below_threshold = 0usize;
    for utxo in utxos {
        record_band(&mut bands, utxo.value_sats, config.consolidation_threshold_sats);
        if utxo.value_sats < config.consolidation_threshold_sats {
            below_threshold += 1;
        }
    }

    let n_before = utxo_count as u64;
    let max_inputs = config.max_consolidation_inputs.max(1) as u64;
    let n_after = if n_before == 0 { 0 } else { (n_before + max_inputs - 1) / max_inputs };

    let gross_savings_sats =
        (n_before.saturating_sub(n_after)) as f64 * P2PKH_INPUT_BYTES * config.sats_per_byte * ASSUMED_FUTURE_TX_COUNT;
    let consolidation_fee_sats = if n_before == 0 {
        0
    } else {
        coin_select::estimate_fee(utxo_count, n_after.max(1) as usize, config.sats_per_byte)
    };
    let projected_savings_sats = (gross_savings_sats - consolidation_fee_sats as f64) as i64;

    let should_consolidate = utxo_count >= MIN_UTXO_COUNT_TO_CONSIDER
        && below_threshold >= MIN_BELOW_THRESHOLD_TO_CONSIDER
        && projected_savings_sats > 0;

    ConsolidationAnalysis {
        utxo_count,
        total_value_sats,
        bands,
        should_consolidate,
        projected_savings_sats,
    }
}

/// Batch `utxos` (smallest first) into groups of at most
/// `config.max_consolidation_inputs`, each projected to merge into one
/// output. A batch whose projected output would be dust is dropped rather
/// than handed to `start`, which would otherwise build a rejected transaction.
pub fn plan(utxos: &[Utxo], config: &WalletConfig) -> ConsolidationPlan {
    let mut sorted: Vec<Utxo> = utxos.to_vec();
    sorted.sort_by(|a, b| a.value_sats.cmp(&b.value_sats));

    let max_inputs = config.max_consolidation_inputs.max(1);
    let batches = sorted
        .chunks(max_inputs)
        .map(|chunk| {
            let inputs = chunk.to_vec();
            let total_input_sats: u64 = inputs.iter().map(|u| u.value_sats).sum();
            let projected_fee_sats = coin_select::estimate_fee(inputs.len(), 1, config.sats_per_byte);
            let projected_output_sats = total_input_sats.saturating_sub(projected_fee_sats);
            ConsolidationBatch { inputs, total_input_sats, projected_output_sats, projected_fee_sats }
        })
        .filter(|batch| batch.projected_output_sats >= DUST_LIMIT_SATS)
        .collect();

    ConsolidationPlan { batches }
}

/// Execute every batch in `plan`, in order, via `sender`.
pub async fn start<S: XecSender>(plan: &ConsolidationPlan, sender: &S) -> Result<Vec<String>> {
    let mut txids = Vec::with_capacity(plan.batches.len());
    for batch in &plan.batches {
        let txid = sender.consolidate_batch(&batch.inputs).await?;
        txids.push(txid);
    }
    Ok(txids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Outpoint;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn utxo(value: u64) -> Utxo {
        Utxo {
            outpoint: Outpoint { txid: [3u8; 32], vout: 0 },
            block_height: 800_000,
            is_coinbase: false,
            value_sats: value,
            script_pubkey: vec![],
            token: None,
        }
    }

    #[test]
    fn fragmented_small_utxos_should_consolidate() {
        let config = WalletConfig::default();
        let utxos: Vec<Utxo> = (0..10).map(|_| utxo(1_000)).collect();
        let analysis = analyze(&utxos, &config);
        assert!(analysis.should_consolidate);
        assert_eq!(analysis.utxo_count, 10);
    }

    #[test]
    fn few_large_utxos_should_not_consolidate() {
        let config = WalletConfig::default();
        let utxos: Vec<Utxo> = (0..3).map(|_| utxo(10_000_000)).collect();
        let analysis = analyze(&utxos, &config);
        assert!(!analysis.should_consolidate);
    }

    #[test]
    fn exactly_two_hundred_utxos_is_one_batch() {
        let config = WalletConfig::default();
        let utxos: Vec<Utxo> = (0..200).map(|_| utxo(1_000)).collect();
        let plan = plan(&utxos, &config);
        assert_eq!(plan.batches.len(), 1);
        assert_eq!(plan.batches[0].inputs.len(), 200);
    }

    #[test]
    fn batch_netting_below_dust_limit_is_dropped_from_plan() {
        let config = WalletConfig::default();
        let utxos: Vec<Utxo> = (0..3).map(|_| utxo(100)).collect();
        let plan = plan(&utxos, &config);
        assert!(plan.batches.is_empty());
    }

    #[test]
    fn trailing_leftover_batch_dropped_while_full_batch_kept() {
        // 201 equal-value UTXOs split into a 200-input batch (economical) and a
        // single-input leftover batch (fee-dominated, nets below the dust limit).
        let config = WalletConfig::default();
        let utxos: Vec<Utxo> = (0..201).map(|_| utxo(300)).collect();
        let plan = plan(&utxos, &config);

        assert_eq!(plan.batches.len(), 1);
        assert_eq!(plan.batches[0].inputs.len(), 200);
        for batch in &plan.batches {
            assert!(batch.projected_output_sats >= DUST_LIMIT_SATS);
        }
    }

    #[test]
    fn two_hundred_and_one_utxos_splits_into_two_batches() {
        let config = WalletConfig::default();
        let utxos: Vec<Utxo> = (0..201).map(|_| utxo(1_000)).collect();
        let plan = plan(&utxos, &config);
        assert_eq!(plan.batches.len(), 2);
        assert_eq!(plan.batches[0].inputs.len(), 200);
        assert_eq!(plan.batches[1].inputs.len(), 1);
    }

    struct CountingSender {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl XecSender for CountingSender {
        async fn consolidate_batch(&self, _inputs: &[Utxo]) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("batch-{n}"))
        }
    }

    #[tokio::test]
    async fn start_executes_every_batch_in_order() {
        let config = WalletConfig::default();
        let utxos: Vec<Utxo> = (0..201).map(|_| utxo(1_000)).collect();
        let plan = plan(&utxos, &config);
        let sender = CountingSender { calls: AtomicUsize::new(0) };

        let txids = start(&plan, &sender).await.unwrap();
        assert_eq!(txids, vec!["batch-0".to_string(), "batch-1".to_string()]);
    }
}
