//! Coin selection
//!
//! Fee-aware greedy largest-first input selection with a smallest-single-UTXO
//! tie-break, and dust-into-fee absorption when the leftover change would be
//! unspendable.

use crate::config::DUST_LIMIT_SATS;
use crate::error::{Result, WalletError};
use crate::types::Utxo;

const P2PKH_INPUT_BYTES: u64 = 148;
const P2PKH_OUTPUT_BYTES: u64 = 34;
const BASE_TX_BYTES: u64 = 10;

/// `ceil((inputs·148 + outputs·34 + 10) · sats_per_byte)`.
pub fn estimate_fee(num_inputs: usize, num_outputs: usize, sats_per_byte: f64) -> u64 {
    let size_bytes = num_inputs as u64 * P2PKH_INPUT_BYTES
        + num_outputs as u64 * P2PKH_OUTPUT_BYTES
        + BASE_TX_BYTES;
    (size_bytes as f64 * sats_per_byte).ceil() as u64
}

#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub selected: Vec<Utxo>,
    pub total_input: u64,
    pub estimated_fee: u64,
    /// 0 when the leftover was absorbed into the fee instead of a change output.
    pub change: u64,
}

/// Select pure-XEC UTXOs covering `target_value` plus fees.
///
/// `base_output_count` is the number of non-change outputs the caller plans
/// to emit (recipients, and any zero-value data output); this function adds
/// one tentative change output to the fee estimate and drops it again if the
/// leftover would be dust.
pub fn select(
    target_value: u64,
    candidates: &[Utxo],
    sats_per_byte: f64,
    base_output_count: usize,
) -> Result<SelectionResult> {
    if candidates.is_empty() {
        return Err(WalletError::InsufficientFunds { needed: target_value, available: 0 });
    }

    let mut ascending: Vec<&Utxo> = candidates.iter().collect();
    ascending.sort_by(|a, b| a.value_sats.cmp(&b.value_sats));

    // Tie-break: the smallest single UTXO that alone covers target + fee.
    for utxo in &ascending {
        let fee_with_change = estimate_fee(1, base_output_count + 1, sats_per_byte);
        if utxo.value_sats >= target_value + fee_with_change {
            return Ok(finalize(vec![(*utxo).clone()], target_value, sats_per_byte, base_output_count));
        }
    }

    // Greedy largest-first accumulation.
    let mut descending = ascending;
    descending.reverse();

    let mut selected: Vec<Utxo> = Vec::new();
    let mut total_input: u64 = 0;
    for utxo in descending {
        selected.push(utxo.clone());
        total_input += utxo.value_sats;
        let fee = estimate_fee(selected.len(), base_output_count + 1, sats_per_byte);
        if total_input >= target_value + fee {
            return Ok(finalize(selected, target_value, sats_per_byte, base_output_count));
        }
    }

    let available: u64 = candidates.iter().map(|u| u.value_sats).sum();
    Err(WalletError::InsufficientFunds { needed: target_value, available })
}

fn finalize(
    selected: Vec<Utxo>,
    target_value: u64,
    sats_per_byte: f64,
    base_output_count: usize,
) -> SelectionResult {
    let total_input: u64 = selected.iter().map(|u| u.value_sats).sum();
    let fee_with_change = estimate_fee(selected.len(), base_output_count + 1, sats_per_byte);
    let change_with = total_input.saturating_sub(target_value).saturating_sub(fee_with_change);

    if change_with >= DUST_LIMIT_SATS {
        SelectionResult { selected, total_input, estimated_fee: fee_with_change, change: change_with }
    } else {
        let fee_without_change = estimate_fee(selected.len(), base_output_count, sats_per_byte);
        let fee = total_input.saturating_sub(target_value).max(fee_without_change);
        SelectionResult { selected, total_input, estimated_fee: fee, change: 0 }
    }
}
