//! Transaction codec
//!
//! Bitcoin-style version-2 transaction serialization, P2PKH script
//! construction, OP_RETURN data outputs, and BIP143-style sighash signing
//! with SIGHASH_ALL | SIGHASH_FORKID (the BCH/XEC replay-protected sighash).

use crate::config::{DUST_LIMIT_SATS, MAX_OP_RETURN_BYTES};
use crate::crypto::sha256d;
use crate::error::{Result, WalletError};
use crate::keys::Identity;
use crate::types::Utxo;

const SIGHASH_ALL: u32 = 0x01;
const SIGHASH_FORKID: u32 = 0x40;
const SIGHASH_TYPE: u32 = SIGHASH_ALL | SIGHASH_FORKID;

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_RETURN: u8 = 0x6a;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;

const TX_VERSION: i32 = 2;
const SEQUENCE_FINAL: u32 = 0xffff_ffff;
const LOCKTIME_NONE: u32 = 0;

/// A transaction output about to be constructed.
#[derive(Debug, Clone)]
pub struct TxOutput {
    pub value_sats: u64,
    pub script_pubkey: Vec<u8>,
}

/// Build a standard P2PKH scriptPubKey: `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`.
pub fn p2pkh_script_pubkey(hash160: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(20);
    script.extend_from_slice(hash160);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

pub fn p2pkh_output(hash160: &[u8; 20], value_sats: u64) -> TxOutput {
    TxOutput { value_sats, script_pubkey: p2pkh_script_pubkey(hash160) }
}

/// Build an `OP_RETURN` output carrying one or more pushed data chunks
/// (used by plain data pushes and the SLP/ALP token engines alike).
/// Rejects payloads whose combined encoded script exceeds the 220-byte limit.
pub fn op_return_output(chunks: &[Vec<u8>]) -> Result<TxOutput> {
    let mut script = vec![OP_RETURN];
    for chunk in chunks {
        push_data(&mut script, chunk);
    }
    if script.len() > MAX_OP_RETURN_BYTES {
        return Err(WalletError::OversizeOpReturn(script.len()));
    }
    Ok(TxOutput { value_sats: 0, script_pubkey: script })
}

fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    let len = data.len();
    if len < OP_PUSHDATA1 as usize {
        script.push(len as u8);
    } else if len <= 0xff {
        script.push(OP_PUSHDATA1);
        script.push(len as u8);
    } else {
        script.push(OP_PUSHDATA2);
        script.extend_from_slice(&(len as u16).to_le_bytes());
    }
    script.extend_from_slice(data);
}

fn write_varint(buf: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(0xfe);
        buf.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        buf.push(0xff);
        buf.extend_from_slice(&n.to_le_bytes());
    }
}

/// Outpoints are serialized with the txid reversed to wire (little-endian)
/// byte order; `Utxo::outpoint.txid` is kept in display (big-endian hex) order.
fn serialize_outpoint(buf: &mut Vec<u8>, utxo: &Utxo) {
    let mut txid_wire = utxo.outpoint.txid;
    txid_wire.reverse();
    buf.extend_from_slice(&txid_wire);
    buf.extend_from_slice(&utxo.outpoint.vout.to_le_bytes());
}

fn serialize_output(buf: &mut Vec<u8>, output: &TxOutput) {
    buf.extend_from_slice(&output.value_sats.to_le_bytes());
    write_varint(buf, output.script_pubkey.len() as u64);
    buf.extend_from_slice(&output.script_pubkey);
}

/// Build, sign, and serialize a transaction spending `inputs` to `outputs`.
///
/// Every input is signed with the same identity, under SIGHASH_ALL |
/// SIGHASH_FORKID against the BIP143-style preimage. Rejects any non-zero
/// output below the dust limit and any zero-value output that is not an
/// `OP_RETURN` data carrier.
pub fn build_and_sign_tx(identity: &Identity, inputs: &[Utxo], outputs: &[TxOutput]) -> Result<Vec<u8>> {
    if inputs.is_empty() {
        return Err(WalletError::invalid_input("transaction has no inputs"));
    }
    for output in outputs {
        let is_op_return = output.script_pubkey.first() == Some(&OP_RETURN);
        if output.value_sats == 0 && !is_op_return {
            return Err(WalletError::invalid_input("zero-value non-data output"));
        }
        if output.value_sats > 0 && output.value_sats < DUST_LIMIT_SATS {
            return Err(WalletError::DustOutput(output.value_sats));
        }
    }

    let mut prevouts = Vec::with_capacity(inputs.len() * 36);
    for utxo in inputs {
        serialize_outpoint(&mut prevouts, utxo);
    }
    let hash_prevouts = sha256d(&prevouts);

    let mut sequences = Vec::with_capacity(inputs.len() * 4);
    for _ in inputs {
        sequences.extend_from_slice(&SEQUENCE_FINAL.to_le_bytes());
    }
    let hash_sequence = sha256d(&sequences);

    let mut outs_buf = Vec::new();
    write_varint(&mut outs_buf, outputs.len() as u64);
    for output in outputs {
        serialize_output(&mut outs_buf, output);
    }
    let hash_outputs = sha256d(&outs_buf);

    let mut signatures = Vec::with_capacity(inputs.len());
    for utxo in inputs {
        let script_code = &utxo.script_pubkey;

        let mut preimage = Vec::new();
        preimage.extend_from_slice(&TX_VERSION.to_le_bytes());
        preimage.extend_from_slice(&hash_prevouts);
        preimage.extend_from_slice(&hash_sequence);
        serialize_outpoint(&mut preimage, utxo);
        write_varint(&mut preimage, script_code.len() as u64);
        preimage.extend_from_slice(script_code);
        preimage.extend_from_slice(&utxo.value_sats.to_le_bytes());
        preimage.extend_from_slice(&SEQUENCE_FINAL.to_le_bytes());
        preimage.extend_from_slice(&hash_outputs);
        preimage.extend_from_slice(&LOCKTIME_NONE.to_le_bytes());
        preimage.extend_from_slice(&SIGHASH_TYPE.to_le_bytes());

        let digest = sha256d(&preimage);
        let signature = identity.sign(&digest)?;
        let mut der = signature.serialize_der().to_vec();
        der.push(SIGHASH_TYPE as u8);
        signatures.push(der);
    }

    let mut tx = Vec::new();
    tx.extend_from_slice(&TX_VERSION.to_le_bytes());
    write_varint(&mut tx, inputs.len() as u64);
    for (utxo, sig) in inputs.iter().zip(signatures.iter()) {
        serialize_outpoint(&mut tx, utxo);
        let mut script_sig = Vec::new();
        push_data(&mut script_sig, sig);
        push_data(&mut script_sig, &identity.public_key);
        write_varint(&mut tx, script_sig.len() as u64);
        tx.extend_from_slice(&script_sig);
        tx.extend_from_slice(&SEQUENCE_FINAL.to_le_bytes());
    }
    write_varint(&mut tx, outputs.len() as u64);
    for output in outputs {
        serialize_output(&mut tx, output);
    }
    tx.extend_from_slice(&LOCKTIME_NONE.to_le_bytes());

    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::types::Outpoint;

    fn funded_identity() -> Identity {
        Identity::from_private_key_bytes([0x11u8; 32], Network::Mainnet).unwrap()
    }

    fn funding_utxo(identity: &Identity, value_sats: u64) -> Utxo {
        Utxo {
            outpoint: Outpoint { txid: [0x22u8; 32], vout: 0 },
            block_height: 800_000,
            is_coinbase: false,
            value_sats,
            script_pubkey: p2pkh_script_pubkey(&identity.hash160),
            token: None,
        }
    }

    #[test]
    fn builds_and_signs_a_simple_payment() {
        let identity = funded_identity();
        let input = funding_utxo(&identity, 100_000);
        let output = p2pkh_output(&identity.hash160, 50_000);
        let change = p2pkh_output(&identity.hash160, 49_000);

        let raw = build_and_sign_tx(&identity, &[input], &[output, change]).unwrap();
        assert!(!raw.is_empty());
        assert_eq!(&raw[0..4], &TX_VERSION.to_le_bytes());
    }

    #[test]
    fn op_return_carries_memo_with_known_prefix() {
        let prefix = hex::decode("6d02").unwrap();
        let message = b"hello".to_vec();
        let output = op_return_output(&[prefix, message]).unwrap();
        assert_eq!(output.value_sats, 0);
        assert_eq!(output.script_pubkey[0], OP_RETURN);
    }

    #[test]
    fn oversize_op_return_is_rejected() {
        let big_chunk = vec![0u8; 230];
        let err = op_return_output(&[big_chunk]).unwrap_err();
        assert!(matches!(err, WalletError::OversizeOpReturn(_)));
    }

    #[test]
    fn dust_output_is_rejected() {
        let identity = funded_identity();
        let input = funding_utxo(&identity, 100_000);
        let dust_output = p2pkh_output(&identity.hash160, 200);

        let err = build_and_sign_tx(&identity, &[input], &[dust_output]).unwrap_err();
        assert!(matches!(err, WalletError::DustOutput(200)));
    }

    #[test]
    fn no_inputs_is_rejected() {
        let identity = funded_identity();
        let output = p2pkh_output(&identity.hash160, 50_000);
        let err = build_and_sign_tx(&identity, &[], &[output]).unwrap_err();
        assert!(matches!(err, WalletError::InvalidInput(_)));
    }
}
