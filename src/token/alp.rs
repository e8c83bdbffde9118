//! ALP (eMPP-wrapped token protocol) payload encoding.
//!
//! An ALP transaction's data output is an eMPP container: `OP_RETURN` plus
//! an outer push prefix `0x50`, followed by one push per section. Each
//! section carries its own LOKAD id, so multiple ALP sections can share a
//! single eMPP container.

use crate::error::{Result, WalletError};
use crate::txcodec::{self, TxOutput};

const LOKAD_ID: &[u8; 4] = b"SLP2";
const SEND_TYPE: u8 = 0x00;
const BURN_TYPE: u8 = 0x02;
const EMPP_PREFIX: u8 = 0x50;

fn encode_amount(amount_atoms: u128) -> Result<[u8; 6]> {
    const MAX_LE48: u128 = 0xffff_ffff_ffff;
    if amount_atoms > MAX_LE48 {
        return Err(WalletError::invalid_input("ALP atom amount exceeds 6-byte range"));
    }
    let full = (amount_atoms as u64).to_le_bytes();
    let mut out = [0u8; 6];
    out.copy_from_slice(&full[..6]);
    Ok(out)
}

/// Build one ALP SEND section for `token_id`.
pub fn send_section(token_id: &[u8; 32], amounts_atoms: &[u128]) -> Result<Vec<u8>> {
    let mut section = Vec::with_capacity(4 + 1 + 32 + amounts_atoms.len() * 6);
    section.extend_from_slice(LOKAD_ID);
    section.push(SEND_TYPE);
    section.extend_from_slice(token_id);
    for amount in amounts_atoms {
        section.extend_from_slice(&encode_amount(*amount)?);
    }
    Ok(section)
}

/// Build one ALP BURN section for `token_id`.
pub fn burn_section(token_id: &[u8; 32], amount_atoms: u128) -> Result<Vec<u8>> {
    let mut section = Vec::with_capacity(4 + 1 + 32 + 6);
    section.extend_from_slice(LOKAD_ID);
    section.push(BURN_TYPE);
    section.extend_from_slice(token_id);
    section.extend_from_slice(&encode_amount(amount_atoms)?);
    Ok(section)
}

/// Wrap one or more ALP sections in a single eMPP `OP_RETURN` output.
pub fn empp_output(sections: &[Vec<u8>]) -> Result<TxOutput> {
    let mut chunks = vec![vec![EMPP_PREFIX]];
    chunks.extend(sections.iter().cloned());
    txcodec::op_return_output(&chunks)
}
