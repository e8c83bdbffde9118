//! SLP (Simple Ledger Protocol) OP_RETURN payload encoding.
//!
//! Each field is pushed as its own script element; `txcodec::op_return_output`
//! applies the minimal-pushdata framing.

use crate::error::{Result, WalletError};

const LOKAD_ID: &[u8; 4] = b"SLP\0";
const TOKEN_TYPE_VERSION: u8 = 0x01;

fn encode_amount(amount_atoms: u128) -> Result<Vec<u8>> {
    if amount_atoms > u64::MAX as u128 {
        return Err(WalletError::invalid_input("SLP atom amount exceeds 8-byte range"));
    }
    Ok((amount_atoms as u64).to_be_bytes().to_vec())
}

/// Build the chunk list for a SEND transaction: one amount per output, in
/// output order (recipients, then token change last).
pub fn send_chunks(token_id: &[u8; 32], amounts_atoms: &[u128]) -> Result<Vec<Vec<u8>>> {
    let mut chunks = vec![
        LOKAD_ID.to_vec(),
        vec![TOKEN_TYPE_VERSION],
        b"SEND".to_vec(),
        token_id.to_vec(),
    ];
    for amount in amounts_atoms {
        chunks.push(encode_amount(*amount)?);
    }
    Ok(chunks)
}

/// Build the chunk list for a BURN transaction: a single amount being burned.
pub fn burn_chunks(token_id: &[u8; 32], amount_atoms: u128) -> Result<Vec<Vec<u8>>> {
    Ok(vec![
        LOKAD_ID.to_vec(),
        vec![TOKEN_TYPE_VERSION],
        b"BURN".to_vec(),
        token_id.to_vec(),
        encode_amount(amount_atoms)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_chunks_has_lokad_and_amounts_in_order() {
        let token_id = [0x11u8; 32];
        let chunks = send_chunks(&token_id, &[6, 4]).unwrap();
        assert_eq!(chunks[0], LOKAD_ID.to_vec());
        assert_eq!(chunks[2], b"SEND".to_vec());
        assert_eq!(chunks[3], token_id.to_vec());
        assert_eq!(chunks[4], 6u64.to_be_bytes().to_vec());
        assert_eq!(chunks[5], 4u64.to_be_bytes().to_vec());
    }

    #[test]
    fn burn_chunks_carries_single_amount() {
        let token_id = [0x22u8; 32];
        let chunks = burn_chunks(&token_id, 10).unwrap();
        assert_eq!(chunks[2], b"BURN".to_vec());
        assert_eq!(chunks[4], 10u64.to_be_bytes().to_vec());
    }

    #[test]
    fn rejects_amount_above_u64_range() {
        let token_id = [0x33u8; 32];
        let err = send_chunks(&token_id, &[u128::MAX]).unwrap_err();
        assert!(matches!(err, WalletError::InvalidInput(_)));
    }
}
