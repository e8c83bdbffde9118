//! Error taxonomy
//!
//! A single closed enum covers every failure kind the wallet can surface.
//! Variants carry structured context so callers match on kind rather than
//! sniffing substrings out of a message.

use displaydoc::Display;

/// Convenience alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, WalletError>;

/// All error kinds the wallet can return.
#[derive(Debug, Display)]
pub enum WalletError {
    /// invalid input: {0}
    InvalidInput(String),
    /// insufficient funds: need {needed} sats, have {available}
    InsufficientFunds { needed: u64, available: u64 },
    /// every UTXO in this wallet carries a token; consolidate pure-XEC funds first
    NoPureXecUtxos,
    /// insufficient token balance: need {needed} atoms, have {available}
    InsufficientTokenBalance { needed: u128, available: u128 },
    /// unknown token: {0}
    UnknownToken(String),
    /// token protocol mismatch: expected {expected}, found {found}
    ProtocolMismatch { expected: String, found: String },
    /// output value {0} sats is below the dust limit
    DustOutput(u64),
    /// OP_RETURN payload of {0} bytes exceeds the 220 byte limit
    OversizeOpReturn(usize),
    /// wrong password
    WrongPassword,
    /// network error: {0}
    NetworkError(String),
    /// broadcast rejected: {0}
    BroadcastRejected(String),
    /// wallet has not been initialized; call initialize() first
    NotInitialized,
}

impl std::error::Error for WalletError {
    // Every variant is built by flattening the originating crate error (secp256k1,
    // bip39, hex, base64, serde_json, bs58) to a String at the conversion site rather
    // than boxing it, so that sanitize() can redact secret-shaped substrings before
    // the error leaves the wallet facade. There is never a source to link to.
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl WalletError {
    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        WalletError::InvalidInput(msg.into())
    }
}

/// Elides secret-shaped substrings (long hex blobs, WIF keys, cashaddr bodies)
/// from a message before it is handed back to a caller.
pub fn sanitize(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for word in message.split_inclusive(char::is_whitespace) {
        let trimmed = word.trim();
        if looks_like_secret(trimmed) {
            out.push_str("<redacted>");
            let trailing: String = word.chars().skip(trimmed.len()).collect();
            out.push_str(&trailing);
        } else {
            out.push_str(word);
        }
    }
    out
}

fn looks_like_secret(token: &str) -> bool {
    if token.len() >= 64 && token.chars().all(|c| c.is_ascii_hexdigit()) {
        return true;
    }
    if is_wif_shaped(token) {
        return true;
    }
    if let Some(rest) = token.split(':').last() {
        if token.contains("ecash:") || token.contains("etoken:") {
            return rest.len() >= 20;
        }
    }
    false
}

fn is_wif_shaped(token: &str) -> bool {
    let first = match token.chars().next() {
        Some(c) => c,
        None => return false,
    };
    matches!(first, 'K' | 'L' | 'c')
        && token.len() >= 50
        && token.len() <= 53
        && token.chars().all(|c| c.is_ascii_alphanumeric())
}
