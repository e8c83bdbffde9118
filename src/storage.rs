//! Mnemonic encryption envelope
//!
//! Encrypts/decrypts a mnemonic phrase for callers who want to persist it
//! themselves. The core library never touches a filesystem path; it only
//! produces and consumes the envelope value. The new envelope format is a
//! self-describing JSON structure; decryption also accepts the legacy raw
//! CryptoJS OpenSSL format (`Salted__` + 8-byte salt, base64-encoded with the
//! well-known `U2FsdGVkX1` prefix) so existing wallets keep working.

use base64::Engine;
use md5::{Digest, Md5};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::error::{Result, WalletError};

const PBKDF2_ITERATIONS: u32 = 10_000;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const SALT_LEN: usize = 32;

const LEGACY_MAGIC: &[u8; 8] = b"Salted__";

/// A self-describing mnemonic encryption envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MnemonicEnvelope {
    /// Hex-encoded PBKDF2 salt.
    pub salt: String,
    /// Hex-encoded AES-CBC IV.
    pub iv: String,
    /// Base64-encoded ciphertext.
    pub encrypted: String,
}

/// Encrypt `mnemonic` under `password`, producing a fresh envelope with a
/// random salt and IV.
pub fn encrypt_mnemonic(mnemonic: &str, password: &str) -> MnemonicEnvelope {
    let mut salt = vec![0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let key = derive_key(password.as_bytes(), &salt);
    let ciphertext = crypto::aes256_cbc_encrypt(&key, &iv, mnemonic.as_bytes());

    MnemonicEnvelope {
        salt: hex::encode(salt),
        iv: hex::encode(iv),
        encrypted: base64::engine::general_purpose::STANDARD.encode(ciphertext),
    }
}

/// Decrypt a new-format envelope.
pub fn decrypt_mnemonic(envelope: &MnemonicEnvelope, password: &str) -> Result<String> {
    let salt = hex::decode(&envelope.salt)
        .map_err(|e| WalletError::invalid_input(format!("invalid envelope salt: {e}")))?;
    let iv_bytes = hex::decode(&envelope.iv)
        .map_err(|e| WalletError::invalid_input(format!("invalid envelope iv: {e}")))?;
    let iv: [u8; IV_LEN] = iv_bytes
        .try_into()
        .map_err(|_| WalletError::invalid_input("envelope iv must be 16 bytes"))?;
    let ciphertext = base64::engine::general_purpose::STANDARD
        .decode(&envelope.encrypted)
        .map_err(|e| WalletError::invalid_input(format!("invalid envelope ciphertext: {e}")))?;

    let key = derive_key(password.as_bytes(), &salt);
    let plaintext = crypto::aes256_cbc_decrypt(&key, &iv, &ciphertext)?;
    String::from_utf8(plaintext).map_err(|_| WalletError::WrongPassword)
}

/// Decrypt a legacy raw CryptoJS OpenSSL-format ciphertext (base64, carrying
/// the `Salted__` + salt prefix before the ciphertext body).
pub fn decrypt_legacy_mnemonic(raw_base64: &str, password: &str) -> Result<String> {
    let data = base64::engine::general_purpose::STANDARD
        .decode(raw_base64.trim())
        .map_err(|e| WalletError::invalid_input(format!("invalid legacy ciphertext: {e}")))?;
    if data.len() < 16 || &data[..8] != LEGACY_MAGIC {
        return Err(WalletError::invalid_input("not a legacy CryptoJS envelope"));
    }
    let salt = &data[8..16];
    let ciphertext = &data[16..];

    let (key, iv) = evp_bytes_to_key(password.as_bytes(), salt);
    let plaintext = crypto::aes256_cbc_decrypt(&key, &iv, ciphertext)?;
    String::from_utf8(plaintext).map_err(|_| WalletError::WrongPassword)
}

/// Decrypt either format, detecting the legacy form by its `U2FsdGVkX1`
/// base64 prefix and the new form by its JSON object shape.
pub fn decrypt_any(raw: &str, password: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        let envelope: MnemonicEnvelope = serde_json::from_str(trimmed)
            .map_err(|e| WalletError::invalid_input(format!("invalid envelope json: {e}")))?;
        decrypt_mnemonic(&envelope, password)
    } else {
        decrypt_legacy_mnemonic(trimmed, password)
    }
}

fn derive_key(password: &[u8], salt: &[u8]) -> [u8; KEY_LEN] {
    let derived = crypto::pbkdf2_sha256(password, salt, PBKDF2_ITERATIONS, KEY_LEN);
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&derived);
    key
}

/// OpenSSL's legacy EVP_BytesToKey with MD5, one digest round per 16 bytes
/// of output, as used by CryptoJS's default `AES.encrypt(str, password)`.
fn evp_bytes_to_key(password: &[u8], salt: &[u8]) -> ([u8; KEY_LEN], [u8; IV_LEN]) {
    let mut derived = Vec::with_capacity(KEY_LEN + IV_LEN);
    let mut prev: Vec<u8> = Vec::new();
    while derived.len() < KEY_LEN + IV_LEN {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(password);
        hasher.update(salt);
        let digest = hasher.finalize();
        prev = digest.to_vec();
        derived.extend_from_slice(&digest);
    }
    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    key.copy_from_slice(&derived[..KEY_LEN]);
    iv.copy_from_slice(&derived[KEY_LEN..KEY_LEN + IV_LEN]);
    (key, iv)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn round_trips_new_envelope() {
        let envelope = encrypt_mnemonic(TEST_MNEMONIC, "hunter2");
        let decrypted = decrypt_mnemonic(&envelope, "hunter2").unwrap();
        assert_eq!(decrypted, TEST_MNEMONIC);
    }

    #[test]
    fn wrong_password_fails() {
        let envelope = encrypt_mnemonic(TEST_MNEMONIC, "hunter2");
        assert!(decrypt_mnemonic(&envelope, "wrong").is_err());
    }

    #[test]
    fn decrypt_any_accepts_json_envelope() {
        let envelope = encrypt_mnemonic(TEST_MNEMONIC, "hunter2");
        let json = serde_json::to_string(&envelope).unwrap();
        let decrypted = decrypt_any(&json, "hunter2").unwrap();
        assert_eq!(decrypted, TEST_MNEMONIC);
    }

    /// A legacy CryptoJS-compatible envelope, built by hand with
    /// `evp_bytes_to_key` and compared against the known `Salted__` layout
    /// that `CryptoJS.AES.encrypt(mnemonic, password).toString()` produces.
    #[test]
    fn decrypts_legacy_cryptojs_envelope() {
        let salt = [0x5au8; 8];
        let (key, iv) = evp_bytes_to_key(b"hunter2", &salt);
        let ciphertext = crypto::aes256_cbc_encrypt(&key, &iv, TEST_MNEMONIC.as_bytes());

        let mut raw = Vec::new();
        raw.extend_from_slice(LEGACY_MAGIC);
        raw.extend_from_slice(&salt);
        raw.extend_from_slice(&ciphertext);
        let encoded = base64::engine::general_purpose::STANDARD.encode(&raw);
        assert!(encoded.starts_with("U2FsdGVkX1"));

        let decrypted = decrypt_legacy_mnemonic(&encoded, "hunter2").unwrap();
        assert_eq!(decrypted, TEST_MNEMONIC);

        let via_dispatch = decrypt_any(&encoded, "hunter2").unwrap();
        assert_eq!(via_dispatch, TEST_MNEMONIC);
    }

    #[test]
    fn rejects_non_legacy_garbage() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"not a cryptojs envelope");
        assert!(decrypt_legacy_mnemonic(&encoded, "hunter2").is_err());
    }
}
