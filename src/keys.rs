//! Key and identity derivation
//!
//! BIP39 mnemonic -> seed -> BIP32 hierarchical keys -> secp256k1 keypair ->
//! P2PKH CashAddr on XEC (coin type 899). Also WIF import/export.

use bip39::{Language, Mnemonic, MnemonicType, Seed};
use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use zeroize::Zeroizing;

use crate::config::Network;
use crate::crypto::{self, cashaddr};
use crate::error::{Result, WalletError};
use crate::secmem::LockedRegion;

/// Default XEC derivation path (coin type 899, account/change/index 0).
pub const DEFAULT_XEC_PATH: &str = "m/44'/899'/0'/0/0";

const BIP32_SEED_KEY: &[u8] = b"Bitcoin seed";

/// A derived spending identity: private key, public key, HASH160, and the
/// CashAddr address, plus the mnemonic that produced it (if any).
///
/// Never mutated after construction. The private key buffer is `mlock`ed
/// where supported and zeroized on drop.
pub struct Identity {
    mnemonic: Option<Zeroizing<String>>,
    path: String,
    private_key: Zeroizing<[u8; 32]>,
    pub public_key: [u8; 33],
    pub hash160: [u8; 20],
    pub address: String,
    pub network: Network,
    _lock: LockedRegion,
}

impl Identity {
    fn from_scalar(
        mnemonic: Option<String>,
        path: String,
        key_bytes: [u8; 32],
        network: Network,
    ) -> Result<Self> {
        let secp = Secp256k1::new();
        let secret_key = SecretKey::from_slice(&key_bytes)
            .map_err(|e| WalletError::invalid_input(format!("invalid private key: {e}")))?;
        let public_key = PublicKey::from_secret_key(&secp, &secret_key).serialize();
        let hash160 = crypto::hash160(&public_key);
        let address = cashaddr::encode("ecash", cashaddr::AddressType::P2pkh, &hash160)?;

        let private_key = Zeroizing::new(key_bytes);
        // SAFETY: the pointer is valid for the lifetime of `private_key`,
        // which this LockedRegion is stored alongside and dropped with.
        let lock = unsafe {
            LockedRegion::new(
                std::ptr::NonNull::new(private_key.as_ptr() as *mut u8).unwrap(),
                private_key.len(),
            )
        };

        Ok(Self {
            mnemonic: mnemonic.map(Zeroizing::new),
            path,
            private_key,
            public_key,
            hash160,
            address,
            network,
            _lock: lock,
        })
    }

    /// Generate a brand-new mnemonic (12 or 24 words) and derive the default
    /// XEC identity from it.
    pub fn generate(word_count: u8, network: Network) -> Result<Self> {
        let mnemonic_type = match word_count {
            12 => MnemonicType::Words12,
            24 => MnemonicType::Words24,
            other => {
                return Err(WalletError::invalid_input(format!(
                    "unsupported mnemonic word count {other}, expected 12 or 24"
                )))
            }
        };
        let mnemonic = Mnemonic::new(mnemonic_type, Language::English);
        Self::from_mnemonic(mnemonic.phrase(), "", DEFAULT_XEC_PATH, network)
    }

    /// Derive an identity from an existing mnemonic phrase, validating its
    /// wordlist membership and checksum.
    pub fn from_mnemonic(
        phrase: &str,
        passphrase: &str,
        path: &str,
        network: Network,
    ) -> Result<Self> {
        validate_mnemonic(phrase)?;
        let mnemonic = Mnemonic::from_phrase(phrase, Language::English)
            .map_err(|e| WalletError::invalid_input(format!("invalid mnemonic: {e}")))?;
        let seed = Seed::new(&mnemonic, passphrase);
        let key_bytes = derive_path(seed.as_bytes(), path)?;
        Self::from_scalar(Some(phrase.to_string()), path.to_string(), key_bytes, network)
    }

    /// Derive an identity directly from a raw 32-byte private key (no
    /// mnemonic).
    pub fn from_private_key_bytes(key_bytes: [u8; 32], network: Network) -> Result<Self> {
        Self::from_scalar(None, String::new(), key_bytes, network)
    }

    /// Import a WIF-encoded private key.
    pub fn from_wif(wif: &str) -> Result<Self> {
        let (key_bytes, _compressed, network) = decode_wif(wif)?;
        Self::from_scalar(None, String::new(), key_bytes, network)
    }

    /// Export this identity's private key as WIF (always compressed, since
    /// the public key was derived in compressed form).
    pub fn to_wif(&self) -> String {
        encode_wif(&self.private_key, true, self.network)
    }

    pub fn mnemonic(&self) -> Option<&str> {
        self.mnemonic.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Sign a 32-byte sighash preimage digest with this identity's key.
    pub(crate) fn sign(&self, msg_hash: &[u8; 32]) -> Result<secp256k1::ecdsa::Signature> {
        let secp = Secp256k1::new();
        let secret_key = SecretKey::from_slice(&self.private_key[..])
            .map_err(|e| WalletError::invalid_input(format!("invalid private key: {e}")))?;
        let message = secp256k1::Message::from_digest(*msg_hash);
        Ok(secp.sign_ecdsa(&message, &secret_key))
    }
}

/// Validate a mnemonic's wordlist membership and checksum without deriving
/// any keys from it.
pub fn validate_mnemonic(phrase: &str) -> Result<()> {
    Mnemonic::from_phrase(phrase, Language::English)
        .map(|_| ())
        .map_err(|e| WalletError::invalid_input(format!("invalid mnemonic: {e}")))
}

/// Parse a BIP32 path like `m/44'/899'/0'/0/0` into derivation steps.
fn parse_path(path: &str) -> Result<Vec<u32>> {
    let mut segments = path.split('/');
    match segments.next() {
        Some("m") => {}
        _ => return Err(WalletError::invalid_input("derivation path must start with 'm'")),
    }

    let mut steps = Vec::new();
    for segment in segments {
        let (number_str, hardened) = match segment.strip_suffix('\'') {
            Some(stripped) => (stripped, true),
            None => (segment, false),
        };
        let index: u32 = number_str
            .parse()
            .map_err(|_| WalletError::invalid_input(format!("invalid path segment '{segment}'")))?;
        if index >= 0x8000_0000 {
            return Err(WalletError::invalid_input("path index out of range"));
        }
        steps.push(if hardened { index | 0x8000_0000 } else { index });
    }
    Ok(steps)
}

/// Advance a derivation index to the next candidate on a failed tweak,
/// preserving the hardened bit and staying within the 31-bit index range.
fn next_index(index: u32, hardened: bool) -> Result<u32> {
    let local = index & 0x7fff_ffff;
    let next_local = local
        .checked_add(1)
        .filter(|&n| n <= 0x7fff_ffff)
        .ok_or_else(|| WalletError::invalid_input("exhausted derivation indices retrying BIP32 child key"))?;
    Ok(if hardened { next_local | 0x8000_0000 } else { next_local })
}

/// Derive the 32-byte private key at `path` from a BIP32 seed, retrying the
/// next index whenever an intermediate scalar falls outside `[1, n-1]`.
fn derive_path(seed: &[u8], path: &str) -> Result<[u8; 32]> {
    let steps = parse_path(path)?;

    let master = crypto::hmac_sha512(BIP32_SEED_KEY, seed);
    let mut key: [u8; 32] = master[..32].try_into().unwrap();
    let mut chain_code: [u8; 32] = master[32..].try_into().unwrap();

    for &step in &steps {
        let hardened = step & 0x8000_0000 != 0;
        let mut index = step;
        loop {
            let mut data = Vec::with_capacity(37);
            if hardened {
                data.push(0u8);
                data.extend_from_slice(&key);
            } else {
                let secp = Secp256k1::new();
                let secret_key = SecretKey::from_slice(&key)
                    .map_err(|e| WalletError::invalid_input(format!("invalid derived key: {e}")))?;
                let public_key = PublicKey::from_secret_key(&secp, &secret_key);
                data.extend_from_slice(&public_key.serialize());
            }
            data.extend_from_slice(&index.to_be_bytes());

            let i = crypto::hmac_sha512(&chain_code, &data);
            let il: [u8; 32] = i[..32].try_into().unwrap();
            let ir: [u8; 32] = i[32..].try_into().unwrap();

            let parent_key = SecretKey::from_slice(&key)
                .map_err(|e| WalletError::invalid_input(format!("invalid parent key: {e}")))?;
            let tweak = match Scalar::from_be_bytes(il) {
                Ok(t) => t,
                Err(_) => {
                    // IL >= curve order: BIP32 says try the next index
                    index = next_index(index, hardened)?;
                    continue;
                }
            };
            match parent_key.add_tweak(&tweak) {
                Ok(child) => {
                    key = child.secret_bytes();
                    chain_code = ir;
                    break;
                }
                Err(_) => {
                    // resulting scalar invalid: try the next index
                    index = next_index(index, hardened)?;
                    continue;
                }
            }
        }
    }

    Ok(key)
}

/// Encode a raw private key as WIF.
pub fn encode_wif(key: &[u8; 32], compressed: bool, network: Network) -> String {
    let mut payload = Vec::with_capacity(34);
    payload.push(network.wif_version_byte());
    payload.extend_from_slice(key);
    if compressed {
        payload.push(0x01);
    }
    crypto::base58check_encode(&payload)
}

/// Decode a WIF-encoded private key, recovering the compression flag and
/// network.
pub fn decode_wif(wif: &str) -> Result<([u8; 32], bool, Network)> {
    let payload = crypto::base58check_decode(wif)?;
    if payload.is_empty() {
        return Err(WalletError::invalid_input("empty WIF payload"));
    }
    let network = match payload[0] {
        0x80 => Network::Mainnet,
        0xEF => Network::Testnet,
        other => {
            return Err(WalletError::invalid_input(format!(
                "unknown WIF network byte 0x{other:02x}"
            )))
        }
    };
    let rest = &payload[1..];
    let (key_bytes, compressed) = match rest.len() {
        33 if rest[32] == 0x01 => (&rest[..32], true),
        32 => (rest, false),
        _ => return Err(WalletError::invalid_input("invalid WIF payload length")),
    };
    let mut key = [0u8; 32];
    key.copy_from_slice(key_bytes);
    Ok((key, compressed, network))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC_12: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn deterministic_address_from_seed_mnemonic() {
        let identity =
            Identity::from_mnemonic(TEST_MNEMONIC_12, "", DEFAULT_XEC_PATH, Network::Mainnet)
                .unwrap();
        assert!(identity.address.starts_with("ecash:"));

        let again =
            Identity::from_mnemonic(TEST_MNEMONIC_12, "", DEFAULT_XEC_PATH, Network::Mainnet)
                .unwrap();
        assert_eq!(identity.address, again.address);
        assert_eq!(identity.public_key, again.public_key);
    }

    #[test]
    fn wif_round_trip_mainnet_compressed() {
        let key_hex = "1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
        let key_bytes: Vec<u8> = hex::decode(key_hex).unwrap();
        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);

        let wif = encode_wif(&key, true, Network::Mainnet);
        assert!(wif.starts_with('K') || wif.starts_with('L'));

        let (decoded_key, compressed, network) = decode_wif(&wif).unwrap();
        assert_eq!(decoded_key, key);
        assert!(compressed);
        assert_eq!(network, Network::Mainnet);
    }

    #[test]
    fn wif_round_trip_testnet_starts_with_c() {
        let key = [0x11u8; 32];
        let wif = encode_wif(&key, true, Network::Testnet);
        assert!(wif.starts_with('c'));
        let (decoded_key, compressed, network) = decode_wif(&wif).unwrap();
        assert_eq!(decoded_key, key);
        assert!(compressed);
        assert_eq!(network, Network::Testnet);
    }

    #[test]
    fn rejects_invalid_mnemonic() {
        let bad = "not a real bip39 mnemonic phrase at all nope";
        assert!(validate_mnemonic(bad).is_err());
    }

    #[test]
    fn rejects_bad_wif_checksum() {
        let mut wif = encode_wif(&[0x42u8; 32], true, Network::Mainnet);
        wif.push('1');
        assert!(decode_wif(&wif).is_err());
    }

    #[test]
    fn generate_produces_valid_mnemonic() {
        let identity = Identity::generate(12, Network::Mainnet).unwrap();
        let phrase = identity.mnemonic().unwrap().to_string();
        assert_eq!(phrase.split_whitespace().count(), 12);
        validate_mnemonic(&phrase).unwrap();
    }

    #[test]
    fn path_parsing_rejects_missing_m() {
        let seed = [0u8; 64];
        assert!(derive_path(&seed, "44'/899'/0'/0/0").is_err());
    }
}
