//! Cryptographic primitives
//!
//! secp256k1 scalar/pubkey operations, HASH160, double-SHA256, Base58Check,
//! CashAddr encode/decode for the `ecash` HRP, and the PBKDF2/AES-CBC
//! primitives backing the mnemonic encryption envelope. Everything that
//! touches a private key scalar is delegated to `secp256k1`, which is
//! constant-time for scalar operations.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{Result, WalletError};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha512 = Hmac<Sha512>;

/// SHA256(SHA256(x)).
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let once = Sha256::digest(data);
    let twice = Sha256::digest(once);
    twice.into()
}

/// RIPEMD160(SHA256(x)), the Bitcoin-style "HASH160".
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripe = Ripemd160::digest(sha);
    ripe.into()
}

/// HMAC-SHA512, used for BIP32 master key and child key derivation.
pub fn hmac_sha512(key: &[u8], data: &[u8]) -> [u8; 64] {
    let mut mac = HmacSha512::new_from_slice(key).expect("HMAC accepts a key of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// PBKDF2-HMAC-SHA256, used for the mnemonic encryption envelope's KDF.
pub fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32, out_len: usize) -> Vec<u8> {
    let mut out = vec![0u8; out_len];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    out
}

/// AES-256-CBC encrypt with PKCS7 padding.
pub fn aes256_cbc_encrypt(key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    Aes256CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// AES-256-CBC decrypt with PKCS7 padding. Fails (wrong key/corrupt data) as
/// `WrongPassword` since this primitive is only ever used to decrypt the
/// mnemonic envelope.
pub fn aes256_cbc_decrypt(key: &[u8; 32], iv: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>> {
    Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| WalletError::WrongPassword)
}

/// Base58Check encode: payload ∥ first 4 bytes of `sha256d(payload)`.
pub fn base58check_encode(payload: &[u8]) -> String {
    let checksum = sha256d(payload);
    let mut buf = Vec::with_capacity(payload.len() + 4);
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&checksum[..4]);
    bs58::encode(buf).into_string()
}

/// Base58Check decode, validating the checksum. Returns the payload with
/// the checksum stripped.
pub fn base58check_decode(s: &str) -> Result<Vec<u8>> {
    let data = bs58::decode(s)
        .into_vec()
        .map_err(|e| WalletError::invalid_input(format!("invalid base58: {e}")))?;
    if data.len() < 4 {
        return Err(WalletError::invalid_input("base58check payload too short"));
    }
    let (payload, checksum) = data.split_at(data.len() - 4);
    let expected = sha256d(payload);
    if expected[..4] != *checksum {
        return Err(WalletError::invalid_input("base58check checksum mismatch"));
    }
    Ok(payload.to_vec())
}

pub mod cashaddr {
    //! CashAddr encode/decode for the `ecash` HRP with P2PKH/P2SH type tags.
    //!
    //! Implements the BCH CashAddr specification directly (no crate in this
    //! corpus implements it); the checksum polymod and charset are the public
    //! BCH specification, not invented behavior.

    use crate::error::{Result, WalletError};

    const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

    /// CashAddr type tag (occupies the top bits of the version byte).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum AddressType {
        P2pkh,
        P2sh,
    }

    impl AddressType {
        fn bits(self) -> u8 {
            match self {
                AddressType::P2pkh => 0,
                AddressType::P2sh => 1,
            }
        }

        fn from_bits(bits: u8) -> Result<Self> {
            match bits {
                0 => Ok(AddressType::P2pkh),
                1 => Ok(AddressType::P2sh),
                other => Err(WalletError::invalid_input(format!(
                    "unsupported cashaddr type tag {other}"
                ))),
            }
        }
    }

    fn polymod(values: &[u8]) -> u64 {
        let mut c: u64 = 1;
        for &d in values {
            let c0 = (c >> 35) as u8;
            c = ((c & 0x07ff_ffff_ff) << 5) ^ (d as u64);
            if c0 & 0x01 != 0 {
                c ^= 0x98f2bc8e61;
            }
            if c0 & 0x02 != 0 {
                c ^= 0x79b76d99e2;
            }
            if c0 & 0x04 != 0 {
                c ^= 0xf33e5fb3c4;
            }
            if c0 & 0x08 != 0 {
                c ^= 0xae2eabe2a8;
            }
            if c0 & 0x10 != 0 {
                c ^= 0x1e4f43e470;
            }
        }
        c ^ 1
    }

    fn prefix_expand(prefix: &str) -> Vec<u8> {
        let mut v: Vec<u8> = prefix.bytes().map(|b| b & 0x1f).collect();
        v.push(0);
        v
    }

    fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Result<Vec<u8>> {
        let mut acc: u32 = 0;
        let mut bits: u32 = 0;
        let mut out = Vec::new();
        let maxv = (1u32 << to) - 1;
        for &value in data {
            acc = (acc << from) | value as u32;
            bits += from;
            while bits >= to {
                bits -= to;
                out.push(((acc >> bits) & maxv) as u8);
            }
        }
        if pad {
            if bits > 0 {
                out.push(((acc << (to - bits)) & maxv) as u8);
            }
        } else if bits >= from || ((acc << (to - bits)) & maxv) != 0 {
            return Err(WalletError::invalid_input("cashaddr padding invalid"));
        }
        Ok(out)
    }

    /// Size-bit encoding for a 20-byte hash (P2PKH/P2SH, the only sizes this
    /// wallet produces).
    fn size_bits_for_len(len: usize) -> Result<u8> {
        match len {
            20 => Ok(0),
            24 => Ok(1),
            28 => Ok(2),
            32 => Ok(3),
            40 => Ok(4),
            48 => Ok(5),
            56 => Ok(6),
            64 => Ok(7),
            other => Err(WalletError::invalid_input(format!(
                "unsupported cashaddr hash length {other}"
            ))),
        }
    }

    fn len_for_size_bits(bits: u8) -> Result<usize> {
        match bits {
            0 => Ok(20),
            1 => Ok(24),
            2 => Ok(28),
            3 => Ok(32),
            4 => Ok(40),
            5 => Ok(48),
            6 => Ok(56),
            7 => Ok(64),
            other => Err(WalletError::invalid_input(format!(
                "unsupported cashaddr size bits {other}"
            ))),
        }
    }

    /// Encode a hash into a CashAddr string with the given HRP and type.
    pub fn encode(hrp: &str, addr_type: AddressType, hash: &[u8]) -> Result<String> {
        let version_byte = (addr_type.bits() << 3) | size_bits_for_len(hash.len())?;
        let mut payload = Vec::with_capacity(1 + hash.len());
        payload.push(version_byte);
        payload.extend_from_slice(hash);

        let payload_5bit = convert_bits(&payload, 8, 5, true)?;

        let mut checksum_input = prefix_expand(hrp);
        checksum_input.extend_from_slice(&payload_5bit);
        checksum_input.extend_from_slice(&[0u8; 8]);
        let checksum = polymod(&checksum_input);

        let mut body = String::with_capacity(payload_5bit.len() + 8);
        for &b in &payload_5bit {
            body.push(CHARSET[b as usize] as char);
        }
        for i in (0..8).rev() {
            let c = ((checksum >> (i * 5)) & 0x1f) as usize;
            body.push(CHARSET[c] as char);
        }

        Ok(format!("{hrp}:{body}"))
    }

    /// Decode a CashAddr string, normalizing an `etoken:` HRP to `ecash`.
    /// Returns `(hrp, type, hash)`. The checksum is always validated; there
    /// is no substring-matching fallback.
    pub fn decode(addr: &str) -> Result<(String, AddressType, Vec<u8>)> {
        let lower = addr.to_ascii_lowercase();
        if lower != addr && addr.to_ascii_uppercase() != addr {
            return Err(WalletError::invalid_input("mixed-case cashaddr"));
        }

        let (hrp, body) = match lower.split_once(':') {
            Some((h, b)) => (h.to_string(), b.to_string()),
            None => ("ecash".to_string(), lower.clone()),
        };

        let mut values = Vec::with_capacity(body.len());
        for c in body.chars() {
            let pos = CHARSET
                .iter()
                .position(|&x| x as char == c)
                .ok_or_else(|| WalletError::invalid_input("invalid cashaddr character"))?;
            values.push(pos as u8);
        }
        if values.len() < 8 {
            return Err(WalletError::invalid_input("cashaddr too short"));
        }

        let mut checksum_input = prefix_expand(&hrp);
        checksum_input.extend_from_slice(&values);
        if polymod(&checksum_input) != 0 {
            return Err(WalletError::invalid_input("cashaddr checksum mismatch"));
        }

        let payload_5bit = &values[..values.len() - 8];
        let payload = convert_bits(payload_5bit, 5, 8, false)?;
        let version_byte = payload[0];
        let hash = payload[1..].to_vec();

        let expected_len = len_for_size_bits(version_byte & 0x07)?;
        if hash.len() != expected_len {
            return Err(WalletError::invalid_input("cashaddr length mismatch"));
        }
        let addr_type = AddressType::from_bits(version_byte >> 3)?;

        let normalized_hrp = if hrp == "etoken" { "ecash".to_string() } else { hrp };

        Ok((normalized_hrp, addr_type, hash))
    }

}
