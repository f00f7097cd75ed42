//! Password-based key derivation and AES-256-CBC helpers shared by the
//! text, JSON and legacy formats.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use rand::RngCore;
use sha1::Sha1;
use sha2::Sha256;

use crate::error::{Result, WalletError};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Fixed salt of the encrypted text export.
pub const TEXT_KDF_SALT: &[u8] = b"alpha_wallet_salt";
pub const TEXT_KDF_ITERATIONS: u32 = 100_000;

/// PBKDF2-HMAC-SHA1 key for the encrypted text export.
pub fn text_key(password: &str) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha1>(password.as_bytes(), TEXT_KDF_SALT, TEXT_KDF_ITERATIONS, &mut key);
    key
}

/// PBKDF2-HMAC-SHA256 key for JSON v1 encrypted sections.
pub fn json_key(password: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

pub fn aes256_cbc_encrypt(key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    Aes256CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Bad padding almost always means the wrong key, so it maps to
/// [`WalletError::WrongPassword`].
pub fn aes256_cbc_decrypt(key: &[u8; 32], iv: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
        return Err(WalletError::InvalidFormat(format!(
            "ciphertext length {} is not a positive multiple of 16",
            ciphertext.len()
        )));
    }
    Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| WalletError::WrongPassword)
}

/// `base64(IV || AES-256-CBC(plaintext))` with a fresh random IV.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> String {
    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut iv);
    let mut blob = iv.to_vec();
    blob.extend(aes256_cbc_encrypt(key, &iv, plaintext));
    encode_base64(&blob)
}

/// Inverse of [`seal`].
pub fn open(key: &[u8; 32], blob: &str) -> Result<Vec<u8>> {
    let raw = decode_base64(blob.trim())?;
    if raw.len() < 32 {
        return Err(WalletError::InvalidFormat("encrypted blob too short".into()));
    }
    let (iv, ciphertext) = raw.split_at(16);
    let mut iv_arr = [0u8; 16];
    iv_arr.copy_from_slice(iv);
    aes256_cbc_decrypt(key, &iv_arr, ciphertext)
}

pub fn random_salt() -> [u8; 16] {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

pub fn encode_base64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

pub fn decode_base64(value: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|e| WalletError::InvalidFormat(format!("base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pbkdf2_sha256_rfc_vector() {
        // RFC 7914 section 11, PBKDF2-HMAC-SHA256("passwd", "salt", 1), first 32 bytes.
        let key = json_key("passwd", b"salt", 1);
        assert_eq!(
            hex::encode(key),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
    }

    #[test]
    fn test_pbkdf2_sha1_rfc_vector() {
        // RFC 6070: PBKDF2-HMAC-SHA1("password", "salt", 2), 20 bytes.
        let mut out = [0u8; 20];
        pbkdf2::pbkdf2_hmac::<Sha1>(b"password", b"salt", 2, &mut out);
        assert_eq!(hex::encode(out), "ea6c014dc72d6f8ccd1ed92ace1d41f0d8de8957");
    }

    #[test]
    fn test_seal_open() {
        let key = [7u8; 32];
        let blob = seal(&key, b"secret material");
        assert_eq!(open(&key, &blob).unwrap(), b"secret material");
        assert_ne!(seal(&key, b"secret material"), blob);
    }

    #[test]
    fn test_wrong_key_is_wrong_password() {
        let blob = seal(&[7u8; 32], &[0x41; 64]);
        match open(&[8u8; 32], &blob) {
            Err(WalletError::WrongPassword) => {}
            Ok(plain) => assert_ne!(plain, vec![0x41; 64]),
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_aes_cbc_nist_vector() {
        // NIST SP 800-38A F.2.5, first block, no padding check.
        let key: [u8; 32] = hex::decode("603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4")
            .unwrap()
            .try_into()
            .unwrap();
        let iv: [u8; 16] = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap().try_into().unwrap();
        let pt = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();
        let ct = aes256_cbc_encrypt(&key, &iv, &pt);
        assert_eq!(hex::encode(&ct[..16]), "f58c4c04d6e5f1ba779eabfb5f7bfbd6");
        assert_eq!(aes256_cbc_decrypt(&key, &iv, &ct).unwrap(), pt);
    }
}
