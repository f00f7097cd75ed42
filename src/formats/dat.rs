//! Legacy `.dat` import: a descriptor wallet stored in an SQLite file.
//!
//! No SQL reader is involved. Records are found by scanning the raw bytes
//! for their length-prefixed key names; in an SQLite cell the key blob is
//! immediately followed by the value blob.
//!
//! ```text
//! 04 "mkey" u32                         │ 30 <48 ct> 08 <8 salt> u32 method u32 iterations
//! 10 "walletdescriptor" <32 id>         │ <compact len> "wpkh(xpub.../84h/1h/0h/0/*)#..."
//! 13 "walletdescriptorkey" <id> 21 <pk> │ d6 30 81 d3 02 01 01 04 20 <32 secret> ...
//! 14 "walletdescriptorckey" <id> 21 <pk>│ 30 <48 ct>
//! 03 "key" 21 <pk>                      │ d6 30 81 d3 02 01 01 04 20 <32 secret> ...
//! ```
//!
//! Encrypted wallets: the password unlocks a master key through iterated
//! SHA-512 (`SHA512(password || salt)`, then rehash) and AES-256-CBC; the
//! master key then decrypts the descriptor key with
//! `IV = SHA256d(pubkey)[0..16]`.

use sha2::{Digest, Sha512};
use std::fmt;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use super::cipher::aes256_cbc_decrypt;
use crate::config::WalletConfig;
use crate::error::{Result, WalletError};
use crate::keys::{curve, DerivationMode, DerivationPath, KeyManager};
use crate::tx::serialize::sha256d;
use crate::wallet::{Wallet, WalletSource, DEFAULT_DESCRIPTOR_PATH};

pub const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

const MKEY: &[u8] = b"\x04mkey";
const DESCRIPTOR: &[u8] = b"\x10walletdescriptor";
const DESCRIPTOR_KEY: &[u8] = b"\x13walletdescriptorkey";
const DESCRIPTOR_CKEY: &[u8] = b"\x14walletdescriptorckey";
const LEGACY_KEY: &[u8] = b"\x03key";
const HDCHAIN: &[u8] = b"hdchain";
const DER_PRIVKEY_PREFIX: &[u8] = &[0x30, 0x81, 0xd3, 0x02, 0x01, 0x01, 0x04, 0x20];
const DER_PRIVKEY_PREFIX_UNCOMPRESSED: &[u8] = &[0x30, 0x82, 0x01, 0x13, 0x02, 0x01, 0x01, 0x04, 0x20];

const MKEY_WINDOW: usize = 128;
const DER_WINDOW: usize = 320;
const MIN_ITERATIONS: u32 = 1_000;
const MAX_ITERATIONS: u32 = 10_000_000;

/// 32 secret bytes; redacted in `Debug`, wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretBytes(pub [u8; 32]);

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBytes(..)")
    }
}

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// CMasterKey: password-protected wallet encryption key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterKeyRecord {
    pub encrypted_key: [u8; 48],
    pub salt: [u8; 8],
    pub derivation_method: u32,
    pub iterations: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatRecord {
    /// Unencrypted descriptor private key.
    DescriptorKey { descriptor_id: [u8; 32], pubkey: [u8; 33], secret: SecretBytes },
    /// Pre-descriptor `key` record.
    LegacyKey { secret: SecretBytes },
    EncryptedMasterKey(MasterKeyRecord),
    EncryptedDescriptorKey { descriptor_id: [u8; 32], pubkey: [u8; 33], ciphertext: Vec<u8> },
    Descriptor { descriptor_id: [u8; 32], descriptor: String },
    ExtendedPublicKey { chain_code: [u8; 32], pubkey: [u8; 33], depth: u8 },
    HdChain,
}

fn positions<'a>(haystack: &'a [u8], needle: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(move |(_, w)| *w == needle)
        .map(|(i, _)| i)
}

fn find_in(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn array<const N: usize>(bytes: &[u8], at: usize) -> Option<[u8; N]> {
    bytes.get(at..at + N)?.try_into().ok()
}

fn read_u32_le(bytes: &[u8], at: usize) -> Option<u32> {
    array::<4>(bytes, at).map(u32::from_le_bytes)
}

/// CompactSize at `at`: `(value, bytes consumed)`.
fn read_compact_size(bytes: &[u8], at: usize) -> Option<(u64, usize)> {
    match *bytes.get(at)? {
        n @ 0..=0xfc => Some((u64::from(n), 1)),
        0xfd => array::<2>(bytes, at + 1).map(|b| (u64::from(u16::from_le_bytes(b)), 3)),
        0xfe => array::<4>(bytes, at + 1).map(|b| (u64::from(u32::from_le_bytes(b)), 5)),
        _ => array::<8>(bytes, at + 1).map(|b| (u64::from_le_bytes(b), 9)),
    }
}

/// `len` bytes at `at`, where `len` was read from the file.
fn length_prefixed(bytes: &[u8], at: usize, len: u64) -> Option<&[u8]> {
    let end = at.checked_add(usize::try_from(len).ok()?)?;
    bytes.get(at..end)
}

fn scan_master_keys(bytes: &[u8], out: &mut Vec<DatRecord>) {
    for marker in positions(bytes, MKEY) {
        let start = marker + MKEY.len();
        let end = (start + MKEY_WINDOW).min(bytes.len());
        for p in start..end {
            if bytes[p] != 0x30 || bytes.get(p + 49) != Some(&0x08) {
                continue;
            }
            let (Some(encrypted_key), Some(salt), Some(method), Some(iterations)) = (
                array::<48>(bytes, p + 1),
                array::<8>(bytes, p + 50),
                read_u32_le(bytes, p + 58),
                read_u32_le(bytes, p + 62),
            ) else {
                continue;
            };
            if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&iterations) {
                continue;
            }
            debug!(offset = p, iterations, method, "found master key record");
            out.push(DatRecord::EncryptedMasterKey(MasterKeyRecord {
                encrypted_key,
                salt,
                derivation_method: method,
                iterations,
            }));
            break;
        }
    }
}

/// `<marker> <32 id> 21 <33 pubkey>`; returns id, pubkey and the offset
/// just past the key blob.
fn descriptor_key_blob(bytes: &[u8], marker: usize, marker_len: usize) -> Option<([u8; 32], [u8; 33], usize)> {
    let id_at = marker + marker_len;
    let descriptor_id = array::<32>(bytes, id_at)?;
    if *bytes.get(id_at + 32)? != 0x21 {
        return None;
    }
    let pubkey = array::<33>(bytes, id_at + 33)?;
    Some((descriptor_id, pubkey, id_at + 66))
}

fn der_secret_after(bytes: &[u8], from: usize) -> Option<[u8; 32]> {
    let end = (from + DER_WINDOW).min(bytes.len());
    let window = bytes.get(from..end)?;
    for prefix in [DER_PRIVKEY_PREFIX, DER_PRIVKEY_PREFIX_UNCOMPRESSED] {
        if let Some(at) = find_in(window, prefix) {
            let secret = array::<32>(window, at + prefix.len())?;
            if curve::is_valid_scalar(&secret) {
                return Some(secret);
            }
        }
    }
    None
}

fn scan_descriptor_keys(bytes: &[u8], out: &mut Vec<DatRecord>) {
    for marker in positions(bytes, DESCRIPTOR_KEY) {
        let Some((descriptor_id, pubkey, value_at)) = descriptor_key_blob(bytes, marker, DESCRIPTOR_KEY.len()) else {
            continue;
        };
        let Some(mut secret) = der_secret_after(bytes, value_at) else { continue };
        let matches = curve::secret_key(&secret)
            .map(|sk| curve::compressed_public_key(&sk) == pubkey)
            .unwrap_or(false);
        if matches {
            out.push(DatRecord::DescriptorKey { descriptor_id, pubkey, secret: SecretBytes(secret) });
        } else {
            warn!(offset = marker, "descriptor key does not match its public key, skipping");
        }
        secret.zeroize();
    }

    for marker in positions(bytes, DESCRIPTOR_CKEY) {
        let Some((descriptor_id, pubkey, value_at)) = descriptor_key_blob(bytes, marker, DESCRIPTOR_CKEY.len()) else {
            continue;
        };
        let Some((len, used)) = read_compact_size(bytes, value_at) else { continue };
        if len == 0 || len % 16 != 0 || len > 128 {
            continue;
        }
        let Some(ciphertext) = length_prefixed(bytes, value_at + used, len) else { continue };
        out.push(DatRecord::EncryptedDescriptorKey { descriptor_id, pubkey, ciphertext: ciphertext.to_vec() });
    }
}

fn scan_descriptors(bytes: &[u8], out: &mut Vec<DatRecord>) {
    for marker in positions(bytes, DESCRIPTOR) {
        let id_at = marker + DESCRIPTOR.len();
        let Some(descriptor_id) = array::<32>(bytes, id_at) else { continue };
        let value_at = id_at + 32;
        let Some((len, used)) = read_compact_size(bytes, value_at) else { continue };
        let Some(raw) = length_prefixed(bytes, value_at + used, len) else { continue };
        let Ok(descriptor) = std::str::from_utf8(raw) else { continue };
        if descriptor.contains('(') {
            out.push(DatRecord::Descriptor { descriptor_id, descriptor: descriptor.to_string() });
        }
    }
}

fn scan_legacy_keys(bytes: &[u8], out: &mut Vec<DatRecord>) {
    for marker in positions(bytes, LEGACY_KEY) {
        let pk_at = marker + LEGACY_KEY.len();
        let pk_len = match bytes.get(pk_at) {
            Some(0x21) => 33,
            Some(0x41) => 65,
            _ => continue,
        };
        if let Some(secret) = der_secret_after(bytes, pk_at + 1 + pk_len) {
            out.push(DatRecord::LegacyKey { secret: SecretBytes(secret) });
        }
    }
}

const BASE58_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Decode a Base58Check extended public key starting at `bytes[at..]`.
fn extended_key_at(bytes: &[u8], at: usize) -> Option<DatRecord> {
    let len = bytes[at..]
        .iter()
        .take(112)
        .take_while(|b| BASE58_ALPHABET.contains(b))
        .count();
    let encoded = std::str::from_utf8(&bytes[at..at + len]).ok()?;
    let raw = bitcoin::base58::decode_check(encoded).ok()?;
    if raw.len() != 78 {
        return None;
    }
    Some(DatRecord::ExtendedPublicKey {
        depth: raw[4],
        chain_code: array::<32>(&raw, 13)?,
        pubkey: array::<33>(&raw, 45)?,
    })
}

fn scan_extended_keys(bytes: &[u8], out: &mut Vec<DatRecord>) {
    for needle in [b"xpub".as_slice(), b"tpub".as_slice()] {
        for at in positions(bytes, needle) {
            if let Some(record) = extended_key_at(bytes, at) {
                if !out.contains(&record) {
                    out.push(record);
                }
            }
        }
    }
}

/// Every recognizable record in the file, in scan order by kind.
pub fn scan_records(bytes: &[u8]) -> Vec<DatRecord> {
    let mut out = Vec::new();
    scan_master_keys(bytes, &mut out);
    scan_descriptor_keys(bytes, &mut out);
    scan_descriptors(bytes, &mut out);
    scan_legacy_keys(bytes, &mut out);
    scan_extended_keys(bytes, &mut out);
    if find_in(bytes, HDCHAIN).is_some() {
        out.push(DatRecord::HdChain);
    }
    out
}

/// Key and IV from Bitcoin Core's `BytesToKeySHA512AES`, yielding to the
/// scheduler every `yield_every` rounds.
pub async fn derive_master_key_material(
    password: &[u8],
    salt: &[u8; 8],
    iterations: u32,
    yield_every: u32,
) -> ([u8; 32], [u8; 16]) {
    let mut digest = Sha512::new().chain_update(password).chain_update(salt).finalize();

    let yield_every = yield_every.max(1);
    for round in 1..iterations {
        digest = Sha512::digest(digest);
        if round % yield_every == 0 {
            tokio::task::yield_now().await;
        }
    }

    let mut key = [0u8; 32];
    let mut iv = [0u8; 16];
    key.copy_from_slice(&digest[..32]);
    iv.copy_from_slice(&digest[32..48]);
    digest.as_mut_slice().zeroize();
    (key, iv)
}

/// Try every master key record with `password`; first 32-byte plaintext wins.
pub async fn decrypt_master_key(records: &[MasterKeyRecord], password: &str, yield_every: u32) -> Result<SecretBytes> {
    let mut tried = 0;
    for record in records {
        if record.derivation_method != 0 {
            warn!(method = record.derivation_method, "unsupported key derivation method, skipping");
            continue;
        }
        tried += 1;
        let (mut key, iv) = derive_master_key_material(password.as_bytes(), &record.salt, record.iterations, yield_every).await;
        let plain = aes256_cbc_decrypt(&key, &iv, &record.encrypted_key);
        key.zeroize();
        if let Ok(mut plain) = plain {
            if plain.len() == 32 {
                let mut master = [0u8; 32];
                master.copy_from_slice(&plain);
                plain.zeroize();
                return Ok(SecretBytes(master));
            }
            plain.zeroize();
        }
    }
    if tried == 0 {
        return Err(WalletError::UnsupportedWalletFormat("no usable master key record".into()));
    }
    Err(WalletError::WrongPassword)
}

/// Decrypt a `walletdescriptorckey` secret and check it against its pubkey.
pub fn decrypt_descriptor_key(master: &SecretBytes, pubkey: &[u8; 33], ciphertext: &[u8]) -> Result<SecretBytes> {
    let hash = sha256d(pubkey);
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&hash[..16]);
    let mut plain = aes256_cbc_decrypt(&master.0, &iv, ciphertext)?;
    let secret: Option<[u8; 32]> = plain.as_slice().try_into().ok();
    plain.zeroize();
    let secret = SecretBytes(secret.ok_or(WalletError::WrongPassword)?);
    let derived = curve::secret_key(&secret.0).map(|sk| curve::compressed_public_key(&sk))?;
    if &derived != pubkey {
        return Err(WalletError::IntegrityCheckFailed(
            "decrypted descriptor key does not match its public key".into(),
        ));
    }
    Ok(secret)
}

/// What the receive descriptor tells us about the wallet layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveDescriptor {
    pub descriptor_id: [u8; 32],
    /// Base path, e.g. `84'/1'/0'`.
    pub base_path: Option<String>,
    /// Extended key embedded in the descriptor, if it is a master key.
    pub master_xpub: Option<([u8; 32], [u8; 33])>,
}

/// Parse `wpkh(xpub/84h/1h/0h/0/*)#chk` or `wpkh([fp/84'/1'/0']xpub/0/*)#chk`.
pub fn parse_receive_descriptor(descriptor_id: [u8; 32], descriptor: &str) -> Option<ReceiveDescriptor> {
    let body = descriptor.split('#').next()?.trim();
    let inner = body.strip_prefix("wpkh(")?.strip_suffix(')')?;
    let chain_part = inner.strip_suffix("/0/*")?;

    let (origin, key_and_path) = match chain_part.strip_prefix('[') {
        Some(rest) => {
            let (origin, after) = rest.split_once(']')?;
            (Some(origin), after)
        }
        None => (None, chain_part),
    };
    let (key, path_after_key) = match key_and_path.split_once('/') {
        Some((k, p)) => (k, Some(p)),
        None => (key_and_path, None),
    };

    let base_path = match (path_after_key, origin) {
        (Some(p), _) => p.parse::<DerivationPath>().ok(),
        (None, Some(origin)) => origin.split_once('/').and_then(|(_, p)| p.parse::<DerivationPath>().ok()),
        (None, None) => None,
    }
    .map(|p| p.to_relative_string());

    let master_xpub = match extended_key_at(key.as_bytes(), 0) {
        Some(DatRecord::ExtendedPublicKey { depth: 0, chain_code, pubkey }) => Some((chain_code, pubkey)),
        _ => None,
    };
    Some(ReceiveDescriptor { descriptor_id, base_path, master_xpub })
}

/// Import a legacy `.dat` file. Password-protected files need `password`;
/// key stretching is bounded by `config.legacy_decrypt_timeout`.
pub async fn import_dat(bytes: &[u8], password: Option<&str>, config: &WalletConfig) -> Result<Wallet> {
    if !bytes.starts_with(SQLITE_MAGIC) {
        return Err(WalletError::InvalidFormat("missing SQLite header".into()));
    }
    let records = scan_records(bytes);
    if records.iter().any(|r| matches!(r, DatRecord::HdChain)) {
        debug!("hdchain record present");
    }

    let receive = records.iter().find_map(|r| match r {
        DatRecord::Descriptor { descriptor_id, descriptor } if descriptor.contains("/0/*)") => {
            parse_receive_descriptor(*descriptor_id, descriptor)
        }
        _ => None,
    });
    let receive_id = receive.as_ref().map(|r| r.descriptor_id);

    let master_records: Vec<MasterKeyRecord> = records
        .iter()
        .filter_map(|r| match r {
            DatRecord::EncryptedMasterKey(m) => Some(m.clone()),
            _ => None,
        })
        .collect();

    let (secret, pubkey) = if !master_records.is_empty() {
        let password = password.ok_or(WalletError::NeedsPassword)?;
        let encrypted: Vec<(&[u8; 32], &[u8; 33], &Vec<u8>)> = records
            .iter()
            .filter_map(|r| match r {
                DatRecord::EncryptedDescriptorKey { descriptor_id, pubkey, ciphertext } => {
                    Some((descriptor_id, pubkey, ciphertext))
                }
                _ => None,
            })
            .collect();
        let (_, pubkey, ciphertext) = encrypted
            .iter()
            .find(|(id, _, _)| Some(**id) == receive_id)
            .or_else(|| encrypted.first())
            .copied()
            .ok_or_else(|| WalletError::UnsupportedWalletFormat("encrypted wallet without descriptor keys".into()))?;

        let master = tokio::time::timeout(
            config.legacy_decrypt_timeout,
            decrypt_master_key(&master_records, password, config.kdf_yield_interval),
        )
        .await
        .map_err(|_| WalletError::Timeout("legacy wallet key stretching".into()))??;
        (decrypt_descriptor_key(&master, pubkey, ciphertext)?, Some(*pubkey))
    } else {
        let descriptor_keys: Vec<(&[u8; 32], &[u8; 33], &SecretBytes)> = records
            .iter()
            .filter_map(|r| match r {
                DatRecord::DescriptorKey { descriptor_id, pubkey, secret } => Some((descriptor_id, pubkey, secret)),
                _ => None,
            })
            .collect();
        let chosen = descriptor_keys
            .iter()
            .find(|(id, _, _)| Some(**id) == receive_id)
            .or_else(|| descriptor_keys.first());
        match chosen {
            Some((_, pubkey, secret)) => ((*secret).clone(), Some(**pubkey)),
            None => {
                let legacy = records.iter().find_map(|r| match r {
                    DatRecord::LegacyKey { secret } => Some(secret.clone()),
                    _ => None,
                });
                let secret = legacy
                    .ok_or_else(|| WalletError::UnsupportedWalletFormat("no recognizable key record".into()))?;
                return legacy_key_wallet(secret, config);
            }
        }
    };

    // Chain code: the descriptor's own master xpub, else any depth-0 xpub
    // whose public key matches the recovered secret.
    let xpub_chain_code = receive
        .as_ref()
        .and_then(|r| r.master_xpub)
        .into_iter()
        .chain(records.iter().filter_map(|r| match r {
            DatRecord::ExtendedPublicKey { depth: 0, chain_code, pubkey } => Some((*chain_code, *pubkey)),
            _ => None,
        }))
        .find(|(_, xpub_key)| pubkey.map_or(true, |pk| pk == *xpub_key))
        .map(|(cc, _)| cc)
        .ok_or_else(|| WalletError::UnsupportedWalletFormat("no depth-0 extended public key".into()))?;

    let base_path = receive
        .as_ref()
        .and_then(|r| r.base_path.clone())
        .unwrap_or_else(|| DEFAULT_DESCRIPTOR_PATH.to_string());
    let mut wallet = Wallet::new(&secret.0, Some(&xpub_chain_code), DerivationMode::Bip32, &base_path, WalletSource::LegacyDat)?;
    let manager = KeyManager::from_wallet(&wallet, config.hrp())?;
    wallet.add_address(manager.derive_address(0, false)?)?;

    info!(
        encrypted = !master_records.is_empty(),
        descriptor_path = %wallet.descriptor_path,
        "legacy wallet imported"
    );
    Ok(wallet)
}

fn legacy_key_wallet(secret: SecretBytes, config: &WalletConfig) -> Result<Wallet> {
    let mut wallet = Wallet::new(&secret.0, None, DerivationMode::WifHmac, DEFAULT_DESCRIPTOR_PATH, WalletSource::LegacyDat)?;
    let manager = KeyManager::from_wallet(&wallet, config.hrp())?;
    wallet.add_address(manager.derive_address(0, false)?)?;
    info!("legacy key-record wallet imported");
    Ok(wallet)
}
