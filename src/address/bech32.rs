//! Bech32 (BIP173 checksum constant) with an arbitrary human-readable part.
//!
//! Only witness version 0 programs are produced. The checksum is the
//! original bech32 one, not bech32m.

use thiserror::Error;

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const GENERATOR: [u32; 5] = [0x3b6a_57b2, 0x2650_8e6d, 0x1ea1_19fa, 0x3d42_33dd, 0x2a14_62b3];
const CHECKSUM_LEN: usize = 6;
const MAX_LEN: usize = 90;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Bech32Error {
    #[error("mixed case")]
    MixedCase,
    #[error("missing separator")]
    MissingSeparator,
    #[error("invalid human-readable part")]
    InvalidHrp,
    #[error("invalid character '{0}'")]
    InvalidChar(char),
    #[error("invalid length {0}")]
    InvalidLength(usize),
    #[error("checksum mismatch")]
    InvalidChecksum,
    #[error("invalid padding")]
    InvalidPadding,
    #[error("unsupported witness version {0}")]
    UnsupportedWitnessVersion(u8),
    #[error("invalid witness program length {0}")]
    InvalidProgramLength(usize),
    #[error("wrong network prefix: expected '{expected}', got '{got}'")]
    HrpMismatch { expected: String, got: String },
}

/// The parts of a decoded segwit address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAddress {
    pub hrp: String,
    pub version: u8,
    pub program: Vec<u8>,
}

fn polymod(values: &[u8]) -> u32 {
    let mut chk: u32 = 1;
    for &v in values {
        let top = chk >> 25;
        chk = ((chk & 0x01ff_ffff) << 5) ^ u32::from(v);
        for (i, g) in GENERATOR.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= g;
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let bytes = hrp.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() * 2 + 1);
    out.extend(bytes.iter().map(|b| b >> 5));
    out.push(0);
    out.extend(bytes.iter().map(|b| b & 0x1f));
    out
}

fn create_checksum(hrp: &str, data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0u8; CHECKSUM_LEN]);
    let pm = polymod(&values) ^ 1;
    let mut out = [0u8; CHECKSUM_LEN];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = ((pm >> (5 * (5 - i))) & 0x1f) as u8;
    }
    out
}

fn verify_checksum(hrp: &str, data: &[u8]) -> bool {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    polymod(&values) == 1
}

/// Regroup bits, e.g. 8-bit bytes into 5-bit symbols.
pub(crate) fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Result<Vec<u8>, Bech32Error> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let maxv: u32 = (1 << to) - 1;
    let max_acc: u32 = (1 << (from + to - 1)) - 1;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);
    for &value in data {
        let v = u32::from(value);
        if v >> from != 0 {
            return Err(Bech32Error::InvalidPadding);
        }
        acc = ((acc << from) | v) & max_acc;
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
        return Err(Bech32Error::InvalidPadding);
    }
    Ok(out)
}

/// Encode a witness program as `hrp1...`.
pub fn create_bech32(hrp: &str, version: u8, program: &[u8]) -> Result<String, Bech32Error> {
    if hrp.is_empty() || !hrp.bytes().all(|b| (33..=126).contains(&b)) {
        return Err(Bech32Error::InvalidHrp);
    }
    if version > 16 {
        return Err(Bech32Error::UnsupportedWitnessVersion(version));
    }
    let hrp = hrp.to_ascii_lowercase();

    let mut data = vec![version];
    data.extend(convert_bits(program, 8, 5, true)?);
    let checksum = create_checksum(&hrp, &data);

    let mut out = String::with_capacity(hrp.len() + 1 + data.len() + CHECKSUM_LEN);
    out.push_str(&hrp);
    out.push('1');
    for &d in data.iter().chain(checksum.iter()) {
        out.push(CHARSET[d as usize] as char);
    }
    Ok(out)
}

/// Decode and checksum-verify a bech32 segwit address.
pub fn decode_bech32(address: &str) -> Result<DecodedAddress, Bech32Error> {
    if address.len() > MAX_LEN {
        return Err(Bech32Error::InvalidLength(address.len()));
    }
    let has_lower = address.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = address.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(Bech32Error::MixedCase);
    }
    let address = address.to_ascii_lowercase();

    let sep = address.rfind('1').ok_or(Bech32Error::MissingSeparator)?;
    if sep == 0 {
        return Err(Bech32Error::InvalidHrp);
    }
    if sep + 1 + CHECKSUM_LEN > address.len() {
        return Err(Bech32Error::InvalidLength(address.len()));
    }
    let (hrp, rest) = address.split_at(sep);
    if !hrp.bytes().all(|b| (33..=126).contains(&b)) {
        return Err(Bech32Error::InvalidHrp);
    }

    let mut data = Vec::with_capacity(rest.len() - 1);
    for c in rest[1..].chars() {
        let pos = CHARSET
            .iter()
            .position(|&x| x as char == c)
            .ok_or(Bech32Error::InvalidChar(c))?;
        data.push(pos as u8);
    }
    if !verify_checksum(hrp, &data) {
        return Err(Bech32Error::InvalidChecksum);
    }

    let payload = &data[..data.len() - CHECKSUM_LEN];
    let (&version, words) = payload.split_first().ok_or(Bech32Error::InvalidLength(0))?;
    if version != 0 {
        return Err(Bech32Error::UnsupportedWitnessVersion(version));
    }
    let program = convert_bits(words, 5, 8, false)?;
    if program.len() != 20 && program.len() != 32 {
        return Err(Bech32Error::InvalidProgramLength(program.len()));
    }

    Ok(DecodedAddress { hrp: hrp.to_string(), version, program })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &str = "751e76e8199196d454941c45d1b3a323f1433bd6";

    #[test]
    fn test_bip173_vector() {
        let program = hex::decode(PROGRAM).unwrap();
        let addr = create_bech32("bc", 0, &program).unwrap();
        assert_eq!(addr, "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4");

        let decoded = decode_bech32("BC1QW508D6QEJXTDG4Y5R3ZARVARY0C5XW7KV8F3T4").unwrap();
        assert_eq!(decoded.hrp, "bc");
        assert_eq!(decoded.version, 0);
        assert_eq!(decoded.program, program);
    }

    #[test]
    fn test_roundtrip_custom_hrp() {
        for seed in 0u8..8 {
            let program: Vec<u8> = (0..20).map(|i| i * 13 + seed).collect();
            let addr = create_bech32("alpha", 0, &program).unwrap();
            assert!(addr.starts_with("alpha1q"));
            let decoded = decode_bech32(&addr).unwrap();
            assert_eq!(
                decoded,
                DecodedAddress { hrp: "alpha".into(), version: 0, program }
            );
        }
    }

    #[test]
    fn test_rejects_corrupted_checksum() {
        let addr = create_bech32("alpha", 0, &[7u8; 20]).unwrap();
        let mut chars: Vec<char> = addr.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == 'q' { 'p' } else { 'q' };
        let tampered: String = chars.into_iter().collect();
        assert_eq!(decode_bech32(&tampered), Err(Bech32Error::InvalidChecksum));
    }

    #[test]
    fn test_rejects_mixed_case_and_bad_chars() {
        assert_eq!(
            decode_bech32("bc1qW508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"),
            Err(Bech32Error::MixedCase)
        );
        assert_eq!(
            decode_bech32("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3tb"),
            Err(Bech32Error::InvalidChar('b'))
        );
        assert_eq!(decode_bech32("qw508d6qejxtdg"), Err(Bech32Error::MissingSeparator));
    }
}
