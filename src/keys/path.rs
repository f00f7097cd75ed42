//! Derivation paths: `m/84'/1'/0'/0/5`, `84h/1h/0h`, ...

use std::fmt;
use std::str::FromStr;

use crate::error::WalletError;

/// The hardened index offset (0x80000000).
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// A parsed BIP32 path. Indices carry the hardened bit already applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DerivationPath(Vec<u32>);

impl DerivationPath {
    pub fn master() -> Self {
        Self(Vec::new())
    }

    pub fn indices(&self) -> &[u32] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append one non-hardened or hardened child index.
    pub fn child(&self, index: u32) -> Self {
        let mut next = self.0.clone();
        next.push(index);
        Self(next)
    }

    /// `base/chain/index` with both trailing components non-hardened.
    pub fn address_path(&self, is_change: bool, index: u32) -> Self {
        self.child(u32::from(is_change)).child(index)
    }

    /// Path without the `m/` prefix, e.g. `84'/1'/0'`.
    pub fn to_relative_string(&self) -> String {
        self.0
            .iter()
            .map(|&i| {
                if i >= HARDENED_OFFSET {
                    format!("{}'", i - HARDENED_OFFSET)
                } else {
                    i.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "m")
        } else {
            write!(f, "m/{}", self.to_relative_string())
        }
    }
}

impl FromStr for DerivationPath {
    type Err = WalletError;

    /// Accepts `m`, `m/...` and bare relative paths. Hardened components
    /// may be marked with `'` or `h`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(WalletError::InvalidPath("empty path".into()));
        }
        let body = match trimmed {
            "m" | "M" => return Ok(Self::master()),
            t if t.starts_with("m/") || t.starts_with("M/") => &t[2..],
            t => t,
        };

        let mut indices = Vec::new();
        for part in body.split('/') {
            let part = part.trim();
            if part.is_empty() {
                return Err(WalletError::InvalidPath(format!("empty component in '{trimmed}'")));
            }
            let (num, hardened) = match part.strip_suffix('\'').or_else(|| part.strip_suffix('h')) {
                Some(n) => (n, true),
                None => (part, false),
            };
            let index: u32 = num
                .parse()
                .map_err(|_| WalletError::InvalidPath(format!("invalid index '{part}' in '{trimmed}'")))?;
            if index >= HARDENED_OFFSET {
                return Err(WalletError::InvalidPath(format!("index {index} out of range")));
            }
            indices.push(if hardened { index | HARDENED_OFFSET } else { index });
        }
        Ok(Self(indices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_path() {
        let path: DerivationPath = "m/84'/1'/0'/0/5".parse().unwrap();
        assert_eq!(
            path.indices(),
            &[84 | HARDENED_OFFSET, 1 | HARDENED_OFFSET, HARDENED_OFFSET, 0, 5]
        );
        assert_eq!(path.to_string(), "m/84'/1'/0'/0/5");
    }

    #[test]
    fn test_parse_relative_and_h_suffix() {
        let a: DerivationPath = "84h/1h/0h".parse().unwrap();
        let b: DerivationPath = "84'/1'/0'".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_relative_string(), "84'/1'/0'");
    }

    #[test]
    fn test_address_path() {
        let base: DerivationPath = "84'/1'/0'".parse().unwrap();
        assert_eq!(base.address_path(true, 7).to_string(), "m/84'/1'/0'/1/7");
        assert_eq!(base.address_path(false, 0).to_string(), "m/84'/1'/0'/0/0");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("".parse::<DerivationPath>().is_err());
        assert!("m/".parse::<DerivationPath>().is_err());
        assert!("m/44'//0".parse::<DerivationPath>().is_err());
        assert!("m/abc".parse::<DerivationPath>().is_err());
        assert!("m/2147483648".parse::<DerivationPath>().is_err());
    }

    #[test]
    fn test_master() {
        let m: DerivationPath = "m".parse().unwrap();
        assert!(m.is_empty());
        assert_eq!(m.to_string(), "m");
    }
}
