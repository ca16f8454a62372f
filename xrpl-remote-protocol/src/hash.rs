//! 256-bit hashes as used for transaction and ledger identifiers.

use crate::error::ProtocolError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A 256-bit hash, rendered on the wire as 64 upper-case hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl FromStr for Hash256 {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| ProtocolError::InvalidHash(format!("{}: {}", s, e)))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self)
    }
}

impl Serialize for Hash256 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TX_HASH: &str = "E08D6E9754025BA2534A78707605E0601F03ACE063687A0CA1BDDACFCD1698C7";

    #[test]
    fn test_parse_and_display() {
        let hash: Hash256 = TX_HASH.parse().unwrap();
        assert_eq!(hash.to_string(), TX_HASH);
        assert!(!hash.is_zero());
    }

    #[test]
    fn test_parse_lowercase_displays_uppercase() {
        let hash: Hash256 = TX_HASH.to_lowercase().parse().unwrap();
        assert_eq!(hash.to_string(), TX_HASH);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("ABC".parse::<Hash256>().is_err());
        assert!("ZZ".repeat(32).parse::<Hash256>().is_err());
        assert!(format!("{}00", TX_HASH).parse::<Hash256>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let hash: Hash256 = TX_HASH.parse().unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", TX_HASH));

        let parsed: Hash256 = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, hash);

        assert!(serde_json::from_str::<Hash256>("\"nothex\"").is_err());
    }

    #[test]
    fn test_default_is_zero() {
        assert!(Hash256::default().is_zero());
    }
}
