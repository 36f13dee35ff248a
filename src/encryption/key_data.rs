//! KeyData - wrapped data-protection key and its derivation parameters
//!
//! Persisted form is a JSON object with hex-encoded byte fields:
//! `{"dpk": .., "salt": .., "iv": .., "iterations": n, "version": ".."}`

use serde::{Deserialize, Serialize};

use super::errors::{KeyStorageError, KeyStorageResult};

/// AES block size; the IV must be exactly one block.
pub const IV_LENGTH: usize = 16;

#[derive(Clone, PartialEq, Eq)]
pub struct KeyData {
    encrypted_dpk: Vec<u8>,
    salt: Vec<u8>,
    iv: Vec<u8>,
    iterations: u32,
    version: String,
}

#[derive(Serialize, Deserialize)]
struct StoredKeyData {
    dpk: String,
    salt: String,
    iv: String,
    iterations: u32,
    version: String,
}

impl KeyData {
    pub fn new(
        encrypted_dpk: Vec<u8>,
        salt: Vec<u8>,
        iv: Vec<u8>,
        iterations: u32,
        version: impl Into<String>,
    ) -> KeyStorageResult<Self> {
        if encrypted_dpk.is_empty() {
            return Err(KeyStorageError::InvalidKeyData(
                "encrypted key is empty".to_string(),
            ));
        }
        if salt.is_empty() {
            return Err(KeyStorageError::InvalidKeyData("salt is empty".to_string()));
        }
        if iv.len() != IV_LENGTH {
            return Err(KeyStorageError::InvalidKeyData(format!(
                "iv must be {} bytes, got {}",
                IV_LENGTH,
                iv.len()
            )));
        }
        if iterations == 0 {
            return Err(KeyStorageError::InvalidKeyData(
                "iterations must be > 0".to_string(),
            ));
        }
        Ok(Self {
            encrypted_dpk,
            salt,
            iv,
            iterations,
            version: version.into(),
        })
    }

    pub fn encrypted_dpk(&self) -> &[u8] {
        &self.encrypted_dpk
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub(crate) fn to_json(&self) -> KeyStorageResult<String> {
        let stored = StoredKeyData {
            dpk: hex::encode(&self.encrypted_dpk),
            salt: hex::encode(&self.salt),
            iv: hex::encode(&self.iv),
            iterations: self.iterations,
            version: self.version.clone(),
        };
        serde_json::to_string(&stored).map_err(|e| KeyStorageError::InvalidKeyData(e.to_string()))
    }

    /// Parses the persisted form. Any decoding problem is `Corrupt`.
    pub(crate) fn from_json(key: &str, content: &str) -> KeyStorageResult<Self> {
        let corrupt = |reason: String| KeyStorageError::Corrupt {
            key: key.to_string(),
            reason,
        };
        let stored: StoredKeyData =
            serde_json::from_str(content).map_err(|e| corrupt(e.to_string()))?;
        let decode = |field: &str, value: &str| {
            hex::decode(value).map_err(|e| corrupt(format!("{}: {}", field, e)))
        };
        Self::new(
            decode("dpk", &stored.dpk)?,
            decode("salt", &stored.salt)?,
            decode("iv", &stored.iv)?,
            stored.iterations,
            stored.version,
        )
        .map_err(|e| corrupt(e.to_string()))
    }
}

/// Key material is never printed.
impl std::fmt::Debug for KeyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyData")
            .field("iterations", &self.iterations)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KeyData {
        KeyData::new(vec![1, 2, 3, 4], vec![9; 32], vec![7; IV_LENGTH], 10_000, "1.0").unwrap()
    }

    #[test]
    fn test_validation() {
        assert!(KeyData::new(vec![], vec![1], vec![0; 16], 1, "1.0").is_err());
        assert!(KeyData::new(vec![1], vec![], vec![0; 16], 1, "1.0").is_err());
        assert!(KeyData::new(vec![1], vec![1], vec![0; 8], 1, "1.0").is_err());
        assert!(KeyData::new(vec![1], vec![1], vec![0; 16], 0, "1.0").is_err());
    }

    #[test]
    fn test_persisted_form_uses_hex() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["dpk"], "01020304");
        assert_eq!(value["iterations"], 10_000);
        assert_eq!(value["version"], "1.0");
        assert_eq!(KeyData::from_json("dpk-x", &json).unwrap(), sample());
    }

    #[test]
    fn test_bad_hex_is_corrupt() {
        let json = r#"{"dpk":"zz","salt":"01","iv":"00000000000000000000000000000000","iterations":1,"version":"1.0"}"#;
        assert!(matches!(
            KeyData::from_json("dpk-x", json),
            Err(KeyStorageError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_debug_hides_key_material() {
        let printed = format!("{:?}", sample());
        assert!(!printed.contains("encrypted_dpk"));
        assert!(printed.contains("10000"));
    }
}
