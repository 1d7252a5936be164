//! AES-256-GCM envelope for custodial secrets.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

use crate::vault::VaultError;

/// Required host key width in bytes.
pub const HOST_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Symmetric key protecting every escrow secret of one host.
///
/// Any byte length is accepted at construction; width is checked when the key
/// is used so a wrong-size key surfaces as [`VaultError::KeyMismatch`].
#[derive(Clone)]
pub struct HostKey(Zeroizing<Vec<u8>>);

impl HostKey {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(Zeroizing::new(bytes.to_vec()))
    }

    /// Decode a hex string (with or without 0x prefix).
    pub fn from_hex(encoded: &str) -> Result<Self, VaultError> {
        let encoded = encoded.trim();
        let encoded = encoded.strip_prefix("0x").unwrap_or(encoded);
        let bytes = Zeroizing::new(
            hex::decode(encoded)
                .map_err(|_| VaultError::SecretUnavailable("host key is not valid hex".to_string()))?,
        );
        Ok(Self::from_bytes(&bytes))
    }

    /// Hex encoding for handing a freshly generated key to an operator.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.0.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn cipher(&self) -> Result<Aes256Gcm, VaultError> {
        if self.0.len() != HOST_KEY_LEN {
            return Err(VaultError::KeyMismatch {
                expected: HOST_KEY_LEN,
                actual: self.0.len(),
            });
        }
        Aes256Gcm::new_from_slice(&self.0).map_err(|_| VaultError::KeyMismatch {
            expected: HOST_KEY_LEN,
            actual: self.0.len(),
        })
    }
}

impl fmt::Debug for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostKey(<redacted {} bytes>)", self.0.len())
    }
}

/// Authenticated ciphertext of one escrow secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    #[serde(with = "hex_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub iv: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub auth_tag: Vec<u8>,
}

/// Generate a random 256-bit host key.
pub fn generate_host_key() -> HostKey {
    let mut bytes = Zeroizing::new(vec![0u8; HOST_KEY_LEN]);
    rand::thread_rng().fill_bytes(&mut bytes);
    HostKey(bytes)
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(plaintext: &[u8], key: &HostKey) -> Result<EncryptedBlob, VaultError> {
    let cipher = key.cipher()?;

    let iv: [u8; NONCE_LEN] = rand::random();
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&iv), Payload::from(plaintext))
        .map_err(|_| VaultError::EncryptionFailed)?;

    // aes-gcm appends the tag to the ciphertext
    let auth_tag = sealed.split_off(sealed.len() - TAG_LEN);

    Ok(EncryptedBlob {
        ciphertext: sealed,
        iv: iv.to_vec(),
        auth_tag,
    })
}

/// Decrypt a blob. Fails closed: any tampering yields `AuthenticationFailure`.
pub fn decrypt(blob: &EncryptedBlob, key: &HostKey) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    let cipher = key.cipher()?;

    if blob.iv.len() != NONCE_LEN || blob.auth_tag.len() != TAG_LEN {
        return Err(VaultError::AuthenticationFailure);
    }

    let mut sealed = Vec::with_capacity(blob.ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(&blob.ciphertext);
    sealed.extend_from_slice(&blob.auth_tag);

    cipher
        .decrypt(Nonce::from_slice(&blob.iv), sealed.as_slice())
        .map(Zeroizing::new)
        .map_err(|_| VaultError::AuthenticationFailure)
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(encoded).map_err(serde::de::Error::custom)
    }
}
