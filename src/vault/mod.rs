//! KeyVault: authenticated encryption of custodial secrets at rest.
//!
//! # Data Flow
//! ```text
//! createEscrow:  adapter secret → encrypt(secret, host key) → EncryptedBlob → session
//! payout:        session blob   → decrypt(blob, host key)   → Zeroizing secret → build_transfer
//! ```
//!
//! # Security
//! - The host key comes from a `SecretProvider`, never from session state
//! - Decryption fails closed; a bad tag never yields plaintext
//! - Plaintext lives in `Zeroizing` buffers and is wiped on drop
//! - Neither keys nor plaintext implement `Display`

pub mod cipher;
pub mod secret;

use thiserror::Error;

pub use cipher::{decrypt, encrypt, generate_host_key, EncryptedBlob, HostKey, HOST_KEY_LEN};
pub use secret::{EnvSecretProvider, SecretProvider, StaticSecretProvider};

/// Custody failures. Messages never carry key material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("authentication failure: ciphertext or tag did not verify")]
    AuthenticationFailure,

    #[error("key mismatch: expected {expected} bytes, got {actual}")]
    KeyMismatch { expected: usize, actual: usize },

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("host key unavailable: {0}")]
    SecretUnavailable(String),
}
