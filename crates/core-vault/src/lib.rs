//! Vault capability: random, hash, X25519 ECDH, HKDF-SHA256, AES-GCM,
//! behind an opaque [`SecretHandle`] so callers never see private-key bytes.

mod error;
mod secret;
mod software;
mod types;
mod vault;

pub use error::VaultError;
pub use secret::SecretHandle;
pub use software::SoftwareVault;
pub use types::{Persistence, Purpose, SecretAttributes, SecretType};
pub use vault::{nonce_from_counter, Vault};
