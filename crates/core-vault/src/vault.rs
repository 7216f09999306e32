//! The capability set the handshake and transport cipher consume.

use crate::error::VaultError;
use crate::secret::SecretHandle;
use crate::types::{SecretAttributes, SecretType};

/// Cryptographic primitives consumed by the handshake and transport cipher,
/// kept behind a trait so the same `core-noise`/`secure-channel` code runs
/// over a software vault or (outside this crate's scope) a hardware one.
///
/// Every method takes `&self`: a vault instance may be shared across
/// channels, and is responsible for its own internal mutual exclusion.
pub trait Vault {
    /// Fill `buf` with uniform random bytes. This core only ever calls it
    /// with 32-byte buffers.
    fn random(&self, buf: &mut [u8]) -> Result<(), VaultError>;

    /// Pure SHA-256.
    fn sha256(&self, input: &[u8]) -> Result<[u8; 32], VaultError>;

    /// Produce a fresh secret of the given type/persistence.
    fn secret_generate(&self, attrs: SecretAttributes) -> Result<SecretHandle, VaultError>;

    /// Adopt externally supplied material. May fail on hardware-backed
    /// vaults for private-key types.
    fn secret_import(&self, attrs: SecretAttributes, bytes: &[u8]) -> Result<SecretHandle, VaultError>;

    /// Export raw bytes. Only `Buffer` secrets may be exported.
    fn secret_export(&self, secret: SecretHandle) -> Result<Vec<u8>, VaultError>;

    /// The attributes a secret was created/imported with.
    fn secret_attributes(&self, secret: SecretHandle) -> Result<SecretAttributes, VaultError>;

    /// The X25519 public point for a private-key secret.
    fn secret_publickey_get(&self, secret: SecretHandle) -> Result<[u8; 32], VaultError>;

    /// Reinterpret a `Buffer` secret as an AEAD key, or vice versa.
    fn secret_type_set(&self, secret: SecretHandle, new_type: SecretType) -> Result<(), VaultError>;

    /// Zeroise and release. Idempotent calls on an already-destroyed handle
    /// are a programmer error (returns `InvalidSecret`, not a panic).
    fn secret_destroy(&self, secret: SecretHandle) -> Result<(), VaultError>;

    /// X25519 scalar multiplication. The shared secret never leaves the
    /// vault as raw bytes — it comes back as a new `Buffer` secret.
    fn ecdh(&self, priv_key: SecretHandle, peer_public: &[u8; 32]) -> Result<SecretHandle, VaultError>;

    /// RFC 5869 HKDF-SHA256 with empty `info`, producing `n_outputs` fixed
    /// 32-byte `Buffer` secrets. `n_outputs` is 1, 2, or 3 for this core.
    fn hkdf_sha256(
        &self,
        salt: SecretHandle,
        ikm: SecretHandle,
        n_outputs: usize,
    ) -> Result<Vec<SecretHandle>, VaultError>;

    /// AES-GCM seal. `out` receives `ciphertext || tag16`.
    fn aead_aes_gcm_encrypt(
        &self,
        key: SecretHandle,
        nonce: u64,
        aad: &[u8],
        plaintext: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<(), VaultError>;

    /// AES-GCM open. On tag mismatch returns `AeadFailure` and `out` is left
    /// untouched (no partial-plaintext leak).
    fn aead_aes_gcm_decrypt(
        &self,
        key: SecretHandle,
        nonce: u64,
        aad: &[u8],
        ciphertext: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<(), VaultError>;
}

/// Build the 12-byte nonce layout shared by handshake and transport mode:
/// 4 zero bytes followed by the 64-bit counter, big-endian.
pub fn nonce_from_counter(counter: u64) -> [u8; 12] {
    let mut n = [0u8; 12];
    n[4..12].copy_from_slice(&counter.to_be_bytes());
    n
}
