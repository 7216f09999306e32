//! Error taxonomy surfaced by every [`crate::Vault`] primitive.

/// Failure kinds a [`crate::Vault`] implementation may return.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum VaultError {
    #[error("invalid parameter")]
    InvalidParam,
    #[error("invalid size")]
    InvalidSize,
    #[error("invalid context")]
    InvalidContext,
    #[error("invalid secret handle")]
    InvalidSecret,
    #[error("operation not valid for this secret type")]
    InvalidSecretType,
    #[error("random source failed")]
    RandomFailure,
    #[error("hash computation failed")]
    HashFailure,
    #[error("ECDH computation failed")]
    EcdhFailure,
    #[error("HKDF computation failed")]
    HkdfFailure,
    #[error("AEAD operation failed")]
    AeadFailure,
}
