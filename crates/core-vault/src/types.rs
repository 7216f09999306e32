//! Secret attributes: the metadata a [`crate::Vault`] tracks per handle.

/// The concrete key material a [`SecretHandle`](crate::SecretHandle) holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretType {
    X25519Private,
    P256Private,
    Aes128Key,
    Aes256Key,
    Buffer,
}

/// What a secret is for; informational, not enforced by the software vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    KeyAgreement,
    Generic,
}

/// Whether a secret should outlive the handshake/channel that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    Ephemeral,
    Persistent,
}

/// Attributes passed to `secret_generate`/`secret_import`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretAttributes {
    pub stype: SecretType,
    pub purpose: Purpose,
    pub persistence: Persistence,
    pub length: usize,
}

impl SecretAttributes {
    pub fn x25519(persistence: Persistence) -> Self {
        Self { stype: SecretType::X25519Private, purpose: Purpose::KeyAgreement, persistence, length: 32 }
    }

    pub fn buffer(length: usize, persistence: Persistence) -> Self {
        Self { stype: SecretType::Buffer, purpose: Purpose::Generic, persistence, length }
    }
}
