//! Opaque handle to key material living inside a [`crate::Vault`].

/// A tagged handle into a vault's internal slot table. Never carries raw
/// bytes itself — the storage is entirely the vault's business (software
/// slot table here; an HSM slot number in a hardware-backed vault).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecretHandle(pub(crate) u64);
