//! Errors the symmetric state and handshake engine can raise.

use core_vault::VaultError;

#[derive(Debug, thiserror::Error)]
pub enum NoiseError {
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error("handshake message has the wrong length or shape")]
    Malformed,
    #[error("handshake operation is not valid in the current stage")]
    WrongStage,
}
