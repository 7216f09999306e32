//! The channel's composed error type: every component error folded into one
//! enum the application sees, plus the channel's own taxonomy of failures.

use core_noise::NoiseError;
use core_transport::TransportError;
use core_vault::VaultError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Handshake(#[from] NoiseError),
    #[error(transparent)]
    Cipher(#[from] TransportError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("channel operation is not valid in the current state")]
    WrongState,
    #[error("onward/return route bytes other than 0x00 are not supported")]
    RouteUnsupported,
    #[error("peer sent a frame whose msg_type does not match the current state")]
    ProtocolViolation,
    #[error("frame header is malformed or truncated")]
    Malformed,
    #[error("plaintext does not fit in a single frame")]
    FrameTooLarge,
}
