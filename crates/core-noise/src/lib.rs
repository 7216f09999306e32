//! Noise symmetric state and the XX handshake engine.

mod error;
mod handshake;
mod symmetric;

pub use error::NoiseError;
pub use handshake::{Handshake, InitiatorStage, ResponderStage, Stage};
pub use symmetric::SymmetricState;
