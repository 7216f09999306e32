//! The channel framing layer: the sole public surface of this core.
//! Wraps the XX handshake and transport cipher in a wire envelope and
//! drives the Idle -> handshake -> Secure state transitions.

mod channel;
mod envelope;
mod error;
mod io;

pub use channel::{Channel, ChannelConfig};
pub use envelope::{KEY_AGREEMENT_M2, KEY_AGREEMENT_M3, PAYLOAD, PING, REQUEST_CHANNEL};
pub use error::Error;
pub use io::{Reader, Writer};
