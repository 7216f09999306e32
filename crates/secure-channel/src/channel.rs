//! The channel state machine: drives an embedded [`Handshake`] to
//! `Secure`, then hands application bytes to a [`TransportCipher`],
//! wrapping every message on the wire in the envelope from [`crate::envelope`].

use core_noise::{Handshake, InitiatorStage, ResponderStage, Stage};
use core_transport::TransportCipher;
use core_vault::{Persistence, SecretAttributes, SecretHandle, Vault};
use tracing::{instrument, warn};

use crate::envelope::{read_frame, write_frame, KEY_AGREEMENT_M2, KEY_AGREEMENT_M3, PAYLOAD, PING, REQUEST_CHANNEL};
use crate::error::Error;
use crate::io::{Reader, Writer};

/// Configuration for [`Channel::connect`]/[`Channel::accept`].
/// `local_identity` lets the caller supply a persistent static key; when
/// absent the vault generates one.
pub struct ChannelConfig<'v, V: Vault, R, W> {
    pub vault: &'v V,
    pub reader: R,
    pub writer: W,
    pub local_identity: Option<SecretHandle>,
}

fn static_keypair<V: Vault>(vault: &V, supplied: Option<SecretHandle>) -> Result<(SecretHandle, [u8; 32]), Error> {
    let s = match supplied {
        Some(s) => s,
        None => vault.secret_generate(SecretAttributes::x25519(Persistence::Persistent))?,
    };
    let s_pub = vault.secret_publickey_get(s)?;
    Ok((s, s_pub))
}

/// One secure channel, bound to a transport `Reader`/`Writer` pair. Not
/// `Send`/`Sync`: a channel is single-threaded cooperative, never shared
/// across threads.
pub struct Channel<'v, V: Vault, R, W> {
    vault: &'v V,
    reader: R,
    writer: W,
    hs: Option<Handshake<'v, V>>,
    cipher: Option<TransportCipher<'v, V>>,
    peer_static: Option<[u8; 32]>,
    failed: bool,
    /// Decrypted bytes from a frame that didn't fit in the caller's `read`
    /// buffer, served to the next call before any new frame is read.
    pending: Vec<u8>,
}

impl<'v, V: Vault, R: Reader, W: Writer> Channel<'v, V, R, W> {
    /// Initiator role: build the context, run the prologue, and write `M1`.
    #[instrument(skip_all)]
    pub fn connect(config: ChannelConfig<'v, V, R, W>) -> Result<Self, Error> {
        let ChannelConfig { vault, mut reader, mut writer, local_identity } = config;
        let (s, s_pub) = static_keypair(vault, local_identity)?;
        let mut hs = Handshake::new_initiator(vault, s, s_pub)?;
        let m1 = hs.write_message1()?;
        if let Err(e) = write_frame(&mut writer, REQUEST_CHANNEL, &m1) {
            hs.abort();
            return Err(e);
        }
        Ok(Self { vault, reader, writer, hs: Some(hs), cipher: None, peer_static: None, failed: false, pending: Vec::new() })
    }

    /// Responder role: build the context, read `M1`, and write `M2`.
    #[instrument(skip_all)]
    pub fn accept(config: ChannelConfig<'v, V, R, W>) -> Result<Self, Error> {
        let ChannelConfig { vault, mut reader, mut writer, local_identity } = config;
        let (s, s_pub) = static_keypair(vault, local_identity)?;
        let mut hs = Handshake::new_responder(vault, s, s_pub)?;
        let run = || -> Result<(), Error> {
            let (msg_type, payload) = read_frame(&mut reader)?;
            if msg_type != REQUEST_CHANNEL {
                return Err(Error::ProtocolViolation);
            }
            hs.read_message1(&payload)?;
            let m2 = hs.write_message2()?;
            write_frame(&mut writer, KEY_AGREEMENT_M2, &m2)?;
            Ok(())
        };
        if let Err(e) = run() {
            hs.abort();
            warn!(error = %e, "channel accept failed during prologue");
            return Err(e);
        }
        Ok(Self { vault, reader, writer, hs: Some(hs), cipher: None, peer_static: None, failed: false, pending: Vec::new() })
    }

    /// The peer's long-term static public key, available once `Secure`.
    pub fn peer_static(&self) -> Option<[u8; 32]> {
        self.peer_static
    }

    pub fn is_secure(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    fn fail(&mut self, err: Error) -> Error {
        self.failed = true;
        if let Some(hs) = self.hs.as_mut() {
            hs.abort();
        }
        self.hs = None;
        if let Some(cipher) = self.cipher.take() {
            cipher.destroy();
        }
        warn!(error = %err, "channel entering Failed state");
        err
    }

    /// Drive any remaining handshake reads/writes; a no-op once `Secure`.
    #[instrument(skip_all)]
    fn ensure_secure(&mut self) -> Result<(), Error> {
        if self.failed {
            return Err(Error::WrongState);
        }
        let stage = match self.hs.as_ref() {
            Some(hs) => hs.stage(),
            None => return Ok(()),
        };
        let result = match stage {
            Stage::Initiator(InitiatorStage::AwaitingReadM2) => self.drive_initiator_tail(),
            Stage::Responder(ResponderStage::AwaitingReadM3) => self.drive_responder_tail(),
            Stage::Secure => {
                self.finish_handshake();
                Ok(())
            }
            _ => Err(Error::WrongState),
        };
        result.map_err(|e| self.fail(e))
    }

    fn drive_initiator_tail(&mut self) -> Result<(), Error> {
        let (msg_type, payload) = read_frame(&mut self.reader)?;
        if msg_type != KEY_AGREEMENT_M2 {
            return Err(Error::ProtocolViolation);
        }
        let hs = self.hs.as_mut().expect("present in this stage");
        hs.read_message2(&payload)?;
        let m3 = hs.write_message3()?;
        write_frame(&mut self.writer, KEY_AGREEMENT_M3, &m3)?;
        self.finish_handshake();
        Ok(())
    }

    fn drive_responder_tail(&mut self) -> Result<(), Error> {
        let (msg_type, payload) = read_frame(&mut self.reader)?;
        if msg_type != KEY_AGREEMENT_M3 {
            return Err(Error::ProtocolViolation);
        }
        let hs = self.hs.as_mut().expect("present in this stage");
        hs.read_message3(&payload)?;
        self.finish_handshake();
        Ok(())
    }

    fn finish_handshake(&mut self) {
        let hs = self.hs.take().expect("called only once, from ensure_secure");
        self.peer_static = hs.peer_static();
        let (tx, rx) = hs.transport_keys().expect("Secure implies Split has run");
        self.cipher = Some(TransportCipher::new(self.vault, tx, rx));
    }

    /// Encrypt and send one application message as a `PAYLOAD` frame.
    #[instrument(skip_all, fields(len = buf.len()))]
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        self.ensure_secure()?;
        let ct = {
            let cipher = self.cipher.as_mut().expect("ensure_secure leaves a cipher on success");
            cipher.encrypt(buf).map_err(Error::from)
        };
        let ct = ct.map_err(|e| self.fail(e))?;
        write_frame(&mut self.writer, PAYLOAD, &ct).map_err(|e| self.fail(e))?;
        Ok(buf.len())
    }

    /// Read one application message. `PING` frames are consumed silently
    /// and never surfaced. If a prior frame decrypted to more bytes than
    /// `buf` could hold, the leftover is served first and no new frame is
    /// read; otherwise the call blocks until a `PAYLOAD` frame arrives.
    #[instrument(skip_all)]
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        self.ensure_secure()?;
        if !self.pending.is_empty() {
            let n = self.pending.len().min(buf.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            return Ok(n);
        }
        loop {
            let (msg_type, payload) = read_frame(&mut self.reader).map_err(|e| self.fail(e))?;
            match msg_type {
                PING => continue,
                PAYLOAD => {
                    let pt = {
                        let cipher = self.cipher.as_mut().expect("ensure_secure leaves a cipher on success");
                        cipher.decrypt(&payload).map_err(Error::from)
                    };
                    let mut pt = pt.map_err(|e| self.fail(e))?;
                    let n = pt.len().min(buf.len());
                    buf[..n].copy_from_slice(&pt[..n]);
                    if n < pt.len() {
                        self.pending = pt.split_off(n);
                    }
                    return Ok(n);
                }
                _ => return Err(self.fail(Error::ProtocolViolation)),
            }
        }
    }

    /// Destroy every held secret and release the channel. Inner resources
    /// (handshake/transport secrets) before outer (reader/writer), matching
    /// the teardown order of the C original.
    pub fn deinit(mut self) {
        if let Some(hs) = self.hs.as_mut() {
            hs.abort();
        }
        if let Some(cipher) = self.cipher.take() {
            cipher.destroy();
        }
    }
}
