//! The Noise XX handshake engine: three messages, mutual authentication,
//! terminating in a pair of transport keys.

use core_vault::{Persistence, SecretAttributes, SecretHandle, Vault};

use crate::error::NoiseError;
use crate::symmetric::SymmetricState;

const PROTOCOL_NAME: &[u8] = b"Noise_XX_25519_AESGCM_SHA256";

/// Where an [`Initiator`](Stage::Initiator) handshake is in its 3-message
/// schedule. A tagged variant in place of a free-floating stage integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatorStage {
    AwaitingWriteM1,
    AwaitingReadM2,
    AwaitingWriteM3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderStage {
    AwaitingReadM1,
    AwaitingWriteM2,
    AwaitingReadM3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Initiator(InitiatorStage),
    Responder(ResponderStage),
    Secure,
    Failed,
}

/// One handshake context, for one role, on one connection.
pub struct Handshake<'v, V: Vault> {
    vault: &'v V,
    sym: Option<SymmetricState<'v, V>>,
    s: SecretHandle,
    s_pub: [u8; 32],
    e: Option<SecretHandle>,
    rs: Option<[u8; 32]>,
    re: Option<[u8; 32]>,
    stage: Stage,
    transport: Option<(SecretHandle, SecretHandle)>,
    e_override: Option<SecretHandle>,
}

impl<'v, V: Vault> Handshake<'v, V> {
    pub fn new_initiator(vault: &'v V, s: SecretHandle, s_pub: [u8; 32]) -> Result<Self, NoiseError> {
        Ok(Self {
            vault,
            sym: Some(SymmetricState::new(vault, PROTOCOL_NAME)?),
            s,
            s_pub,
            e: None,
            rs: None,
            re: None,
            stage: Stage::Initiator(InitiatorStage::AwaitingWriteM1),
            transport: None,
            e_override: None,
        })
    }

    pub fn new_responder(vault: &'v V, s: SecretHandle, s_pub: [u8; 32]) -> Result<Self, NoiseError> {
        Ok(Self {
            vault,
            sym: Some(SymmetricState::new(vault, PROTOCOL_NAME)?),
            s,
            s_pub,
            e: None,
            rs: None,
            re: None,
            stage: Stage::Responder(ResponderStage::AwaitingReadM1),
            transport: None,
            e_override: None,
        })
    }

    /// Force the next ephemeral key generated (in `write_message1` or
    /// `write_message2`) to be `e` instead of a freshly random one. For
    /// tests only, mirroring how the static key `s` is already supplied by
    /// the caller rather than always generated internally.
    pub fn set_forced_ephemeral(&mut self, e: SecretHandle) {
        self.e_override = Some(e);
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_secure(&self) -> bool {
        matches!(self.stage, Stage::Secure)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.stage, Stage::Failed)
    }

    /// `(k_send, k_recv)` once `Secure`.
    pub fn transport_keys(&self) -> Option<(SecretHandle, SecretHandle)> {
        self.transport
    }

    /// The peer's long-term static public key, available once `Secure`.
    pub fn peer_static(&self) -> Option<[u8; 32]> {
        self.rs
    }

    fn sym_mut(&mut self) -> &mut SymmetricState<'v, V> {
        self.sym.as_mut().expect("symmetric state present while not Secure/Failed")
    }

    fn generate_ephemeral(&mut self) -> Result<[u8; 32], NoiseError> {
        let e = match self.e_override.take() {
            Some(e) => e,
            None => self.vault.secret_generate(SecretAttributes::x25519(Persistence::Ephemeral))?,
        };
        let e_pub = self.vault.secret_publickey_get(e)?;
        self.e = Some(e);
        Ok(e_pub)
    }

    fn fail(&mut self, err: NoiseError) -> NoiseError {
        self.cleanup();
        err
    }

    fn cleanup(&mut self) {
        if let Some(e) = self.e.take() {
            self.vault.secret_destroy(e).ok();
        }
        if let Some(sym) = self.sym.take() {
            sym.destroy();
        }
        self.stage = Stage::Failed;
    }

    /// Force the context to `Failed` and release any held secrets, for a
    /// caller (the channel) that detected a protocol violation above this
    /// layer rather than receiving a [`NoiseError`] from one of its methods.
    /// A no-op once already `Secure` or `Failed`.
    pub fn abort(&mut self) {
        if !matches!(self.stage, Stage::Secure | Stage::Failed) {
            self.cleanup();
        }
    }

    /// Initiator, message 1: `-> e`.
    pub fn write_message1(&mut self) -> Result<Vec<u8>, NoiseError> {
        if self.stage != Stage::Initiator(InitiatorStage::AwaitingWriteM1) {
            return Err(NoiseError::WrongStage);
        }
        match self.write_message1_inner() {
            Ok(out) => {
                self.stage = Stage::Initiator(InitiatorStage::AwaitingReadM2);
                Ok(out)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn write_message1_inner(&mut self) -> Result<Vec<u8>, NoiseError> {
        let e_pub = self.generate_ephemeral()?;
        self.sym_mut().mix_hash(&e_pub)?;
        self.sym_mut().mix_hash(&[])?;
        Ok(e_pub.to_vec())
    }

    /// Responder, message 1: `<- e`.
    pub fn read_message1(&mut self, msg: &[u8]) -> Result<(), NoiseError> {
        if self.stage != Stage::Responder(ResponderStage::AwaitingReadM1) {
            return Err(NoiseError::WrongStage);
        }
        match self.read_message1_inner(msg) {
            Ok(()) => {
                self.stage = Stage::Responder(ResponderStage::AwaitingWriteM2);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn read_message1_inner(&mut self, msg: &[u8]) -> Result<(), NoiseError> {
        if msg.len() != 32 {
            return Err(NoiseError::Malformed);
        }
        let re: [u8; 32] = msg.try_into().unwrap();
        self.sym_mut().mix_hash(&re)?;
        self.sym_mut().mix_hash(&[])?;
        self.re = Some(re);
        Ok(())
    }

    /// Responder, message 2: `<- e, ee, s, es`.
    pub fn write_message2(&mut self) -> Result<Vec<u8>, NoiseError> {
        if self.stage != Stage::Responder(ResponderStage::AwaitingWriteM2) {
            return Err(NoiseError::WrongStage);
        }
        match self.write_message2_inner() {
            Ok(out) => {
                self.stage = Stage::Responder(ResponderStage::AwaitingReadM3);
                Ok(out)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn write_message2_inner(&mut self) -> Result<Vec<u8>, NoiseError> {
        let re = self.re.expect("re set by read_message1");
        let e_pub = self.generate_ephemeral()?;
        self.sym_mut().mix_hash(&e_pub)?;

        let ee = self.vault.ecdh(self.e.expect("just generated"), &re)?;
        self.sym_mut().mix_key(ee)?;

        let c_s = self.sym_mut().encrypt_and_hash(&self.s_pub)?;

        let es = self.vault.ecdh(self.s, &re)?;
        self.sym_mut().mix_key(es)?;

        let c_payload = self.sym_mut().encrypt_and_hash(&[])?;

        let mut out = Vec::with_capacity(32 + c_s.len() + c_payload.len());
        out.extend_from_slice(&e_pub);
        out.extend_from_slice(&c_s);
        out.extend_from_slice(&c_payload);
        Ok(out)
    }

    /// Initiator, message 2 (read): `<- e, ee, s, es`.
    pub fn read_message2(&mut self, msg: &[u8]) -> Result<(), NoiseError> {
        if self.stage != Stage::Initiator(InitiatorStage::AwaitingReadM2) {
            return Err(NoiseError::WrongStage);
        }
        match self.read_message2_inner(msg) {
            Ok(()) => {
                self.stage = Stage::Initiator(InitiatorStage::AwaitingWriteM3);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn read_message2_inner(&mut self, msg: &[u8]) -> Result<(), NoiseError> {
        if msg.len() != 32 + 48 + 16 {
            return Err(NoiseError::Malformed);
        }
        let re: [u8; 32] = msg[..32].try_into().unwrap();
        self.sym_mut().mix_hash(&re)?;
        self.re = Some(re);

        let e = self.e.expect("set by write_message1");
        let ee = self.vault.ecdh(e, &re)?;
        self.sym_mut().mix_key(ee)?;

        let s_peer = self.sym_mut().decrypt_and_hash(&msg[32..80])?;
        let rs: [u8; 32] = s_peer.as_slice().try_into().map_err(|_| NoiseError::Malformed)?;
        self.rs = Some(rs);

        let es = self.vault.ecdh(e, &rs)?;
        self.sym_mut().mix_key(es)?;

        self.sym_mut().decrypt_and_hash(&msg[80..96])?;
        Ok(())
    }

    /// Initiator, message 3 (write): `-> s, se`.
    pub fn write_message3(&mut self) -> Result<Vec<u8>, NoiseError> {
        if self.stage != Stage::Initiator(InitiatorStage::AwaitingWriteM3) {
            return Err(NoiseError::WrongStage);
        }
        match self.write_message3_inner() {
            Ok(out) => {
                self.stage = Stage::Secure;
                Ok(out)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn write_message3_inner(&mut self) -> Result<Vec<u8>, NoiseError> {
        let re = self.re.expect("set by read_message2");
        let c_s = self.sym_mut().encrypt_and_hash(&self.s_pub)?;

        let se = self.vault.ecdh(self.s, &re)?;
        self.sym_mut().mix_key(se)?;

        let c_payload = self.sym_mut().encrypt_and_hash(&[])?;

        let mut out = Vec::with_capacity(c_s.len() + c_payload.len());
        out.extend_from_slice(&c_s);
        out.extend_from_slice(&c_payload);

        let sym = self.sym.take().expect("present until Secure/Failed");
        let (k1, k2) = sym.split()?;
        self.transport = Some((k1, k2));
        if let Some(e) = self.e.take() {
            self.vault.secret_destroy(e).ok();
        }
        Ok(out)
    }

    /// Responder, message 3 (read): `-> s, se`.
    pub fn read_message3(&mut self, msg: &[u8]) -> Result<(), NoiseError> {
        if self.stage != Stage::Responder(ResponderStage::AwaitingReadM3) {
            return Err(NoiseError::WrongStage);
        }
        match self.read_message3_inner(msg) {
            Ok(()) => {
                self.stage = Stage::Secure;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn read_message3_inner(&mut self, msg: &[u8]) -> Result<(), NoiseError> {
        if msg.len() != 48 + 16 {
            return Err(NoiseError::Malformed);
        }
        let s_peer = self.sym_mut().decrypt_and_hash(&msg[..48])?;
        let rs: [u8; 32] = s_peer.as_slice().try_into().map_err(|_| NoiseError::Malformed)?;
        self.rs = Some(rs);

        let e = self.e.expect("set by write_message2");
        let se = self.vault.ecdh(e, &rs)?;
        self.sym_mut().mix_key(se)?;

        self.sym_mut().decrypt_and_hash(&msg[48..64])?;

        let sym = self.sym.take().expect("present until Secure/Failed");
        let (k1, k2) = sym.split()?;
        // responder's orientation mirrors the initiator's: tx=k2, rx=k1.
        self.transport = Some((k2, k1));
        if let Some(e) = self.e.take() {
            self.vault.secret_destroy(e).ok();
        }
        Ok(())
    }
}
