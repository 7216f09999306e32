//! End-to-end scenarios exercising the vault, handshake, transport cipher
//! and channel framing together: a real handshake over an in-memory duplex
//! pipe, then transport-mode traffic.

use std::io::{self, Read, Write};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;

use core_vault::SoftwareVault;
use rand::Rng;
use secure_channel::{Channel, ChannelConfig, Error, PAYLOAD};

struct PipeReader(Receiver<u8>);
struct PipeWriter(Sender<u8>);

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        for (i, slot) in buf.iter_mut().enumerate() {
            match self.0.recv() {
                Ok(byte) => *slot = byte,
                Err(_) => return Ok(i),
            }
        }
        Ok(buf.len())
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &b in buf {
            self.0.send(b).map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn duplex_pair() -> ((PipeWriter, PipeReader), (PipeWriter, PipeReader)) {
    let (tx_i2r, rx_i2r) = channel();
    let (tx_r2i, rx_r2i) = channel();
    ((PipeWriter(tx_i2r), PipeReader(rx_r2i)), (PipeWriter(tx_r2i), PipeReader(rx_i2r)))
}

/// Happy path: 10,000 random plaintexts, sizes uniform in [1, 16384], sent
/// and received over a full handshake-then-transport channel.
#[test]
fn happy_path_random_transport() {
    let vault: &'static SoftwareVault = Box::leak(Box::new(SoftwareVault::new()));
    let ((init_w, init_r), (resp_w, resp_r)) = duplex_pair();

    let initiator = thread::spawn(move || {
        let mut ch = Channel::connect(ChannelConfig { vault, reader: init_r, writer: init_w, local_identity: None }).unwrap();
        let mut rng = rand::thread_rng();
        let mut sent = Vec::with_capacity(10_000);
        for _ in 0..10_000u32 {
            let len = rng.gen_range(1..=16_384usize.min(core_transport::MAX_FRAME - 32));
            let msg: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            ch.write(&msg).unwrap();
            sent.push(msg);
        }
        sent
    });

    let responder = thread::spawn(move || {
        let mut ch = Channel::accept(ChannelConfig { vault, reader: resp_r, writer: resp_w, local_identity: None }).unwrap();
        let mut received = Vec::with_capacity(10_000);
        let mut buf = vec![0u8; core_transport::MAX_FRAME];
        for _ in 0..10_000u32 {
            let n = ch.read(&mut buf).unwrap();
            received.push(buf[..n].to_vec());
        }
        received
    });

    let sent = initiator.join().unwrap();
    let received = responder.join().unwrap();
    assert_eq!(sent, received);
}

/// A flipped bit inside M2 must fail authentication and never reach
/// `Secure`, without the initiator or responder crashing.
#[test]
fn bitflip_during_m2_fails_authentication() {
    let vault = SoftwareVault::new();
    let si = vault.secret_generate(core_vault::SecretAttributes::x25519(core_vault::Persistence::Persistent)).unwrap();
    let si_pub = vault.secret_publickey_get(si).unwrap();
    let sr = vault.secret_generate(core_vault::SecretAttributes::x25519(core_vault::Persistence::Persistent)).unwrap();
    let sr_pub = vault.secret_publickey_get(sr).unwrap();

    let mut init = core_noise::Handshake::new_initiator(&vault, si, si_pub).unwrap();
    let mut resp = core_noise::Handshake::new_responder(&vault, sr, sr_pub).unwrap();

    let m1 = init.write_message1().unwrap();
    resp.read_message1(&m1).unwrap();
    let mut m2 = resp.write_message2().unwrap();
    m2[40] ^= 0x01;

    let err = init.read_message2(&m2).unwrap_err();
    assert!(matches!(err, core_noise::NoiseError::Vault(_)));
    assert!(init.is_failed());
    assert!(!init.is_secure());
}

/// Replaying an already-delivered frame must fail; with the default
/// "do not advance on failure" policy the channel recovers for the next
/// legitimate frame.
#[test]
fn replay_after_handshake_does_not_wedge_the_channel() {
    let vault = SoftwareVault::new();
    let si = vault.secret_generate(core_vault::SecretAttributes::x25519(core_vault::Persistence::Persistent)).unwrap();
    let sr = vault.secret_generate(core_vault::SecretAttributes::x25519(core_vault::Persistence::Persistent)).unwrap();
    let si_pub = vault.secret_publickey_get(si).unwrap();
    let sr_pub = vault.secret_publickey_get(sr).unwrap();

    let mut init = core_noise::Handshake::new_initiator(&vault, si, si_pub).unwrap();
    let mut resp = core_noise::Handshake::new_responder(&vault, sr, sr_pub).unwrap();
    let m1 = init.write_message1().unwrap();
    resp.read_message1(&m1).unwrap();
    let m2 = resp.write_message2().unwrap();
    init.read_message2(&m2).unwrap();
    let m3 = init.write_message3().unwrap();
    resp.read_message3(&m3).unwrap();

    let (i_tx, i_rx) = init.transport_keys().unwrap();
    let (r_tx, r_rx) = resp.transport_keys().unwrap();
    let mut sender = core_transport::TransportCipher::new(&vault, i_tx, i_rx);
    let mut receiver = core_transport::TransportCipher::new(&vault, r_tx, r_rx);

    let frame3 = sender.encrypt(b"frame 3").unwrap();
    let frame4 = sender.encrypt(b"frame 4").unwrap();
    let frame5 = sender.encrypt(b"frame 5").unwrap();
    let frame6 = sender.encrypt(b"frame 6").unwrap();

    assert_eq!(receiver.decrypt(&frame3).unwrap(), b"frame 3");
    assert_eq!(receiver.decrypt(&frame4).unwrap(), b"frame 4");
    assert_eq!(receiver.decrypt(&frame5).unwrap(), b"frame 5");

    // Resubmit frame 3: receiver expects nonce 3, frame3 was sealed under
    // nonce 0 — authentication fails.
    assert!(receiver.decrypt(&frame3).is_err());
    // Default policy does not burn the nonce on failure, so frame 6 still
    // decrypts correctly next.
    assert_eq!(receiver.decrypt(&frame6).unwrap(), b"frame 6");
}

/// Protocol confusion: the first frame claims `PAYLOAD` instead of
/// `REQUEST_CHANNEL`. The responder must reject it before deriving any key
/// material.
#[test]
fn protocol_confusion_on_first_frame() {
    let vault: &'static SoftwareVault = Box::leak(Box::new(SoftwareVault::new()));
    let ((mut init_w, _init_r), (_resp_w, resp_r)) = duplex_pair();

    // Hand-build a wire frame with msg_type = PAYLOAD where accept()
    // expects REQUEST_CHANNEL.
    let payload = b"not a handshake message";
    let mut frame = vec![0x01u8, 0x00, 0x00];
    frame.extend_from_slice(&((1 + payload.len()) as u16).to_be_bytes());
    frame.push(PAYLOAD);
    frame.extend_from_slice(payload);
    init_w.write_all(&frame).unwrap();

    let err = Channel::accept(ChannelConfig { vault, reader: resp_r, writer: Vec::new(), local_identity: None }).unwrap_err();
    assert!(matches!(err, Error::ProtocolViolation));
}

/// After `Secure`, each side's view of the peer's static key matches what
/// the peer actually holds: the channel's authentication guarantee.
#[test]
fn identity_exchange_matches() {
    let vault: &'static SoftwareVault = Box::leak(Box::new(SoftwareVault::new()));
    let ((init_w, init_r), (resp_w, resp_r)) = duplex_pair();

    let init_identity = vault.secret_generate(core_vault::SecretAttributes::x25519(core_vault::Persistence::Persistent)).unwrap();
    let init_identity_pub = vault.secret_publickey_get(init_identity).unwrap();
    let resp_identity = vault.secret_generate(core_vault::SecretAttributes::x25519(core_vault::Persistence::Persistent)).unwrap();
    let resp_identity_pub = vault.secret_publickey_get(resp_identity).unwrap();

    let initiator = thread::spawn(move || {
        let ch = Channel::connect(ChannelConfig { vault, reader: init_r, writer: init_w, local_identity: Some(init_identity) }).unwrap();
        let mut ch = ch;
        ch.write(b"x").unwrap();
        ch.peer_static()
    });

    let responder = thread::spawn(move || {
        let mut ch = Channel::accept(ChannelConfig { vault, reader: resp_r, writer: resp_w, local_identity: Some(resp_identity) }).unwrap();
        let mut buf = [0u8; 8];
        ch.read(&mut buf).unwrap();
        ch.peer_static()
    });

    let init_sees = initiator.join().unwrap();
    let resp_sees = responder.join().unwrap();
    assert_eq!(init_sees, Some(resp_identity_pub));
    assert_eq!(resp_sees, Some(init_identity_pub));
}
