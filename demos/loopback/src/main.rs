//! Drives a `connect()`/`accept()` pair over an in-memory duplex pipe and
//! exchanges a few application messages, printing the transcript.

use std::io::{self, Read, Write};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;

use core_vault::SoftwareVault;
use secure_channel::{Channel, ChannelConfig};

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

fn main() {
    tracing_subscriber::fmt::init();

    let vault = SoftwareVault::new();
    let vault: &'static SoftwareVault = Box::leak(Box::new(vault));
    let ((init_w, init_r), (resp_w, resp_r)) = duplex_pair();

    let initiator = thread::spawn(move || {
        let mut ch = Channel::connect(ChannelConfig { vault, reader: init_r, writer: init_w, local_identity: None })
            .expect("initiator handshake");
        ch.write(b"ping").expect("send ping");
        let mut buf = [0u8; 256];
        let n = ch.read(&mut buf).expect("recv pong");
        println!("initiator received: {:?}", String::from_utf8_lossy(&buf[..n]));
        ch.deinit();
    });

    let responder = thread::spawn(move || {
        let mut ch = Channel::accept(ChannelConfig { vault, reader: resp_r, writer: resp_w, local_identity: None })
            .expect("responder handshake");
        let mut buf = [0u8; 256];
        let n = ch.read(&mut buf).expect("recv ping");
        println!("responder received: {:?}", String::from_utf8_lossy(&buf[..n]));
        ch.write(b"pong").expect("send pong");
        ch.deinit();
    });

    initiator.join().expect("initiator thread");
    responder.join().expect("responder thread");
}
