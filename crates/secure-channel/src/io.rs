//! The `Reader`/`Writer` capabilities the channel is built on, and the
//! pair it in turn exposes to the application. Rust-idiomatic replacement
//! for the C `ockam_reader_t`/`ockam_writer_t` function-pointer structs:
//! small traits with a blanket impl over `std::io::{Read, Write}` so any
//! `TcpStream`, in-memory pipe, or test double works without adaptation.

use std::io;

pub trait Reader {
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;
}

pub trait Writer {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
}

impl<T: io::Read> Reader for T {
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        io::Read::read_exact(self, buf)
    }
}

impl<T: io::Write> Writer for T {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        io::Write::write_all(self, buf)
    }
}
