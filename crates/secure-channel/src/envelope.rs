//! The wire envelope wrapping every handshake and payload message:
//! version byte, two route placeholders, a 15-bit length, a `msg_type`
//! tag, then the (possibly encrypted) payload.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error;
use crate::io::{Reader, Writer};
use core_transport::MAX_FRAME;

const VERSION: u8 = 0x01;
const ROUTE_EMPTY: u8 = 0x00;

pub const REQUEST_CHANNEL: u8 = 0x01;
pub const KEY_AGREEMENT_M2: u8 = 0x02;
pub const KEY_AGREEMENT_M3: u8 = 0x03;
pub const PAYLOAD: u8 = 0x10;
pub const PING: u8 = 0x20;

const HEADER_LEN: usize = 5; // version, onward, return, len_hi, len_lo

pub fn write_frame(writer: &mut impl Writer, msg_type: u8, payload: &[u8]) -> Result<(), Error> {
    let body_len = 1 + payload.len();
    if body_len > MAX_FRAME {
        return Err(Error::FrameTooLarge);
    }
    let mut out = BytesMut::with_capacity(HEADER_LEN + body_len);
    out.put_u8(VERSION);
    out.put_u8(ROUTE_EMPTY);
    out.put_u8(ROUTE_EMPTY);
    out.put_u16(body_len as u16);
    out.put_u8(msg_type);
    out.extend_from_slice(payload);
    writer.write_all(&out.freeze())?;
    Ok(())
}

pub fn read_frame(reader: &mut impl Reader) -> Result<(u8, Vec<u8>), Error> {
    let mut header_buf = [0u8; HEADER_LEN];
    reader.read_exact(&mut header_buf)?;
    let mut header = &header_buf[..];
    if header.get_u8() != VERSION {
        return Err(Error::Malformed);
    }
    let onward = header.get_u8();
    let return_route = header.get_u8();
    if onward != ROUTE_EMPTY || return_route != ROUTE_EMPTY {
        return Err(Error::RouteUnsupported);
    }
    let body_len = header.get_u16() as usize;
    if body_len == 0 || body_len > MAX_FRAME {
        return Err(Error::Malformed);
    }
    let mut body = BytesMut::zeroed(body_len);
    reader.read_exact(&mut body)?;
    let mut body = body.freeze();
    let msg_type = body.get_u8();
    let payload = body.to_vec();
    Ok((msg_type, payload))
}
