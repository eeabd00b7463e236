//! Framed codec for the channel wire format.
//!
//! Each message is a varint length prefix followed by exactly that many UTF-8
//! bytes, no terminator. The prefix is 7 bits per byte, high bit set on all
//! but the final byte, accumulated little-endian — the string convention of
//! common binary-writer/reader pairs. The existing peer speaks this format,
//! so it must not be swapped for a fixed-width length field.

use std::io;

use tokio_util::bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Longest valid prefix. Five bytes encode 35 bits of length, more than any
/// frame the size limit admits.
const MAX_PREFIX_LEN: usize = 5;

/// Codec for length-prefixed UTF-8 text frames.
///
/// Works over any AsyncRead/AsyncWrite via `FramedRead`/`FramedWrite`.
pub struct TextCodec {
    max_frame_len: usize,
}

impl TextCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }
}

fn put_varint(dst: &mut BytesMut, mut value: usize) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            dst.put_u8(byte);
            return;
        }
        dst.put_u8(byte | 0x80);
    }
}

/// Parses a length prefix from the front of `src` without consuming it.
/// Returns `None` until the prefix is complete, then `(length, prefix_len)`.
fn read_varint(src: &[u8]) -> io::Result<Option<(u64, usize)>> {
    let mut len: u64 = 0;
    for (i, &byte) in src.iter().enumerate() {
        if i >= MAX_PREFIX_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "length prefix exceeds 5 bytes",
            ));
        }
        len |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((len, i + 1)));
        }
    }
    Ok(None)
}

impl Decoder for TextCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        let (declared, prefix_len) = match read_varint(src)? {
            Some(prefix) => prefix,
            None => return Ok(None),
        };

        if declared > self.max_frame_len as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "frame length {} exceeds limit {}",
                    declared, self.max_frame_len
                ),
            ));
        }
        let declared = declared as usize;

        if src.len() < prefix_len + declared {
            src.reserve(prefix_len + declared - src.len());
            return Ok(None);
        }

        src.advance(prefix_len);
        let payload = src.split_to(declared);
        let text = String::from_utf8(payload.to_vec())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(text))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            // Stream ended inside a prefix or payload: a closed connection,
            // never a partial message.
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed mid-frame",
            )),
        }
    }
}

impl Encoder<&str> for TextCodec {
    type Error = io::Error;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<(), io::Error> {
        let bytes = item.as_bytes();
        if bytes.len() > self.max_frame_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "message of {} bytes exceeds frame limit {}",
                    bytes.len(),
                    self.max_frame_len
                ),
            ));
        }
        tracing::trace!(frame_size_bytes = bytes.len(), "Encoding frame");
        dst.reserve(MAX_PREFIX_LEN + bytes.len());
        put_varint(dst, bytes.len());
        dst.extend_from_slice(bytes);
        Ok(())
    }
}

impl Encoder<String> for TextCodec {
    type Error = io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), io::Error> {
        self.encode(item.as_str(), dst)
    }
}
