// Frame layer
//
// Every message on the wire is a fixed 6-byte header, a one-byte payload
// length, the ASCII payload, and a one-byte checksum. `FrameCodec` plugs
// into `tokio_util::codec::Framed` so the session never touches raw buffers.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::error::{Error, ProtocolError};

/// Header prepended to every request sent to the device.
pub const REQUEST_HEADER: [u8; 6] = [0x02, 0xFD, 0xD0, 0xE0, 0x00, 0x00];

/// Fixed prefix of every response header. Byte 4 carries a flag byte.
const RESPONSE_PREFIX: [u8; 4] = [0x02, 0xFD, 0xE0, 0xD0];

/// Flag values the device is known to emit in byte 4 of a response header.
const RESPONSE_FLAGS: [u8; 5] = [0x00, 0x01, 0x02, 0x04, 0x08];

const HEADER_LEN: usize = 6;

/// Largest payload a single frame can carry (the length field is one byte).
pub const MAX_PAYLOAD: usize = 255;

/// Direction of a frame, determined by its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response { flags: u8 },
}

/// A decoded frame: direction plus the raw ASCII payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub direction: Direction,
    pub payload: Bytes,
}

impl Frame {
    /// Build a request frame around an ASCII payload.
    pub fn request(payload: impl Into<Bytes>) -> Self {
        Self {
            direction: Direction::Request,
            payload: payload.into(),
        }
    }

    /// Build a response frame (flags `0x00`) around an ASCII payload.
    pub fn response(payload: impl Into<Bytes>) -> Self {
        Self {
            direction: Direction::Response { flags: 0x00 },
            payload: payload.into(),
        }
    }

    /// Payload as UTF-8 text. The device only ever emits ASCII.
    pub fn text(&self) -> Result<&str, ProtocolError> {
        std::str::from_utf8(&self.payload).map_err(|_| ProtocolError::Malformed {
            reason: "payload is not ASCII".into(),
        })
    }

    fn header(&self) -> [u8; HEADER_LEN] {
        match self.direction {
            Direction::Request => REQUEST_HEADER,
            Direction::Response { flags } => [
                RESPONSE_PREFIX[0],
                RESPONSE_PREFIX[1],
                RESPONSE_PREFIX[2],
                RESPONSE_PREFIX[3],
                flags,
                0x00,
            ],
        }
    }
}

/// Checksum over header, length byte and payload.
///
/// For each byte `b`: `c ^= b; c ^= (b << 1) & 0xFF`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b ^ (b << 1))
}

fn classify_header(header: &[u8]) -> Result<Direction, ProtocolError> {
    if header == REQUEST_HEADER {
        return Ok(Direction::Request);
    }
    if header[..4] == RESPONSE_PREFIX && header[5] == 0x00 && RESPONSE_FLAGS.contains(&header[4])
    {
        return Ok(Direction::Response { flags: header[4] });
    }
    Err(ProtocolError::HeaderMismatch {
        header: header.to_vec(),
    })
}

/// Encode a frame into a standalone byte vector.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, Error> {
    let mut buf = BytesMut::new();
    FrameCodec::default().encode(frame.clone(), &mut buf)?;
    Ok(buf.to_vec())
}

/// Decode exactly one complete frame from a byte slice.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, Error> {
    let mut buf = BytesMut::from(bytes);
    let frame = FrameCodec::default()
        .decode(&mut buf)?
        .ok_or_else(|| ProtocolError::Malformed {
            reason: format!("incomplete frame ({} bytes)", bytes.len()),
        })?;
    if !buf.is_empty() {
        return Err(ProtocolError::Malformed {
            reason: format!("{} trailing bytes after frame", buf.len()),
        }
        .into());
    }
    Ok(frame)
}

/// `tokio_util` codec for the device frame format.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = frame.payload.len();
        let len_byte = u8::try_from(len)
            .ok()
            .filter(|l| *l > 0)
            .ok_or(Error::PayloadTooLong {
                len,
                max: MAX_PAYLOAD,
            })?;

        let start = dst.len();
        dst.reserve(HEADER_LEN + 2 + len);
        dst.put_slice(&frame.header());
        dst.put_u8(len_byte);
        dst.put_slice(&frame.payload);
        let sum = checksum(&dst[start..]);
        dst.put_u8(sum);

        trace!(payload = %String::from_utf8_lossy(&frame.payload), "encoded frame");
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN + 1 {
            return Ok(None);
        }

        let direction = classify_header(&src[..HEADER_LEN])?;
        let len = usize::from(src[HEADER_LEN]);
        if len == 0 {
            return Err(ProtocolError::Malformed {
                reason: "zero-length payload".into(),
            }
            .into());
        }

        let total = HEADER_LEN + 1 + len + 1;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let expected = checksum(&src[..total - 1]);
        let actual = src[total - 1];
        if expected != actual {
            // Drop the corrupt frame so a retry on a fresh session starts clean.
            src.advance(total);
            return Err(ProtocolError::ChecksumMismatch { expected, actual }.into());
        }

        let mut frame = src.split_to(total);
        frame.advance(HEADER_LEN + 1);
        frame.truncate(len);
        let payload = frame.freeze();

        trace!(payload = %String::from_utf8_lossy(&payload), "decoded frame");
        Ok(Some(Frame { direction, payload }))
    }
}
