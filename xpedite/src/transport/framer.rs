//! Length-prefixed frame codec.
//!
//! Every frame on the wire is a `u32` little-endian length followed by
//! that many bytes of UTF-8. Requests travel as bare payloads; responses
//! carry one leading status byte inside the payload: `0x00` for a value,
//! `0x01` for an error, followed by the string.

use crate::request::Response;
use std::io::{self, Read, Write};

/// Response payload status byte: the string that follows is a value.
pub const STATUS_OK: u8 = 0x00;
/// Response payload status byte: the string that follows is an error.
pub const STATUS_ERROR: u8 = 0x01;

/// Frames longer than this are treated as framing corruption and end the
/// connection.
pub const MAX_FRAME_BYTES: usize = 1 << 20;

/// Outcome of a non-blocking read pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// Connection still open; zero or more frames may now be assembled.
    Open,
    /// Peer closed the connection or the stream failed.
    Closed,
}

/// Incremental frame assembler over a non-blocking stream.
///
/// Bytes accumulate across poll ticks until a full frame is available;
/// an incomplete frame is simply retried on the next tick.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull whatever the stream has ready. Returns `Closed` on EOF or a
    /// hard error; `WouldBlock` is a normal empty pass.
    pub fn fill(&mut self, stream: &mut impl Read) -> ReadState {
        let mut chunk = [0u8; 4096];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => return ReadState::Closed,
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return ReadState::Open,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => return ReadState::Closed,
            }
        }
    }

    /// Pop the next complete frame payload, if one has been assembled.
    ///
    /// # Errors
    /// A declared length beyond [`MAX_FRAME_BYTES`] is framing corruption.
    pub fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_le_bytes(self.buf[..4].try_into().unwrap()) as usize;
        if len > MAX_FRAME_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame length {len} exceeds limit"),
            ));
        }
        if self.buf.len() < 4 + len {
            return Ok(None);
        }
        let payload = self.buf[4..4 + len].to_vec();
        self.buf.drain(..4 + len);
        Ok(Some(payload))
    }
}

/// Write one frame: length prefix plus payload, in a single write call.
pub fn write_frame(stream: &mut impl Write, payload: &[u8]) -> io::Result<()> {
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    stream.write_all(&frame)
}

/// Write a response frame with its status byte.
pub fn write_response(stream: &mut impl Write, response: &Response) -> io::Result<()> {
    let (status, text) = match response {
        Response::Value(value) => (STATUS_OK, value.as_str()),
        Response::Error(error) => (STATUS_ERROR, error.as_str()),
    };
    let mut payload = Vec::with_capacity(1 + text.len());
    payload.push(status);
    payload.extend_from_slice(text.as_bytes());
    write_frame(stream, &payload)
}

/// Blocking read of one full frame. Used by clients of the protocol, not
/// by the server poll loop.
pub fn read_frame(stream: &mut impl Read) -> io::Result<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {len} exceeds limit"),
        ));
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_round_trip() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"Ping").unwrap();

        let mut reader = FrameReader::new();
        reader.buf.extend_from_slice(&wire);
        assert_eq!(reader.next_frame().unwrap(), Some(b"Ping".to_vec()));
        assert_eq!(reader.next_frame().unwrap(), None);
    }

    #[test]
    fn test_partial_frame_waits() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"ListProbes").unwrap();

        let mut reader = FrameReader::new();
        reader.buf.extend_from_slice(&wire[..6]);
        assert_eq!(reader.next_frame().unwrap(), None);
        reader.buf.extend_from_slice(&wire[6..]);
        assert_eq!(reader.next_frame().unwrap(), Some(b"ListProbes".to_vec()));
    }

    #[test]
    fn test_zero_length_frame_is_empty_payload() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"").unwrap();

        let mut reader = FrameReader::new();
        reader.buf.extend_from_slice(&wire);
        assert_eq!(reader.next_frame().unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_oversized_frame_is_corruption() {
        let mut reader = FrameReader::new();
        reader.buf.extend_from_slice(&(MAX_FRAME_BYTES as u32 + 1).to_le_bytes());
        assert!(reader.next_frame().is_err());
    }

    #[test]
    fn test_response_status_bytes() {
        let mut wire = Vec::new();
        write_response(&mut wire, &Response::Value("ok".to_string())).unwrap();
        assert_eq!(wire[4], STATUS_OK);
        assert_eq!(&wire[5..], b"ok");

        let mut wire = Vec::new();
        write_response(&mut wire, &Response::Error("boom".to_string())).unwrap();
        assert_eq!(wire[4], STATUS_ERROR);
        assert_eq!(&wire[5..], b"boom");
    }
}
