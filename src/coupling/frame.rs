//! Length-prefixed stream framing.
//!
//! # Wire format
//!
//! ```text
//! [4-byte big-endian length][body]
//! ```
//!
//! Every command tag and every message body travels as its own frame. The
//! body bytes are produced by the codec in [`protocol`](super::protocol).

use std::io::{self, Read, Write};
use thiserror::Error;

/// Maximum accepted frame size.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Errors from framing operations.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("frame too large: {0} bytes")]
    TooLarge(usize),

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("cannot encode body: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("cannot decode body: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// Writes `data` as one length-prefixed frame. The caller flushes.
pub fn write_frame<W: Write + ?Sized>(stream: &mut W, data: &[u8]) -> io::Result<()> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame too large: {} bytes", data.len()),
        ));
    }
    let len = data.len() as u32;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(data)
}

/// Reads one length-prefixed frame.
pub fn read_frame<R: Read + ?Sized>(stream: &mut R, max_size: usize) -> Result<Vec<u8>, FrameError> {
    let len = read_frame_len(stream, max_size)?;
    let mut data = vec![0u8; len];
    stream.read_exact(&mut data)?;
    Ok(data)
}

/// Reads the 4-byte length prefix and validates it against `max_size`.
pub fn read_frame_len<R: Read + ?Sized>(stream: &mut R, max_size: usize) -> Result<usize, FrameError> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len > max_size {
        return Err(FrameError::TooLarge(len));
    }

    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_write_read_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();
        write_frame(&mut buf, b"").unwrap();
        assert_eq!(&buf[..4], &5u32.to_be_bytes());

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor, MAX_FRAME_SIZE).unwrap(), b"hello");
        assert!(read_frame(&mut cursor, MAX_FRAME_SIZE).unwrap().is_empty());
    }

    #[test]
    fn test_read_frame_too_large() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &[0u8; 64]).unwrap();
        let mut cursor = Cursor::new(buf);
        let result = read_frame(&mut cursor, 16);
        assert!(matches!(result, Err(FrameError::TooLarge(64))));
    }

    #[test]
    fn test_read_frame_empty_stream() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let result = read_frame(&mut cursor, MAX_FRAME_SIZE);
        assert!(matches!(result, Err(FrameError::Io(_))));
    }

    #[test]
    fn test_read_frame_truncated_body() {
        let mut buf = 1000u32.to_be_bytes().to_vec();
        buf.extend_from_slice(&[0u8; 10]);
        let mut cursor = Cursor::new(buf);
        let result = read_frame(&mut cursor, MAX_FRAME_SIZE);
        assert!(matches!(result, Err(FrameError::Io(_))));
    }
}
