//! Incremental netstring framing.
//!
//! A stream is a sequence of `<length>:<payload>,` frames. The decoder keeps
//! the bytes of a partially received frame between calls, so it can be fed
//! from a socket in arbitrary chunks.

use crate::message::WireError;

/// Upper bound on a single frame payload. A peer announcing a longer frame
/// has lost framing (or is hostile) and the stream cannot be resynchronized.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Wrap a payload in a netstring frame.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let prefix = payload.len().to_string();
    let mut out = Vec::with_capacity(prefix.len() + payload.len() + 2);
    out.extend_from_slice(prefix.as_bytes());
    out.push(b':');
    out.extend_from_slice(payload);
    out.push(b',');
    out
}

/// Per-connection reassembly buffer for inbound frames.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes read from the stream.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Extract the next complete frame payload, if one is fully buffered.
    ///
    /// `Ok(None)` means the buffer holds only a partial frame; feed more
    /// bytes and call again. Errors mean the stream has lost framing and
    /// must be torn down.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, WireError> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        let mut len: usize = 0;
        let mut idx = 0;
        loop {
            let Some(&byte) = self.buf.get(idx) else {
                // Length prefix itself is still incomplete.
                return Ok(None);
            };
            match byte {
                b'0'..=b'9' => {
                    len = len * 10 + usize::from(byte - b'0');
                    if len > MAX_FRAME_LEN {
                        return Err(WireError::Oversize(len));
                    }
                    idx += 1;
                }
                b':' if idx > 0 => {
                    idx += 1;
                    break;
                }
                other => return Err(WireError::InvalidLengthPrefix(other)),
            }
        }

        let end = idx + len;
        if self.buf.len() < end + 1 {
            return Ok(None);
        }
        if self.buf[end] != b',' {
            return Err(WireError::MissingTerminator);
        }

        let payload = self.buf[idx..end].to_vec();
        self.buf.drain(..=end);
        Ok(Some(payload))
    }

    /// Bytes currently buffered, including any partial frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_single_frame() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(&encode_frame(b"{\"method\":\"x\"}"));
        assert_eq!(buffer.next_frame().unwrap().as_deref(), Some(&b"{\"method\":\"x\"}"[..]));
        assert_eq!(buffer.next_frame().unwrap(), None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn reassembles_frames_split_across_reads() {
        let frame = encode_frame(b"hello world");
        let (head, tail) = frame.split_at(5);

        let mut buffer = FrameBuffer::new();
        buffer.extend(head);
        assert_eq!(buffer.next_frame().unwrap(), None);
        buffer.extend(tail);
        assert_eq!(buffer.next_frame().unwrap().as_deref(), Some(&b"hello world"[..]));
    }

    #[test]
    fn drains_multiple_frames_from_one_read() {
        let mut bytes = encode_frame(b"one");
        bytes.extend_from_slice(&encode_frame(b"two"));

        let mut buffer = FrameBuffer::new();
        buffer.extend(&bytes);
        assert_eq!(buffer.next_frame().unwrap().as_deref(), Some(&b"one"[..]));
        assert_eq!(buffer.next_frame().unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(buffer.next_frame().unwrap(), None);
    }

    #[test]
    fn empty_payload_is_a_valid_frame() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(b"0:,");
        assert_eq!(buffer.next_frame().unwrap().as_deref(), Some(&b""[..]));
    }

    #[test]
    fn rejects_non_numeric_length_prefix() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(b"junk:payload,");
        assert!(matches!(
            buffer.next_frame(),
            Err(WireError::InvalidLengthPrefix(b'j'))
        ));
    }

    #[test]
    fn rejects_missing_terminator() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(b"3:abcX");
        assert!(matches!(buffer.next_frame(), Err(WireError::MissingTerminator)));
    }

    #[test]
    fn rejects_oversize_announcements_before_buffering_them() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(b"99999999999:");
        assert!(matches!(buffer.next_frame(), Err(WireError::Oversize(_))));
    }
}
