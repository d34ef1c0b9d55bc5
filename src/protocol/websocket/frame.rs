//! WebSocket frame codec (RFC 6455 §5)
//!
//! A frame is two header bytes, an optional extended length (16 or 64 bit,
//! big-endian), an optional 4-byte masking key, and the payload. Decoding
//! reads exactly what each stage needs from the stream; encoding mirrors the
//! layout without masking, since server-to-client frames are never masked.

use std::io::Read;

/// Decode failures; any of these terminates the session's read loop
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O while reading frame: {0}")]
    Io(#[from] std::io::Error),
    #[error("illegal opcode {0:#x}")]
    BadOpcode(u8),
    #[error("TEXT payload is not valid UTF-8")]
    BadUtf8,
    #[error("payload of {got} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { got: u64, limit: u64 },
}

/// Frame opcodes; the six values below are the only legal ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    pub fn from_bits(bits: u8) -> Result<Self, FrameError> {
        match bits {
            0x0 => Ok(Opcode::Continuation),
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Close),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            other => Err(FrameError::BadOpcode(other)),
        }
    }
}

/// One decoded frame: fin flag, opcode, and the (unmasked) payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl Frame {
    /// A final data frame
    pub fn data(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self { fin: true, opcode, payload }
    }

    /// A control frame (control frames are always final)
    pub fn control(opcode: Opcode, payload: &[u8]) -> Self {
        Self { fin: true, opcode, payload: payload.to_vec() }
    }

    /// Read one frame off the stream.
    ///
    /// Reads exactly 2 header bytes, then the extended length (`126` = 2 more
    /// bytes, `127` = 8 more), then the 4-byte mask if the mask bit is set,
    /// then exactly `payload_length` payload bytes. Masked payloads are
    /// XOR-unmasked with `mask[i mod 4]`. A final TEXT payload must be valid
    /// UTF-8.
    ///
    /// `max_payload` bounds the advertised payload length before any payload
    /// byte is read.
    pub fn read_from<R: Read>(reader: &mut R, max_payload: u64) -> Result<Self, FrameError> {
        let mut header = [0u8; 2];
        reader.read_exact(&mut header)?;

        let fin = header[0] & 0x80 != 0;
        let opcode = Opcode::from_bits(header[0] & 0x0F)?;
        let masked = header[1] & 0x80 != 0;

        let payload_len = match header[1] & 0x7F {
            126 => {
                let mut ext = [0u8; 2];
                reader.read_exact(&mut ext)?;
                u16::from_be_bytes(ext) as u64
            }
            127 => {
                let mut ext = [0u8; 8];
                reader.read_exact(&mut ext)?;
                u64::from_be_bytes(ext)
            }
            short => short as u64,
        };

        if payload_len > max_payload {
            return Err(FrameError::PayloadTooLarge { got: payload_len, limit: max_payload });
        }

        let mask = if masked {
            let mut key = [0u8; 4];
            reader.read_exact(&mut key)?;
            Some(key)
        } else {
            None
        };

        let mut payload = vec![0u8; payload_len as usize];
        reader.read_exact(&mut payload)?;

        if let Some(key) = mask {
            apply_mask(&mut payload, key);
        }

        if fin && opcode == Opcode::Text && std::str::from_utf8(&payload).is_err() {
            return Err(FrameError::BadUtf8);
        }

        Ok(Self { fin, opcode, payload })
    }

    /// Serialize the frame for the wire. Server frames carry no mask; the
    /// length field uses the 7-bit, 16-bit, or 64-bit form as the payload
    /// size requires.
    pub fn encode(&self) -> Vec<u8> {
        let len = self.payload.len();
        let mut out = Vec::with_capacity(len + 10);

        out.push((if self.fin { 0x80 } else { 0 }) | self.opcode as u8);

        if len < 126 {
            out.push(len as u8);
        } else if len < (1 << 16) {
            out.push(126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            out.push(127);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }

        out.extend_from_slice(&self.payload);
        out
    }
}

/// XOR each payload byte with `key[i mod 4]`; its own inverse
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}
