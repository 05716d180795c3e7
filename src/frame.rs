use crate::error::Error;

/// Wire opcodes defined by RFC 6455 §5.2. Reserved opcodes (0x3-0x7, 0xB-0xF)
/// never reach application code; [`OpCode::from_byte`] rejects them at decode
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continue,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn from_byte(byte: u8) -> Result<Self, Error> {
        match byte {
            0x0 => Ok(OpCode::Continue),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            _ => Err(Error::InvalidOpcode),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            OpCode::Continue => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    /// Control frames are routed to the priority queue ahead of any pending
    /// data frames; see `WriteScheduler`.
    pub fn is_priority(&self) -> bool {
        self.is_control()
    }
}

/// Outcome of attempting to decode a frame header from a byte buffer.
pub enum DecodeResult {
    /// Not enough bytes buffered yet to parse a full header.
    NeedMore,
    /// The header bytes themselves do not describe a well-formed frame
    /// (reserved opcode, oversize control-frame length, non-zero high bit on
    /// the 64-bit length).
    Invalid,
    Header(FrameHeader),
}

#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub opcode: OpCode,
    pub masked: bool,
    pub payload_length: u64,
    pub masking_key: Option<[u8; 4]>,
    /// Bytes consumed by the header itself; the payload starts here.
    pub payload_offset: usize,
}

impl FrameHeader {
    pub fn frame_length(&self) -> u64 {
        self.payload_offset as u64 + self.payload_length
    }
}

/// Attempts to parse one frame header from the front of `buf`.
///
/// Does not consume `buf`; the caller trims it once the full frame (header +
/// payload) has been handled.
pub fn decode_header(buf: &[u8]) -> DecodeResult {
    if buf.len() < 2 {
        return DecodeResult::NeedMore;
    }

    let fin = (buf[0] & 0b1000_0000) != 0;
    let rsv1 = (buf[0] & 0b0100_0000) != 0;
    let rsv2 = (buf[0] & 0b0010_0000) != 0;
    let rsv3 = (buf[0] & 0b0001_0000) != 0;

    let opcode = match OpCode::from_byte(buf[0] & 0b0000_1111) {
        Ok(opcode) => opcode,
        Err(_) => return DecodeResult::Invalid,
    };

    let masked = (buf[1] & 0b1000_0000) != 0;
    let len_bits = buf[1] & 0b0111_1111;

    let mut offset = 2usize;
    let payload_length: u64 = match len_bits {
        0..=125 => len_bits as u64,
        126 => {
            if buf.len() < offset + 2 {
                return DecodeResult::NeedMore;
            }
            let len = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as u64;
            offset += 2;
            len
        }
        127 => {
            if buf.len() < offset + 8 {
                return DecodeResult::NeedMore;
            }
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[offset..offset + 8]);
            let len = u64::from_be_bytes(bytes);
            offset += 8;
            // RFC 6455 §5.2: the most significant bit of the 64-bit length
            // must be zero.
            if len & 0x8000_0000_0000_0000 != 0 {
                return DecodeResult::Invalid;
            }
            len
        }
        _ => unreachable!("7-bit field"),
    };

    if opcode.is_control() && (!fin || payload_length > 125) {
        return DecodeResult::Invalid;
    }

    let masking_key = if masked {
        if buf.len() < offset + 4 {
            return DecodeResult::NeedMore;
        }
        let mut key = [0u8; 4];
        key.copy_from_slice(&buf[offset..offset + 4]);
        offset += 4;
        Some(key)
    } else {
        None
    };

    DecodeResult::Header(FrameHeader {
        fin,
        rsv1,
        rsv2,
        rsv3,
        opcode,
        masked,
        payload_length,
        masking_key,
        payload_offset: offset,
    })
}

/// Extracts and unmasks the payload of a complete frame (`frame` holds
/// exactly `header.frame_length()` bytes, header included).
pub fn extract_payload(frame: &[u8], header: &FrameHeader) -> Result<Vec<u8>, Error> {
    let total = header.frame_length() as usize;
    if frame.len() < total {
        return Err(Error::ProtocolError("frame shorter than declared length"));
    }

    let mut payload = frame[header.payload_offset..total].to_vec();
    if let Some(key) = header.masking_key {
        mask_in_place(&mut payload, key);
    }
    Ok(payload)
}

/// XOR-masking is its own inverse: applying the same key twice returns the
/// original bytes.
pub fn mask_in_place(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Encodes one frame ready for the wire. `mask_key` is `Some` iff the role
/// requires masking (client role); the caller is responsible for sourcing a
/// fresh random key per frame.
pub fn encode_frame(
    payload: &[u8],
    opcode: OpCode,
    fin: bool,
    mask_key: Option<[u8; 4]>,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 14);

    let first_byte = ((fin as u8) << 7) | opcode.as_u8();
    out.push(first_byte);

    let len = payload.len();
    let mask_bit = if mask_key.is_some() { 0b1000_0000 } else { 0 };

    if len <= 125 {
        out.push(mask_bit | len as u8);
    } else if len <= 0xFFFF {
        out.push(mask_bit | 126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(mask_bit | 127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    let mut body = payload.to_vec();
    if let Some(key) = mask_key {
        out.extend_from_slice(&key);
        mask_in_place(&mut body, key);
    }
    out.extend_from_slice(&body);

    out
}

/// Classification of a numeric WebSocket close code, per RFC 6455 §7.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCodeKind {
    Valid,
    /// Defined by the RFC but must never appear on the wire (e.g. 1005 "no
    /// status received" is a sentinel for local use only).
    Reserved,
    Illegal,
}

/// A three-way classification so callers can distinguish "reserved" (never
/// sent) from merely out-of-range codes.
pub fn classify_close_code(code: u16) -> CloseCodeKind {
    match code {
        1000..=1003 | 1007..=1011 => CloseCodeKind::Valid,
        3000..=4999 => CloseCodeKind::Valid,
        1004 | 1005 | 1006 | 1015 => CloseCodeKind::Reserved,
        _ => CloseCodeKind::Illegal,
    }
}

pub fn is_valid_close_code(code: u16) -> bool {
    classify_close_code(code) == CloseCodeKind::Valid
}
