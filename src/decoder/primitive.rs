/// Big-endian integer reads and a bounds-checked cursor over a frame
use crate::error::DecodeError;

/// Integer widths the gateway uses on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    One,
    Two,
    Four,
}

impl IntWidth {
    pub const fn bytes(self) -> usize {
        match self {
            IntWidth::One => 1,
            IntWidth::Two => 2,
            IntWidth::Four => 4,
        }
    }
}

impl TryFrom<usize> for IntWidth {
    type Error = DecodeError;

    fn try_from(size: usize) -> Result<Self, Self::Error> {
        match size {
            1 => Ok(IntWidth::One),
            2 => Ok(IntWidth::Two),
            4 => Ok(IntWidth::Four),
            other => Err(DecodeError::UnsupportedWidth(other)),
        }
    }
}

/// Read a big-endian integer of the given width from the start of `bytes`
///
/// # Arguments
/// * `bytes` - Buffer whose first `width` bytes hold the value
/// * `signed` - Interpret the value as two's complement
/// * `width` - Number of bytes to read
///
/// # Returns
/// The decoded value widened to i64, or OutOfBounds if `bytes` is too short
pub fn read_int(bytes: &[u8], signed: bool, width: IntWidth) -> Result<i64, DecodeError> {
    let len = width.bytes();
    let raw = bytes.get(..len).ok_or(DecodeError::OutOfBounds {
        offset: 0,
        len,
        available: bytes.len(),
    })?;

    let value = match (width, signed) {
        (IntWidth::One, false) => raw[0] as i64,
        (IntWidth::One, true) => raw[0] as i8 as i64,
        (IntWidth::Two, false) => u16::from_be_bytes([raw[0], raw[1]]) as i64,
        (IntWidth::Two, true) => i16::from_be_bytes([raw[0], raw[1]]) as i64,
        (IntWidth::Four, false) => u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as i64,
        (IntWidth::Four, true) => i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as i64,
    };

    Ok(value)
}

/// Forward-only cursor over a byte buffer
///
/// Every read is checked against the buffer end; a read that would run past
/// it fails without moving the cursor.
#[derive(Debug, Clone)]
pub struct PacketCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Byte at the cursor without consuming it
    pub fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    /// Consume `len` bytes and return them
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DecodeError::OutOfBounds {
                offset: self.pos,
                len,
                available: self.buf.len(),
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}
