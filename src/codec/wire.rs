//! Protocol Buffers wire format primitives: tags, varints, zigzag and
//! little-endian fixed-width values.

use crate::error::DecodeError;
use crate::types::{ID_MAX, ID_MIN};

/// Maximum depth of nested messages accepted by the encoder and decoder.
pub const RECURSION_LIMIT: usize = 100;

/// The low three bits of a field key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

impl WireType {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for WireType {
    type Error = u32;

    fn try_from(v: u32) -> Result<Self, u32> {
        match v {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Fixed32),
            other => Err(other),
        }
    }
}

/// Longest varint encoding of a 64-bit value.
pub const MAX_VARINT_LEN: usize = 10;

/// Append a base-128 varint.
#[inline]
pub fn write_varint(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8 & 0x7f) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

/// Number of bytes `write_varint` emits for `v`.
#[inline]
pub fn varint_len(v: u64) -> usize {
    let bits = 64 - (v | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Append a field key.
#[inline]
pub fn write_key(buf: &mut Vec<u8>, id: i32, wire_type: WireType) {
    write_varint(buf, ((id as u64) << 3) | wire_type.as_u32() as u64);
}

#[inline]
pub fn write_fixed32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

#[inline]
pub fn write_fixed64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

#[inline]
pub fn zigzag_encode32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

#[inline]
pub fn zigzag_decode32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

#[inline]
pub fn zigzag_encode64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[inline]
pub fn zigzag_decode64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Cursor over an input buffer.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn ensure(&self, n: usize) -> Result<(), DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                need: self.pos.saturating_add(n),
                have: self.buf.len(),
            });
        }
        Ok(())
    }

    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.pos;
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let b = match self.buf.get(self.pos) {
                Some(b) => *b,
                None => {
                    return Err(DecodeError::Truncated {
                        need: self.pos + 1,
                        have: self.buf.len(),
                    })
                }
            };
            self.pos += 1;
            if i == MAX_VARINT_LEN - 1 && b > 1 {
                return Err(DecodeError::VarintOverflow { offset: start });
            }
            value |= ((b & 0x7f) as u64) << (7 * i);
            if b < 0x80 {
                return Ok(value);
            }
        }
        Err(DecodeError::VarintOverflow { offset: start })
    }

    pub fn read_fixed32(&mut self) -> Result<u32, DecodeError> {
        self.ensure(4)?;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn read_fixed64(&mut self) -> Result<u64, DecodeError> {
        self.ensure(8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.buf[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Read a varint length prefix followed by that many bytes.
    pub fn read_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        self.ensure(len)?;
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Read a field key, returning `(id, wire_type)`.
    pub fn read_key(&mut self) -> Result<(i32, WireType), DecodeError> {
        let offset = self.pos;
        let key = self.read_varint()?;
        let wire = (key & 7) as u32;
        let wire_type = WireType::try_from(wire).map_err(|wire_type| {
            DecodeError::InvalidWireType { wire_type, offset }
        })?;
        let id = key >> 3;
        if id < ID_MIN as u64 || id > ID_MAX as u64 {
            return Err(DecodeError::InvalidFieldId { offset });
        }
        Ok((id as i32, wire_type))
    }

    /// Skip over a value of the given wire type.
    pub fn skip(&mut self, wire_type: WireType) -> Result<(), DecodeError> {
        match wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => {
                self.ensure(8)?;
                self.pos += 8;
            }
            WireType::LengthDelimited => {
                self.read_bytes()?;
            }
            WireType::Fixed32 => {
                self.ensure(4)?;
                self.pos += 4;
            }
            WireType::StartGroup | WireType::EndGroup => {
                return Err(DecodeError::UnsupportedWireType {
                    wire_type: wire_type.as_u32(),
                    offset: self.pos,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 300);
        assert_eq!(buf, [0xac, 0x02]);
        assert_eq!(varint_len(300), 2);
        assert_eq!(varint_len(0), 1);
        assert_eq!(varint_len(u64::MAX), 10);
        assert_eq!(Reader::new(&buf).read_varint().unwrap(), 300);
    }

    #[test]
    fn test_negative_varint_is_ten_bytes() {
        let mut buf = Vec::new();
        write_varint(&mut buf, -1i64 as u64);
        assert_eq!(buf.len(), 10);
        assert_eq!(Reader::new(&buf).read_varint().unwrap() as i64, -1);
    }

    #[test]
    fn test_varint_overflow() {
        let buf = [0xffu8; 11];
        assert!(matches!(
            Reader::new(&buf).read_varint(),
            Err(DecodeError::VarintOverflow { offset: 0 })
        ));
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag_encode32(0), 0);
        assert_eq!(zigzag_encode32(-1), 1);
        assert_eq!(zigzag_encode32(1), 2);
        assert_eq!(zigzag_encode32(i32::MIN), u32::MAX);
        assert_eq!(zigzag_decode32(u32::MAX), i32::MIN);
        assert_eq!(zigzag_encode64(-2), 3);
        assert_eq!(zigzag_decode64(3), -2);
    }

    #[test]
    fn test_key() {
        let mut buf = Vec::new();
        write_key(&mut buf, 1, WireType::Varint);
        write_key(&mut buf, 4, WireType::LengthDelimited);
        assert_eq!(buf, [0x08, 0x22]);
        let mut r = Reader::new(&buf);
        assert_eq!(r.read_key().unwrap(), (1, WireType::Varint));
        assert_eq!(r.read_key().unwrap(), (4, WireType::LengthDelimited));
    }

    #[test]
    fn test_invalid_wire_type() {
        assert!(matches!(
            Reader::new(&[0x0e]).read_key(),
            Err(DecodeError::InvalidWireType { wire_type: 6, .. })
        ));
    }

    #[test]
    fn test_truncated() {
        let mut r = Reader::new(&[0x03, 0x01]);
        assert!(matches!(
            r.read_bytes(),
            Err(DecodeError::Truncated { need: 4, have: 2 })
        ));
        assert!(Reader::new(&[1, 2, 3]).read_fixed32().is_err());
    }

    #[test]
    fn test_skip() {
        let buf = [0x96, 0x01, 0x02, 0xaa, 0xbb, 1, 2, 3, 4];
        let mut r = Reader::new(&buf);
        r.skip(WireType::Varint).unwrap();
        r.skip(WireType::LengthDelimited).unwrap();
        r.skip(WireType::Fixed32).unwrap();
        assert_eq!(r.remaining(), 0);
        assert!(r.skip(WireType::StartGroup).is_err());
    }
}
