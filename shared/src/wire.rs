//! Network byte order helpers
//!
//! Every multi-byte field on the wire is big-endian. Floats travel as their
//! IEEE-754 bit pattern reinterpreted as a `u32` and then byte-swapped like any
//! other integer, so both ends reproduce the exact same value regardless of
//! host endianness.

use crate::protocol::ProtocolError;

/// Converts a float to its big-endian wire representation.
pub fn f32_to_be(value: f32) -> [u8; 4] {
    value.to_bits().to_be_bytes()
}

/// Rebuilds a float from its big-endian wire representation.
pub fn f32_from_be(bytes: [u8; 4]) -> f32 {
    f32::from_bits(u32::from_be_bytes(bytes))
}

/// Append-only writer producing big-endian fields
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&f32_to_be(value));
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a received buffer
///
/// Every read is bounds checked; running off the end yields
/// [`ProtocolError::Truncated`] instead of panicking.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let end = self.pos + N;
        let slice = self
            .buf
            .get(self.pos..end)
            .ok_or(ProtocolError::Truncated {
                needed: end,
                available: self.buf.len(),
            })?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pos = end;
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    pub fn get_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    pub fn get_f32(&mut self) -> Result<f32, ProtocolError> {
        Ok(f32_from_be(self.take()?))
    }

    /// Bytes left after the cursor
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_are_big_endian() {
        let mut writer = WireWriter::default();
        writer.put_u16(0x1234);
        writer.put_u32(0xDEADBEEF);

        assert_eq!(writer.into_bytes(), vec![0x12, 0x34, 0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_float_bit_pattern_on_wire() {
        // 1.0f32 is 0x3F800000
        assert_eq!(f32_to_be(1.0), [0x3F, 0x80, 0x00, 0x00]);
        assert_eq!(f32_from_be([0xC0, 0x50, 0x00, 0x00]), -3.25);
    }

    #[test]
    fn test_float_special_values_survive() {
        for value in [0.0f32, -0.0, f32::MAX, f32::MIN_POSITIVE, f32::INFINITY] {
            assert_eq!(f32_from_be(f32_to_be(value)).to_bits(), value.to_bits());
        }
        assert!(f32_from_be(f32_to_be(f32::NAN)).is_nan());
    }

    #[test]
    fn test_reader_reports_truncation() {
        let bytes = [0x00, 0x01, 0x02];
        let mut reader = WireReader::new(&bytes);

        assert_eq!(reader.get_u16().unwrap(), 1);
        assert_eq!(reader.remaining(), 1);
        match reader.get_u32() {
            Err(ProtocolError::Truncated { needed, available }) => {
                assert_eq!(needed, 6);
                assert_eq!(available, 3);
            }
            other => panic!("Unexpected result: {:?}", other),
        }
        // Failed read does not advance the cursor
        assert_eq!(reader.get_u8().unwrap(), 2);
    }
}
