//! The TraCI wire codec.
//!
//! All values are big-endian. Strings and string lists carry a `u32` length
//! prefix; positions are two or three consecutive doubles. A [Buffer] holds
//! the bytes of one message plus a read cursor and nothing else.

use crate::constants::{POSITION_2D, POSITION_3D, TYPE_DOUBLE, TYPE_INTEGER, TYPE_STRING};
use crate::constants::{TYPE_BYTE, TYPE_STRINGLIST, TYPE_UBYTE};
use crate::error::ProtocolError;
use crate::math::{Point2d, Point3d};
use crate::time::{SimTime, TimeFormat};
use byteorder::{BigEndian, ByteOrder};

/// A value with a fixed wire representation.
pub trait WireValue: Sized {
    /// The type tag announcing this value when it is sent as a typed value.
    const TYPE_TAG: u8;

    /// Appends the untagged encoding of the value.
    fn encode(&self, out: &mut Vec<u8>);

    /// Reads an untagged value at the cursor.
    fn decode(buf: &mut Buffer) -> Result<Self, ProtocolError>;
}

/// A byte buffer with a read cursor.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Buffer {
    bytes: Vec<u8>,
    pos: usize,
}

impl Buffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Default::default()
    }

    /// Wraps received bytes for decoding.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Appends the untagged encoding of `value`.
    pub fn write<T: WireValue>(&mut self, value: T) -> &mut Self {
        value.encode(&mut self.bytes);
        self
    }

    /// Appends a length-prefixed string without copying it first.
    pub fn write_str(&mut self, value: &str) -> &mut Self {
        encode_str(value, &mut self.bytes);
        self
    }

    /// Appends a string type tag and a length-prefixed string.
    pub fn write_typed_str(&mut self, value: &str) -> &mut Self {
        self.bytes.push(TYPE_STRING);
        self.write_str(value)
    }

    /// Appends a type tag followed by the encoding of `value`.
    pub fn write_typed<T: WireValue>(&mut self, value: T) -> &mut Self {
        self.bytes.push(T::TYPE_TAG);
        self.write(value)
    }

    /// Appends an untagged time value in the given format.
    pub fn write_time(&mut self, time: SimTime, format: TimeFormat) -> &mut Self {
        match format {
            TimeFormat::Milliseconds => self.write(TimeFormat::to_millis(time)),
            TimeFormat::Seconds => self.write(time),
        }
    }

    /// Appends raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// Reads an untagged value.
    pub fn read<T: WireValue>(&mut self) -> Result<T, ProtocolError> {
        T::decode(self)
    }

    /// Reads a type tag, checks it is the one `T` expects, then reads the value.
    pub fn read_typed<T: WireValue>(&mut self) -> Result<T, ProtocolError> {
        self.expect_tag(T::TYPE_TAG)?;
        T::decode(self)
    }

    /// Reads an untagged time value in the given format.
    pub fn read_time(&mut self, format: TimeFormat) -> Result<SimTime, ProtocolError> {
        match format {
            TimeFormat::Milliseconds => Ok(f64::from(self.read::<i32>()?) / 1000.0),
            TimeFormat::Seconds => self.read::<f64>(),
        }
    }

    /// Reads a tagged time value in the given format.
    pub fn read_typed_time(&mut self, format: TimeFormat) -> Result<SimTime, ProtocolError> {
        self.expect_tag(format.type_tag())?;
        self.read_time(format)
    }

    /// Reads a type tag and fails unless it equals `expected`.
    pub fn expect_tag(&mut self, expected: u8) -> Result<(), ProtocolError> {
        let found = self.read::<u8>()?;
        if found != expected {
            return Err(ProtocolError::TypeMismatch { expected, found });
        }
        Ok(())
    }

    /// Consumes `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&[u8], ProtocolError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(ProtocolError::Underrun {
                needed: n,
                remaining,
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.bytes[start..self.pos])
    }

    /// The number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// The read cursor.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Whether every byte has been read.
    pub fn eof(&self) -> bool {
        self.pos == self.bytes.len()
    }

    /// Fails unless every byte has been read.
    pub fn expect_eof(&self) -> Result<(), ProtocolError> {
        if !self.eof() {
            return Err(ProtocolError::TrailingBytes {
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    /// The encoded bytes, including those already read.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The number of encoded bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing has been encoded.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

fn encode_str(value: &str, out: &mut Vec<u8>) {
    (value.len() as u32).encode(out);
    out.extend_from_slice(value.as_bytes());
}

impl WireValue for u8 {
    const TYPE_TAG: u8 = TYPE_UBYTE;

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(*self);
    }

    fn decode(buf: &mut Buffer) -> Result<Self, ProtocolError> {
        Ok(buf.take(1)?[0])
    }
}

impl WireValue for i8 {
    const TYPE_TAG: u8 = TYPE_BYTE;

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }

    fn decode(buf: &mut Buffer) -> Result<Self, ProtocolError> {
        Ok(buf.take(1)?[0] as i8)
    }
}

impl WireValue for i32 {
    const TYPE_TAG: u8 = TYPE_INTEGER;

    fn encode(&self, out: &mut Vec<u8>) {
        let mut bytes = [0; 4];
        BigEndian::write_i32(&mut bytes, *self);
        out.extend_from_slice(&bytes);
    }

    fn decode(buf: &mut Buffer) -> Result<Self, ProtocolError> {
        Ok(BigEndian::read_i32(buf.take(4)?))
    }
}

/// Lengths and counts. They share the integer tag since the protocol only
/// ever sends them untagged.
impl WireValue for u32 {
    const TYPE_TAG: u8 = TYPE_INTEGER;

    fn encode(&self, out: &mut Vec<u8>) {
        let mut bytes = [0; 4];
        BigEndian::write_u32(&mut bytes, *self);
        out.extend_from_slice(&bytes);
    }

    fn decode(buf: &mut Buffer) -> Result<Self, ProtocolError> {
        Ok(BigEndian::read_u32(buf.take(4)?))
    }
}

impl WireValue for f64 {
    const TYPE_TAG: u8 = TYPE_DOUBLE;

    fn encode(&self, out: &mut Vec<u8>) {
        let mut bytes = [0; 8];
        BigEndian::write_f64(&mut bytes, *self);
        out.extend_from_slice(&bytes);
    }

    fn decode(buf: &mut Buffer) -> Result<Self, ProtocolError> {
        Ok(BigEndian::read_f64(buf.take(8)?))
    }
}

impl WireValue for String {
    const TYPE_TAG: u8 = TYPE_STRING;

    fn encode(&self, out: &mut Vec<u8>) {
        encode_str(self, out);
    }

    fn decode(buf: &mut Buffer) -> Result<Self, ProtocolError> {
        let len = buf.read::<u32>()? as usize;
        let bytes = buf.take(len)?.to_vec();
        String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)
    }
}

impl WireValue for Vec<String> {
    const TYPE_TAG: u8 = TYPE_STRINGLIST;

    fn encode(&self, out: &mut Vec<u8>) {
        (self.len() as u32).encode(out);
        for item in self {
            item.encode(out);
        }
    }

    fn decode(buf: &mut Buffer) -> Result<Self, ProtocolError> {
        let count = buf.read::<u32>()?;
        (0..count).map(|_| buf.read::<String>()).collect()
    }
}

impl WireValue for Point2d {
    const TYPE_TAG: u8 = POSITION_2D;

    fn encode(&self, out: &mut Vec<u8>) {
        self.x.encode(out);
        self.y.encode(out);
    }

    fn decode(buf: &mut Buffer) -> Result<Self, ProtocolError> {
        Ok(Point2d::new(buf.read()?, buf.read()?))
    }
}

impl WireValue for Point3d {
    const TYPE_TAG: u8 = POSITION_3D;

    fn encode(&self, out: &mut Vec<u8>) {
        self.x.encode(out);
        self.y.encode(out);
        self.z.encode(out);
    }

    fn decode(buf: &mut Buffer) -> Result<Self, ProtocolError> {
        Ok(Point3d::new(buf.read()?, buf.read()?, buf.read()?))
    }
}
