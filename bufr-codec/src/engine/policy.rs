//! The three leaf hooks decode and encode differ in (§4.4); everything else
//! — operator semantics, bitmap resolution, replication/sequence expansion —
//! lives in [`super::walker`] and is shared between both directions.

use crate::bitio::{is_missing_numeric, is_missing_string, BitReader, BitWriter};
use crate::error::Result;
use crate::tree::Value;

/// A value already known for the current position, supplied when walking
/// alongside an existing tree (encoding, or compressed-subset replay).
pub type Hint<'a> = Option<&'a Value>;

/// Abstracts over "read the next leaf's bits" (decode) and "write this
/// leaf's already-known value" (encode/replay).
pub trait LeafPolicy {
    /// A scaled numeric element.
    fn numeric(&mut self, nbits: u32, scale: i32, reference: i64, hint: Hint<'_>) -> Result<Value>;
    /// A character-string element.
    fn string(&mut self, nbits: u32, hint: Hint<'_>) -> Result<Value>;
    /// A code- or flag-table element: an unscaled raw integer.
    fn codeflag(&mut self, nbits: u32, hint: Hint<'_>) -> Result<Value>;
    /// A raw unsigned field with no scale/reference — used for replication
    /// counts, bitmap bits, and skipped-local/inline-string payloads.
    fn raw(&mut self, nbits: u32, hint: Hint<'_>) -> Result<Value>;
    /// A BUFR sign-and-magnitude signed field — used by `203YYY` new
    /// reference value capture.
    fn signed(&mut self, nbits: u32, hint: Hint<'_>) -> Result<Value>;
}

pub(crate) fn value_to_numeric(raw: u64, nbits: u32, scale: i32, reference: i64) -> Value {
    if is_missing_numeric(raw, nbits) {
        return Value::None;
    }

    let v = raw as i64 + reference;

    if scale == 0 {
        Value::Int(v)
    } else {
        Value::Float(v as f64 * 10f64.powi(-scale))
    }
}

pub(crate) fn value_to_raw(value: &Value, scale: i32, reference: i64, nbits: u32) -> u64 {
    match value {
        Value::None => {
            if nbits >= 64 {
                u64::MAX
            } else {
                (1u64 << nbits) - 1
            }
        }
        Value::Int(v) => (*v - reference) as u64,
        Value::Float(v) => {
            let scaled = (*v * 10f64.powi(scale)).round() as i64;
            (scaled - reference) as u64
        }
        _ => 0,
    }
}

/// Reads leaf values directly from the bitstream.
pub struct DecodePolicy<'a> {
    reader: BitReader<'a>,
}

impl<'a> DecodePolicy<'a> {
    /// Wrap a reader positioned at the start of a subset's data.
    pub fn new(reader: BitReader<'a>) -> Self {
        Self { reader }
    }

    /// Hand back the underlying reader (used once a subset's walk is done).
    pub fn into_reader(self) -> BitReader<'a> {
        self.reader
    }

    /// The reader's current bit position, for diagnostics.
    pub fn bit_pos(&self) -> usize {
        self.reader.bit_pos()
    }
}

impl LeafPolicy for DecodePolicy<'_> {
    fn numeric(&mut self, nbits: u32, scale: i32, reference: i64, _hint: Hint<'_>) -> Result<Value> {
        let raw = self.reader.read_uint(nbits)?;
        Ok(value_to_numeric(raw, nbits, scale, reference))
    }

    fn string(&mut self, nbits: u32, _hint: Hint<'_>) -> Result<Value> {
        let bytes = self.reader.read_bytes(nbits)?;

        if is_missing_string(&bytes) {
            return Ok(Value::None);
        }

        match String::from_utf8(bytes.clone()) {
            Ok(s) => Ok(Value::Str(s.trim_end().to_string())),
            Err(_) => Ok(Value::Bytes(bytes)),
        }
    }

    fn codeflag(&mut self, nbits: u32, _hint: Hint<'_>) -> Result<Value> {
        let raw = self.reader.read_uint(nbits)?;

        if is_missing_numeric(raw, nbits) {
            Ok(Value::None)
        } else {
            Ok(Value::Int(raw as i64))
        }
    }

    fn raw(&mut self, nbits: u32, _hint: Hint<'_>) -> Result<Value> {
        let raw = self.reader.read_uint(nbits)?;
        Ok(Value::Int(raw as i64))
    }

    fn signed(&mut self, nbits: u32, _hint: Hint<'_>) -> Result<Value> {
        Ok(Value::Int(self.reader.read_int(nbits)?))
    }
}

/// Writes already-known leaf values (the `hint`) to the bitstream.
#[derive(Default)]
pub struct EncodePolicy {
    writer: BitWriter,
}

impl EncodePolicy {
    /// A fresh, empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the policy, returning the written, byte-aligned payload.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.writer.align();
        self.writer.into_bytes()
    }
}

impl LeafPolicy for EncodePolicy {
    fn numeric(&mut self, nbits: u32, scale: i32, reference: i64, hint: Hint<'_>) -> Result<Value> {
        let value = hint.cloned().unwrap_or(Value::None);
        let raw = value_to_raw(&value, scale, reference, nbits);
        self.writer.write_uint(nbits, raw);
        Ok(value)
    }

    fn string(&mut self, nbits: u32, hint: Hint<'_>) -> Result<Value> {
        match hint {
            Some(Value::Str(s)) => {
                let mut bytes = s.clone().into_bytes();
                bytes.resize((nbits / 8) as usize, b' ');
                self.writer.write_bytes(&bytes);
                Ok(Value::Str(s.clone()))
            }
            Some(Value::Bytes(b)) => {
                let mut bytes = b.clone();
                bytes.resize((nbits / 8) as usize, 0);
                self.writer.write_bytes(&bytes);
                Ok(Value::Bytes(b.clone()))
            }
            _ => {
                self.writer.write_bytes(&vec![b' '; (nbits / 8) as usize]);
                Ok(Value::None)
            }
        }
    }

    fn codeflag(&mut self, nbits: u32, hint: Hint<'_>) -> Result<Value> {
        match hint {
            Some(Value::Int(v)) => {
                self.writer.write_uint(nbits, *v as u64);
                Ok(Value::Int(*v))
            }
            _ => {
                self.writer.write_missing(nbits);
                Ok(Value::None)
            }
        }
    }

    fn raw(&mut self, nbits: u32, hint: Hint<'_>) -> Result<Value> {
        match hint {
            Some(Value::Int(v)) => {
                self.writer.write_uint(nbits, *v as u64);
                Ok(Value::Int(*v))
            }
            _ => {
                self.writer.write_uint(nbits, 0);
                Ok(Value::Int(0))
            }
        }
    }

    fn signed(&mut self, nbits: u32, hint: Hint<'_>) -> Result<Value> {
        match hint {
            Some(Value::Int(v)) => {
                self.writer.write_int(nbits, *v);
                Ok(Value::Int(*v))
            }
            _ => {
                self.writer.write_int(nbits, 0);
                Ok(Value::Int(0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_roundtrips_through_decode_and_encode() {
        let mut enc = EncodePolicy::new();
        enc.numeric(10, 1, 0, Some(&Value::Float(12.3))).unwrap();
        let bytes = enc.into_bytes();

        let mut dec = DecodePolicy::new(BitReader::new(&bytes));
        let value = dec.numeric(10, 1, 0, None).unwrap();
        assert_eq!(value, Value::Float(12.3));
    }

    #[test]
    fn missing_numeric_roundtrips() {
        let mut enc = EncodePolicy::new();
        enc.numeric(7, 0, 0, Some(&Value::None)).unwrap();
        let bytes = enc.into_bytes();

        let mut dec = DecodePolicy::new(BitReader::new(&bytes));
        assert_eq!(dec.numeric(7, 0, 0, None).unwrap(), Value::None);
    }
}
