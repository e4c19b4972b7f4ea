//! Register codec: pure conversions between 16-bit register words and typed
//! values.
//!
//! Decoding never applies scaling; callers multiply by the parameter scale
//! afterwards so raw and scaled views stay distinguishable.

use std::fmt;

use crate::catalog::DataType;
use crate::error::{InvSrvError, Result};

/// A decoded register value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Apply a multiplicative scale. Unity scale keeps the integer shape so
    /// counters publish without a decimal point.
    pub fn scaled(self, scale: f64) -> Value {
        match self {
            #[allow(clippy::float_cmp)]
            Value::Integer(raw) if scale != 1.0 => Value::Float(raw as f64 * scale),
            other => other,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Text(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v}"),
        }
    }
}

fn require(words: &[u16], needed: usize, dtype: DataType) -> Result<()> {
    if words.len() < needed {
        return Err(InvSrvError::data(format!(
            "{dtype:?} needs {needed} words, got {}",
            words.len()
        )));
    }
    Ok(())
}

/// Sign-extend an 8-bit field.
fn extend_i8(byte: u16) -> i64 {
    if byte >= 0x80 {
        i64::from(byte) - 0x100
    } else {
        i64::from(byte)
    }
}

/// Decode register words into a typed value.
pub fn decode(words: &[u16], dtype: DataType) -> Result<Value> {
    match dtype {
        DataType::U16 => {
            require(words, 1, dtype)?;
            Ok(Value::Integer(i64::from(words[0])))
        }
        DataType::I16 => {
            require(words, 1, dtype)?;
            Ok(Value::Integer(i64::from(words[0] as i16)))
        }
        DataType::I8High => {
            require(words, 1, dtype)?;
            Ok(Value::Integer(extend_i8(words[0] >> 8)))
        }
        DataType::I8Low => {
            require(words, 1, dtype)?;
            Ok(Value::Integer(extend_i8(words[0] & 0x00FF)))
        }
        DataType::U32 => {
            require(words, 2, dtype)?;
            let value = (u32::from(words[0]) << 16) | u32::from(words[1]);
            Ok(Value::Integer(i64::from(value)))
        }
        DataType::Utf8 => {
            let mut text = String::with_capacity(words.len() * 2);
            'outer: for word in words {
                for byte in [(word >> 8) as u8, (word & 0x00FF) as u8] {
                    if byte == 0 {
                        break 'outer;
                    }
                    text.push(char::from(byte));
                }
            }
            Ok(Value::Text(text.trim().to_string()))
        }
    }
}

/// Encode a value for writing. Only single-register unsigned writes exist in
/// the current parameter surface; floats are truncated first.
pub fn encode(value: f64, dtype: DataType) -> Result<Vec<u16>> {
    match dtype {
        DataType::U16 => {
            // range-check before truncation so -0.5 cannot sneak in as -0.0
            if !(0.0..=65535.0).contains(&value) {
                return Err(InvSrvError::EncodeRange { value, dtype });
            }
            Ok(vec![value.trunc() as u16])
        }
        other => Err(InvSrvError::UnsupportedCodec { dtype: other }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u16_round_trips() {
        for v in [0u16, 1, 73, 800, 0x7FFF, 0x8000, 65535] {
            let words = encode(f64::from(v), DataType::U16).unwrap();
            assert_eq!(decode(&words, DataType::U16).unwrap(), Value::Integer(i64::from(v)));
        }
    }

    #[test]
    fn u16_encode_rejects_out_of_range() {
        assert!(matches!(
            encode(-1.0, DataType::U16),
            Err(InvSrvError::EncodeRange { .. })
        ));
        assert!(matches!(
            encode(65536.0, DataType::U16),
            Err(InvSrvError::EncodeRange { .. })
        ));
        // negative fractions must not truncate towards zero and pass
        assert!(matches!(
            encode(-0.5, DataType::U16),
            Err(InvSrvError::EncodeRange { .. })
        ));
        assert!(matches!(
            encode(f64::NAN, DataType::U16),
            Err(InvSrvError::EncodeRange { .. })
        ));
    }

    #[test]
    fn u16_encode_truncates_floats() {
        assert_eq!(encode(99.9, DataType::U16).unwrap(), vec![99]);
    }

    #[test]
    fn i16_is_twos_complement() {
        assert_eq!(decode(&[0xFFFF], DataType::I16).unwrap(), Value::Integer(-1));
        assert_eq!(decode(&[0x8000], DataType::I16).unwrap(), Value::Integer(-32768));
        assert_eq!(decode(&[0x0320], DataType::I16).unwrap(), Value::Integer(800));
    }

    #[test]
    fn i8_halves_sign_extend_independently() {
        assert_eq!(decode(&[0x0304], DataType::I8High).unwrap(), Value::Integer(3));
        assert_eq!(decode(&[0x0304], DataType::I8Low).unwrap(), Value::Integer(4));
        assert_eq!(decode(&[0xFF04], DataType::I8High).unwrap(), Value::Integer(-1));
        assert_eq!(decode(&[0xFF04], DataType::I8Low).unwrap(), Value::Integer(4));
    }

    #[test]
    fn u32_is_big_endian() {
        assert_eq!(decode(&[0x0001, 0x0002], DataType::U32).unwrap(), Value::Integer(65538));
        assert_eq!(
            decode(&[0xFFFF, 0xFFFF], DataType::U32).unwrap(),
            Value::Integer(4_294_967_295)
        );
    }

    #[test]
    fn utf8_packs_two_chars_per_word() {
        let words = [0x4850, 0x5331, 0x3230]; // "HPS120"
        assert_eq!(decode(&words, DataType::Utf8).unwrap(), Value::Text("HPS120".into()));
    }

    #[test]
    fn utf8_stops_at_nul_padding() {
        let words = [0x4142, 0x0000, 0x0000];
        assert_eq!(decode(&words, DataType::Utf8).unwrap(), Value::Text("AB".into()));
    }

    #[test]
    fn short_word_slices_are_data_errors() {
        assert!(matches!(decode(&[], DataType::U16), Err(InvSrvError::Data(_))));
        assert!(matches!(decode(&[1], DataType::U32), Err(InvSrvError::Data(_))));
    }

    #[test]
    fn write_encode_is_u16_only() {
        assert!(matches!(
            encode(1.0, DataType::U32),
            Err(InvSrvError::UnsupportedCodec { .. })
        ));
    }

    #[test]
    fn scale_keeps_integers_integral() {
        assert_eq!(Value::Integer(73).scaled(1.0), Value::Integer(73));
        assert_eq!(Value::Integer(800).scaled(0.1), Value::Float(80.0));
    }
}
