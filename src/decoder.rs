//
// Copyright (c) 2025 rmarshal-core contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! Format 4.8 object-graph decoder.
//!
//! A stateful, single-pass cursor over an immutable byte slice. Each `decode`
//! call builds a fresh [`Decoder`]; instances are never reused or shared
//! between calls, matching the single-threaded, non-suspending execution
//! model described for this subsystem.

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::error::DecodeError;
use crate::value::{Value, WrapperKind};

/// Total input size cap (100 MiB).
const MAX_INPUT: usize = 100 * 1024 * 1024;
/// Recursion depth cap.
const MAX_DEPTH: u32 = 1000;
/// Sequence/mapping element-count cap (`MAX_INPUT / 100`).
const MAX_CONTAINER_LEN: usize = MAX_INPUT / 100;
/// Symbol name length cap (`MAX_INPUT / 10`).
const MAX_SYMBOL_LEN: usize = MAX_INPUT / 10;
/// Bignum half-word count cap (`MAX_INPUT / 2`).
const MAX_BIGNUM_HALFWORDS: usize = MAX_INPUT / 2;
/// Upper bound on up-front `Vec::with_capacity` reservations, independent of
/// a length prefix's claimed size — avoids turning a small malicious input
/// into a large allocation before the buffer is known to actually hold that
/// many elements.
const PREALLOC_CAP: usize = 4096;

/// Decode a format 4.8 byte sequence into a single [`Value`].
///
/// Input must be non-empty and no larger than 100 MiB. Any malformed,
/// oversized, or truncated input is reported as a [`DecodeError`] — never as
/// a sentinel value or a partially-built tree.
pub fn decode(bytes: &[u8]) -> Result<Value, DecodeError> {
    tracing::debug!(len = bytes.len(), "decoding format 4.8 payload");
    let result = decode_inner(bytes);
    if let Err(ref e) = result {
        tracing::warn!(error = %e, "format 4.8 decode failed");
    }
    result
}

fn decode_inner(bytes: &[u8]) -> Result<Value, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::UnexpectedEof(0));
    }
    if bytes.len() > MAX_INPUT {
        return Err(DecodeError::OversizedField("input"));
    }
    if bytes.len() < 2 {
        return Err(DecodeError::UnexpectedEof(bytes.len()));
    }
    if bytes[0] != 0x04 || bytes[1] != 0x08 {
        return Err(DecodeError::UnsupportedVersion);
    }

    let mut decoder = Decoder {
        buf: bytes,
        pos: 2,
        symbols: Vec::new(),
        depth: 0,
    };
    decoder.read_value()
}

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    symbols: Vec<Value>,
    depth: u32,
}

impl<'a> Decoder<'a> {
    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        if self.pos >= self.buf.len() {
            return Err(DecodeError::UnexpectedEof(self.pos));
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let buf = self.buf;
        let start = self.pos;
        let end = start
            .checked_add(n)
            .filter(|&end| end <= buf.len())
            .ok_or(DecodeError::UnexpectedEof(start))?;
        self.pos = end;
        Ok(&buf[start..end])
    }

    /// Decode one of the eleven packed-integer schemes into a signed 64-bit value.
    fn read_packed_int(&mut self) -> Result<i64, DecodeError> {
        let c = self.read_u8()? as i8;
        match c {
            0 => Ok(0),
            5..=127 => Ok((c - 5) as i64),
            -128..=-5 => Ok((c + 5) as i64),
            1..=4 => {
                let n = c as usize;
                let bytes = self.read_bytes(n)?;
                let mut val: u64 = 0;
                for (i, &b) in bytes.iter().enumerate() {
                    val |= (b as u64) << (8 * i);
                }
                Ok(val as i64)
            }
            -4..=-1 => {
                let n = (-c) as usize;
                let bytes = self.read_bytes(n)?;
                let mut acc: i64 = -1;
                for (i, &b) in bytes.iter().enumerate() {
                    let shift = 8 * i;
                    acc &= !(0xFFi64 << shift);
                    acc |= (b as i64) << shift;
                }
                Ok(acc)
            }
        }
    }

    /// Read a non-negative length-like packed integer, rejecting negative
    /// results and anything over `cap`.
    fn read_capped_len(&mut self, cap: usize, field: &'static str) -> Result<usize, DecodeError> {
        let n = self.read_packed_int()?;
        if n < 0 {
            return Err(DecodeError::OversizedField(field));
        }
        let n = n as usize;
        if n > cap {
            return Err(DecodeError::OversizedField(field));
        }
        Ok(n)
    }

    fn read_value(&mut self) -> Result<Value, DecodeError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            self.depth -= 1;
            return Err(DecodeError::DepthExceeded);
        }
        let result = self.read_value_inner();
        self.depth -= 1;
        result
    }

    fn read_value_inner(&mut self) -> Result<Value, DecodeError> {
        let tag = self.read_u8()?;
        match tag {
            b'0' => Ok(Value::Nil),
            b'T' => Ok(Value::Bool(true)),
            b'F' => Ok(Value::Bool(false)),
            b'i' => Ok(Value::Int(self.read_packed_int()?)),
            b'l' => self.read_bignum(),
            b'"' => self.read_raw_string(),
            b':' => self.read_new_symbol(),
            b';' => self.read_symbol_backref(),
            b'I' => self.read_ivar_wrapper(),
            b'[' => self.read_sequence(),
            b'{' => self.read_mapping(),
            b'@' => self.read_link(),
            b'o' => self.read_object(),
            b'u' => self.read_userdef(),
            b'U' => self.read_usermarshal(),
            b'e' => Ok(Value::Wrapper {
                kind: WrapperKind::Extended,
                tag: Box::new(Value::Nil),
                children: Vec::new(),
            }),
            other => Err(DecodeError::UnknownTag(other)),
        }
    }

    fn read_bignum(&mut self) -> Result<Value, DecodeError> {
        let sign_byte = self.read_u8()?;
        let sign = match sign_byte {
            b'+' => num_bigint::Sign::Plus,
            b'-' => num_bigint::Sign::Minus,
            _ => return Err(DecodeError::EncodingError),
        };
        let halfwords = self.read_capped_len(MAX_BIGNUM_HALFWORDS, "bignum half-words")?;
        let byte_len = halfwords
            .checked_mul(2)
            .ok_or(DecodeError::OversizedField("bignum half-words"))?;
        let bytes = self.read_bytes(byte_len)?;
        let magnitude = BigInt::from_bytes_le(sign, bytes);
        match magnitude.to_i64() {
            Some(i) => Ok(Value::Int(i)),
            None => Ok(Value::BigInt(magnitude)),
        }
    }

    fn read_raw_string(&mut self) -> Result<Value, DecodeError> {
        let len = self.read_capped_len(MAX_INPUT, "raw string length")?;
        let bytes = self.read_bytes(len)?;
        let s = std::str::from_utf8(bytes).map_err(|_| DecodeError::EncodingError)?;
        Ok(Value::Str(s.to_string()))
    }

    fn read_new_symbol(&mut self) -> Result<Value, DecodeError> {
        let len = self.read_capped_len(MAX_SYMBOL_LEN, "symbol length")?;
        let bytes = self.read_bytes(len)?;
        let name = std::str::from_utf8(bytes).map_err(|_| DecodeError::EncodingError)?;
        let value = Value::new_symbol(name);
        self.symbols.push(value.clone());
        Ok(value)
    }

    fn read_symbol_backref(&mut self) -> Result<Value, DecodeError> {
        let k = self.read_packed_int()?;
        if k < 0 || k as usize >= self.symbols.len() {
            return Err(DecodeError::BadReference(k));
        }
        Ok(self.symbols[k as usize].clone())
    }

    /// The class tag that precedes `o`/`u`/`U` payloads: always a symbol,
    /// new or back-referenced, never a general value.
    fn read_class_tag(&mut self) -> Result<Value, DecodeError> {
        let tag = self.read_u8()?;
        match tag {
            b':' => self.read_new_symbol(),
            b';' => self.read_symbol_backref(),
            other => Err(DecodeError::UnknownTag(other)),
        }
    }

    fn read_sequence(&mut self) -> Result<Value, DecodeError> {
        let n = self.read_capped_len(MAX_CONTAINER_LEN, "sequence length")?;
        let mut items = Vec::with_capacity(n.min(PREALLOC_CAP));
        for _ in 0..n {
            items.push(self.read_value()?);
        }
        Ok(Value::Seq(items))
    }

    fn read_mapping(&mut self) -> Result<Value, DecodeError> {
        let n = self.read_capped_len(MAX_CONTAINER_LEN, "mapping length")?;
        let mut pairs = Vec::with_capacity(n.min(PREALLOC_CAP));
        for _ in 0..n {
            let key = self.read_value()?;
            let val = self.read_value()?;
            pairs.push((key, val));
        }
        Ok(Value::Map(pairs))
    }

    /// `I` — decode the inner value, then discard `m` attached
    /// `(symbol, value)` instance-variable pairs (almost always a single
    /// `:E => true/false` UTF-8 encoding marker).
    fn read_ivar_wrapper(&mut self) -> Result<Value, DecodeError> {
        let inner = self.read_value()?;
        let m = self.read_capped_len(MAX_CONTAINER_LEN, "ivar count")?;
        for _ in 0..m {
            let _name = self.read_value()?;
            let _val = self.read_value()?;
        }
        Ok(inner)
    }

    fn read_link(&mut self) -> Result<Value, DecodeError> {
        let k = self.read_packed_int()?;
        Ok(Value::Wrapper {
            kind: WrapperKind::Link,
            tag: Box::new(Value::Int(k)),
            children: Vec::new(),
        })
    }

    fn read_object(&mut self) -> Result<Value, DecodeError> {
        let class_tag = self.read_class_tag()?;
        let m = self.read_capped_len(MAX_CONTAINER_LEN, "object attribute count")?;
        let mut children = Vec::with_capacity((m * 2).min(PREALLOC_CAP));
        for _ in 0..m {
            children.push(self.read_value()?);
            children.push(self.read_value()?);
        }
        Ok(Value::Wrapper {
            kind: WrapperKind::Object,
            tag: Box::new(class_tag),
            children,
        })
    }

    fn read_userdef(&mut self) -> Result<Value, DecodeError> {
        let class_tag = self.read_class_tag()?;
        let len = self.read_capped_len(MAX_INPUT, "user-def byte count")?;
        let bytes = self.read_bytes(len)?;
        let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::EncodingError)?;
        Ok(Value::Wrapper {
            kind: WrapperKind::UserDef,
            tag: Box::new(class_tag),
            children: vec![Value::Str(text.to_string())],
        })
    }

    fn read_usermarshal(&mut self) -> Result<Value, DecodeError> {
        let class_tag = self.read_class_tag()?;
        let inner = self.read_value()?;
        Ok(Value::Wrapper {
            kind: WrapperKind::UserMarshal,
            tag: Box::new(class_tag),
            children: vec![inner],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    fn b64(s: &str) -> Vec<u8> {
        STANDARD.decode(s).expect("valid base64 fixture")
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(decode(&[]), Err(DecodeError::UnexpectedEof(0)));
    }

    #[test]
    fn rejects_wrong_header() {
        assert_eq!(decode(&[0x03, 0x08, b'0']), Err(DecodeError::UnsupportedVersion));
    }

    #[test]
    fn rejects_unknown_tag() {
        assert_eq!(decode(&[0x04, 0x08, 0xFF]), Err(DecodeError::UnknownTag(0xFF)));
    }

    #[test]
    fn scenario_1_packed_int() {
        let v = decode(&b64("BAhpBg==")).unwrap();
        assert_eq!(v, Value::Int(1));
    }

    #[test]
    fn scenario_2_symbol() {
        let v = decode(&b64("BAg6C2F6ZXJ0eQ==")).unwrap();
        assert_eq!(v, Value::new_symbol("azerty"));
    }

    #[test]
    fn scenario_3_ivar_string_discards_attachments() {
        let v = decode(&b64("BAhJIgthemVydHkGOgZFVA==")).unwrap();
        assert_eq!(v, Value::Str("azerty".to_string()));
    }

    #[test]
    fn scenario_4_mapping() {
        let v = decode(&b64("BAh7BkkiB2F6BjoGRVRJIgdxcwY7AFQ=")).unwrap();
        assert_eq!(
            v,
            Value::Map(vec![(
                Value::Str("az".to_string()),
                Value::Str("qs".to_string())
            )])
        );
    }

    #[test]
    fn scenario_5_symbol_identity_on_reuse() {
        let v = decode(&b64("BAhbCToQc2FtZV9zeW1ib2w7ADoOZGlmZmVyZW50OwA=")).unwrap();
        let items = match v {
            Value::Seq(items) => items,
            other => panic!("expected Seq, got {other:?}"),
        };
        assert_eq!(items.len(), 4);
        assert_eq!(items[0], Value::new_symbol("same_symbol"));
        assert_eq!(items[1], Value::new_symbol("same_symbol"));
        assert_eq!(items[2], Value::new_symbol("different"));
        assert_eq!(items[3], Value::new_symbol("same_symbol"));
        assert!(items[0].ptr_eq(&items[1]));
        assert!(items[0].ptr_eq(&items[3]));
        assert!(!items[0].ptr_eq(&items[2]));
    }

    #[test]
    fn scenario_6_positive_bignum() {
        let v = decode(&b64("BAhsKwwAAAAAAAAAAAAAAAAQAA==")).unwrap();
        assert_eq!(v, Value::BigInt(BigInt::from(2).pow(100)));
    }

    #[test]
    fn scenario_7_negative_bignum() {
        let v = decode(&b64("BAhsLQwAAAAAAAAAAAAAAAAQAA==")).unwrap();
        assert_eq!(v, Value::BigInt(-(BigInt::from(2).pow(100))));
    }

    #[test]
    fn empty_name_symbol_occupies_one_slot() {
        // header + ':' + packed-int(0) + new symbol "" + ';' + backref(0)
        let mut bytes = vec![0x04, 0x08, b'[', 0x07];
        bytes.extend_from_slice(&[b':', 0x00]);
        bytes.extend_from_slice(&[b';', 0x00]);
        let v = decode(&bytes).unwrap();
        match v {
            Value::Seq(items) => {
                assert_eq!(items, vec![Value::new_symbol(""), Value::new_symbol("")]);
                assert!(items[0].ptr_eq(&items[1]));
            }
            other => panic!("expected Seq, got {other:?}"),
        }
    }

    #[test]
    fn depth_exceeded_on_deeply_nested_sequences() {
        // 1001 nested one-element sequences: [ [ [ ... 0 ... ] ] ]
        let mut bytes = vec![0x04, 0x08];
        for _ in 0..1001 {
            bytes.push(b'[');
            bytes.push(0x06); // packed int 1
        }
        bytes.push(b'0');
        assert_eq!(decode(&bytes), Err(DecodeError::DepthExceeded));
    }

    #[test]
    fn bad_symbol_reference_is_rejected() {
        // header + symbol back-reference 0, with no prior symbols
        let bytes = vec![0x04, 0x08, b';', 0x00];
        assert_eq!(decode(&bytes), Err(DecodeError::BadReference(0)));
    }

    #[test]
    fn invalid_bignum_sign_byte_is_encoding_error() {
        let bytes = vec![0x04, 0x08, b'l', b'?', 0x00];
        assert_eq!(decode(&bytes), Err(DecodeError::EncodingError));
    }

    #[test]
    fn truncated_buffer_is_unexpected_eof() {
        let bytes = vec![0x04, 0x08, b'"', 0x0a]; // claims 5 bytes of string, has zero
        assert!(matches!(decode(&bytes), Err(DecodeError::UnexpectedEof(_))));
    }

    #[test]
    fn user_defined_object_wrapper() {
        // o, class tag :Foo (new symbol), 1 attr pair (:x => 1)
        let mut bytes = vec![0x04, 0x08, b'o'];
        bytes.push(b':');
        bytes.push(0x08); // packed len 3
        bytes.extend_from_slice(b"Foo");
        bytes.push(0x06); // packed int 1 (attr count)
        bytes.push(b':');
        bytes.push(0x06); // packed len 1
        bytes.push(b'x');
        bytes.push(b'i');
        bytes.push(0x06); // packed int 1
        let v = decode(&bytes).unwrap();
        match v {
            Value::Wrapper {
                kind: WrapperKind::Object,
                tag,
                children,
            } => {
                assert_eq!(*tag, Value::new_symbol("Foo"));
                assert_eq!(children, vec![Value::new_symbol("x"), Value::Int(1)]);
            }
            other => panic!("expected Object wrapper, got {other:?}"),
        }
    }

    #[test]
    fn link_wrapper_is_not_resolved() {
        let bytes = vec![0x04, 0x08, b'@', 0x06]; // packed int 1
        let v = decode(&bytes).unwrap();
        assert_eq!(
            v,
            Value::Wrapper {
                kind: WrapperKind::Link,
                tag: Box::new(Value::Int(1)),
                children: Vec::new(),
            }
        );
    }
}
