//! Bit-level operations on string values (SETBIT, BITCOUNT, BITPOS, BITFIELD).
//!
//! Bit 0 is the most significant bit of byte 0, as in Redis.

use crate::error::{ZedisError, ZedisResult};
use crate::types::string::MAX_STRING_LEN;

const MAX_BIT_OFFSET: u64 = (MAX_STRING_LEN as u64) * 8 - 1;

pub fn get_bit(bytes: &[u8], offset: u64) -> bool {
    let byte = (offset / 8) as usize;
    let shift = 7 - (offset % 8);
    bytes.get(byte).is_some_and(|b| (b >> shift) & 1 == 1)
}

/// Set a bit, growing the buffer with zeros. Returns the previous bit.
pub fn set_bit(bytes: &mut Vec<u8>, offset: u64, on: bool) -> bool {
    let byte = (offset / 8) as usize;
    let mask = 1u8 << (7 - (offset % 8));
    if byte >= bytes.len() {
        bytes.resize(byte + 1, 0);
    }
    let old = bytes[byte] & mask != 0;
    if on {
        bytes[byte] |= mask;
    } else {
        bytes[byte] &= !mask;
    }
    old
}

pub fn parse_bit_offset(arg: &[u8]) -> ZedisResult<u64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|o| *o <= MAX_BIT_OFFSET)
        .ok_or_else(|| ZedisError::generic("bit offset is not an integer or out of range"))
}

/// Unit of BITCOUNT / BITPOS ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeUnit {
    Byte,
    Bit,
}

/// Count set bits in the inclusive range `[start, end]` (negative from the end).
pub fn count_bits(bytes: &[u8], range: Option<(i64, i64, RangeUnit)>) -> u64 {
    match range {
        None => bytes.iter().map(|b| b.count_ones() as u64).sum(),
        Some((start, end, RangeUnit::Byte)) => match super::normalize_range(start, end, bytes.len()) {
            Some((s, e)) => bytes[s..=e].iter().map(|b| b.count_ones() as u64).sum(),
            None => 0,
        },
        Some((start, end, RangeUnit::Bit)) => {
            match super::normalize_range(start, end, bytes.len() * 8) {
                Some((s, e)) => (s..=e).filter(|&i| get_bit(bytes, i as u64)).count() as u64,
                None => 0,
            }
        }
    }
}

/// Position of the first bit equal to `bit` within the byte range, or -1.
///
/// Looking for a clear bit with no explicit end treats the string as padded with
/// zeros, so the answer is just past the last byte when every bit is set.
pub fn first_bit(bytes: &[u8], bit: bool, start: Option<i64>, end: Option<i64>) -> i64 {
    if bytes.is_empty() {
        return if bit { -1 } else { 0 };
    }
    let Some((s, e)) =
        super::normalize_range(start.unwrap_or(0), end.unwrap_or(-1), bytes.len())
    else {
        return -1;
    };
    for (i, &b) in bytes[s..=e].iter().enumerate() {
        let probe = if bit { b } else { !b };
        if probe != 0 {
            return ((s + i) * 8 + probe.leading_zeros() as usize) as i64;
        }
    }
    if !bit && end.is_none() {
        return ((e + 1) * 8) as i64;
    }
    -1
}

/// Integer encoding of a BITFIELD slot, e.g. `i8` or `u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldType {
    pub signed: bool,
    pub bits: u32,
}

impl FieldType {
    pub fn parse(arg: &[u8]) -> ZedisResult<Self> {
        let invalid = || {
            ZedisError::generic(
                "Invalid bitfield type. Use something like i16 u8. Note that u64 is not supported but i64 is.",
            )
        };
        let (signed, digits) = match arg.split_first() {
            Some((b'i' | b'I', rest)) => (true, rest),
            Some((b'u' | b'U', rest)) => (false, rest),
            _ => return Err(invalid()),
        };
        let bits: u32 = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(invalid)?;
        let max = if signed { 64 } else { 63 };
        if bits == 0 || bits > max {
            return Err(invalid());
        }
        Ok(FieldType { signed, bits })
    }

    fn min(self) -> i128 {
        if self.signed { -(1i128 << (self.bits - 1)) } else { 0 }
    }

    fn max(self) -> i128 {
        if self.signed { (1i128 << (self.bits - 1)) - 1 } else { (1i128 << self.bits) - 1 }
    }
}

/// Behaviour of SET / INCRBY when the result does not fit the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overflow {
    #[default]
    Wrap,
    Sat,
    Fail,
}

impl Overflow {
    pub fn parse(arg: &[u8]) -> ZedisResult<Self> {
        match arg.to_ascii_uppercase().as_slice() {
            b"WRAP" => Ok(Overflow::Wrap),
            b"SAT" => Ok(Overflow::Sat),
            b"FAIL" => Ok(Overflow::Fail),
            _ => Err(ZedisError::generic("Invalid OVERFLOW type specified")),
        }
    }

    /// Fit `value` into `ty`. `None` means FAIL rejected it.
    fn fit(self, ty: FieldType, value: i128) -> Option<i64> {
        if (ty.min()..=ty.max()).contains(&value) {
            return Some(value as i64);
        }
        match self {
            Overflow::Fail => None,
            Overflow::Sat => Some(value.clamp(ty.min(), ty.max()) as i64),
            Overflow::Wrap => {
                let modulus = 1i128 << ty.bits;
                let mut wrapped = value.rem_euclid(modulus);
                if ty.signed && wrapped > ty.max() {
                    wrapped -= modulus;
                }
                Some(wrapped as i64)
            }
        }
    }
}

/// One parsed BITFIELD sub-command. Offsets are already in bits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldOp {
    Get { ty: FieldType, offset: u64 },
    Set { ty: FieldType, offset: u64, value: i64 },
    IncrBy { ty: FieldType, offset: u64, delta: i64 },
    Overflow(Overflow),
}

impl FieldOp {
    pub fn is_write(&self) -> bool {
        matches!(self, FieldOp::Set { .. } | FieldOp::IncrBy { .. })
    }
}

/// Parse a BITFIELD offset: plain bits, or `#n` meaning `n * width`.
pub fn parse_field_offset(arg: &[u8], ty: FieldType) -> ZedisResult<u64> {
    let invalid = || ZedisError::generic("bit offset is not an integer or out of range");
    let (scaled, digits) = match arg.split_first() {
        Some((b'#', rest)) => (true, rest),
        _ => (false, arg),
    };
    let n: u64 = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(invalid)?;
    let offset = if scaled { n.checked_mul(ty.bits as u64).ok_or_else(invalid)? } else { n };
    if offset + ty.bits as u64 - 1 > MAX_BIT_OFFSET {
        return Err(invalid());
    }
    Ok(offset)
}

pub fn read_field(bytes: &[u8], ty: FieldType, offset: u64) -> i64 {
    let mut raw: u64 = 0;
    for i in 0..ty.bits as u64 {
        raw = (raw << 1) | get_bit(bytes, offset + i) as u64;
    }
    if ty.signed && ty.bits < 64 {
        let shift = 64 - ty.bits;
        ((raw << shift) as i64) >> shift
    } else {
        raw as i64
    }
}

pub fn write_field(bytes: &mut Vec<u8>, ty: FieldType, offset: u64, value: i64) {
    let raw = value as u64;
    for i in 0..ty.bits as u64 {
        let bit = (raw >> (ty.bits as u64 - 1 - i)) & 1 == 1;
        set_bit(bytes, offset + i, bit);
    }
}

/// Run already-validated sub-commands in order.
///
/// GET and INCRBY reply with the field value, SET with the previous value. A write
/// refused by `OVERFLOW FAIL` replies nil and leaves that field untouched; the other
/// sub-commands still apply.
pub fn run_bitfield(bytes: &mut Vec<u8>, ops: &[FieldOp]) -> Vec<Option<i64>> {
    let mut overflow = Overflow::default();
    let mut out = Vec::with_capacity(ops.len());
    for op in ops {
        match *op {
            FieldOp::Overflow(o) => overflow = o,
            FieldOp::Get { ty, offset } => out.push(Some(read_field(bytes, ty, offset))),
            FieldOp::Set { ty, offset, value } => {
                let old = read_field(bytes, ty, offset);
                match overflow.fit(ty, value as i128) {
                    Some(v) => {
                        write_field(bytes, ty, offset, v);
                        out.push(Some(old));
                    }
                    None => out.push(None),
                }
            }
            FieldOp::IncrBy { ty, offset, delta } => {
                let old = read_field(bytes, ty, offset);
                match overflow.fit(ty, old as i128 + delta as i128) {
                    Some(v) => {
                        write_field(bytes, ty, offset, v);
                        out.push(Some(v));
                    }
                    None => out.push(None),
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(s: &str) -> FieldType {
        FieldType::parse(s.as_bytes()).unwrap()
    }

    #[test]
    fn test_set_and_get_bits_msb_first() {
        let mut b = Vec::new();
        assert!(!set_bit(&mut b, 7, true));
        assert_eq!(b, [0b0000_0001]);
        assert!(set_bit(&mut b, 7, false));
        set_bit(&mut b, 0, true);
        assert_eq!(b, [0b1000_0000]);
        assert!(get_bit(&b, 0));
        assert!(!get_bit(&b, 100));
    }

    #[test]
    fn test_count_and_position() {
        let b = b"foobar";
        assert_eq!(count_bits(b, None), 26);
        assert_eq!(count_bits(b, Some((0, 0, RangeUnit::Byte))), 4);
        assert_eq!(count_bits(b, Some((1, 1, RangeUnit::Byte))), 6);
        assert_eq!(count_bits(b, Some((5, 30, RangeUnit::Bit))), 17);

        assert_eq!(first_bit(&[0xff, 0xf0, 0x00], false, None, None), 12);
        assert_eq!(first_bit(&[0x00, 0xff, 0xf0], true, Some(0), None), 8);
        assert_eq!(first_bit(&[0xff, 0xff], false, None, None), 16);
        assert_eq!(first_bit(&[0xff, 0xff], false, Some(0), Some(-1)), -1);
        assert_eq!(first_bit(&[], true, None, None), -1);
    }

    #[test]
    fn test_field_types() {
        assert_eq!(ty("i8"), FieldType { signed: true, bits: 8 });
        assert!(FieldType::parse(b"u64").is_err());
        assert!(FieldType::parse(b"i65").is_err());
        assert!(FieldType::parse(b"x8").is_err());
        assert_eq!(parse_field_offset(b"#2", ty("u8")).unwrap(), 16);
    }

    #[test]
    fn test_signed_read_write() {
        let mut b = Vec::new();
        write_field(&mut b, ty("i8"), 0, -1);
        assert_eq!(b, [0xff]);
        assert_eq!(read_field(&b, ty("i8"), 0), -1);
        assert_eq!(read_field(&b, ty("u8"), 0), 255);
        assert_eq!(read_field(&b, ty("i4"), 4), -1);
    }

    #[test]
    fn test_overflow_policies() {
        let u2 = ty("u2");
        let incr = |ovf| {
            vec![
                FieldOp::Overflow(ovf),
                FieldOp::IncrBy { ty: u2, offset: 0, delta: 3 },
                FieldOp::IncrBy { ty: u2, offset: 0, delta: 1 },
            ]
        };
        assert_eq!(run_bitfield(&mut Vec::new(), &incr(Overflow::Wrap)), [Some(3), Some(0)]);
        assert_eq!(run_bitfield(&mut Vec::new(), &incr(Overflow::Sat)), [Some(3), Some(3)]);

        let mut b = Vec::new();
        assert_eq!(run_bitfield(&mut b, &incr(Overflow::Fail)), [Some(3), None]);
        assert_eq!(read_field(&b, u2, 0), 3);

        let i8t = ty("i8");
        let wrap = run_bitfield(&mut Vec::new(), &[
            FieldOp::Set { ty: i8t, offset: 0, value: 127 },
            FieldOp::IncrBy { ty: i8t, offset: 0, delta: 1 },
        ]);
        assert_eq!(wrap, [Some(0), Some(-128)]);
    }

    #[test]
    fn test_failed_subcommand_does_not_block_the_rest() {
        let u4 = ty("u4");
        let mut b = Vec::new();
        let out = run_bitfield(&mut b, &[
            FieldOp::Overflow(Overflow::Fail),
            FieldOp::Set { ty: u4, offset: 0, value: 99 },
            FieldOp::Set { ty: u4, offset: 4, value: 5 },
            FieldOp::Get { ty: u4, offset: 0 },
        ]);
        assert_eq!(out, [None, Some(0), Some(0)]);
        assert_eq!(read_field(&b, u4, 4), 5);
    }
}
