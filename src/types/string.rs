use super::ValueKind;
use crate::error::{ZedisError, ZedisResult};
use crate::resp::{Reply, format_double};
use bytes::Bytes;
use std::borrow::Cow;

/// Largest string SETRANGE/APPEND/SETBIT may produce.
pub const MAX_STRING_LEN: usize = 512 * 1024 * 1024;

/// Binary-safe string. Values written as canonical integers stay integer-backed
/// so INCR and friends avoid reparsing.
#[derive(Debug, Clone, PartialEq)]
pub enum StrValue {
    Int(i64),
    Raw(Vec<u8>),
}

impl StrValue {
    /// Store `data`, keeping it integer-backed when it round-trips exactly.
    pub fn new(data: &[u8]) -> Self {
        match parse_canonical_int(data) {
            Some(n) => StrValue::Int(n),
            None => StrValue::Raw(data.to_vec()),
        }
    }

    pub fn from_int(n: i64) -> Self {
        StrValue::Int(n)
    }

    pub fn as_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            StrValue::Int(n) => Cow::Owned(n.to_string().into_bytes()),
            StrValue::Raw(data) => Cow::Borrowed(data),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.as_bytes().into_owned())
    }

    pub fn len(&self) -> usize {
        match self {
            StrValue::Int(n) => n.to_string().len(),
            StrValue::Raw(data) => data.len(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            StrValue::Int(n) => Some(*n),
            StrValue::Raw(data) => std::str::from_utf8(data).ok()?.parse().ok(),
        }
    }

    /// Raw bytes for in-place edits; drops the integer encoding.
    pub fn bytes_mut(&mut self) -> &mut Vec<u8> {
        if let StrValue::Int(n) = *self {
            *self = StrValue::Raw(n.to_string().into_bytes());
        }
        match self {
            StrValue::Raw(data) => data,
            StrValue::Int(_) => unreachable!("integer encoding replaced above"),
        }
    }

    /// Checked integer add. The stored value is untouched on error.
    pub fn incr_by(&mut self, delta: i64) -> ZedisResult<i64> {
        let current = self.as_int().ok_or(ZedisError::NotInteger)?;
        let next = current.checked_add(delta).ok_or(ZedisError::Overflow)?;
        *self = StrValue::Int(next);
        Ok(next)
    }

    pub fn incr_by_float(&mut self, delta: f64) -> ZedisResult<f64> {
        let current: f64 = std::str::from_utf8(&self.as_bytes())
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or(ZedisError::NotFloat)?;
        let next = current + delta;
        if !next.is_finite() {
            return Err(ZedisError::NanOrInfinity);
        }
        *self = StrValue::new(format_double(next).as_bytes());
        Ok(next)
    }

    pub fn append(&mut self, data: &[u8]) -> ZedisResult<usize> {
        check_len(self.len() + data.len())?;
        let buf = self.bytes_mut();
        buf.extend_from_slice(data);
        Ok(buf.len())
    }

    pub fn getrange(&self, start: i64, end: i64) -> Vec<u8> {
        let bytes = self.as_bytes();
        match super::normalize_range(start, end, bytes.len()) {
            Some((s, e)) => bytes[s..=e].to_vec(),
            None => Vec::new(),
        }
    }

    /// Overwrite from `offset`, zero-padding as needed. Returns the new length.
    pub fn setrange(&mut self, offset: usize, data: &[u8]) -> ZedisResult<usize> {
        if data.is_empty() {
            return Ok(self.len());
        }
        let needed = offset + data.len();
        check_len(needed)?;
        let buf = self.bytes_mut();
        if needed > buf.len() {
            buf.resize(needed, 0);
        }
        buf[offset..needed].copy_from_slice(data);
        Ok(buf.len())
    }
}

impl ValueKind for StrValue {
    const TYPE_NAME: &'static str = "string";

    fn create_empty() -> Self {
        StrValue::Raw(Vec::new())
    }

    fn to_reply(&self) -> Reply {
        Reply::bulk(self.to_bytes())
    }
}

pub fn check_len(len: usize) -> ZedisResult<()> {
    if len > MAX_STRING_LEN {
        return Err(ZedisError::generic("string exceeds maximum allowed size (512MB)"));
    }
    Ok(())
}

/// Parse `data` as an i64 only if formatting it back yields the same bytes,
/// so "007" or "+1" stay raw strings.
fn parse_canonical_int(data: &[u8]) -> Option<i64> {
    if data.is_empty() || data.len() > 20 {
        return None;
    }
    let n: i64 = std::str::from_utf8(data).ok()?.parse().ok()?;
    (n.to_string().as_bytes() == data).then_some(n)
}
