use super::ValueKind;
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;

/// `<ms>-<seq>` stream entry identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId { ms: u64::MAX, seq: u64::MAX };

    pub fn new(ms: u64, seq: u64) -> Self {
        StreamId { ms, seq }
    }

    /// Parse `ms-seq`, or a bare `ms` whose sequence defaults to `default_seq`.
    pub fn parse(arg: &[u8], default_seq: u64) -> Option<Self> {
        let s = std::str::from_utf8(arg).ok()?;
        match s.split_once('-') {
            Some((ms, seq)) => Some(StreamId::new(ms.parse().ok()?, seq.parse().ok()?)),
            None => Some(StreamId::new(s.parse().ok()?, default_seq)),
        }
    }

    fn next(self) -> Option<Self> {
        if self.seq < u64::MAX {
            Some(StreamId::new(self.ms, self.seq + 1))
        } else if self.ms < u64::MAX {
            Some(StreamId::new(self.ms + 1, 0))
        } else {
            None
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// The ID argument of XADD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IdSpec {
    /// `*`
    Auto,
    /// `<ms>-*`
    AutoSeq(u64),
    Explicit(StreamId),
}

impl IdSpec {
    pub fn parse(arg: &[u8]) -> ZedisResult<Self> {
        let invalid = || ZedisError::generic("Invalid stream ID specified as stream command argument");
        if arg == b"*" {
            return Ok(IdSpec::Auto);
        }
        if let Some(ms) = arg.strip_suffix(b"-*") {
            let ms = std::str::from_utf8(ms).ok().and_then(|s| s.parse().ok()).ok_or_else(invalid)?;
            return Ok(IdSpec::AutoSeq(ms));
        }
        StreamId::parse(arg, 0).map(IdSpec::Explicit).ok_or_else(invalid)
    }
}

/// One end of an XRANGE interval: `-`, `+`, `id`, or `(id`.
pub fn parse_range_bound(arg: &[u8], is_start: bool) -> ZedisResult<Bound<StreamId>> {
    let invalid = || ZedisError::generic("Invalid stream ID specified as stream command argument");
    match arg {
        b"-" => Ok(Bound::Included(StreamId::MIN)),
        b"+" => Ok(Bound::Included(StreamId::MAX)),
        _ => {
            let (exclusive, body) = match arg.split_first() {
                Some((b'(', rest)) => (true, rest),
                _ => (false, arg),
            };
            let default_seq = if is_start { 0 } else { u64::MAX };
            let id = StreamId::parse(body, default_seq).ok_or_else(invalid)?;
            Ok(if exclusive { Bound::Excluded(id) } else { Bound::Included(id) })
        }
    }
}

pub type Fields = Vec<(Bytes, Bytes)>;

/// Append-only log of field/value records keyed by increasing IDs.
#[derive(Debug, Clone, Default)]
pub struct Stream {
    entries: BTreeMap<StreamId, Fields>,
    last_id: StreamId,
}

impl Stream {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn last_id(&self) -> StreamId {
        self.last_id
    }

    /// Resolve an XADD id against the current top of the stream, without inserting.
    pub fn next_id(&self, spec: IdSpec, now_ms: u64) -> ZedisResult<StreamId> {
        let too_small = || {
            ZedisError::generic(
                "The ID specified in XADD is equal or smaller than the target stream top item",
            )
        };
        let id = match spec {
            IdSpec::Auto => {
                if now_ms > self.last_id.ms {
                    StreamId::new(now_ms, 0)
                } else {
                    self.last_id.next().ok_or_else(too_small)?
                }
            }
            IdSpec::AutoSeq(ms) => {
                if ms > self.last_id.ms {
                    StreamId::new(ms, 0)
                } else if ms == self.last_id.ms {
                    self.last_id.next().filter(|id| id.ms == ms).ok_or_else(too_small)?
                } else {
                    return Err(too_small());
                }
            }
            IdSpec::Explicit(id) => {
                if id == StreamId::MIN {
                    return Err(ZedisError::generic(
                        "The ID specified in XADD must be greater than 0-0",
                    ));
                }
                if id <= self.last_id {
                    return Err(too_small());
                }
                id
            }
        };
        Ok(id)
    }

    /// Append under an id obtained from [`Stream::next_id`].
    pub fn append(&mut self, id: StreamId, fields: Fields) {
        self.entries.insert(id, fields);
        self.last_id = id;
    }

    pub fn range(
        &self,
        start: Bound<StreamId>,
        end: Bound<StreamId>,
        reverse: bool,
        count: Option<usize>,
    ) -> Vec<(StreamId, &Fields)> {
        // BTreeMap::range panics on inverted bounds.
        let empty = match (start, end) {
            (Bound::Included(s), Bound::Included(e)) => s > e,
            (Bound::Included(s) | Bound::Excluded(s), Bound::Included(e) | Bound::Excluded(e)) => {
                s >= e
            }
            _ => false,
        };
        if empty {
            return Vec::new();
        }
        let limit = count.unwrap_or(usize::MAX);
        let iter = self.entries.range((start, end)).map(|(id, f)| (*id, f));
        if reverse {
            iter.rev().take(limit).collect()
        } else {
            iter.take(limit).collect()
        }
    }

    pub fn delete(&mut self, id: StreamId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Drop the oldest entries until at most `maxlen` remain. Returns how many went.
    pub fn trim(&mut self, maxlen: usize) -> usize {
        let mut removed = 0;
        while self.entries.len() > maxlen {
            self.entries.pop_first();
            removed += 1;
        }
        removed
    }
}

pub fn entry_reply(id: StreamId, fields: &Fields) -> Reply {
    let mut flat = Vec::with_capacity(fields.len() * 2);
    for (f, v) in fields {
        flat.push(Reply::bulk(f.clone()));
        flat.push(Reply::bulk(v.clone()));
    }
    Reply::array(vec![Reply::bulk(id.to_string()), Reply::array(flat)])
}

impl ValueKind for Stream {
    const TYPE_NAME: &'static str = "stream";

    fn create_empty() -> Self {
        Stream::default()
    }

    fn to_reply(&self) -> Reply {
        Reply::array(self.entries.iter().map(|(id, f)| entry_reply(*id, f)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Fields {
        vec![(Bytes::from_static(b"f"), Bytes::from_static(b"v"))]
    }

    #[test]
    fn test_auto_ids_are_monotonic_even_if_clock_goes_back() {
        let mut s = Stream::default();
        let a = s.next_id(IdSpec::Auto, 1000).unwrap();
        s.append(a, fields());
        let b = s.next_id(IdSpec::Auto, 1000).unwrap();
        s.append(b, fields());
        let c = s.next_id(IdSpec::Auto, 900).unwrap();
        assert_eq!(a, StreamId::new(1000, 0));
        assert_eq!(b, StreamId::new(1000, 1));
        assert_eq!(c, StreamId::new(1000, 2));
    }

    #[test]
    fn test_explicit_ids_must_increase() {
        let mut s = Stream::default();
        assert!(s.next_id(IdSpec::Explicit(StreamId::MIN), 0).is_err());
        let id = s.next_id(IdSpec::parse(b"5-1").unwrap(), 0).unwrap();
        s.append(id, fields());
        assert!(s.next_id(IdSpec::parse(b"5-1").unwrap(), 0).is_err());
        assert!(s.next_id(IdSpec::parse(b"4").unwrap(), 0).is_err());
        assert_eq!(s.next_id(IdSpec::parse(b"5-*").unwrap(), 0).unwrap(), StreamId::new(5, 2));
        assert_eq!(s.next_id(IdSpec::parse(b"6-*").unwrap(), 0).unwrap(), StreamId::new(6, 0));
    }

    #[test]
    fn test_range_and_trim() {
        let mut s = Stream::default();
        for ms in 1..=5 {
            s.append(StreamId::new(ms, 0), fields());
        }
        let all = s.range(parse_range_bound(b"-", true).unwrap(), parse_range_bound(b"+", false).unwrap(), false, None);
        assert_eq!(all.len(), 5);
        let mid = s.range(parse_range_bound(b"2", true).unwrap(), parse_range_bound(b"(4", false).unwrap(), false, None);
        assert_eq!(mid.iter().map(|(id, _)| id.ms).collect::<Vec<_>>(), [2, 3]);
        let rev = s.range(Bound::Included(StreamId::MIN), Bound::Included(StreamId::MAX), true, Some(2));
        assert_eq!(rev.iter().map(|(id, _)| id.ms).collect::<Vec<_>>(), [5, 4]);

        assert_eq!(s.trim(2), 3);
        assert_eq!(s.len(), 2);
        assert_eq!(s.last_id(), StreamId::new(5, 0));
    }
}
