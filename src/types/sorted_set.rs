use super::{ValueKind, normalize_range};
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

/// Members ordered by (score, member), with O(1) score lookup.
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    scores: HashMap<Bytes, f64>,
    order: BTreeSet<(u64, Bytes)>,
}

/// Map an f64 onto a u64 whose natural order matches the float order.
fn orderable(score: f64) -> u64 {
    let bits = score.to_bits();
    if bits >> 63 == 1 { !bits } else { bits | (1 << 63) }
}

/// One end of a score interval, e.g. `(1.5` or `+inf`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBound {
    pub value: f64,
    pub exclusive: bool,
}

impl ScoreBound {
    pub fn parse(arg: &[u8]) -> ZedisResult<Self> {
        let (exclusive, body) = match arg.split_first() {
            Some((b'(', rest)) => (true, rest),
            _ => (false, arg),
        };
        let value = parse_score(body)
            .ok_or_else(|| ZedisError::generic("min or max is not a float"))?;
        Ok(ScoreBound { value, exclusive })
    }

    fn admits_above(&self, score: f64) -> bool {
        if self.exclusive { score > self.value } else { score >= self.value }
    }

    fn admits_below(&self, score: f64) -> bool {
        if self.exclusive { score < self.value } else { score <= self.value }
    }
}

/// Scores accept `inf`, `+inf` and `-inf`; NaN is rejected.
pub fn parse_score(arg: &[u8]) -> Option<f64> {
    let s = std::str::from_utf8(arg).ok()?;
    let v = match s.to_ascii_lowercase().as_str() {
        "inf" | "+inf" => f64::INFINITY,
        "-inf" => f64::NEG_INFINITY,
        other => other.parse().ok()?,
    };
    (!v.is_nan()).then_some(v)
}

impl SortedSet {
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Insert or rescore. Returns true if the member was new.
    pub fn insert(&mut self, member: Bytes, score: f64) -> bool {
        match self.scores.insert(member.clone(), score) {
            Some(old) => {
                if old != score {
                    self.order.remove(&(orderable(old), member.clone()));
                    self.order.insert((orderable(score), member));
                }
                false
            }
            None => {
                self.order.insert((orderable(score), member));
                true
            }
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.scores.remove_entry(member) {
            Some((m, score)) => {
                self.order.remove(&(orderable(score), m));
                true
            }
            None => false,
        }
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// Add `delta` to a member's score (starting from 0). Errors on NaN.
    pub fn incr(&mut self, member: Bytes, delta: f64) -> ZedisResult<f64> {
        let next = self.score(&member).unwrap_or(0.0) + delta;
        if next.is_nan() {
            return Err(ZedisError::generic("resulting score is not a number (NaN)"));
        }
        self.insert(member, next);
        Ok(next)
    }

    /// Zero-based ascending rank.
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let (m, score) = self.scores.get_key_value(member)?;
        Some(self.order.range(..(orderable(*score), m.clone())).count())
    }

    pub fn rev_rank(&self, member: &[u8]) -> Option<usize> {
        self.rank(member).map(|r| self.len() - 1 - r)
    }

    fn entry(&self, key: &(u64, Bytes)) -> (Bytes, f64) {
        let score = self.scores.get(&key.1).copied().unwrap_or_default();
        (key.1.clone(), score)
    }

    pub fn range(&self, start: i64, stop: i64, reverse: bool) -> Vec<(Bytes, f64)> {
        let Some((s, e)) = normalize_range(start, stop, self.len()) else {
            return Vec::new();
        };
        let take = e - s + 1;
        if reverse {
            self.order.iter().rev().skip(s).take(take).map(|k| self.entry(k)).collect()
        } else {
            self.order.iter().skip(s).take(take).map(|k| self.entry(k)).collect()
        }
    }

    pub fn range_by_score(&self, min: ScoreBound, max: ScoreBound) -> Vec<(Bytes, f64)> {
        let start = (orderable(min.value), Bytes::new());
        self.order
            .range((Bound::Included(start), Bound::Unbounded))
            .map(|k| self.entry(k))
            .skip_while(|(_, score)| !min.admits_above(*score))
            .take_while(|(_, score)| max.admits_below(*score))
            .collect()
    }

    pub fn count(&self, min: ScoreBound, max: ScoreBound) -> usize {
        self.range_by_score(min, max).len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Bytes, f64)> + '_ {
        self.order.iter().map(|k| self.entry(k))
    }
}

impl ValueKind for SortedSet {
    const TYPE_NAME: &'static str = "zset";

    fn create_empty() -> Self {
        SortedSet::default()
    }

    fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// `member, score, ...` in ascending order.
    fn to_reply(&self) -> Reply {
        let mut items = Vec::with_capacity(self.len() * 2);
        for (m, s) in self.iter() {
            items.push(Reply::bulk(m));
            items.push(Reply::double(s));
        }
        Reply::array(items)
    }
}
