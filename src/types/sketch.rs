//! Frequency sketches: Count-Min and Top-K.

use super::{ValueKind, seeded_hash};
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;
use bytes::Bytes;
use std::collections::HashMap;

pub const DEFAULT_CMS_WIDTH: usize = 2000;
pub const DEFAULT_CMS_DEPTH: usize = 5;
pub const DEFAULT_TOPK: usize = 50;

#[derive(Debug, Clone)]
pub struct CountMinSketch {
    width: usize,
    depth: usize,
    counters: Vec<u64>,
    total: u64,
}

impl CountMinSketch {
    pub fn new(width: usize, depth: usize) -> ZedisResult<Self> {
        if width == 0 || depth == 0 {
            return Err(ZedisError::generic("CMS: invalid width/depth"));
        }
        Ok(CountMinSketch { width, depth, counters: vec![0; width * depth], total: 0 })
    }

    fn cell(&self, row: usize, item: &[u8]) -> usize {
        row * self.width + (seeded_hash(item, row as u64) % self.width as u64) as usize
    }

    /// Returns the new estimate for `item`.
    pub fn incr_by(&mut self, item: &[u8], by: u64) -> u64 {
        let mut min = u64::MAX;
        for row in 0..self.depth {
            let i = self.cell(row, item);
            self.counters[i] = self.counters[i].saturating_add(by);
            min = min.min(self.counters[i]);
        }
        self.total = self.total.saturating_add(by);
        min
    }

    /// Never undercounts; may overcount on collisions.
    pub fn query(&self, item: &[u8]) -> u64 {
        (0..self.depth).map(|row| self.counters[self.cell(row, item)]).min().unwrap_or(0)
    }
}

impl ValueKind for CountMinSketch {
    const TYPE_NAME: &'static str = "CMSk-TYPE";

    fn create_empty() -> Self {
        CountMinSketch {
            width: DEFAULT_CMS_WIDTH,
            depth: DEFAULT_CMS_DEPTH,
            counters: vec![0; DEFAULT_CMS_WIDTH * DEFAULT_CMS_DEPTH],
            total: 0,
        }
    }

    /// CMS.INFO layout.
    fn to_reply(&self) -> Reply {
        Reply::array(vec![
            Reply::status("width"),
            Reply::integer(self.width as i64),
            Reply::status("depth"),
            Reply::integer(self.depth as i64),
            Reply::status("count"),
            Reply::integer(self.total as i64),
        ])
    }
}

/// Heavy hitters tracked in a bounded candidate table.
///
/// Counts are exact while an item stays in the table. When the table overflows,
/// the lightest candidates are dropped, so a late-arriving heavy item can be
/// undercounted.
#[derive(Debug, Clone)]
pub struct TopK {
    k: usize,
    width: usize,
    counts: HashMap<Bytes, u64>,
}

impl TopK {
    pub fn new(k: usize, width: Option<usize>) -> ZedisResult<Self> {
        if k == 0 {
            return Err(ZedisError::generic("TopK: invalid k"));
        }
        let width = width.unwrap_or(k * 8).max(k);
        Ok(TopK { k, width, counts: HashMap::new() })
    }

    /// The current top list, heaviest first, ties by item.
    pub fn list(&self) -> Vec<(Bytes, u64)> {
        let mut all: Vec<(Bytes, u64)> =
            self.counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
        all.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        all.truncate(self.k);
        all
    }

    fn in_top(&self, item: &[u8]) -> bool {
        self.list().iter().any(|(m, _)| m.as_ref() == item)
    }

    /// Count one occurrence. Returns the item pushed out of the top list, if any.
    pub fn add(&mut self, item: Bytes, by: u64) -> Option<Bytes> {
        let before = self.list();
        *self.counts.entry(item).or_insert(0) += by;
        if self.counts.len() > self.width {
            let keep: Vec<(Bytes, u64)> = {
                let mut all: Vec<_> = self.counts.drain().collect();
                all.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                all.truncate(self.width);
                all
            };
            self.counts.extend(keep);
        }
        let after = self.list();
        before
            .into_iter()
            .map(|(m, _)| m)
            .find(|m| !after.iter().any(|(a, _)| a == m))
    }

    pub fn query(&self, item: &[u8]) -> bool {
        self.in_top(item)
    }

    pub fn count(&self, item: &[u8]) -> u64 {
        self.counts.get(item).copied().unwrap_or(0)
    }
}

impl ValueKind for TopK {
    const TYPE_NAME: &'static str = "TopK-TYPE";

    fn create_empty() -> Self {
        TopK { k: DEFAULT_TOPK, width: DEFAULT_TOPK * 8, counts: HashMap::new() }
    }

    /// TOPK.INFO layout.
    fn to_reply(&self) -> Reply {
        Reply::array(vec![
            Reply::status("k"),
            Reply::integer(self.k as i64),
            Reply::status("width"),
            Reply::integer(self.width as i64),
            Reply::status("depth"),
            Reply::integer(1),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cms_never_undercounts() {
        let mut cms = CountMinSketch::new(50, 4).unwrap();
        for i in 0..200u64 {
            cms.incr_by(format!("k{}", i % 20).as_bytes(), 1);
        }
        for i in 0..20 {
            assert!(cms.query(format!("k{i}").as_bytes()) >= 10);
        }
        assert_eq!(cms.incr_by(b"fresh-item", 0), cms.query(b"fresh-item"));
        assert!(CountMinSketch::new(0, 1).is_err());
    }

    #[test]
    fn test_topk_keeps_heaviest() {
        let mut t = TopK::new(2, None).unwrap();
        for (item, n) in [("a", 5), ("b", 3), ("c", 1)] {
            for _ in 0..n {
                t.add(Bytes::from_static(item.as_bytes()), 1);
            }
        }
        assert_eq!(t.list(),[(Bytes::from_static(b"a"), 5), (Bytes::from_static(b"b"), 3)]);
        assert!(t.query(b"a"));
        assert!(!t.query(b"c"));
    }

    #[test]
    fn test_topk_reports_expelled_item() {
        let mut t = TopK::new(1, None).unwrap();
        assert_eq!(t.add(Bytes::from_static(b"a"), 1), None);
        assert_eq!(t.add(Bytes::from_static(b"b"), 1), None);
        assert_eq!(t.add(Bytes::from_static(b"b"), 1), Some(Bytes::from_static(b"a")));
    }
}
