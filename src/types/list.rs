use super::{ValueKind, normalize_range};
use crate::resp::Reply;
use bytes::Bytes;
use std::collections::VecDeque;

/// Double-ended list of byte strings.
#[derive(Debug, Clone, Default)]
pub struct ListValue {
    items: VecDeque<Bytes>,
}

impl ListValue {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn push_front(&mut self, item: Bytes) {
        self.items.push_front(item);
    }

    pub fn push_back(&mut self, item: Bytes) {
        self.items.push_back(item);
    }

    pub fn pop_front(&mut self) -> Option<Bytes> {
        self.items.pop_front()
    }

    pub fn pop_back(&mut self) -> Option<Bytes> {
        self.items.pop_back()
    }

    fn resolve(&self, index: i64) -> Option<usize> {
        let len = self.items.len() as i64;
        let idx = if index < 0 { len + index } else { index };
        (0..len).contains(&idx).then_some(idx as usize)
    }

    pub fn get(&self, index: i64) -> Option<&Bytes> {
        self.resolve(index).and_then(|i| self.items.get(i))
    }

    /// Replace the element at `index`. False when out of range.
    pub fn set(&mut self, index: i64, item: Bytes) -> bool {
        match self.resolve(index) {
            Some(i) => {
                self.items[i] = item;
                true
            }
            None => false,
        }
    }

    pub fn range(&self, start: i64, stop: i64) -> Vec<Bytes> {
        match normalize_range(start, stop, self.items.len()) {
            Some((s, e)) => self.items.range(s..=e).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Remove up to `count` occurrences of `item`: from the head when positive,
    /// from the tail when negative, all of them when zero.
    pub fn remove(&mut self, count: i64, item: &[u8]) -> usize {
        let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
        let mut removed = 0;
        if count >= 0 {
            let mut i = 0;
            while i < self.items.len() && removed < limit {
                if self.items[i] == item {
                    self.items.remove(i);
                    removed += 1;
                } else {
                    i += 1;
                }
            }
        } else {
            let mut i = self.items.len();
            while i > 0 && removed < limit {
                i -= 1;
                if self.items[i] == item {
                    self.items.remove(i);
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Keep only `[start, stop]`.
    pub fn trim(&mut self, start: i64, stop: i64) {
        match normalize_range(start, stop, self.items.len()) {
            Some((s, e)) => {
                self.items.truncate(e + 1);
                self.items.drain(..s);
            }
            None => self.items.clear(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.items.iter()
    }
}

impl ValueKind for ListValue {
    const TYPE_NAME: &'static str = "list";

    fn create_empty() -> Self {
        ListValue::default()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn to_reply(&self) -> Reply {
        Reply::array(self.items.iter().cloned().map(Reply::bulk).collect())
    }
}
