use super::ValueKind;
use crate::resp::Reply;
use bytes::Bytes;
use rand::seq::IteratorRandom;
use std::collections::HashSet;

/// Unordered collection of unique byte strings.
#[derive(Debug, Clone, Default)]
pub struct SetValue {
    members: HashSet<Bytes>,
}

impl SetValue {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the member was new.
    pub fn insert(&mut self, member: Bytes) -> bool {
        self.members.insert(member)
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        self.members.remove(member)
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.members.contains(member)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.members.iter()
    }

    /// Remove and return up to `count` random members.
    pub fn pop_random(&mut self, count: usize) -> Vec<Bytes> {
        let picked: Vec<Bytes> = self
            .members
            .iter()
            .cloned()
            .choose_multiple(&mut rand::thread_rng(), count);
        for m in &picked {
            self.members.remove(m);
        }
        picked
    }
}

impl FromIterator<Bytes> for SetValue {
    fn from_iter<I: IntoIterator<Item = Bytes>>(iter: I) -> Self {
        SetValue {
            members: iter.into_iter().collect(),
        }
    }
}

impl ValueKind for SetValue {
    const TYPE_NAME: &'static str = "set";

    fn create_empty() -> Self {
        SetValue::default()
    }

    fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn to_reply(&self) -> Reply {
        Reply::array(self.members.iter().cloned().map(Reply::bulk).collect())
    }
}
