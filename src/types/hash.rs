use super::ValueKind;
use crate::resp::Reply;
use bytes::Bytes;
use std::collections::HashMap;

/// Field to value map.
#[derive(Debug, Clone, Default)]
pub struct HashValue {
    fields: HashMap<Bytes, Bytes>,
}

impl HashValue {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, field: &[u8]) -> Option<&Bytes> {
        self.fields.get(field)
    }

    /// Returns true if the field is new.
    pub fn insert(&mut self, field: Bytes, value: Bytes) -> bool {
        self.fields.insert(field, value).is_none()
    }

    pub fn remove(&mut self, field: &[u8]) -> bool {
        self.fields.remove(field).is_some()
    }

    pub fn contains(&self, field: &[u8]) -> bool {
        self.fields.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Bytes)> {
        self.fields.iter()
    }
}

impl ValueKind for HashValue {
    const TYPE_NAME: &'static str = "hash";

    fn create_empty() -> Self {
        HashValue::default()
    }

    fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Flat `field, value, field, value, ...` array (HGETALL).
    fn to_reply(&self) -> Reply {
        let mut items = Vec::with_capacity(self.fields.len() * 2);
        for (f, v) in &self.fields {
            items.push(Reply::bulk(f.clone()));
            items.push(Reply::bulk(v.clone()));
        }
        Reply::array(items)
    }
}
