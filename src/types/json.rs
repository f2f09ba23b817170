//! JSON documents addressed by a small path language: `$` (or `.`) for the root,
//! then `.field` and `[index]` segments. Negative indexes count from the end.

use super::ValueKind;
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;
use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Field(String),
    Index(i64),
}

/// A parsed path. An empty segment list is the root.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath(Vec<Segment>);

impl JsonPath {
    pub fn root() -> Self {
        JsonPath(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn parse(arg: &[u8]) -> ZedisResult<Self> {
        let bad = || ZedisError::generic("invalid JSON path");
        let s = std::str::from_utf8(arg).map_err(|_| bad())?;
        let mut rest = s.strip_prefix('$').unwrap_or(s);
        if rest == "." {
            return Ok(JsonPath::root());
        }
        let mut segments = Vec::new();
        let mut first = true;
        while !rest.is_empty() {
            if let Some(inner) = rest.strip_prefix('[') {
                let end = inner.find(']').ok_or_else(bad)?;
                let body = inner[..end].trim();
                let seg = match body.strip_prefix('"').and_then(|b| b.strip_suffix('"')) {
                    Some(quoted) => Segment::Field(quoted.to_string()),
                    None => Segment::Index(body.parse().map_err(|_| bad())?),
                };
                segments.push(seg);
                rest = &inner[end + 1..];
            } else {
                let body = match rest.strip_prefix('.') {
                    Some(b) => b,
                    None if first => rest,
                    None => return Err(bad()),
                };
                let end = body.find(['.', '[']).unwrap_or(body.len());
                if end == 0 {
                    return Err(bad());
                }
                segments.push(Segment::Field(body[..end].to_string()));
                rest = &body[end..];
            }
            first = false;
        }
        Ok(JsonPath(segments))
    }

    fn split_last(&self) -> Option<(&Segment, &[Segment])> {
        self.0.split_last()
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let i = if index < 0 { len as i64 + index } else { index };
    (0..len as i64).contains(&i).then_some(i as usize)
}

fn step<'a>(node: &'a Json, seg: &Segment) -> Option<&'a Json> {
    match (node, seg) {
        (Json::Object(map), Segment::Field(f)) => map.get(f),
        (Json::Array(items), Segment::Index(i)) => items.get(resolve_index(*i, items.len())?),
        _ => None,
    }
}

fn step_mut<'a>(node: &'a mut Json, seg: &Segment) -> Option<&'a mut Json> {
    match (node, seg) {
        (Json::Object(map), Segment::Field(f)) => map.get_mut(f),
        (Json::Array(items), Segment::Index(i)) => {
            let idx = resolve_index(*i, items.len())?;
            items.get_mut(idx)
        }
        _ => None,
    }
}

pub fn type_name(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

pub fn parse_json(arg: &[u8]) -> ZedisResult<Json> {
    serde_json::from_slice(arg)
        .map_err(|e| ZedisError::Generic(format!("invalid JSON: {e}")))
}

#[derive(Debug, Clone)]
pub struct JsonDoc {
    root: Json,
}

impl JsonDoc {
    pub fn new(root: Json) -> Self {
        JsonDoc { root }
    }

    pub fn get(&self, path: &JsonPath) -> Option<&Json> {
        path.0.iter().try_fold(&self.root, step)
    }

    fn get_mut(&mut self, segments: &[Segment]) -> Option<&mut Json> {
        segments.iter().try_fold(&mut self.root, |node, seg| step_mut(node, seg))
    }

    /// Replace the value at `path`, or add a new object member under an existing
    /// parent. Returns false when the path cannot be reached.
    pub fn set(&mut self, path: &JsonPath, value: Json) -> bool {
        let Some((last, parent)) = path.split_last() else {
            self.root = value;
            return true;
        };
        match (self.get_mut(parent), last) {
            (Some(Json::Object(map)), Segment::Field(f)) => {
                map.insert(f.clone(), value);
                true
            }
            (Some(Json::Array(items)), Segment::Index(i)) => match resolve_index(*i, items.len()) {
                Some(idx) => {
                    items[idx] = value;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    /// Remove the value at a non-root path. Returns how many values went (0 or 1).
    pub fn delete(&mut self, path: &JsonPath) -> usize {
        let Some((last, parent)) = path.split_last() else {
            return 0;
        };
        let removed = match (self.get_mut(parent), last) {
            (Some(Json::Object(map)), Segment::Field(f)) => map.remove(f).is_some(),
            (Some(Json::Array(items)), Segment::Index(i)) => match resolve_index(*i, items.len()) {
                Some(idx) => {
                    items.remove(idx);
                    true
                }
                None => false,
            },
            _ => false,
        };
        removed as usize
    }
}

impl ValueKind for JsonDoc {
    const TYPE_NAME: &'static str = "ReJSON-RL";

    fn create_empty() -> Self {
        JsonDoc { root: Json::Null }
    }

    fn to_reply(&self) -> Reply {
        Reply::bulk(self.root.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> JsonPath {
        JsonPath::parse(s.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_paths() {
        assert!(path("$").is_root());
        assert!(path(".").is_root());
        assert_eq!(
            path("$.a.b[2]").0,
            [Segment::Field("a".into()), Segment::Field("b".into()), Segment::Index(2)]
        );
        assert_eq!(path(".a[-1]").0, [Segment::Field("a".into()), Segment::Index(-1)]);
        assert_eq!(path("a").0, [Segment::Field("a".into())]);
        assert_eq!(path("$[\"x y\"]").0, [Segment::Field("x y".into())]);
        assert!(JsonPath::parse(b"$.a..b").is_err());
        assert!(JsonPath::parse(b"$[abc]").is_err());
    }

    #[test]
    fn test_get_set_delete() {
        let mut doc = JsonDoc::new(json!({"user": {"name": "ann", "tags": ["a", "b"]}}));
        assert_eq!(doc.get(&path("$.user.name")), Some(&json!("ann")));
        assert_eq!(doc.get(&path("$.user.tags[-1]")), Some(&json!("b")));
        assert_eq!(doc.get(&path("$.missing")), None);

        assert!(doc.set(&path("$.user.age"), json!(30)));
        assert!(doc.set(&path("$.user.tags[0]"), json!("z")));
        assert!(!doc.set(&path("$.user.tags[5]"), json!("q")));
        assert!(!doc.set(&path("$.nope.deeper"), json!(1)));
        assert_eq!(type_name(doc.get(&path("$.user.age")).unwrap()), "integer");

        assert_eq!(doc.delete(&path("$.user.tags[0]")), 1);
        assert_eq!(doc.delete(&path("$.user.tags[0]")), 1);
        assert_eq!(doc.delete(&path("$.user.tags[0]")), 0);
        assert_eq!(doc.get(&path("$.user.tags")), Some(&json!([])));
    }

    #[test]
    fn test_root_replace() {
        let mut doc = JsonDoc::create_empty();
        assert!(doc.set(&JsonPath::root(), json!([1, 2.5])));
        assert_eq!(doc.to_reply(), Reply::bulk("[1,2.5]"));
        assert_eq!(type_name(doc.get(&path("$[1]")).unwrap()), "number");
    }
}
