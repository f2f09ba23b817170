//! Directed graph stored as sorted adjacency sets.

use super::ValueKind;
use crate::resp::Reply;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct Graph {
    adjacency: BTreeMap<Bytes, BTreeSet<Bytes>>,
    edges: usize,
}

impl Graph {
    /// Returns true if the edge is new.
    pub fn add_edge(&mut self, from: Bytes, to: Bytes) -> bool {
        let added = self.adjacency.entry(from).or_default().insert(to);
        self.edges += added as usize;
        added
    }

    pub fn remove_edge(&mut self, from: &[u8], to: &[u8]) -> bool {
        let Some(out) = self.adjacency.get_mut(from) else {
            return false;
        };
        let removed = out.remove(to);
        if out.is_empty() {
            self.adjacency.remove(from);
        }
        self.edges -= removed as usize;
        removed
    }

    pub fn neighbors(&self, node: &[u8]) -> Vec<Bytes> {
        self.adjacency.get(node).map(|s| s.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn edge_count(&self) -> usize {
        self.edges
    }

    /// Breadth-first visit order from `start`, at most `depth` hops out.
    /// Neighbours are visited in byte order so the result is deterministic.
    pub fn bfs(&self, start: &[u8], depth: usize) -> Vec<Bytes> {
        let start = Bytes::copy_from_slice(start);
        let mut seen: HashSet<Bytes> = HashSet::from([start.clone()]);
        let mut queue = VecDeque::from([(start, 0usize)]);
        let mut order = Vec::new();
        while let Some((node, d)) = queue.pop_front() {
            if d < depth {
                for next in self.adjacency.get(&node).into_iter().flatten() {
                    if seen.insert(next.clone()) {
                        queue.push_back((next.clone(), d + 1));
                    }
                }
            }
            order.push(node);
        }
        order
    }
}

impl ValueKind for Graph {
    const TYPE_NAME: &'static str = "graph";

    fn create_empty() -> Self {
        Graph::default()
    }

    fn is_empty(&self) -> bool {
        self.edges == 0
    }

    /// Flat `from, to, ...` edge list.
    fn to_reply(&self) -> Reply {
        let mut items = Vec::with_capacity(self.edges * 2);
        for (from, outs) in &self.adjacency {
            for to in outs {
                items.push(Reply::bulk(from.clone()));
                items.push(Reply::bulk(to.clone()));
            }
        }
        Reply::array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&'static str, &'static str)]) -> Graph {
        let mut g = Graph::default();
        for (a, b) in edges {
            g.add_edge(Bytes::from_static(a.as_bytes()), Bytes::from_static(b.as_bytes()));
        }
        g
    }

    fn names(v: Vec<Bytes>) -> Vec<String> {
        v.into_iter().map(|b| String::from_utf8_lossy(&b).into_owned()).collect()
    }

    #[test]
    fn test_bfs_respects_depth_and_cycles() {
        let g = graph(&[("a", "c"), ("a", "b"), ("b", "d"), ("d", "a"), ("c", "e")]);
        assert_eq!(names(g.bfs(b"a", 0)), ["a"]);
        assert_eq!(names(g.bfs(b"a", 1)), ["a", "b", "c"]);
        assert_eq!(names(g.bfs(b"a", 10)), ["a", "b", "c", "d", "e"]);
        assert_eq!(names(g.bfs(b"zzz", 3)), ["zzz"]);
    }

    #[test]
    fn test_edges_are_a_set() {
        let mut g = graph(&[("a", "b")]);
        assert!(!g.add_edge(Bytes::from_static(b"a"), Bytes::from_static(b"b")));
        assert_eq!(g.edge_count(), 1);
        assert_eq!(names(g.neighbors(b"a")), ["b"]);
        assert!(g.remove_edge(b"a", b"b"));
        assert!(!g.remove_edge(b"a", b"b"));
        assert!(g.is_empty());
    }
}
