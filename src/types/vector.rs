//! Fixed-dimension float vectors with exhaustive cosine-similarity search.

use super::ValueKind;
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;
use bytes::Bytes;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    /// Set by the first insert; zero while the index has never held a vector.
    dim: usize,
    vectors: HashMap<Bytes, Vec<f32>>,
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na.sqrt() * nb.sqrt()) }
}

impl VectorIndex {
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    fn check_dim(&self, got: usize) -> ZedisResult<()> {
        if self.dim != 0 && got != self.dim {
            return Err(ZedisError::Generic(format!(
                "Vector dimension mismatch - got {got} but set has {}",
                self.dim
            )));
        }
        Ok(())
    }

    /// Insert or replace. Returns true if the id was new.
    pub fn add(&mut self, id: Bytes, vector: Vec<f32>) -> ZedisResult<bool> {
        if vector.is_empty() {
            return Err(ZedisError::generic("vector must have at least one component"));
        }
        self.check_dim(vector.len())?;
        self.dim = vector.len();
        Ok(self.vectors.insert(id, vector).is_none())
    }

    pub fn remove(&mut self, id: &[u8]) -> bool {
        self.vectors.remove(id).is_some()
    }

    /// The `k` most similar ids, best first; equal scores order by id.
    pub fn search(&self, query: &[f32], k: usize) -> ZedisResult<Vec<(Bytes, f32)>> {
        self.check_dim(query.len())?;
        let mut scored: Vec<(Bytes, f32)> = self
            .vectors
            .iter()
            .map(|(id, v)| (id.clone(), cosine(query, v)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }
}

impl ValueKind for VectorIndex {
    const TYPE_NAME: &'static str = "vectorset";

    fn create_empty() -> Self {
        VectorIndex::default()
    }

    fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    fn to_reply(&self) -> Reply {
        let mut ids: Vec<&Bytes> = self.vectors.keys().collect();
        ids.sort();
        Reply::array(ids.into_iter().cloned().map(Reply::bulk).collect())
    }
}
