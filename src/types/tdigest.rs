//! Merging t-digest for streaming quantile estimates.

use super::ValueKind;
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;

pub const DEFAULT_COMPRESSION: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Centroid {
    mean: f64,
    weight: f64,
}

#[derive(Debug, Clone)]
pub struct TDigest {
    compression: f64,
    centroids: Vec<Centroid>,
    count: f64,
    min: f64,
    max: f64,
}

impl TDigest {
    pub fn new(compression: f64) -> ZedisResult<Self> {
        if !(compression.is_finite() && compression >= 1.0) {
            return Err(ZedisError::generic("T-Digest: compression parameter needs to be a positive integer"));
        }
        Ok(TDigest {
            compression,
            centroids: Vec::new(),
            count: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        })
    }

    pub fn add(&mut self, values: &[f64]) {
        for &v in values {
            self.centroids.push(Centroid { mean: v, weight: 1.0 });
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
        self.count += values.len() as f64;
        self.compress();
    }

    /// Greedy merge of neighbours while each centroid stays under the
    /// `4 n q (1 - q) / δ` size bound for its quantile.
    fn compress(&mut self) {
        if self.centroids.len() <= self.compression as usize {
            return;
        }
        self.centroids.sort_by(|a, b| a.mean.total_cmp(&b.mean));
        let n = self.count;
        let mut merged: Vec<Centroid> = Vec::with_capacity(self.compression as usize * 2);
        let mut seen = 0.0;
        for c in self.centroids.drain(..) {
            if let Some(cur) = merged.last_mut() {
                let q = (seen - cur.weight + (cur.weight + c.weight) / 2.0) / n;
                let bound = (4.0 * n * q * (1.0 - q) / self.compression).max(1.0);
                if cur.weight + c.weight <= bound {
                    let w = cur.weight + c.weight;
                    cur.mean += (c.mean - cur.mean) * c.weight / w;
                    cur.weight = w;
                    seen += c.weight;
                    continue;
                }
            }
            seen += c.weight;
            merged.push(c);
        }
        self.centroids = merged;
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0.0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0.0).then_some(self.max)
    }

    /// Estimated value at quantile `q` in `[0, 1]`; `None` when empty.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        let mut cs = self.centroids.clone();
        cs.sort_by(|a, b| a.mean.total_cmp(&b.mean));
        let (first, last) = (cs.first()?, cs.last()?);
        if cs.len() == 1 || q <= 0.0 {
            return Some(if q <= 0.0 { self.min } else { first.mean });
        }
        if q >= 1.0 {
            return Some(self.max);
        }
        let n = self.count;
        let target = q * n;
        let lerp = |x0: f64, y0: f64, x1: f64, y1: f64| {
            if x1 <= x0 { y0 } else { y0 + (target - x0) / (x1 - x0) * (y1 - y0) }
        };
        if target < first.weight / 2.0 {
            return Some(lerp(0.0, self.min, first.weight / 2.0, first.mean));
        }
        let mut cum = 0.0;
        for pair in cs.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let ca = cum + a.weight / 2.0;
            let cb = cum + a.weight + b.weight / 2.0;
            if target <= cb {
                return Some(lerp(ca, a.mean, cb, b.mean));
            }
            cum += a.weight;
        }
        Some(lerp(n - last.weight / 2.0, last.mean, n, self.max))
    }
}

impl ValueKind for TDigest {
    const TYPE_NAME: &'static str = "TDIS-TYPE";

    fn create_empty() -> Self {
        TDigest {
            compression: DEFAULT_COMPRESSION,
            centroids: Vec::new(),
            count: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// TDIGEST.INFO layout.
    fn to_reply(&self) -> Reply {
        Reply::array(vec![
            Reply::status("Compression"),
            Reply::integer(self.compression as i64),
            Reply::status("Merged nodes"),
            Reply::integer(self.centroids.len() as i64),
            Reply::status("Unmerged nodes"),
            Reply::integer(0),
            Reply::status("Observations"),
            Reply::integer(self.count as i64),
        ])
    }
}
