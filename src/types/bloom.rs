//! Scalable Bloom filter: a stack of fixed-size layers, each new one twice the
//! capacity and half the error rate of the last.

use super::{ValueKind, seeded_hash};
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;

pub const DEFAULT_ERROR_RATE: f64 = 0.01;
pub const DEFAULT_CAPACITY: u64 = 1000;
const EXPANSION: u64 = 2;

#[derive(Debug, Clone)]
struct Layer {
    bits: Vec<u64>,
    nbits: u64,
    hashes: u32,
    capacity: u64,
    items: u64,
}

impl Layer {
    fn new(capacity: u64, error_rate: f64) -> Self {
        let ln2 = std::f64::consts::LN_2;
        let nbits = ((-(capacity as f64) * error_rate.ln()) / (ln2 * ln2)).ceil().max(64.0) as u64;
        let hashes = ((nbits as f64 / capacity as f64) * ln2).round().max(1.0) as u32;
        Layer {
            bits: vec![0; nbits.div_ceil(64) as usize],
            nbits,
            hashes,
            capacity,
            items: 0,
        }
    }

    /// Kirsch-Mitzenmacher double hashing: position i is h1 + i*h2.
    fn positions(&self, item: &[u8]) -> impl Iterator<Item = u64> + '_ {
        let h1 = seeded_hash(item, 0x9e37);
        let h2 = seeded_hash(item, 0x7f4a) | 1;
        (0..self.hashes as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % self.nbits)
    }

    fn contains(&self, item: &[u8]) -> bool {
        self.positions(item).all(|p| self.bits[(p / 64) as usize] & (1 << (p % 64)) != 0)
    }

    fn insert(&mut self, item: &[u8]) {
        let positions: Vec<u64> = self.positions(item).collect();
        for p in positions {
            self.bits[(p / 64) as usize] |= 1 << (p % 64);
        }
        self.items += 1;
    }
}

#[derive(Debug, Clone)]
pub struct BloomFilter {
    layers: Vec<Layer>,
    error_rate: f64,
    scaling: bool,
}

impl BloomFilter {
    pub fn new(error_rate: f64, capacity: u64, scaling: bool) -> ZedisResult<Self> {
        if !(error_rate > 0.0 && error_rate < 1.0) {
            return Err(ZedisError::generic("(0 < error rate range < 1)"));
        }
        if capacity == 0 {
            return Err(ZedisError::generic("(capacity should be larger than 0)"));
        }
        Ok(BloomFilter {
            layers: vec![Layer::new(capacity, error_rate)],
            error_rate,
            scaling,
        })
    }

    pub fn contains(&self, item: &[u8]) -> bool {
        self.layers.iter().any(|l| l.contains(item))
    }

    /// Returns false if the item was (probably) present already.
    pub fn add(&mut self, item: &[u8]) -> ZedisResult<bool> {
        if self.contains(item) {
            return Ok(false);
        }
        let full = self.layers.last().is_some_and(|l| l.items >= l.capacity);
        if full {
            if !self.scaling {
                return Err(ZedisError::generic("non scaling filter is full"));
            }
            let n = self.layers.len() as i32;
            let capacity = self.layers[0].capacity * EXPANSION.pow(n as u32);
            self.layers.push(Layer::new(capacity, self.error_rate * 0.5f64.powi(n)));
        }
        if let Some(top) = self.layers.last_mut() {
            top.insert(item);
        }
        Ok(true)
    }

    pub fn capacity(&self) -> u64 {
        self.layers.iter().map(|l| l.capacity).sum()
    }

    pub fn items(&self) -> u64 {
        self.layers.iter().map(|l| l.items).sum()
    }
}

impl ValueKind for BloomFilter {
    const TYPE_NAME: &'static str = "MBbloom--";

    fn create_empty() -> Self {
        BloomFilter {
            layers: vec![Layer::new(DEFAULT_CAPACITY, DEFAULT_ERROR_RATE)],
            error_rate: DEFAULT_ERROR_RATE,
            scaling: true,
        }
    }

    /// BF.INFO layout.
    fn to_reply(&self) -> Reply {
        let size: u64 = self.layers.iter().map(|l| l.bits.len() as u64 * 8).sum();
        Reply::array(vec![
            Reply::status("Capacity"),
            Reply::integer(self.capacity() as i64),
            Reply::status("Size"),
            Reply::integer(size as i64),
            Reply::status("Number of filters"),
            Reply::integer(self.layers.len() as i64),
            Reply::status("Number of items inserted"),
            Reply::integer(self.items() as i64),
            Reply::status("Expansion rate"),
            if self.scaling { Reply::integer(EXPANSION as i64) } else { Reply::nil() },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_false_negatives() {
        let mut bf = BloomFilter::new(0.01, 500, true).unwrap();
        for i in 0..500 {
            bf.add(format!("k{i}").as_bytes()).unwrap();
        }
        assert!((0..500).all(|i| bf.contains(format!("k{i}").as_bytes())));
    }

    #[test]
    fn test_false_positive_rate_is_bounded() {
        let mut bf = BloomFilter::new(0.01, 1000, true).unwrap();
        for i in 0..1000 {
            bf.add(format!("in{i}").as_bytes()).unwrap();
        }
        let fp = (0..10_000).filter(|i| bf.contains(format!("out{i}").as_bytes())).count();
        assert!(fp < 300, "{fp} false positives");
    }

    #[test]
    fn test_readd_reports_existing() {
        let mut bf = BloomFilter::create_empty();
        assert!(bf.add(b"x").unwrap());
        assert!(!bf.add(b"x").unwrap());
        assert_eq!(bf.items(), 1);
    }

    #[test]
    fn test_scaling_and_nonscaling() {
        let mut bf = BloomFilter::new(0.01, 10, true).unwrap();
        for i in 0..50 {
            bf.add(format!("{i}").as_bytes()).unwrap();
        }
        assert!(bf.capacity() >= 50);

        let mut fixed = BloomFilter::new(0.01, 2, false).unwrap();
        fixed.add(b"a").unwrap();
        fixed.add(b"b").unwrap();
        assert!(fixed.add(b"c").is_err());
        assert!(BloomFilter::new(1.5, 10, true).is_err());
    }
}
