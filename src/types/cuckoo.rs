//! Cuckoo filter with four one-byte fingerprints per bucket.

use super::{ValueKind, seeded_hash};
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;
use rand::Rng;

const BUCKET_SIZE: usize = 4;
const MAX_KICKS: usize = 500;
pub const DEFAULT_BUCKETS: usize = 1024;

#[derive(Debug, Clone)]
pub struct CuckooFilter {
    buckets: Vec<[u8; BUCKET_SIZE]>,
    items: u64,
    deletes: u64,
}

impl CuckooFilter {
    /// `capacity` items are spread over a power-of-two number of buckets.
    pub fn with_capacity(capacity: u64) -> ZedisResult<Self> {
        if capacity == 0 {
            return Err(ZedisError::generic("(capacity should be larger than 0)"));
        }
        let buckets = (capacity as usize).div_ceil(BUCKET_SIZE).next_power_of_two();
        Ok(Self::with_buckets(buckets))
    }

    fn with_buckets(buckets: usize) -> Self {
        CuckooFilter {
            buckets: vec![[0; BUCKET_SIZE]; buckets.next_power_of_two()],
            items: 0,
            deletes: 0,
        }
    }

    fn mask(&self) -> usize {
        self.buckets.len() - 1
    }

    /// Fingerprint (never zero, zero marks an empty slot) and primary bucket.
    fn locate(&self, item: &[u8]) -> (u8, usize) {
        let h = seeded_hash(item, 0xc0c0);
        let fp = ((h >> 56) as u8).max(1);
        (fp, (h as usize) & self.mask())
    }

    /// Partial-key cuckoo hashing: the alternate bucket depends only on the
    /// current bucket and the fingerprint, so it can be found during eviction.
    fn alternate(&self, bucket: usize, fp: u8) -> usize {
        (bucket ^ seeded_hash(&[fp], 0xf1f1) as usize) & self.mask()
    }

    fn bucket_has(&self, bucket: usize, fp: u8) -> bool {
        self.buckets[bucket].contains(&fp)
    }

    fn try_place(&mut self, bucket: usize, fp: u8) -> bool {
        match self.buckets[bucket].iter_mut().find(|s| **s == 0) {
            Some(slot) => {
                *slot = fp;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, item: &[u8]) -> bool {
        let (fp, b1) = self.locate(item);
        self.bucket_has(b1, fp) || self.bucket_has(self.alternate(b1, fp), fp)
    }

    /// Insert a fingerprint (duplicates allowed, like CF.ADD).
    pub fn add(&mut self, item: &[u8]) -> ZedisResult<()> {
        let (mut fp, b1) = self.locate(item);
        let b2 = self.alternate(b1, fp);
        if self.try_place(b1, fp) || self.try_place(b2, fp) {
            self.items += 1;
            return Ok(());
        }
        let snapshot = self.buckets.clone();
        let mut rng = rand::thread_rng();
        let mut bucket = if rng.gen_bool(0.5) { b1 } else { b2 };
        for _ in 0..MAX_KICKS {
            let slot = rng.gen_range(0..BUCKET_SIZE);
            std::mem::swap(&mut fp, &mut self.buckets[bucket][slot]);
            bucket = self.alternate(bucket, fp);
            if self.try_place(bucket, fp) {
                self.items += 1;
                return Ok(());
            }
        }
        self.buckets = snapshot;
        Err(ZedisError::generic("Filter is full"))
    }

    /// Remove one copy of the item's fingerprint.
    pub fn delete(&mut self, item: &[u8]) -> bool {
        let (fp, b1) = self.locate(item);
        for bucket in [b1, self.alternate(b1, fp)] {
            if let Some(slot) = self.buckets[bucket].iter_mut().find(|s| **s == fp) {
                *slot = 0;
                self.items -= 1;
                self.deletes += 1;
                return true;
            }
        }
        false
    }
}

impl ValueKind for CuckooFilter {
    const TYPE_NAME: &'static str = "MBbloomCF";

    fn create_empty() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS)
    }

    /// CF.INFO layout.
    fn to_reply(&self) -> Reply {
        Reply::array(vec![
            Reply::status("Size"),
            Reply::integer((self.buckets.len() * BUCKET_SIZE) as i64),
            Reply::status("Number of buckets"),
            Reply::integer(self.buckets.len() as i64),
            Reply::status("Number of items inserted"),
            Reply::integer(self.items as i64),
            Reply::status("Number of items deleted"),
            Reply::integer(self.deletes as i64),
            Reply::status("Bucket size"),
            Reply::integer(BUCKET_SIZE as i64),
            Reply::status("Max iterations"),
            Reply::integer(MAX_KICKS as i64),
        ])
    }
}
