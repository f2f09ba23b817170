//! Dense HyperLogLog with 2^14 six-bit registers (stored one per byte).

use super::ValueKind;
use crate::resp::Reply;
use bytes::{BufMut, BytesMut};

const PRECISION: u32 = 14;
const REGISTERS: usize = 1 << PRECISION;
const INDEX_MASK: u64 = REGISTERS as u64 - 1;
/// Bits of the hash left for the run length once the index is taken.
const RUN_BITS: u32 = 64 - PRECISION;

#[derive(Debug, Clone)]
pub struct HyperLogLog {
    registers: Vec<u8>,
}

impl Default for HyperLogLog {
    fn default() -> Self {
        HyperLogLog { registers: vec![0; REGISTERS] }
    }
}

impl HyperLogLog {
    /// Observe one element. Returns true when a register grew.
    pub fn add(&mut self, element: &[u8]) -> bool {
        let hash = mix(fnv1a(element));
        let index = (hash & INDEX_MASK) as usize;
        let rest = hash >> PRECISION;
        let run = if rest == 0 {
            RUN_BITS as u8 + 1
        } else {
            (rest.leading_zeros() - PRECISION) as u8 + 1
        };
        if run > self.registers[index] {
            self.registers[index] = run;
            true
        } else {
            false
        }
    }

    pub fn estimate(&self) -> u64 {
        let m = REGISTERS as f64;
        let alpha = 0.7213 / (1.0 + 1.079 / m);
        let (sum, zeros) = self.registers.iter().fold((0.0f64, 0usize), |(sum, zeros), &r| {
            (sum + 2f64.powi(-(r as i32)), zeros + (r == 0) as usize)
        });
        let raw = alpha * m * m / sum;
        if raw <= 2.5 * m && zeros > 0 {
            (m * (m / zeros as f64).ln()).round() as u64
        } else {
            raw.round() as u64
        }
    }

    /// Register-wise maximum, i.e. the sketch of the union.
    pub fn merge(&mut self, other: &HyperLogLog) {
        for (mine, theirs) in self.registers.iter_mut().zip(&other.registers) {
            *mine = (*mine).max(*theirs);
        }
    }
}

fn fnv1a(data: &[u8]) -> u64 {
    data.iter().fold(0xcbf2_9ce4_8422_2325, |h, &b| {
        (h ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

/// Finalizer from splitmix64. FNV alone leaves the low bits poorly spread.
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

impl ValueKind for HyperLogLog {
    const TYPE_NAME: &'static str = "hyperloglog";

    fn create_empty() -> Self {
        HyperLogLog::default()
    }

    /// Raw register dump behind a `HYLL` magic, as GET would see it.
    fn to_reply(&self) -> Reply {
        let mut buf = BytesMut::with_capacity(4 + REGISTERS);
        buf.put_slice(b"HYLL");
        buf.put_slice(&self.registers);
        Reply::bulk(buf.freeze())
    }
}
