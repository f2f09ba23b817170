//! Typed values stored under a key.
//!
//! [`Value`] is a closed tagged union. Each payload type implements [`ValueKind`]
//! (create-empty, type tag, reply form) and gets [`Stored`] from the macro below so
//! the keyspace can hand out typed references without knowing the concrete kind.

pub mod bitmap;
pub mod bloom;
pub mod cuckoo;
pub mod geo;
pub mod graph;
pub mod hash;
pub mod hyperloglog;
pub mod json;
pub mod list;
pub mod set;
pub mod sketch;
pub mod sorted_set;
pub mod stream;
pub mod string;
pub mod tdigest;
pub mod timeseries;
pub mod vector;

pub use bloom::BloomFilter;
pub use cuckoo::CuckooFilter;
pub use graph::Graph;
pub use hash::HashValue;
pub use hyperloglog::HyperLogLog;
pub use json::JsonDoc;
pub use list::ListValue;
pub use set::SetValue;
pub use sketch::{CountMinSketch, TopK};
pub use sorted_set::SortedSet;
pub use stream::Stream;
pub use string::StrValue;
pub use tdigest::TDigest;
pub use timeseries::TimeSeries;
pub use vector::VectorIndex;

use crate::resp::Reply;

/// The contract every value kind fulfils.
pub trait ValueKind: Sized {
    /// Name reported by `TYPE`.
    const TYPE_NAME: &'static str;

    /// The value a key gets when a write command creates it.
    fn create_empty() -> Self;

    /// Containers report empty so the key can be dropped after its last element goes.
    fn is_empty(&self) -> bool {
        false
    }

    fn to_reply(&self) -> Reply;
}

/// Conversion between a payload type and its [`Value`] variant.
pub trait Stored: ValueKind {
    fn from_value(value: &Value) -> Option<&Self>;
    fn from_value_mut(value: &mut Value) -> Option<&mut Self>;
    fn into_value(self) -> Value;
}

macro_rules! values {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        #[derive(Debug, Clone)]
        pub enum Value {
            $($variant($ty),)*
        }

        impl Value {
            pub fn type_name(&self) -> &'static str {
                match self {
                    $(Value::$variant(_) => <$ty as ValueKind>::TYPE_NAME,)*
                }
            }

            pub fn is_empty(&self) -> bool {
                match self {
                    $(Value::$variant(v) => v.is_empty(),)*
                }
            }

            pub fn to_reply(&self) -> Reply {
                match self {
                    $(Value::$variant(v) => v.to_reply(),)*
                }
            }
        }

        $(
            impl Stored for $ty {
                fn from_value(value: &Value) -> Option<&Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }

                fn from_value_mut(value: &mut Value) -> Option<&mut Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

values! {
    Str(StrValue),
    List(ListValue),
    Hash(HashValue),
    Set(SetValue),
    ZSet(SortedSet),
    Stream(Stream),
    Hll(HyperLogLog),
    Bloom(BloomFilter),
    Cuckoo(CuckooFilter),
    CountMin(CountMinSketch),
    TopK(TopK),
    TDigest(TDigest),
    Json(JsonDoc),
    Vector(VectorIndex),
    TimeSeries(TimeSeries),
    Graph(Graph),
}

/// Seeded 64-bit hash shared by the probabilistic structures.
pub(crate) fn seeded_hash(data: &[u8], seed: u64) -> u64 {
    use std::hash::{DefaultHasher, Hash, Hasher};
    let mut h = DefaultHasher::new();
    seed.hash(&mut h);
    data.hash(&mut h);
    h.finish()
}

/// Resolve a Redis-style inclusive `[start, stop]` range (negative counts from the
/// end) against a collection of `len` items.
pub fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}
