//! Time series of `(timestamp_ms, f64)` samples, one value per timestamp.

use super::ValueKind;
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Avg,
    Sum,
    Min,
    Max,
    Count,
}

impl Aggregation {
    pub fn parse(arg: &[u8]) -> ZedisResult<Self> {
        match arg.to_ascii_lowercase().as_slice() {
            b"avg" => Ok(Aggregation::Avg),
            b"sum" => Ok(Aggregation::Sum),
            b"min" => Ok(Aggregation::Min),
            b"max" => Ok(Aggregation::Max),
            b"count" => Ok(Aggregation::Count),
            _ => Err(ZedisError::generic("TSDB: Unknown aggregation type")),
        }
    }

    fn apply(self, values: &[f64]) -> f64 {
        match self {
            Aggregation::Sum => values.iter().sum(),
            Aggregation::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Count => values.len() as f64,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimeSeries {
    samples: BTreeMap<u64, f64>,
}

impl TimeSeries {
    /// Out-of-order timestamps are accepted; an existing timestamp is overwritten.
    pub fn add(&mut self, ts: u64, value: f64) {
        self.samples.insert(ts, value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn last(&self) -> Option<(u64, f64)> {
        self.samples.last_key_value().map(|(t, v)| (*t, *v))
    }

    pub fn first(&self) -> Option<(u64, f64)> {
        self.samples.first_key_value().map(|(t, v)| (*t, *v))
    }

    pub fn range(&self, from: u64, to: u64) -> Vec<(u64, f64)> {
        if from > to {
            return Vec::new();
        }
        self.samples.range(from..=to).map(|(t, v)| (*t, *v)).collect()
    }

    /// Group `[from, to]` into buckets aligned to multiples of `bucket` ms, each
    /// reported under its start timestamp. Empty buckets are skipped.
    pub fn aggregate(&self, from: u64, to: u64, agg: Aggregation, bucket: u64) -> Vec<(u64, f64)> {
        let mut out = Vec::new();
        let mut current: Option<(u64, Vec<f64>)> = None;
        for (ts, v) in self.range(from, to) {
            let start = ts - ts % bucket.max(1);
            match current.as_mut() {
                Some((b, vals)) if *b == start => vals.push(v),
                _ => {
                    if let Some((b, vals)) = current.take() {
                        out.push((b, agg.apply(&vals)));
                    }
                    current = Some((start, vec![v]));
                }
            }
        }
        if let Some((b, vals)) = current {
            out.push((b, agg.apply(&vals)));
        }
        out
    }
}

pub fn sample_reply((ts, v): (u64, f64)) -> Reply {
    Reply::array(vec![Reply::integer(ts as i64), Reply::double(v)])
}

impl ValueKind for TimeSeries {
    const TYPE_NAME: &'static str = "TSDB-TYPE";

    fn create_empty() -> Self {
        TimeSeries::default()
    }

    /// TS.INFO layout.
    fn to_reply(&self) -> Reply {
        let ts = |s: Option<(u64, f64)>| Reply::integer(s.map_or(0, |(t, _)| t as i64));
        Reply::array(vec![
            Reply::status("totalSamples"),
            Reply::integer(self.len() as i64),
            Reply::status("firstTimestamp"),
            ts(self.first()),
            Reply::status("lastTimestamp"),
            ts(self.last()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(points: &[(u64, f64)]) -> TimeSeries {
        let mut s = TimeSeries::default();
        for &(t, v) in points {
            s.add(t, v);
        }
        s
    }

    #[test]
    fn test_out_of_order_and_overwrite() {
        let s = series(&[(30, 3.0), (10, 1.0), (20, 2.0), (10, 9.0)]);
        assert_eq!(s.len(), 3);
        assert_eq!(s.first(), Some((10, 9.0)));
        assert_eq!(s.last(), Some((30, 3.0)));
        assert_eq!(s.range(15, 30), [(20, 2.0), (30, 3.0)]);
        assert!(s.range(40, 10).is_empty());
    }

    #[test]
    fn test_bucketed_aggregation() {
        let s = series(&[(0, 1.0), (5, 3.0), (10, 10.0), (25, 4.0), (29, 6.0)]);
        assert_eq!(s.aggregate(0, 100, Aggregation::Avg, 10), [(0, 2.0), (10, 10.0), (20, 5.0)]);
        assert_eq!(s.aggregate(0, 100, Aggregation::Count, 10), [(0, 2.0), (10, 1.0), (20, 2.0)]);
        assert_eq!(s.aggregate(0, 9, Aggregation::Max, 100), [(0, 3.0)]);
        assert_eq!(s.aggregate(0, 100, Aggregation::Min, 1000), [(0, 1.0)]);
    }
}
