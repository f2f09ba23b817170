use super::{Ctx, keyword, parse_float, parse_int};
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;
use crate::types::timeseries::{Aggregation, sample_reply};
use crate::types::{TimeSeries, ValueKind};
use bytes::Bytes;

const MISSING: &str = "TSDB: the key does not exist";

fn timestamp(arg: &[u8], now: u64) -> ZedisResult<u64> {
    if arg == b"*" {
        return Ok(now);
    }
    u64::try_from(parse_int(arg)?).map_err(|_| ZedisError::generic("TSDB: invalid timestamp"))
}

/// `-` and `+` stand for the earliest and latest possible timestamps.
fn range_bound(arg: &[u8], now: u64) -> ZedisResult<u64> {
    match arg {
        b"-" => Ok(0),
        b"+" => Ok(u64::MAX),
        _ => timestamp(arg, now),
    }
}

/// TS.ADD key timestamp|* value
pub fn cmd_ts_add(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let ts = timestamp(&args[1], ctx.db.now())?;
    let value = parse_float(&args[2]).map_err(|_| ZedisError::generic("TSDB: invalid value"))?;
    ctx.db.write::<TimeSeries>(&args[0])?.add(ts, value);
    Ok(Reply::integer(ts as i64))
}

pub fn cmd_ts_get(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let series = ctx.db.read::<TimeSeries>(&args[0])?.ok_or_else(|| ZedisError::generic(MISSING))?;
    Ok(series.last().map_or_else(|| Reply::array(Vec::new()), sample_reply))
}

/// TS.RANGE key from to [AGGREGATION avg|sum|min|max|count bucket_ms]
pub fn cmd_ts_range(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let now = ctx.db.now();
    let from = range_bound(&args[1], now)?;
    let to = range_bound(&args[2], now)?;
    let aggregation = match &args[3..] {
        [] => None,
        [kw, agg, bucket] if keyword(kw) == "AGGREGATION" => {
            let bucket = parse_int(bucket)?;
            if bucket <= 0 {
                return Err(ZedisError::generic("TSDB: bucketDuration must be greater than zero"));
            }
            Some((Aggregation::parse(agg)?, bucket as u64))
        }
        _ => return Err(ZedisError::Syntax),
    };
    let series = ctx.db.read::<TimeSeries>(&args[0])?.ok_or_else(|| ZedisError::generic(MISSING))?;
    let samples = match aggregation {
        Some((agg, bucket)) => series.aggregate(from, to, agg, bucket),
        None => series.range(from, to),
    };
    Ok(Reply::array(samples.into_iter().map(sample_reply).collect()))
}

pub fn cmd_ts_info(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let series = ctx.db.read::<TimeSeries>(&args[0])?.ok_or_else(|| ZedisError::generic(MISSING))?;
    Ok(series.to_reply())
}
