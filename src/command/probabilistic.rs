//! Bloom, cuckoo, count-min, top-k and t-digest commands.
//!
//! The `*.RESERVE`/`*.CREATE`/`INITBYDIM` forms refuse to overwrite an existing key.
//! Writes to a missing key create the structure with default parameters.

use super::{Ctx, bool_reply, keyword, parse_count, parse_float, parse_int};
use crate::error::{ZedisError, ZedisResult};
use crate::resp::{Reply, format_double};
use crate::store::KeyspaceGuard;
use crate::types::{
    BloomFilter, CountMinSketch, CuckooFilter, Stored, TDigest, TopK, Value, ValueKind,
};
use bytes::Bytes;

/// Store a freshly built structure under a key that must not exist yet.
fn reserve(db: &mut KeyspaceGuard<'_>, key: &Bytes, value: Value, exists_msg: &str) -> ZedisResult<Reply> {
    if db.exists(key)? {
        return Err(ZedisError::generic(exists_msg));
    }
    db.set(key.clone(), value, None)?;
    Ok(Reply::ok())
}

fn existing<'g, T: Stored>(db: &'g mut KeyspaceGuard<'_>, key: &[u8], missing_msg: &str) -> ZedisResult<&'g mut T> {
    db.write_existing::<T>(key)?.ok_or_else(|| ZedisError::generic(missing_msg))
}

fn info<T: Stored>(db: &mut KeyspaceGuard<'_>, key: &[u8], missing_msg: &str) -> ZedisResult<Reply> {
    db.read::<T>(key)?.map(ValueKind::to_reply).ok_or_else(|| ZedisError::generic(missing_msg))
}

fn positive(arg: &[u8], what: &str) -> ZedisResult<usize> {
    match parse_count(arg) {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ZedisError::Generic(format!("{what} must be a positive integer"))),
    }
}

// Bloom filters

/// BF.RESERVE key error_rate capacity [EXPANSION n] [NONSCALING]
pub fn cmd_bf_reserve(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let error_rate = parse_float(&args[1]).map_err(|_| ZedisError::generic("bad error rate"))?;
    let capacity = parse_int(&args[2]).map_err(|_| ZedisError::generic("bad capacity"))?;
    let mut scaling = true;
    let mut i = 3;
    while i < args.len() {
        match keyword(&args[i]).as_str() {
            "NONSCALING" => {
                scaling = false;
                i += 1;
            }
            "EXPANSION" => {
                positive(args.get(i + 1).ok_or(ZedisError::Syntax)?, "expansion")?;
                i += 2;
            }
            _ => return Err(ZedisError::Syntax),
        }
    }
    let filter = BloomFilter::new(error_rate, u64::try_from(capacity).unwrap_or(0), scaling)?;
    reserve(ctx.db, &args[0], Value::Bloom(filter), "item exists")
}

pub fn cmd_bf_add(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let filter = ctx.db.write::<BloomFilter>(&args[0])?;
    Ok(bool_reply(filter.add(&args[1])?))
}

/// One reply per item; a full non-scaling filter yields an error entry.
pub fn cmd_bf_madd(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let filter = ctx.db.write::<BloomFilter>(&args[0])?;
    let replies = args[1..]
        .iter()
        .map(|item| filter.add(item).map_or_else(Reply::from, bool_reply))
        .collect();
    Ok(Reply::array(replies))
}

pub fn cmd_bf_exists(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(bool_reply(ctx.db.read::<BloomFilter>(&args[0])?.is_some_and(|f| f.contains(&args[1]))))
}

pub fn cmd_bf_mexists(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let filter = ctx.db.read::<BloomFilter>(&args[0])?;
    let replies = args[1..]
        .iter()
        .map(|item| bool_reply(filter.is_some_and(|f| f.contains(item))))
        .collect();
    Ok(Reply::array(replies))
}

pub fn cmd_bf_info(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    info::<BloomFilter>(ctx.db, &args[0], "not found")
}

// Cuckoo filters

/// CF.RESERVE key capacity [BUCKETSIZE n] [MAXITERATIONS n] [EXPANSION n]
pub fn cmd_cf_reserve(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let capacity = parse_int(&args[1]).map_err(|_| ZedisError::generic("Bad capacity"))?;
    let options = &args[2..];
    if options.len() % 2 != 0 {
        return Err(ZedisError::Syntax);
    }
    for pair in options.chunks(2) {
        match keyword(&pair[0]).as_str() {
            "BUCKETSIZE" | "MAXITERATIONS" | "EXPANSION" => {
                positive(&pair[1], &keyword(&pair[0]).to_ascii_lowercase())?;
            }
            _ => return Err(ZedisError::Syntax),
        }
    }
    let filter = CuckooFilter::with_capacity(u64::try_from(capacity).unwrap_or(0))?;
    reserve(ctx.db, &args[0], Value::Cuckoo(filter), "item exists")
}

pub fn cmd_cf_add(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    ctx.db.write::<CuckooFilter>(&args[0])?.add(&args[1])?;
    Ok(bool_reply(true))
}

pub fn cmd_cf_exists(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(bool_reply(ctx.db.read::<CuckooFilter>(&args[0])?.is_some_and(|f| f.contains(&args[1]))))
}

pub fn cmd_cf_del(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let filter = existing::<CuckooFilter>(ctx.db, &args[0], "Not found")?;
    Ok(bool_reply(filter.delete(&args[1])))
}

pub fn cmd_cf_info(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    info::<CuckooFilter>(ctx.db, &args[0], "not found")
}

// Count-min sketches

const CMS_MISSING: &str = "CMS: key does not exist";

pub fn cmd_cms_initbydim(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let width = parse_count(&args[1]).map_err(|_| ZedisError::generic("CMS: invalid width"))?;
    let depth = parse_count(&args[2]).map_err(|_| ZedisError::generic("CMS: invalid depth"))?;
    let sketch = CountMinSketch::new(width, depth)?;
    reserve(ctx.db, &args[0], Value::CountMin(sketch), "CMS: key already exists")
}

/// CMS.INCRBY key item increment [item increment ...]
pub fn cmd_cms_incrby(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let pairs = &args[1..];
    if pairs.len() % 2 != 0 {
        return Err(super::wrong_args("cms.incrby"));
    }
    let increments = pairs
        .chunks(2)
        .map(|p| {
            let by = parse_count(&p[1]).map_err(|_| ZedisError::generic("CMS: Cannot parse number"))?;
            Ok((&p[0], by as u64))
        })
        .collect::<ZedisResult<Vec<_>>>()?;
    let sketch = ctx.db.write::<CountMinSketch>(&args[0])?;
    let replies = increments
        .into_iter()
        .map(|(item, by)| Reply::integer(sketch.incr_by(item, by) as i64))
        .collect();
    Ok(Reply::array(replies))
}

pub fn cmd_cms_query(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let sketch = ctx.db.read::<CountMinSketch>(&args[0])?.ok_or_else(|| ZedisError::generic(CMS_MISSING))?;
    Ok(Reply::array(args[1..].iter().map(|i| Reply::integer(sketch.query(i) as i64)).collect()))
}

pub fn cmd_cms_info(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    info::<CountMinSketch>(ctx.db, &args[0], CMS_MISSING)
}

// Top-k

const TOPK_MISSING: &str = "TopK: key does not exist";

/// TOPK.RESERVE key topk [width depth decay]
pub fn cmd_topk_reserve(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let k = positive(&args[1], "TopK: k")?;
    let width = match &args[2..] {
        [] => None,
        [width, depth, decay] => {
            positive(depth, "TopK: depth")?;
            let decay = parse_float(decay)?;
            if !(0.0..=1.0).contains(&decay) {
                return Err(ZedisError::generic("TopK: decay must be between 0 and 1"));
            }
            Some(positive(width, "TopK: width")?)
        }
        _ => return Err(ZedisError::Syntax),
    };
    reserve(ctx.db, &args[0], Value::TopK(TopK::new(k, width)?), "TopK: key already exists")
}

/// Replies with the item each addition pushed out of the top list, or nil.
pub fn cmd_topk_add(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let topk = ctx.db.write::<TopK>(&args[0])?;
    let replies = args[1..].iter().map(|item| Reply::bulk_or_nil(topk.add(item.clone(), 1))).collect();
    Ok(Reply::array(replies))
}

pub fn cmd_topk_query(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let topk = ctx.db.read::<TopK>(&args[0])?.ok_or_else(|| ZedisError::generic(TOPK_MISSING))?;
    Ok(Reply::array(args[1..].iter().map(|i| bool_reply(topk.query(i))).collect()))
}

/// TOPK.LIST key [WITHCOUNT]
pub fn cmd_topk_list(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let with_count = match args.get(1).map(|a| keyword(a)) {
        None => false,
        Some(w) if w == "WITHCOUNT" && args.len() == 2 => true,
        Some(_) => return Err(ZedisError::Syntax),
    };
    let topk = ctx.db.read::<TopK>(&args[0])?.ok_or_else(|| ZedisError::generic(TOPK_MISSING))?;
    let mut out = Vec::new();
    for (item, count) in topk.list() {
        out.push(Reply::bulk(item));
        if with_count {
            out.push(Reply::integer(count as i64));
        }
    }
    Ok(Reply::array(out))
}

pub fn cmd_topk_info(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    info::<TopK>(ctx.db, &args[0], TOPK_MISSING)
}

// T-digest

const TDIGEST_MISSING: &str = "T-Digest: key does not exist";

fn nan_or(value: Option<f64>) -> Reply {
    Reply::bulk(value.map_or_else(|| "nan".to_string(), format_double))
}

/// TDIGEST.CREATE key [COMPRESSION n]
pub fn cmd_tdigest_create(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let compression = match &args[1..] {
        [] => crate::types::tdigest::DEFAULT_COMPRESSION,
        [kw, n] if keyword(kw) == "COMPRESSION" => positive(n, "T-Digest: compression")? as f64,
        _ => return Err(ZedisError::Syntax),
    };
    reserve(ctx.db, &args[0], Value::TDigest(TDigest::new(compression)?), "T-Digest: key already exists")
}

pub fn cmd_tdigest_add(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let values = args[1..]
        .iter()
        .map(|a| parse_float(a).map_err(|_| ZedisError::generic("T-Digest: error parsing val parameter")))
        .collect::<ZedisResult<Vec<f64>>>()?;
    ctx.db.write::<TDigest>(&args[0])?.add(&values);
    Ok(Reply::ok())
}

pub fn cmd_tdigest_quantile(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let quantiles = args[1..]
        .iter()
        .map(|a| match parse_float(a) {
            Ok(q) if (0.0..=1.0).contains(&q) => Ok(q),
            _ => Err(ZedisError::generic("T-Digest: quantile should be in [0,1]")),
        })
        .collect::<ZedisResult<Vec<f64>>>()?;
    let digest = ctx.db.read::<TDigest>(&args[0])?.ok_or_else(|| ZedisError::generic(TDIGEST_MISSING))?;
    Ok(Reply::array(quantiles.into_iter().map(|q| nan_or(digest.quantile(q))).collect()))
}

pub fn cmd_tdigest_min(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let digest = ctx.db.read::<TDigest>(&args[0])?.ok_or_else(|| ZedisError::generic(TDIGEST_MISSING))?;
    Ok(nan_or(digest.min()))
}

pub fn cmd_tdigest_max(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let digest = ctx.db.read::<TDigest>(&args[0])?.ok_or_else(|| ZedisError::generic(TDIGEST_MISSING))?;
    Ok(nan_or(digest.max()))
}

pub fn cmd_tdigest_info(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    info::<TDigest>(ctx.db, &args[0], TDIGEST_MISSING)
}

#[cfg(test)]
mod tests {
    use crate::command::test_support::*;
    use crate::resp::Reply;

    fn ints(values: &[i64]) -> Reply {
        Reply::array(values.iter().map(|v| Reply::integer(*v)).collect())
    }

    #[tokio::test]
    async fn test_bloom() {
        let e = engine();
        assert_eq!(call(&e, "BF.ADD b x").await, Reply::integer(1));
        assert_eq!(call(&e, "BF.ADD b x").await, Reply::integer(0));
        assert_eq!(call(&e, "BF.MADD b x y").await, ints(&[0, 1]));
        assert_eq!(call(&e, "BF.MEXISTS b x y z").await, ints(&[1, 1, 0]));
        assert_eq!(call(&e, "BF.EXISTS missing x").await, Reply::integer(0));
        assert_eq!(call(&e, "BF.RESERVE b 0.01 100").await, Reply::error("ERR item exists"));
        assert_eq!(call(&e, "BF.RESERVE n 0.01 1 NONSCALING").await, Reply::ok());
        call(&e, "BF.ADD n a").await;
        assert!(err_starts(&call(&e, "BF.ADD n b").await, "ERR non scaling filter is full"));
        assert_eq!(call(&e, "TYPE b").await, Reply::status("MBbloom--"));
        assert_eq!(call(&e, "BF.INFO missing").await, Reply::error("ERR not found"));
    }

    #[tokio::test]
    async fn test_cuckoo() {
        let e = engine();
        assert_eq!(call(&e, "CF.RESERVE c 100").await, Reply::ok());
        assert_eq!(call(&e, "CF.ADD c x").await, Reply::integer(1));
        assert_eq!(call(&e, "CF.EXISTS c x").await, Reply::integer(1));
        assert_eq!(call(&e, "CF.DEL c x").await, Reply::integer(1));
        assert_eq!(call(&e, "CF.EXISTS c x").await, Reply::integer(0));
        assert_eq!(call(&e, "CF.DEL nope x").await, Reply::error("ERR Not found"));
    }

    #[tokio::test]
    async fn test_count_min_and_topk() {
        let e = engine();
        assert!(err_starts(&call(&e, "CMS.QUERY s a").await, "ERR CMS: key does not exist"));
        assert_eq!(call(&e, "CMS.INITBYDIM s 100 4").await, Reply::ok());
        assert_eq!(call(&e, "CMS.INCRBY s a 3 b 1").await, ints(&[3, 1]));
        assert_eq!(call(&e, "CMS.QUERY s a c").await, ints(&[3, 0]));

        assert_eq!(call(&e, "TOPK.RESERVE t 2").await, Reply::ok());
        call(&e, "TOPK.ADD t a a a b b c").await;
        assert_eq!(call(&e, "TOPK.LIST t").await, bulks(&["a", "b"]));
        assert_eq!(call(&e, "TOPK.QUERY t a c").await, ints(&[1, 0]));
        let r = call(&e, "TOPK.LIST t WITHCOUNT").await;
        assert_eq!(r, Reply::array(vec![bulk("a"), Reply::integer(3), bulk("b"), Reply::integer(2)]));
    }

    #[tokio::test]
    async fn test_sketch_writes_create_missing_keys() {
        let e = engine();
        assert_eq!(call(&e, "CMS.INCRBY events login 5").await, ints(&[5]));
        assert_eq!(call(&e, "CMS.QUERY events login").await, ints(&[5]));
        let Reply::Array(Some(info)) = call(&e, "CMS.INFO events").await else { panic!("CMS.INFO") };
        assert_eq!(info[..4], [Reply::status("width"), Reply::integer(2000), Reply::status("depth"), Reply::integer(5)]);

        let r = call(&e, "TOPK.ADD top iphone samsung iphone").await;
        assert_eq!(r, Reply::array(vec![Reply::nil(), Reply::nil(), Reply::nil()]));
        assert_eq!(call(&e, "TOPK.QUERY top iphone").await, ints(&[1]));
        let Reply::Array(Some(info)) = call(&e, "TOPK.INFO top").await else { panic!("TOPK.INFO") };
        assert_eq!(info[..2], [Reply::status("k"), Reply::integer(50)]);

        assert_eq!(call(&e, "TDIGEST.ADD lat 12.5").await, Reply::ok());
        assert_eq!(call(&e, "TDIGEST.MAX lat").await, bulk("12.5"));
        assert_eq!(call(&e, "TYPE lat").await, Reply::status("TDIS-TYPE"));
        assert!(err_starts(&call(&e, "TDIGEST.ADD fresh x").await, "ERR T-Digest: error parsing"));
        assert_eq!(call(&e, "EXISTS fresh").await, Reply::integer(0));
    }

    #[tokio::test]
    async fn test_tdigest() {
        let e = engine();
        assert_eq!(call(&e, "TDIGEST.CREATE d").await, Reply::ok());
        assert_eq!(call(&e, "TDIGEST.MIN d").await, bulk("nan"));
        assert_eq!(call(&e, "TDIGEST.ADD d 1 2 3 4 5").await, Reply::ok());
        assert_eq!(call(&e, "TDIGEST.MIN d").await, bulk("1"));
        assert_eq!(call(&e, "TDIGEST.MAX d").await, bulk("5"));
        assert!(matches!(call(&e, "TDIGEST.QUANTILE d 0.5").await, Reply::Array(Some(v)) if v.len() == 1));
        assert!(err_starts(&call(&e, "TDIGEST.QUANTILE d 2").await, "ERR T-Digest: quantile"));
    }
}
