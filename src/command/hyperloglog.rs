use super::{Ctx, bool_reply};
use crate::error::ZedisResult;
use crate::resp::Reply;
use crate::types::HyperLogLog;
use bytes::Bytes;

/// PFADD key [element ...]. Replies 1 when the estimate may have changed,
/// including when the key was created.
pub fn cmd_pfadd(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let created = !ctx.db.exists(&args[0])?;
    let hll = ctx.db.write::<HyperLogLog>(&args[0])?;
    let mut changed = created;
    for element in &args[1..] {
        changed |= hll.add(element);
    }
    Ok(bool_reply(changed))
}

/// Cardinality of the union of the named sketches; missing keys count as empty.
pub fn cmd_pfcount(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    if let [key] = args {
        let estimate = ctx.db.read::<HyperLogLog>(key)?.map_or(0, HyperLogLog::estimate);
        return Ok(Reply::integer(estimate as i64));
    }
    let mut union = HyperLogLog::default();
    for key in args {
        if let Some(hll) = ctx.db.read::<HyperLogLog>(key)? {
            union.merge(hll);
        }
    }
    Ok(Reply::integer(union.estimate() as i64))
}

pub fn cmd_pfmerge(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let mut union = HyperLogLog::default();
    for key in args {
        if let Some(hll) = ctx.db.read::<HyperLogLog>(key)? {
            union.merge(hll);
        }
    }
    *ctx.db.write::<HyperLogLog>(&args[0])? = union;
    Ok(Reply::ok())
}
