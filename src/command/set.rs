use super::{Ctx, bool_reply, bulk_array, len_reply, parse_count};
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;
use crate::types::{SetValue, Value};
use bytes::Bytes;
use std::collections::HashSet;

fn sorted(members: impl IntoIterator<Item = Bytes>) -> Vec<Bytes> {
    let mut out: Vec<Bytes> = members.into_iter().collect();
    out.sort();
    out
}

pub fn cmd_sadd(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let set = ctx.db.write::<SetValue>(&args[0])?;
    let added = args[1..].iter().filter(|m| set.insert((*m).clone())).count();
    Ok(len_reply(added))
}

pub fn cmd_srem(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let Some(set) = ctx.db.write_existing::<SetValue>(&args[0])? else {
        return Ok(len_reply(0));
    };
    Ok(len_reply(args[1..].iter().filter(|m| set.remove(m)).count()))
}

pub fn cmd_smembers(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let set = ctx.db.read::<SetValue>(&args[0])?;
    Ok(bulk_array(sorted(set.into_iter().flat_map(|s| s.iter().cloned()))))
}

pub fn cmd_sismember(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(bool_reply(ctx.db.read::<SetValue>(&args[0])?.is_some_and(|s| s.contains(&args[1]))))
}

pub fn cmd_scard(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(len_reply(ctx.db.read::<SetValue>(&args[0])?.map_or(0, SetValue::len)))
}

pub fn cmd_spop(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    if args.len() > 2 {
        return Err(ZedisError::Syntax);
    }
    let count = args.get(1).map(|c| parse_count(c)).transpose()?;
    let Some(set) = ctx.db.write_existing::<SetValue>(&args[0])? else {
        return Ok(if count.is_some() { Reply::array(Vec::new()) } else { Reply::nil() });
    };
    match count {
        None => Ok(Reply::bulk_or_nil(set.pop_random(1).pop())),
        Some(n) => Ok(bulk_array(set.pop_random(n))),
    }
}

#[derive(Debug, Clone, Copy)]
enum SetOp {
    Inter,
    Union,
    Diff,
}

/// Evaluate a set operation over `keys`; missing keys are empty sets.
fn combine(ctx: &mut Ctx<'_, '_>, keys: &[Bytes], op: SetOp) -> ZedisResult<HashSet<Bytes>> {
    let mut sets = Vec::with_capacity(keys.len());
    for key in keys {
        let members: HashSet<Bytes> =
            ctx.db.read::<SetValue>(key)?.map(|s| s.iter().cloned().collect()).unwrap_or_default();
        sets.push(members);
    }
    let mut iter = sets.into_iter();
    let first = iter.next().unwrap_or_default();
    Ok(iter.fold(first, |acc, next| match op {
        SetOp::Inter => acc.intersection(&next).cloned().collect(),
        SetOp::Union => acc.union(&next).cloned().collect(),
        SetOp::Diff => acc.difference(&next).cloned().collect(),
    }))
}

fn store(ctx: &mut Ctx<'_, '_>, args: &[Bytes], op: SetOp) -> ZedisResult<Reply> {
    let result = combine(ctx, &args[1..], op)?;
    let n = result.len();
    if n == 0 {
        ctx.db.delete(&args[0])?;
    } else {
        ctx.db.set(args[0].clone(), Value::Set(result.into_iter().collect()), None)?;
    }
    Ok(len_reply(n))
}

pub fn cmd_sinter(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(bulk_array(sorted(combine(ctx, args, SetOp::Inter)?)))
}

pub fn cmd_sunion(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(bulk_array(sorted(combine(ctx, args, SetOp::Union)?)))
}

pub fn cmd_sdiff(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(bulk_array(sorted(combine(ctx, args, SetOp::Diff)?)))
}

pub fn cmd_sinterstore(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    store(ctx, args, SetOp::Inter)
}

pub fn cmd_sunionstore(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    store(ctx, args, SetOp::Union)
}

pub fn cmd_sdiffstore(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    store(ctx, args, SetOp::Diff)
}
