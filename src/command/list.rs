use super::{Ctx, bulk_array, len_reply, parse_count, parse_int};
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;
use crate::types::ListValue;
use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq)]
enum End {
    Head,
    Tail,
}

fn push(ctx: &mut Ctx<'_, '_>, args: &[Bytes], end: End, only_existing: bool) -> ZedisResult<Reply> {
    let list = if only_existing {
        match ctx.db.write_existing::<ListValue>(&args[0])? {
            Some(list) => list,
            None => return Ok(len_reply(0)),
        }
    } else {
        ctx.db.write::<ListValue>(&args[0])?
    };
    for item in &args[1..] {
        match end {
            End::Head => list.push_front(item.clone()),
            End::Tail => list.push_back(item.clone()),
        }
    }
    Ok(len_reply(list.len()))
}

pub fn cmd_lpush(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    push(ctx, args, End::Head, false)
}

pub fn cmd_rpush(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    push(ctx, args, End::Tail, false)
}

pub fn cmd_lpushx(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    push(ctx, args, End::Head, true)
}

pub fn cmd_rpushx(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    push(ctx, args, End::Tail, true)
}

/// Without a count: one element or nil. With a count: an array, or a nil
/// array when the key is missing.
fn pop(ctx: &mut Ctx<'_, '_>, args: &[Bytes], end: End) -> ZedisResult<Reply> {
    if args.len() > 2 {
        return Err(ZedisError::Syntax);
    }
    let count = args.get(1).map(|c| parse_count(c)).transpose()?;
    let Some(list) = ctx.db.write_existing::<ListValue>(&args[0])? else {
        return Ok(if count.is_some() { Reply::nil_array() } else { Reply::nil() });
    };
    let mut take = || match end {
        End::Head => list.pop_front(),
        End::Tail => list.pop_back(),
    };
    match count {
        None => Ok(Reply::bulk_or_nil(take())),
        Some(n) => Ok(bulk_array((0..n).map_while(|_| take()).collect::<Vec<_>>())),
    }
}

pub fn cmd_lpop(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    pop(ctx, args, End::Head)
}

pub fn cmd_rpop(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    pop(ctx, args, End::Tail)
}

pub fn cmd_llen(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(len_reply(ctx.db.read::<ListValue>(&args[0])?.map_or(0, ListValue::len)))
}

pub fn cmd_lrange(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let start = parse_int(&args[1])?;
    let stop = parse_int(&args[2])?;
    let items = ctx.db.read::<ListValue>(&args[0])?.map(|l| l.range(start, stop)).unwrap_or_default();
    Ok(bulk_array(items))
}

pub fn cmd_lindex(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let index = parse_int(&args[1])?;
    let item = ctx.db.read::<ListValue>(&args[0])?.and_then(|l| l.get(index).cloned());
    Ok(Reply::bulk_or_nil(item))
}

pub fn cmd_lset(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let index = parse_int(&args[1])?;
    let list = ctx.db.write_existing::<ListValue>(&args[0])?.ok_or(ZedisError::NoSuchKey)?;
    if list.set(index, args[2].clone()) {
        Ok(Reply::ok())
    } else {
        Err(ZedisError::IndexOutOfRange)
    }
}

pub fn cmd_lrem(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let count = parse_int(&args[1])?;
    let removed = match ctx.db.write_existing::<ListValue>(&args[0])? {
        Some(list) => list.remove(count, &args[2]),
        None => 0,
    };
    Ok(len_reply(removed))
}

pub fn cmd_ltrim(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let start = parse_int(&args[1])?;
    let stop = parse_int(&args[2])?;
    if let Some(list) = ctx.db.write_existing::<ListValue>(&args[0])? {
        list.trim(start, stop);
    }
    Ok(Reply::ok())
}

#[cfg(test)]
mod tests {
    use crate::command::test_support::*;
    use crate::resp::Reply;

    #[tokio::test]
    async fn test_push_pop_range() {
        let e = engine();
        assert_eq!(call(&e, "RPUSH l a b c").await, Reply::integer(3));
        assert_eq!(call(&e, "LPUSH l z").await, Reply::integer(4));
        assert_eq!(call(&e, "LRANGE l 0 -1").await, bulks(&["z", "a", "b", "c"]));
        assert_eq!(call(&e, "LPOP l").await, bulk("z"));
        assert_eq!(call(&e, "RPOP l 2").await, bulks(&["c", "b"]));
        assert_eq!(call(&e, "LINDEX l -1").await, bulk("a"));
        assert_eq!(call(&e, "LPOP l").await, bulk("a"));
        assert_eq!(call(&e, "EXISTS l").await, Reply::integer(0));
        assert_eq!(call(&e, "LPOP l").await, Reply::nil());
        assert_eq!(call(&e, "LPOP l 3").await, Reply::nil_array());
    }

    #[tokio::test]
    async fn test_pushx_and_lset() {
        let e = engine();
        assert_eq!(call(&e, "LPUSHX l a").await, Reply::integer(0));
        assert_eq!(call(&e, "EXISTS l").await, Reply::integer(0));
        assert_eq!(call(&e, "LSET l 0 x").await, Reply::error("ERR no such key"));
        call(&e, "RPUSH l a b").await;
        assert_eq!(call(&e, "LSET l 5 x").await, Reply::error("ERR index out of range"));
        assert_eq!(call(&e, "LSET l -1 x").await, Reply::ok());
        assert_eq!(call(&e, "LRANGE l 0 -1").await, bulks(&["a", "x"]));
    }

    #[tokio::test]
    async fn test_lrem_ltrim() {
        let e = engine();
        call(&e, "RPUSH l a b a c a").await;
        assert_eq!(call(&e, "LREM l -2 a").await, Reply::integer(2));
        assert_eq!(call(&e, "LRANGE l 0 -1").await, bulks(&["a", "b", "c"]));
        assert_eq!(call(&e, "LTRIM l 1 1").await, Reply::ok());
        assert_eq!(call(&e, "LRANGE l 0 -1").await, bulks(&["b"]));
        assert_eq!(call(&e, "LTRIM l 5 10").await, Reply::ok());
        assert_eq!(call(&e, "LLEN l").await, Reply::integer(0));
    }
}
