use super::{Ctx, bool_reply, bulk_array, len_reply, parse_float, parse_int, wrong_args};
use crate::error::{ZedisError, ZedisResult};
use crate::resp::{Reply, format_double};
use crate::types::HashValue;
use bytes::Bytes;

fn set_pairs(ctx: &mut Ctx<'_, '_>, args: &[Bytes], command: &str) -> ZedisResult<usize> {
    if args.len() < 3 || args.len() % 2 == 0 {
        return Err(wrong_args(command));
    }
    let hash = ctx.db.write::<HashValue>(&args[0])?;
    let mut added = 0;
    for pair in args[1..].chunks(2) {
        added += hash.insert(pair[0].clone(), pair[1].clone()) as usize;
    }
    Ok(added)
}

pub fn cmd_hset(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(len_reply(set_pairs(ctx, args, "hset")?))
}

pub fn cmd_hmset(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    set_pairs(ctx, args, "hmset")?;
    Ok(Reply::ok())
}

pub fn cmd_hsetnx(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let hash = ctx.db.write::<HashValue>(&args[0])?;
    if hash.contains(&args[1]) {
        return Ok(bool_reply(false));
    }
    hash.insert(args[1].clone(), args[2].clone());
    Ok(bool_reply(true))
}

pub fn cmd_hget(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let value = ctx.db.read::<HashValue>(&args[0])?.and_then(|h| h.get(&args[1]).cloned());
    Ok(Reply::bulk_or_nil(value))
}

pub fn cmd_hmget(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let hash = ctx.db.read::<HashValue>(&args[0])?;
    let values = args[1..]
        .iter()
        .map(|f| Reply::bulk_or_nil(hash.and_then(|h| h.get(f).cloned())))
        .collect();
    Ok(Reply::array(values))
}

pub fn cmd_hdel(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let Some(hash) = ctx.db.write_existing::<HashValue>(&args[0])? else {
        return Ok(len_reply(0));
    };
    let removed = args[1..].iter().filter(|f| hash.remove(f)).count();
    Ok(len_reply(removed))
}

pub fn cmd_hexists(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(bool_reply(ctx.db.read::<HashValue>(&args[0])?.is_some_and(|h| h.contains(&args[1]))))
}

pub fn cmd_hlen(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(len_reply(ctx.db.read::<HashValue>(&args[0])?.map_or(0, HashValue::len)))
}

pub fn cmd_hstrlen(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let len = ctx.db.read::<HashValue>(&args[0])?.and_then(|h| h.get(&args[1])).map_or(0, |v| v.len());
    Ok(len_reply(len))
}

/// Fields sorted so replies are stable.
fn sorted_fields(hash: Option<&HashValue>) -> Vec<(Bytes, Bytes)> {
    let mut fields: Vec<(Bytes, Bytes)> =
        hash.into_iter().flat_map(|h| h.iter()).map(|(f, v)| (f.clone(), v.clone())).collect();
    fields.sort();
    fields
}

pub fn cmd_hkeys(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let fields = sorted_fields(ctx.db.read::<HashValue>(&args[0])?);
    Ok(bulk_array(fields.into_iter().map(|(f, _)| f)))
}

pub fn cmd_hvals(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let fields = sorted_fields(ctx.db.read::<HashValue>(&args[0])?);
    Ok(bulk_array(fields.into_iter().map(|(_, v)| v)))
}

pub fn cmd_hgetall(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let fields = sorted_fields(ctx.db.read::<HashValue>(&args[0])?);
    Ok(bulk_array(fields.into_iter().flat_map(|(f, v)| [f, v])))
}

pub fn cmd_hincrby(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let delta = parse_int(&args[2])?;
    let current = match ctx.db.read::<HashValue>(&args[0])?.and_then(|h| h.get(&args[1])) {
        Some(v) => std::str::from_utf8(v)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| ZedisError::generic("hash value is not an integer"))?,
        None => 0,
    };
    let next = current.checked_add(delta).ok_or(ZedisError::Overflow)?;
    ctx.db.write::<HashValue>(&args[0])?.insert(args[1].clone(), Bytes::from(next.to_string()));
    Ok(Reply::integer(next))
}

pub fn cmd_hincrbyfloat(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let delta = parse_float(&args[2])?;
    let current = match ctx.db.read::<HashValue>(&args[0])?.and_then(|h| h.get(&args[1])) {
        Some(v) => std::str::from_utf8(v)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .ok_or_else(|| ZedisError::generic("hash value is not a float"))?,
        None => 0.0,
    };
    let next = current + delta;
    if !next.is_finite() {
        return Err(ZedisError::NanOrInfinity);
    }
    let text = format_double(next);
    ctx.db.write::<HashValue>(&args[0])?.insert(args[1].clone(), Bytes::from(text.clone()));
    Ok(Reply::bulk(text))
}

#[cfg(test)]
mod tests {
    use crate::command::test_support::*;
    use crate::resp::Reply;

    #[tokio::test]
    async fn test_hset_get_del() {
        let e = engine();
        assert_eq!(call(&e, "HSET h a 1 b 2").await, Reply::integer(2));
        assert_eq!(call(&e, "HSET h a 9 c 3").await, Reply::integer(1));
        assert!(err_starts(&call(&e, "HSET h a").await, "ERR wrong number"));
        assert_eq!(call(&e, "HGET h a").await, bulk("9"));
        assert_eq!(call(&e, "HMGET h a zz").await, Reply::array(vec![bulk("9"), Reply::nil()]));
        assert_eq!(call(&e, "HGETALL h").await, bulks(&["a", "9", "b", "2", "c", "3"]));
        assert_eq!(call(&e, "HDEL h a b c d").await, Reply::integer(3));
        assert_eq!(call(&e, "EXISTS h").await, Reply::integer(0));
    }

    #[tokio::test]
    async fn test_hincr() {
        let e = engine();
        assert_eq!(call(&e, "HINCRBY h n 5").await, Reply::integer(5));
        assert_eq!(call(&e, "HINCRBY h n -7").await, Reply::integer(-2));
        call(&e, "HSET h s text").await;
        assert_eq!(call(&e, "HINCRBY h s 1").await, Reply::error("ERR hash value is not an integer"));
        assert_eq!(call(&e, "HINCRBYFLOAT h f 0.5").await, bulk("0.5"));
        assert_eq!(call(&e, "HSETNX h n 1").await, Reply::integer(0));
        assert_eq!(call(&e, "HLEN h").await, Reply::integer(3));
    }

    #[tokio::test]
    async fn test_wrongtype_leaves_value_alone() {
        let e = engine();
        call(&e, "SET s v").await;
        assert!(err_starts(&call(&e, "HSET s a 1").await, "WRONGTYPE"));
        assert_eq!(call(&e, "GET s").await, bulk("v"));
    }
}
