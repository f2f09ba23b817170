use super::{Ctx, keyword, len_reply, parse_float, parse_int};
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;
use crate::types::SortedSet;
use crate::types::sorted_set::ScoreBound;
use bytes::Bytes;

#[derive(Debug, Default)]
struct ZaddOptions {
    nx: bool,
    xx: bool,
    gt: bool,
    lt: bool,
    ch: bool,
    incr: bool,
}

/// ZADD key [NX|XX] [GT|LT] [CH] [INCR] score member [score member ...]
pub fn cmd_zadd(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let mut opts = ZaddOptions::default();
    let mut i = 1;
    while i < args.len() {
        match keyword(&args[i]).as_str() {
            "NX" => opts.nx = true,
            "XX" => opts.xx = true,
            "GT" => opts.gt = true,
            "LT" => opts.lt = true,
            "CH" => opts.ch = true,
            "INCR" => opts.incr = true,
            _ => break,
        }
        i += 1;
    }
    let pairs = &args[i..];
    if pairs.is_empty() || pairs.len() % 2 != 0 {
        return Err(ZedisError::Syntax);
    }
    if opts.nx && opts.xx {
        return Err(ZedisError::generic("XX and NX options at the same time are not compatible"));
    }
    if (opts.gt && opts.lt) || (opts.nx && (opts.gt || opts.lt)) {
        return Err(ZedisError::generic("GT, LT, and/or NX options at the same time are not compatible"));
    }
    if opts.incr && pairs.len() != 2 {
        return Err(ZedisError::generic("INCR option supports a single increment-element pair"));
    }
    let scored = pairs
        .chunks(2)
        .map(|p| Ok((parse_float(&p[0])?, p[1].clone())))
        .collect::<ZedisResult<Vec<(f64, Bytes)>>>()?;

    if opts.xx && !ctx.db.exists(&args[0])? {
        return Ok(if opts.incr { Reply::nil() } else { len_reply(0) });
    }
    let zset = ctx.db.write::<SortedSet>(&args[0])?;
    let mut added = 0;
    let mut changed = 0;
    let mut last = None;
    for (score, member) in scored {
        let current = zset.score(&member);
        if (opts.nx && current.is_some()) || (opts.xx && current.is_none()) {
            continue;
        }
        let next = if opts.incr { current.unwrap_or(0.0) + score } else { score };
        if next.is_nan() {
            return Err(ZedisError::generic("resulting score is not a number (NaN)"));
        }
        if let Some(old) = current {
            if (opts.gt && next <= old) || (opts.lt && next >= old) {
                continue;
            }
            if next != old {
                changed += 1;
            }
        } else {
            added += 1;
        }
        zset.insert(member, next);
        last = Some(next);
    }
    if opts.incr {
        return Ok(last.map_or_else(Reply::nil, Reply::double));
    }
    Ok(len_reply(if opts.ch { added + changed } else { added }))
}

pub fn cmd_zrem(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let Some(zset) = ctx.db.write_existing::<SortedSet>(&args[0])? else {
        return Ok(len_reply(0));
    };
    Ok(len_reply(args[1..].iter().filter(|m| zset.remove(m)).count()))
}

pub fn cmd_zscore(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let score = ctx.db.read::<SortedSet>(&args[0])?.and_then(|z| z.score(&args[1]));
    Ok(score.map_or_else(Reply::nil, Reply::double))
}

pub fn cmd_zincrby(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let delta = parse_float(&args[1])?;
    let score = ctx.db.write::<SortedSet>(&args[0])?.incr(args[2].clone(), delta)?;
    Ok(Reply::double(score))
}

pub fn cmd_zcard(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(len_reply(ctx.db.read::<SortedSet>(&args[0])?.map_or(0, SortedSet::len)))
}

fn rank(ctx: &mut Ctx<'_, '_>, args: &[Bytes], reverse: bool) -> ZedisResult<Reply> {
    let zset = ctx.db.read::<SortedSet>(&args[0])?;
    let rank = zset.and_then(|z| if reverse { z.rev_rank(&args[1]) } else { z.rank(&args[1]) });
    Ok(rank.map_or_else(Reply::nil, len_reply))
}

pub fn cmd_zrank(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    rank(ctx, args, false)
}

pub fn cmd_zrevrank(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    rank(ctx, args, true)
}

fn members_reply(items: Vec<(Bytes, f64)>, with_scores: bool) -> Reply {
    let mut out = Vec::with_capacity(items.len() * if with_scores { 2 } else { 1 });
    for (member, score) in items {
        out.push(Reply::bulk(member));
        if with_scores {
            out.push(Reply::double(score));
        }
    }
    Reply::array(out)
}

fn range_by_rank(ctx: &mut Ctx<'_, '_>, args: &[Bytes], reverse: bool) -> ZedisResult<Reply> {
    let start = parse_int(&args[1])?;
    let stop = parse_int(&args[2])?;
    let with_scores = match args.get(3).map(|a| keyword(a)) {
        None => false,
        Some(w) if w == "WITHSCORES" && args.len() == 4 => true,
        Some(_) => return Err(ZedisError::Syntax),
    };
    let items = ctx.db.read::<SortedSet>(&args[0])?.map(|z| z.range(start, stop, reverse)).unwrap_or_default();
    Ok(members_reply(items, with_scores))
}

pub fn cmd_zrange(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    range_by_rank(ctx, args, false)
}

pub fn cmd_zrevrange(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    range_by_rank(ctx, args, true)
}

/// Shared by ZRANGEBYSCORE and ZREVRANGEBYSCORE; the reverse form takes max first.
fn range_by_score(ctx: &mut Ctx<'_, '_>, args: &[Bytes], reverse: bool) -> ZedisResult<Reply> {
    let (min, max) = if reverse { (&args[2], &args[1]) } else { (&args[1], &args[2]) };
    let min = ScoreBound::parse(min)?;
    let max = ScoreBound::parse(max)?;
    let mut with_scores = false;
    let mut limit: Option<(i64, Option<usize>)> = None;
    let mut i = 3;
    while i < args.len() {
        match keyword(&args[i]).as_str() {
            "WITHSCORES" => {
                with_scores = true;
                i += 1;
            }
            "LIMIT" if i + 2 < args.len() => {
                let offset = parse_int(&args[i + 1])?;
                let count = parse_int(&args[i + 2])?;
                limit = Some((offset, usize::try_from(count).ok()));
                i += 3;
            }
            _ => return Err(ZedisError::Syntax),
        }
    }
    let mut items = ctx.db.read::<SortedSet>(&args[0])?.map(|z| z.range_by_score(min, max)).unwrap_or_default();
    if reverse {
        items.reverse();
    }
    if let Some((offset, count)) = limit {
        if offset < 0 {
            items.clear();
        } else {
            let taken = items.into_iter().skip(offset as usize);
            items = match count {
                Some(n) => taken.take(n).collect(),
                None => taken.collect(),
            };
        }
    }
    Ok(members_reply(items, with_scores))
}

pub fn cmd_zrangebyscore(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    range_by_score(ctx, args, false)
}

pub fn cmd_zrevrangebyscore(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    range_by_score(ctx, args, true)
}

pub fn cmd_zcount(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let min = ScoreBound::parse(&args[1])?;
    let max = ScoreBound::parse(&args[2])?;
    Ok(len_reply(ctx.db.read::<SortedSet>(&args[0])?.map_or(0, |z| z.count(min, max))))
}

#[cfg(test)]
mod tests {
    use crate::command::test_support::*;
    use crate::resp::Reply;

    #[tokio::test]
    async fn test_zadd_and_ranges() {
        let e = engine();
        assert_eq!(call(&e, "ZADD z 1 a 2 b 3 c").await, Reply::integer(3));
        assert_eq!(call(&e, "ZADD z 5 a").await, Reply::integer(0));
        assert_eq!(call(&e, "ZRANGE z 0 -1").await, bulks(&["b", "c", "a"]));
        assert_eq!(call(&e, "ZREVRANGE z 0 0 WITHSCORES").await, bulks(&["a", "5"]));
        assert_eq!(call(&e, "ZRANK z a").await, Reply::integer(2));
        assert_eq!(call(&e, "ZREVRANK z a").await, Reply::integer(0));
        assert_eq!(call(&e, "ZRANK z nope").await, Reply::nil());
        assert_eq!(call(&e, "ZSCORE z b").await, bulk("2"));
    }

    #[tokio::test]
    async fn test_zadd_flags() {
        let e = engine();
        call(&e, "ZADD z 1 a").await;
        assert_eq!(call(&e, "ZADD z NX 9 a 1 b").await, Reply::integer(1));
        assert_eq!(call(&e, "ZSCORE z a").await, bulk("1"));
        assert_eq!(call(&e, "ZADD z XX CH 4 a 1 c").await, Reply::integer(1));
        assert_eq!(call(&e, "ZADD z GT CH 2 a").await, Reply::integer(0));
        assert_eq!(call(&e, "ZADD z INCR 1.5 a").await, bulk("5.5"));
        assert_eq!(call(&e, "ZADD missing XX 1 a").await, Reply::integer(0));
        assert_eq!(call(&e, "EXISTS missing").await, Reply::integer(0));
        assert!(err_starts(&call(&e, "ZADD z NX XX 1 a").await, "ERR XX and NX"));
        assert!(err_starts(&call(&e, "ZADD z 1 a 2").await, "ERR syntax"));
        assert!(err_starts(&call(&e, "ZADD z x a").await, "ERR value is not a valid float"));
    }

    #[tokio::test]
    async fn test_score_ranges() {
        let e = engine();
        call(&e, "ZADD z 1 a 2 b 3 c 4 d").await;
        assert_eq!(call(&e, "ZRANGEBYSCORE z (1 3").await, bulks(&["b", "c"]));
        assert_eq!(call(&e, "ZRANGEBYSCORE z -inf +inf LIMIT 1 2").await, bulks(&["b", "c"]));
        assert_eq!(call(&e, "ZREVRANGEBYSCORE z 3 2 WITHSCORES").await, bulks(&["c", "3", "b", "2"]));
        assert_eq!(call(&e, "ZCOUNT z 2 +inf").await, Reply::integer(3));
        assert_eq!(call(&e, "ZINCRBY z 10 a").await, bulk("11"));
        assert_eq!(call(&e, "ZREM z a b x").await, Reply::integer(2));
        assert_eq!(call(&e, "ZCARD z").await, Reply::integer(2));
    }
}
