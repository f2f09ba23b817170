use super::{Ctx, keyword, len_reply, parse_count};
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;
use crate::types::Stream;
use crate::types::stream::{Fields, IdSpec, StreamId, entry_reply, parse_range_bound};
use bytes::Bytes;

/// `MAXLEN [=|~] n` starting at `args[i]`; returns the bound and the index after it.
fn parse_maxlen(args: &[Bytes], i: usize) -> ZedisResult<(usize, usize)> {
    let mut j = i + 1;
    if args.get(j).is_some_and(|a| a.as_ref() == b"=" || a.as_ref() == b"~") {
        j += 1;
    }
    let n = parse_count(args.get(j).ok_or(ZedisError::Syntax)?)?;
    Ok((n, j + 1))
}

/// XADD key [NOMKSTREAM] [MAXLEN [=|~] n] <* | id> field value [field value ...]
pub fn cmd_xadd(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let mut i = 1;
    let mut create = true;
    let mut maxlen = None;
    loop {
        match keyword(args.get(i).ok_or(ZedisError::Syntax)?).as_str() {
            "NOMKSTREAM" => {
                create = false;
                i += 1;
            }
            "MAXLEN" => {
                let (n, next) = parse_maxlen(args, i)?;
                maxlen = Some(n);
                i = next;
            }
            _ => break,
        }
    }
    let spec = IdSpec::parse(args.get(i).ok_or(ZedisError::Syntax)?)?;
    let pairs = &args[i + 1..];
    if pairs.is_empty() || pairs.len() % 2 != 0 {
        return Err(super::wrong_args("xadd"));
    }
    let fields: Fields = pairs.chunks(2).map(|p| (p[0].clone(), p[1].clone())).collect();

    let now = ctx.db.now();
    let id = match ctx.db.read::<Stream>(&args[0])? {
        Some(stream) => stream.next_id(spec, now)?,
        None if !create => return Ok(Reply::nil()),
        None => Stream::default().next_id(spec, now)?,
    };
    let stream = ctx.db.write::<Stream>(&args[0])?;
    stream.append(id, fields);
    if let Some(n) = maxlen {
        stream.trim(n);
    }
    Ok(Reply::bulk(id.to_string()))
}

pub fn cmd_xlen(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(len_reply(ctx.db.read::<Stream>(&args[0])?.map_or(0, Stream::len)))
}

fn range(ctx: &mut Ctx<'_, '_>, args: &[Bytes], reverse: bool) -> ZedisResult<Reply> {
    let (first, second) = if reverse { (&args[2], &args[1]) } else { (&args[1], &args[2]) };
    let start = parse_range_bound(first, true)?;
    let end = parse_range_bound(second, false)?;
    let count = match &args[3..] {
        [] => None,
        [kw, n] if keyword(kw) == "COUNT" => Some(parse_count(n)?),
        _ => return Err(ZedisError::Syntax),
    };
    let entries = match ctx.db.read::<Stream>(&args[0])? {
        Some(stream) => stream
            .range(start, end, reverse, count)
            .into_iter()
            .map(|(id, fields)| entry_reply(id, fields))
            .collect(),
        None => Vec::new(),
    };
    Ok(Reply::array(entries))
}

/// XRANGE key start end [COUNT n]
pub fn cmd_xrange(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    range(ctx, args, false)
}

/// XREVRANGE key end start [COUNT n]
pub fn cmd_xrevrange(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    range(ctx, args, true)
}

pub fn cmd_xdel(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let ids = args[1..]
        .iter()
        .map(|a| {
            StreamId::parse(a, 0)
                .ok_or_else(|| ZedisError::generic("Invalid stream ID specified as stream command argument"))
        })
        .collect::<ZedisResult<Vec<_>>>()?;
    let Some(stream) = ctx.db.write_existing::<Stream>(&args[0])? else {
        return Ok(len_reply(0));
    };
    Ok(len_reply(ids.into_iter().filter(|id| stream.delete(*id)).count()))
}

/// XTRIM key MAXLEN [=|~] n
pub fn cmd_xtrim(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    if keyword(&args[1]) != "MAXLEN" {
        return Err(ZedisError::Syntax);
    }
    let (n, next) = parse_maxlen(args, 1)?;
    if next != args.len() {
        return Err(ZedisError::Syntax);
    }
    let removed = match ctx.db.write_existing::<Stream>(&args[0])? {
        Some(stream) => stream.trim(n),
        None => 0,
    };
    Ok(len_reply(removed))
}
