use super::{Ctx, bool_reply, keyword, len_reply, parse_float, parse_int, wrong_args};
use crate::error::{ZedisError, ZedisResult};
use crate::resp::{Reply, format_double};
use crate::types::string::check_len;
use crate::types::{StrValue, Value};
use bytes::Bytes;

fn string_value(data: &[u8]) -> Value {
    Value::Str(StrValue::new(data))
}

/// Absolute expiry for a relative `amount` in `unit_ms` units; rejects
/// non-positive values and overflow.
fn deadline(now: u64, amount: i64, unit_ms: u64, command: &str) -> ZedisResult<u64> {
    let invalid = || ZedisError::Generic(format!("invalid expire time in '{command}' command"));
    if amount <= 0 {
        return Err(invalid());
    }
    (amount as u64)
        .checked_mul(unit_ms)
        .and_then(|ms| ms.checked_add(now))
        .filter(|at| *at <= i64::MAX as u64)
        .ok_or_else(invalid)
}

pub fn cmd_get(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let value = ctx.db.read::<StrValue>(&args[0])?;
    Ok(Reply::bulk_or_nil(value.map(StrValue::to_bytes)))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Condition {
    Always,
    IfAbsent,
    IfPresent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Expiry {
    Clear,
    Keep,
    At(u64),
}

/// SET key value [EX s | PX ms | EXAT ts | PXAT ts | KEEPTTL] [NX | XX] [GET]
pub fn cmd_set(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let now = ctx.db.now();
    let mut condition = Condition::Always;
    let mut expiry = Expiry::Clear;
    let mut get = false;
    let mut i = 2;
    while i < args.len() {
        let opt = keyword(&args[i]);
        let timed = matches!(opt.as_str(), "EX" | "PX" | "EXAT" | "PXAT");
        if timed {
            if expiry != Expiry::Clear {
                return Err(ZedisError::Syntax);
            }
            let amount = parse_int(args.get(i + 1).ok_or(ZedisError::Syntax)?)?;
            expiry = Expiry::At(match opt.as_str() {
                "EX" => deadline(now, amount, 1000, "set")?,
                "PX" => deadline(now, amount, 1, "set")?,
                "EXAT" => deadline(0, amount, 1000, "set")?,
                _ => deadline(0, amount, 1, "set")?,
            });
            i += 2;
            continue;
        }
        match opt.as_str() {
            "NX" if condition == Condition::Always => condition = Condition::IfAbsent,
            "XX" if condition == Condition::Always => condition = Condition::IfPresent,
            "KEEPTTL" if expiry == Expiry::Clear => expiry = Expiry::Keep,
            "GET" => get = true,
            _ => return Err(ZedisError::Syntax),
        }
        i += 1;
    }

    let key = &args[0];
    let old = if get { ctx.db.read::<StrValue>(key)?.map(StrValue::to_bytes) } else { None };
    let exists = ctx.db.exists(key)?;
    let proceed = match condition {
        Condition::Always => true,
        Condition::IfAbsent => !exists,
        Condition::IfPresent => exists,
    };
    if proceed {
        let value = string_value(&args[1]);
        match expiry {
            Expiry::Clear => ctx.db.set(key.clone(), value, None)?,
            Expiry::Keep => ctx.db.set_keep_ttl(key.clone(), value)?,
            Expiry::At(at) => ctx.db.set(key.clone(), value, Some(at))?,
        }
    }
    Ok(match (get, proceed) {
        (true, _) => Reply::bulk_or_nil(old),
        (false, true) => Reply::ok(),
        (false, false) => Reply::nil(),
    })
}

pub fn cmd_setnx(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    if ctx.db.exists(&args[0])? {
        return Ok(bool_reply(false));
    }
    ctx.db.set(args[0].clone(), string_value(&args[1]), None)?;
    Ok(bool_reply(true))
}

fn set_with_ttl(ctx: &mut Ctx<'_, '_>, args: &[Bytes], unit_ms: u64, command: &str) -> ZedisResult<Reply> {
    let at = deadline(ctx.db.now(), parse_int(&args[1])?, unit_ms, command)?;
    ctx.db.set(args[0].clone(), string_value(&args[2]), Some(at))?;
    Ok(Reply::ok())
}

pub fn cmd_setex(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    set_with_ttl(ctx, args, 1000, "setex")
}

pub fn cmd_psetex(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    set_with_ttl(ctx, args, 1, "psetex")
}

pub fn cmd_getset(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let old = ctx.db.read::<StrValue>(&args[0])?.map(StrValue::to_bytes);
    ctx.db.set(args[0].clone(), string_value(&args[1]), None)?;
    Ok(Reply::bulk_or_nil(old))
}

pub fn cmd_getdel(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let Some(old) = ctx.db.read::<StrValue>(&args[0])?.map(StrValue::to_bytes) else {
        return Ok(Reply::nil());
    };
    ctx.db.delete(&args[0])?;
    Ok(Reply::bulk(old))
}

/// Keys holding something other than a string read as nil.
pub fn cmd_mget(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let mut out = Vec::with_capacity(args.len());
    for key in args {
        let value = ctx.db.read::<StrValue>(key).ok().flatten().map(StrValue::to_bytes);
        out.push(Reply::bulk_or_nil(value));
    }
    Ok(Reply::array(out))
}

pub fn cmd_mset(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    if args.len() % 2 != 0 {
        return Err(wrong_args("mset"));
    }
    for pair in args.chunks(2) {
        ctx.db.set(pair[0].clone(), string_value(&pair[1]), None)?;
    }
    Ok(Reply::ok())
}

pub fn cmd_msetnx(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    if args.len() % 2 != 0 {
        return Err(wrong_args("msetnx"));
    }
    for pair in args.chunks(2) {
        if ctx.db.exists(&pair[0])? {
            return Ok(bool_reply(false));
        }
    }
    for pair in args.chunks(2) {
        ctx.db.set(pair[0].clone(), string_value(&pair[1]), None)?;
    }
    Ok(bool_reply(true))
}

/// A missing key counts as 0. The stored value is untouched on any error.
fn incr_by(ctx: &mut Ctx<'_, '_>, key: &Bytes, delta: i64) -> ZedisResult<Reply> {
    match ctx.db.write_existing::<StrValue>(key)? {
        Some(s) => Ok(Reply::integer(s.incr_by(delta)?)),
        None => {
            ctx.db.set(key.clone(), Value::Str(StrValue::from_int(delta)), None)?;
            Ok(Reply::integer(delta))
        }
    }
}

pub fn cmd_incr(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    incr_by(ctx, &args[0], 1)
}

pub fn cmd_decr(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    incr_by(ctx, &args[0], -1)
}

pub fn cmd_incrby(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let delta = parse_int(&args[1])?;
    incr_by(ctx, &args[0], delta)
}

pub fn cmd_decrby(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let delta = parse_int(&args[1])?.checked_neg().ok_or(ZedisError::Overflow)?;
    incr_by(ctx, &args[0], delta)
}

pub fn cmd_incrbyfloat(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let delta = parse_float(&args[1])?;
    if !delta.is_finite() {
        return Err(ZedisError::NanOrInfinity);
    }
    match ctx.db.write_existing::<StrValue>(&args[0])? {
        Some(s) => Ok(Reply::double(s.incr_by_float(delta)?)),
        None => {
            ctx.db.set(args[0].clone(), string_value(format_double(delta).as_bytes()), None)?;
            Ok(Reply::double(delta))
        }
    }
}

pub fn cmd_append(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    match ctx.db.write_existing::<StrValue>(&args[0])? {
        Some(s) => Ok(len_reply(s.append(&args[1])?)),
        None => {
            ctx.db.set(args[0].clone(), string_value(&args[1]), None)?;
            Ok(len_reply(args[1].len()))
        }
    }
}

pub fn cmd_strlen(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(len_reply(ctx.db.read::<StrValue>(&args[0])?.map_or(0, StrValue::len)))
}

pub fn cmd_getrange(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let start = parse_int(&args[1])?;
    let end = parse_int(&args[2])?;
    let range = ctx.db.read::<StrValue>(&args[0])?.map(|s| s.getrange(start, end)).unwrap_or_default();
    Ok(Reply::bulk(range))
}

pub fn cmd_setrange(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let offset = parse_int(&args[1])?;
    if offset < 0 {
        return Err(ZedisError::generic("offset is out of range"));
    }
    let offset = offset as usize;
    let data = &args[2];
    if !data.is_empty() {
        check_len(offset + data.len())?;
    }
    if !ctx.db.exists(&args[0])? {
        if data.is_empty() {
            return Ok(len_reply(0));
        }
        let mut fresh = StrValue::new(b"");
        let len = fresh.setrange(offset, data)?;
        ctx.db.set(args[0].clone(), Value::Str(fresh), None)?;
        return Ok(len_reply(len));
    }
    let s = ctx.db.write::<StrValue>(&args[0])?;
    Ok(len_reply(s.setrange(offset, data)?))
}

#[cfg(test)]
mod tests {
    use crate::command::test_support::*;
    use crate::resp::Reply;
    use std::time::Duration;

    #[tokio::test]
    async fn test_set_options() {
        let e = engine();
        assert_eq!(call(&e, "SET k v NX").await, Reply::ok());
        assert_eq!(call(&e, "SET k w NX").await, Reply::nil());
        assert_eq!(call(&e, "SET k w XX GET").await, bulk("v"));
        assert_eq!(call(&e, "SET missing x XX").await, Reply::nil());
        assert_eq!(call(&e, "SET k v EX 0").await, Reply::error("ERR invalid expire time in 'set' command"));
        assert_eq!(call(&e, "SET k v NX XX").await, Reply::error("ERR syntax error"));
        assert_eq!(call(&e, "GET k").await, bulk("w"));
    }

    #[tokio::test]
    async fn test_ttl_law_without_reaper() {
        let e = engine();
        call(&e, "PSETEX t 40 v").await;
        assert_eq!(call(&e, "GET t").await, bulk("v"));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(call(&e, "GET t").await, Reply::nil());
        assert_eq!(call(&e, "EXISTS t").await, Reply::integer(0));
    }

    #[tokio::test]
    async fn test_counter_law() {
        let e = engine();
        call(&e, "SET c 0").await;
        for _ in 0..25 {
            call(&e, "INCR c").await;
        }
        assert_eq!(call(&e, "GET c").await, bulk("25"));
        call(&e, "SET s hello").await;
        assert_eq!(call(&e, "INCR s").await, Reply::error("ERR value is not an integer or out of range"));
        assert_eq!(call(&e, "GET s").await, bulk("hello"));
        assert_eq!(call(&e, "DECRBY fresh 5").await, Reply::integer(-5));
        call(&e, "SET big 9223372036854775807").await;
        assert!(err_starts(&call(&e, "INCR big").await, "ERR increment or decrement would overflow"));
    }

    #[tokio::test]
    async fn test_incrbyfloat_and_append() {
        let e = engine();
        assert_eq!(call(&e, "INCRBYFLOAT f 1.5").await, bulk("1.5"));
        assert_eq!(call(&e, "INCRBYFLOAT f 2").await, bulk("3.5"));
        assert_eq!(call(&e, "APPEND s ab").await, Reply::integer(2));
        assert_eq!(call(&e, "APPEND s cd").await, Reply::integer(4));
        assert_eq!(call(&e, "GETRANGE s 1 -1").await, bulk("bcd"));
        assert_eq!(call(&e, "STRLEN s").await, Reply::integer(4));
    }

    #[tokio::test]
    async fn test_setrange_pads_with_zero_bytes() {
        let e = engine();
        assert_eq!(call(&e, "SETRANGE r 2 xy").await, Reply::integer(4));
        assert_eq!(call(&e, "GET r").await, Reply::bulk(&b"\0\0xy"[..]));
    }

    #[tokio::test]
    async fn test_multi_key_strings() {
        let e = engine();
        assert_eq!(call(&e, "MSET a 1 b 2").await, Reply::ok());
        assert!(err_starts(&call(&e, "MSET a 1 b").await, "ERR wrong number"));
        call(&e, "LPUSH l x").await;
        assert_eq!(
            call(&e, "MGET a l b zz").await,
            Reply::array(vec![bulk("1"), Reply::nil(), bulk("2"), Reply::nil()])
        );
        assert_eq!(call(&e, "MSETNX a 9 c 3").await, Reply::integer(0));
        assert_eq!(call(&e, "GET c").await, Reply::nil());
        assert_eq!(call(&e, "GETDEL a").await, bulk("1"));
        assert_eq!(call(&e, "GETDEL a").await, Reply::nil());
    }
}
