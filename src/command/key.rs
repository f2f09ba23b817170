use super::{Ctx, bool_reply, bulk_array, keyword, len_reply, parse_int};
use crate::error::{ZedisError, ZedisResult};
use crate::glob::Pattern;
use crate::resp::Reply;
use crate::store::entry::Ttl;
use bytes::Bytes;

pub fn cmd_del(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let mut removed = 0;
    for key in args {
        removed += ctx.db.delete(key)? as usize;
    }
    Ok(len_reply(removed))
}

/// A key named twice is counted twice.
pub fn cmd_exists(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let mut found = 0;
    for key in args {
        found += ctx.db.exists(key)? as usize;
    }
    Ok(len_reply(found))
}

pub fn cmd_type(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(Reply::status(ctx.db.type_name(&args[0])?.unwrap_or("none")))
}

pub fn cmd_ttl(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(Reply::integer(ctx.db.ttl(&args[0])?.as_secs_reply()))
}

pub fn cmd_pttl(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(Reply::integer(ctx.db.ttl(&args[0])?.as_millis_reply()))
}

fn expire_time(ctx: &mut Ctx<'_, '_>, key: &[u8], unit_ms: u64) -> ZedisResult<Reply> {
    let now = ctx.db.now();
    Ok(Reply::integer(match ctx.db.ttl(key)? {
        Ttl::Missing => -2,
        Ttl::Persistent => -1,
        Ttl::Expires(left) => ((now + left.as_millis() as u64) / unit_ms) as i64,
    }))
}

pub fn cmd_expiretime(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    expire_time(ctx, &args[0], 1000)
}

pub fn cmd_pexpiretime(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    expire_time(ctx, &args[0], 1)
}

/// NX / XX / GT / LT guard on an expiry update.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ExpireGuard {
    Always,
    NoExpiry,
    HasExpiry,
    Greater,
    Less,
}

impl ExpireGuard {
    fn parse(opts: &[Bytes]) -> ZedisResult<Self> {
        let mut guard = ExpireGuard::Always;
        for opt in opts {
            let next = match keyword(opt).as_str() {
                "NX" => ExpireGuard::NoExpiry,
                "XX" => ExpireGuard::HasExpiry,
                "GT" => ExpireGuard::Greater,
                "LT" => ExpireGuard::Less,
                _ => return Err(ZedisError::Syntax),
            };
            if guard != ExpireGuard::Always && guard != next {
                return Err(ZedisError::generic(
                    "NX and XX, GT or LT options at the same time are not compatible",
                ));
            }
            guard = next;
        }
        Ok(guard)
    }

    /// A key without expiry counts as infinitely far in the future for GT/LT.
    fn allows(self, current: Option<u64>, proposed: u64) -> bool {
        match (self, current) {
            (ExpireGuard::Always, _) => true,
            (ExpireGuard::NoExpiry, c) => c.is_none(),
            (ExpireGuard::HasExpiry, c) => c.is_some(),
            (ExpireGuard::Greater, Some(c)) => proposed > c,
            (ExpireGuard::Greater, None) => false,
            (ExpireGuard::Less, Some(c)) => proposed < c,
            (ExpireGuard::Less, None) => true,
        }
    }
}

/// Shared body of EXPIRE and friends. `absolute` says whether the argument is a
/// unix time rather than an offset from now.
fn expire(ctx: &mut Ctx<'_, '_>, args: &[Bytes], unit_ms: i64, absolute: bool, command: &str) -> ZedisResult<Reply> {
    let amount = parse_int(&args[1])?;
    let guard = ExpireGuard::parse(&args[2..])?;
    let now = ctx.db.now() as i64;
    let invalid = || ZedisError::Generic(format!("invalid expire time in '{command}' command"));
    let at = amount
        .checked_mul(unit_ms)
        .and_then(|ms| if absolute { Some(ms) } else { ms.checked_add(now) })
        .ok_or_else(invalid)?;
    let current = match ctx.db.ttl(&args[0])? {
        Ttl::Missing => return Ok(bool_reply(false)),
        Ttl::Persistent => None,
        Ttl::Expires(left) => Some(now as u64 + left.as_millis() as u64),
    };
    let at = at.max(0) as u64;
    if !guard.allows(current, at) {
        return Ok(bool_reply(false));
    }
    Ok(bool_reply(ctx.db.expire_at(&args[0], at)?))
}

pub fn cmd_expire(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    expire(ctx, args, 1000, false, "expire")
}

pub fn cmd_pexpire(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    expire(ctx, args, 1, false, "pexpire")
}

pub fn cmd_expireat(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    expire(ctx, args, 1000, true, "expireat")
}

pub fn cmd_pexpireat(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    expire(ctx, args, 1, true, "pexpireat")
}

pub fn cmd_persist(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(bool_reply(ctx.db.persist(&args[0])?))
}

pub fn cmd_rename(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    if args[0] == args[1] {
        return if ctx.db.exists(&args[0])? { Ok(Reply::ok()) } else { Err(ZedisError::NoSuchKey) };
    }
    if ctx.db.rename(&args[0], args[1].clone())? {
        Ok(Reply::ok())
    } else {
        Err(ZedisError::NoSuchKey)
    }
}

pub fn cmd_renamenx(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    if !ctx.db.exists(&args[0])? {
        return Err(ZedisError::NoSuchKey);
    }
    if ctx.db.exists(&args[1])? {
        return Ok(bool_reply(false));
    }
    ctx.db.rename(&args[0], args[1].clone())?;
    Ok(bool_reply(true))
}

pub fn cmd_keys(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let mut keys = ctx.db.keys(&Pattern::new(args[0].to_vec()))?;
    keys.sort();
    Ok(bulk_array(keys))
}

pub fn cmd_randomkey(ctx: &mut Ctx<'_, '_>, _args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(Reply::bulk_or_nil(ctx.db.random_key()?))
}
