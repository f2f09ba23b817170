//! EVAL, EVALSHA and SCRIPT.

use super::{Ctx, keyword, parse_int, text};
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;
use crate::scripting;
use bytes::Bytes;

/// Split `numkeys key... arg...` into KEYS and ARGV.
fn split_keys(args: &[Bytes]) -> ZedisResult<(&[Bytes], &[Bytes])> {
    let numkeys = parse_int(&args[0])?;
    if numkeys < 0 {
        return Err(ZedisError::generic("Number of keys can't be negative"));
    }
    let rest = &args[1..];
    if numkeys as usize > rest.len() {
        return Err(ZedisError::generic("Number of keys can't be greater than number of args"));
    }
    Ok(rest.split_at(numkeys as usize))
}

/// EVAL script numkeys [key ...] [arg ...]. The script is cached as a side effect.
pub fn cmd_eval(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let (keys, argv) = split_keys(&args[1..])?;
    ctx.engine.scripts.load(&args[0]);
    scripting::eval(ctx, &args[0], keys, argv)
}

pub fn cmd_evalsha(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let (keys, argv) = split_keys(&args[1..])?;
    let source = ctx.engine.scripts.get(&text(&args[0])).ok_or(ZedisError::NoScript)?;
    scripting::eval(ctx, &source, keys, argv)
}

/// SCRIPT LOAD script | EXISTS sha... | FLUSH [ASYNC | SYNC]
pub fn cmd_script(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let scripts = &ctx.engine.scripts;
    match (keyword(&args[0]).as_str(), &args[1..]) {
        ("LOAD", [source]) => Ok(Reply::bulk(scripts.load(source))),
        ("EXISTS", shas) if !shas.is_empty() => Ok(Reply::array(
            shas.iter().map(|sha| super::bool_reply(scripts.exists(&text(sha)))).collect(),
        )),
        ("FLUSH", []) => {
            scripts.flush();
            Ok(Reply::ok())
        }
        ("FLUSH", [mode]) if matches!(keyword(mode).as_str(), "ASYNC" | "SYNC") => {
            scripts.flush();
            Ok(Reply::ok())
        }
        ("LOAD" | "EXISTS" | "FLUSH", _) => Err(super::wrong_args(&format!("script|{}", text(&args[0]).to_ascii_lowercase()))),
        _ => Err(ZedisError::UnknownSubcommand(text(&args[0]), "SCRIPT".into())),
    }
}
