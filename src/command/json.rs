use super::{Ctx, keyword, len_reply};
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;
use crate::types::json::{JsonPath, parse_json, type_name};
use crate::types::{JsonDoc, Value};
use bytes::Bytes;

fn path_arg(args: &[Bytes], i: usize) -> ZedisResult<JsonPath> {
    args.get(i).map_or_else(|| Ok(JsonPath::root()), |p| JsonPath::parse(p))
}

/// JSON.SET key [path] value [NX | XX]. Without a path the value replaces the
/// whole document.
pub fn cmd_json_set(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let (path, value, options) = match args {
        [_, doc] => (JsonPath::root(), parse_json(doc)?, &[][..]),
        [_, path, doc, options @ ..] => (JsonPath::parse(path)?, parse_json(doc)?, options),
        _ => return Err(super::wrong_args("json.set")),
    };
    let (nx, xx) = match options {
        [] => (false, false),
        [flag] => match keyword(flag).as_str() {
            "NX" => (true, false),
            "XX" => (false, true),
            _ => return Err(ZedisError::Syntax),
        },
        _ => return Err(ZedisError::Syntax),
    };
    let present = match ctx.db.read::<JsonDoc>(&args[0])? {
        Some(doc) => doc.get(&path).is_some(),
        None if path.is_root() => false,
        None => {
            return Err(ZedisError::generic("new objects must be created at the root"));
        }
    };
    if (nx && present) || (xx && !present) {
        return Ok(Reply::nil());
    }
    if path.is_root() {
        ctx.db.set_keep_ttl(args[0].clone(), Value::Json(JsonDoc::new(value)))?;
        return Ok(Reply::ok());
    }
    let doc = ctx.db.write::<JsonDoc>(&args[0])?;
    Ok(if doc.set(&path, value) { Reply::ok() } else { Reply::nil() })
}

pub fn cmd_json_get(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let path = path_arg(args, 1)?;
    if args.len() > 2 {
        return Err(ZedisError::Syntax);
    }
    let found = ctx.db.read::<JsonDoc>(&args[0])?.and_then(|doc| doc.get(&path).map(|v| v.to_string()));
    Ok(Reply::bulk_or_nil(found))
}

/// Deleting the root removes the key.
pub fn cmd_json_del(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let path = path_arg(args, 1)?;
    if args.len() > 2 {
        return Err(ZedisError::Syntax);
    }
    if ctx.db.read::<JsonDoc>(&args[0])?.is_none() {
        return Ok(len_reply(0));
    }
    if path.is_root() {
        ctx.db.delete(&args[0])?;
        return Ok(len_reply(1));
    }
    let removed = match ctx.db.write_existing::<JsonDoc>(&args[0])? {
        Some(doc) => doc.delete(&path),
        None => 0,
    };
    Ok(len_reply(removed))
}

pub fn cmd_json_type(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let path = path_arg(args, 1)?;
    if args.len() > 2 {
        return Err(ZedisError::Syntax);
    }
    let kind = ctx.db.read::<JsonDoc>(&args[0])?.and_then(|doc| doc.get(&path).map(type_name));
    Ok(kind.map_or_else(Reply::nil, Reply::status))
}
