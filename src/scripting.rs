//! Lua scripting for EVAL / EVALSHA.
//!
//! Every evaluation gets a fresh Lua 5.4 state. `redis.call` and `redis.pcall`
//! go through the ordinary executor against the guard the EVAL command already
//! holds, which covers every shard, so a script runs as one atomic unit.

use crate::command::{self, Ctx};
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;
use bytes::Bytes;
use mlua::prelude::*;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub fn sha1_hex(script: &[u8]) -> String {
    sha1_smol::Sha1::from(script).digest().to_string()
}

/// Script bodies keyed by their lowercase SHA1 hex digest.
#[derive(Debug, Default)]
pub struct ScriptCache {
    scripts: Mutex<HashMap<String, Arc<[u8]>>>,
}

impl ScriptCache {
    pub fn new() -> Self {
        ScriptCache::default()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<[u8]>>> {
        self.scripts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store a script and return its digest.
    pub fn load(&self, script: &[u8]) -> String {
        let sha = sha1_hex(script);
        self.map().entry(sha.clone()).or_insert_with(|| Arc::from(script));
        sha
    }

    pub fn get(&self, sha: &str) -> Option<Arc<[u8]>> {
        self.map().get(&sha.to_ascii_lowercase()).cloned()
    }

    pub fn exists(&self, sha: &str) -> bool {
        self.map().contains_key(&sha.to_ascii_lowercase())
    }

    pub fn flush(&self) {
        self.map().clear();
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }
}

/// Server reply to Lua value.
fn reply_to_lua(lua: &Lua, reply: &Reply) -> LuaResult<LuaValue> {
    Ok(match reply {
        Reply::Integer(n) => LuaValue::Integer(*n),
        Reply::Bulk(Some(data)) => LuaValue::String(lua.create_string(data)?),
        Reply::Bulk(None) | Reply::Array(None) => LuaValue::Boolean(false),
        Reply::Status(s) => LuaValue::Table(lua.create_table_from([("ok", s.as_str())])?),
        Reply::Error(s) => LuaValue::Table(lua.create_table_from([("err", s.as_str())])?),
        Reply::Array(Some(items)) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for item in items {
                table.raw_push(reply_to_lua(lua, item)?)?;
            }
            LuaValue::Table(table)
        }
    })
}

/// Lua value to server reply. Numbers are truncated; an array table ends at its
/// first nil.
fn lua_to_reply(value: LuaValue) -> Reply {
    match value {
        LuaValue::Integer(n) => Reply::integer(n),
        LuaValue::Number(n) => Reply::integer(n as i64),
        LuaValue::String(s) => Reply::bulk(Bytes::copy_from_slice(&s.as_bytes())),
        LuaValue::Boolean(true) => Reply::integer(1),
        LuaValue::Table(t) => {
            if let Ok(LuaValue::String(err)) = t.raw_get::<LuaValue>("err") {
                return Reply::error(err.to_string_lossy());
            }
            if let Ok(LuaValue::String(ok)) = t.raw_get::<LuaValue>("ok") {
                return Reply::status(ok.to_string_lossy());
            }
            let mut items = Vec::new();
            for i in 1.. {
                match t.raw_get::<LuaValue>(i) {
                    Ok(LuaValue::Nil) | Err(_) => break,
                    Ok(v) => items.push(lua_to_reply(v)),
                }
            }
            Reply::array(items)
        }
        _ => Reply::nil(),
    }
}

fn lua_args(args: &LuaMultiValue) -> Option<Vec<Bytes>> {
    args.iter()
        .map(|v| match v {
            LuaValue::String(s) => Some(Bytes::copy_from_slice(&s.as_bytes())),
            LuaValue::Integer(n) => Some(Bytes::from(n.to_string())),
            LuaValue::Number(n) => Some(Bytes::from(crate::resp::format_double(*n))),
            _ => None,
        })
        .collect()
}

/// One `redis.call` / `redis.pcall`: every failure comes back as an error reply.
fn dispatch(ctx: &mut Ctx<'_, '_>, args: &LuaMultiValue) -> Reply {
    let Some(argv) = lua_args(args) else {
        return Reply::error("ERR Lua redis.call() accepts only strings and numbers as arguments");
    };
    if argv.is_empty() {
        return Reply::error("ERR Please specify at least one argument for this redis lib call");
    }
    match command::resolve(&argv) {
        Ok(spec) if spec.has_flag("noscript") => {
            Reply::error("ERR This Redis command is not allowed from script")
        }
        Ok(spec) => command::invoke(ctx, spec, &argv),
        Err(e) => e.into(),
    }
}

fn string_table(lua: &Lua, items: &[Bytes]) -> LuaResult<LuaTable> {
    let table = lua.create_table_with_capacity(items.len(), 0)?;
    for item in items {
        table.raw_push(lua.create_string(item)?)?;
    }
    Ok(table)
}

/// The parts of the `redis` table that do not touch the keyspace.
fn redis_library(lua: &Lua) -> LuaResult<LuaTable> {
    let redis = lua.create_table()?;
    redis.set(
        "error_reply",
        lua.create_function(|lua, msg: LuaString| lua.create_table_from([("err", msg)]))?,
    )?;
    redis.set(
        "status_reply",
        lua.create_function(|lua, msg: LuaString| lua.create_table_from([("ok", msg)]))?,
    )?;
    redis.set(
        "sha1hex",
        lua.create_function(|_, data: LuaString| Ok(sha1_hex(&data.as_bytes())))?,
    )?;
    redis.set(
        "log",
        lua.create_function(|_, (level, msg): (i64, LuaString)| {
            let msg = msg.to_string_lossy();
            match level {
                0 | 1 => debug!(target: "zedis::script", "{msg}"),
                2 => info!(target: "zedis::script", "{msg}"),
                _ => warn!(target: "zedis::script", "{msg}"),
            }
            Ok(())
        })?,
    )?;
    for (i, name) in ["LOG_DEBUG", "LOG_VERBOSE", "LOG_NOTICE", "LOG_WARNING"].iter().enumerate() {
        redis.set(*name, i as i64)?;
    }
    Ok(redis)
}

/// An error reply raised by `redis.call`, if that is what ended the script.
fn raised_reply(e: &LuaError) -> Option<String> {
    match e {
        LuaError::CallbackError { cause, .. } | LuaError::WithContext { cause, .. } => raised_reply(cause),
        LuaError::ExternalError(inner) => inner.downcast_ref::<ZedisError>().map(ZedisError::to_resp_error),
        _ => None,
    }
}

fn script_error(e: LuaError) -> ZedisError {
    if let Some(reply) = raised_reply(&e) {
        return ZedisError::Reply(reply);
    }
    match e {
        LuaError::SyntaxError { message, .. } => ZedisError::Script(message),
        LuaError::RuntimeError(message) => ZedisError::Script(message),
        other => ZedisError::Script(other.to_string()),
    }
}

/// Run `source` with the given KEYS and ARGV against the caller's guard.
pub fn eval(ctx: &mut Ctx<'_, '_>, source: &[u8], keys: &[Bytes], argv: &[Bytes]) -> ZedisResult<Reply> {
    let lua = Lua::new();
    let ctx = RefCell::new(ctx);
    let result = lua.scope(|scope| {
        let globals = lua.globals();
        globals.set("KEYS", string_table(&lua, keys)?)?;
        globals.set("ARGV", string_table(&lua, argv)?)?;
        let redis = redis_library(&lua)?;
        redis.set(
            "call",
            scope.create_function(|lua, args: LuaMultiValue| {
                let mut guard = ctx.borrow_mut();
                match dispatch(&mut **guard, &args) {
                    Reply::Error(msg) => Err(LuaError::external(ZedisError::Reply(msg))),
                    reply => reply_to_lua(lua, &reply),
                }
            })?,
        )?;
        redis.set(
            "pcall",
            scope.create_function(|lua, args: LuaMultiValue| {
                let mut guard = ctx.borrow_mut();
                reply_to_lua(lua, &dispatch(&mut **guard, &args))
            })?,
        )?;
        globals.set("redis", redis)?;
        let value: LuaValue = lua.load(source).set_name("@user_script").eval()?;
        Ok(lua_to_reply(value))
    });
    result.map_err(script_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_matches_redis() {
        assert_eq!(sha1_hex(b"return 1"), "e0e1f9fabfc9d4800c877a703b823ac0578ff8db");
    }

    #[test]
    fn test_cache_is_case_insensitive_on_lookup() {
        let cache = ScriptCache::new();
        let sha = cache.load(b"return 1");
        assert!(cache.exists(&sha.to_ascii_uppercase()));
        assert_eq!(cache.get(&sha).as_deref(), Some(&b"return 1"[..]));
        assert_eq!(cache.len(), 1);
        cache.flush();
        assert!(!cache.exists(&sha));
    }

    #[test]
    fn test_lua_reply_conversion() {
        let lua = Lua::new();
        let v: LuaValue = lua.load("return {1, 2.7, 'x', true, false, 'dropped'}").eval().unwrap();
        assert_eq!(
            lua_to_reply(v),
            Reply::array(vec![Reply::integer(1), Reply::integer(2), Reply::bulk("x"), Reply::integer(1)])
        );
        let v: LuaValue = lua.load("return {ok='FINE'}").eval().unwrap();
        assert_eq!(lua_to_reply(v), Reply::status("FINE"));
        let back = reply_to_lua(&lua, &Reply::nil()).unwrap();
        assert!(matches!(back, LuaValue::Boolean(false)));
    }
}
