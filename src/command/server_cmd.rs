use super::table::COMMANDS;
use super::{Ctx, keyword, len_reply, lookup, text};
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;
use bytes::Bytes;
use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn cmd_ping(_ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    match args {
        [] => Ok(Reply::status("PONG")),
        [msg] => Ok(Reply::bulk(msg.clone())),
        _ => Err(super::wrong_args("ping")),
    }
}

pub fn cmd_echo(_ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(Reply::bulk(args[0].clone()))
}

/// Unix seconds and the microseconds within the current second.
pub fn cmd_time(_ctx: &mut Ctx<'_, '_>, _args: &[Bytes]) -> ZedisResult<Reply> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    Ok(Reply::array(vec![
        Reply::bulk(now.as_secs().to_string()),
        Reply::bulk(now.subsec_micros().to_string()),
    ]))
}

/// COMMAND [COUNT | INFO name... | DOCS | LIST]
pub fn cmd_command(_ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let Some(sub) = args.first() else {
        return Ok(Reply::array(COMMANDS.iter().map(|c| c.info_reply()).collect()));
    };
    match keyword(sub).as_str() {
        "COUNT" => Ok(len_reply(COMMANDS.len())),
        "INFO" => Ok(Reply::array(
            args[1..]
                .iter()
                .map(|name| lookup(name).map_or_else(Reply::nil, |c| c.info_reply()))
                .collect(),
        )),
        "LIST" => Ok(Reply::array(
            COMMANDS.iter().map(|c| Reply::bulk(c.name.to_ascii_lowercase())).collect(),
        )),
        "DOCS" => Ok(Reply::array(Vec::new())),
        _ => Err(ZedisError::UnknownSubcommand(text(sub), "COMMAND".into())),
    }
}

/// CONFIG GET pattern | CONFIG SET name value
pub fn cmd_config(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    match (keyword(&args[0]).as_str(), &args[1..]) {
        ("GET", [pattern]) => {
            let mut out = Vec::new();
            for (name, value) in ctx.engine.config().matching(pattern) {
                out.push(Reply::bulk(name));
                out.push(Reply::bulk(value));
            }
            Ok(Reply::array(out))
        }
        ("SET", [name, value]) => {
            ctx.engine.config_mut().set(&text(name), &text(value)).map_err(ZedisError::Generic)?;
            Ok(Reply::ok())
        }
        ("GET", _) => Err(super::wrong_args("config|get")),
        ("SET", _) => Err(super::wrong_args("config|set")),
        _ => Err(ZedisError::UnknownSubcommand(text(&args[0]), "CONFIG".into())),
    }
}

pub fn cmd_dbsize(ctx: &mut Ctx<'_, '_>, _args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(len_reply(ctx.db.len()?.0))
}

/// FLUSHDB / FLUSHALL [ASYNC | SYNC]. There is a single database, and the
/// flush always happens before the reply either way.
pub fn cmd_flush(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    match args {
        [] => {}
        [mode] if matches!(keyword(mode).as_str(), "ASYNC" | "SYNC") => {}
        _ => return Err(ZedisError::Syntax),
    }
    ctx.db.flush()?;
    Ok(Reply::ok())
}

const SECTIONS: &[&str] = &["server", "clients", "stats", "keyspace"];

/// INFO [section]. Unknown sections produce an empty body.
pub fn cmd_info(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let wanted = match args {
        [] => None,
        [section] => Some(text(section).to_ascii_lowercase()),
        _ => return Err(ZedisError::Syntax),
    };
    let show = |name: &str| match wanted.as_deref() {
        None | Some("all" | "default" | "everything") => true,
        Some(w) => w == name,
    };
    let engine = ctx.engine;
    let mut out = String::new();
    for section in SECTIONS.iter().copied().filter(|s| show(s)) {
        match section {
            "server" => {
                let config = engine.config();
                out.push_str("# Server\r\n");
                let _ = write!(out, "zedis_version:{}\r\n", env!("CARGO_PKG_VERSION"));
                out.push_str("redis_version:7.2.0\r\nredis_mode:standalone\r\n");
                let _ = write!(out, "process_id:{}\r\n", std::process::id());
                let _ = write!(out, "tcp_port:{}\r\n", config.port);
                let _ = write!(out, "uptime_in_seconds:{}\r\n", engine.started.elapsed().as_secs());
                let _ = write!(out, "hz:{}\r\nshards:{}\r\n", config.hz, engine.keyspace.shard_count());
            }
            "clients" => {
                out.push_str("# Clients\r\n");
                let _ = write!(out, "connected_clients:{}\r\n", engine.connected_clients());
                let _ = write!(out, "pubsub_clients:{}\r\n", engine.broker.subscribers());
            }
            "stats" => {
                let (lazy, active) = engine.keyspace.expired_counts();
                out.push_str("# Stats\r\n");
                let _ = write!(out, "total_connections_received:{}\r\n", engine.connections_received());
                let _ = write!(out, "total_commands_processed:{}\r\n", engine.commands_processed());
                let _ = write!(out, "expired_keys:{}\r\n", lazy + active);
                let _ = write!(out, "expired_keys_lazy:{lazy}\r\nexpired_keys_active:{active}\r\n");
                let _ = write!(out, "pubsub_channels:{}\r\n", engine.broker.channels(None).len());
                let _ = write!(out, "pubsub_patterns:{}\r\n", engine.broker.numpat());
                let _ = write!(out, "cached_scripts:{}\r\n", engine.scripts.len());
            }
            _ => {
                let (keys, volatile) = ctx.db.len()?;
                out.push_str("# Keyspace\r\n");
                if keys > 0 {
                    let _ = write!(out, "db0:keys={keys},expires={volatile},avg_ttl=0\r\n");
                }
            }
        }
        out.push_str("\r\n");
    }
    Ok(Reply::bulk(out))
}
