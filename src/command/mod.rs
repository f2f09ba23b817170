//! Command execution.
//!
//! A command is resolved against [`table::COMMANDS`] and arity-checked before
//! anything is locked. The executor then locks the shards of every key the
//! command names (or every shard, for keyspace-wide commands) and runs the
//! handler against the resulting [`KeyspaceGuard`]. Handlers are synchronous;
//! the only await on the way is taking the shard locks.

pub mod bitmap;
pub mod geo;
pub mod graph;
pub mod hash;
pub mod hyperloglog;
pub mod json;
pub mod key;
pub mod list;
pub mod probabilistic;
pub mod pubsub;
pub mod scripting;
pub mod server_cmd;
pub mod set;
pub mod sorted_set;
pub mod stream;
pub mod string;
pub mod table;
pub mod timeseries;
pub mod transaction;
pub mod vector;

use crate::engine::Engine;
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;
use crate::store::{Keyspace, KeyspaceGuard};
use crate::types::sorted_set::parse_score;
use bytes::Bytes;
pub use table::{CommandKind, CommandSpec, LockScope, lookup};
use tracing::trace;

/// What a handler runs against: the locked shards plus the shared services.
pub struct Ctx<'a, 'k> {
    pub db: &'a mut KeyspaceGuard<'k>,
    pub engine: &'a Engine,
}

/// A data command. `args` excludes the command name.
pub type Handler = for<'a, 'k> fn(&mut Ctx<'a, 'k>, &[Bytes]) -> ZedisResult<Reply>;

/// Find the command for `argv` and check its argument count. No side effects.
pub fn resolve(argv: &[Bytes]) -> ZedisResult<&'static CommandSpec> {
    let Some(name) = argv.first() else {
        return Err(ZedisError::generic("empty command"));
    };
    let spec = lookup(name).ok_or_else(|| unknown_command(argv))?;
    if !spec.accepts(argv.len()) {
        return Err(ZedisError::WrongArgCount(spec.name.to_ascii_lowercase()));
    }
    Ok(spec)
}

fn unknown_command(argv: &[Bytes]) -> ZedisError {
    let preview: Vec<String> = argv[1..]
        .iter()
        .take(3)
        .map(|a| format!("'{}'", String::from_utf8_lossy(a)))
        .collect();
    ZedisError::UnknownCommand(String::from_utf8_lossy(&argv[0]).into_owned(), preview.join(" "))
}

/// Shards a batch of resolved commands needs, or `None` when it needs all of them.
fn footprint<'a>(
    keyspace: &Keyspace,
    batch: impl IntoIterator<Item = (&'static CommandSpec, &'a [Bytes])>,
) -> Option<Vec<usize>> {
    let mut shards = Vec::new();
    for (spec, argv) in batch {
        if spec.scope == LockScope::All {
            return None;
        }
        shards.extend(spec.keys(argv).into_iter().map(|k| keyspace.shard_of(k)));
    }
    Some(shards)
}

async fn lock_footprint(keyspace: &Keyspace, shards: Option<Vec<usize>>) -> KeyspaceGuard<'_> {
    match shards {
        Some(ids) => keyspace.lock(ids).await,
        None => keyspace.lock_all().await,
    }
}

/// Run a resolved command under `ctx`, then drop any container it emptied.
pub fn invoke(ctx: &mut Ctx<'_, '_>, spec: &CommandSpec, argv: &[Bytes]) -> Reply {
    let CommandKind::Data(handler) = spec.kind else {
        return ZedisError::NotInTransaction.into();
    };
    trace!(command = spec.name, args = argv.len() - 1, "executing");
    let result = handler(ctx, &argv[1..]);
    ctx.db.sweep_empty();
    result.unwrap_or_else(Reply::from)
}

/// Resolve and run one command under locks the caller already holds.
pub fn execute(ctx: &mut Ctx<'_, '_>, argv: &[Bytes]) -> Reply {
    match resolve(argv) {
        Ok(spec) => invoke(ctx, spec, argv),
        Err(e) => e.into(),
    }
}

/// Run one standalone command: lock its shards, execute, release.
pub async fn run(engine: &Engine, argv: &[Bytes]) -> Reply {
    let spec = match resolve(argv) {
        Ok(spec) => spec,
        Err(e) => return e.into(),
    };
    let shards = footprint(&engine.keyspace, [(spec, argv)]);
    let mut db = lock_footprint(&engine.keyspace, shards).await;
    invoke(&mut Ctx { db: &mut db, engine }, spec, argv)
}

/// Run a batch as one unit: the union of its shards is locked up front and held
/// until the last command is done. A failing command yields an error entry and
/// the rest still run.
pub async fn run_batch(engine: &Engine, batch: &[Vec<Bytes>]) -> Vec<Reply> {
    let resolved: Vec<ZedisResult<&'static CommandSpec>> = batch.iter().map(|a| resolve(a)).collect();
    let shards = footprint(
        &engine.keyspace,
        resolved
            .iter()
            .zip(batch)
            .filter_map(|(r, argv)| r.as_ref().ok().map(|spec| (*spec, argv.as_slice()))),
    );
    let mut db = lock_footprint(&engine.keyspace, shards).await;
    let mut ctx = Ctx { db: &mut db, engine };
    resolved
        .into_iter()
        .zip(batch)
        .map(|(r, argv)| match r {
            Ok(spec) => invoke(&mut ctx, spec, argv),
            Err(e) => e.into(),
        })
        .collect()
}

// Argument helpers shared by the handlers.

pub fn parse_int(arg: &[u8]) -> ZedisResult<i64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(ZedisError::NotInteger)
}

/// A non-negative count.
pub fn parse_count(arg: &[u8]) -> ZedisResult<usize> {
    match parse_int(arg)? {
        n if n >= 0 => Ok(n as usize),
        _ => Err(ZedisError::generic("value is out of range, must be positive")),
    }
}

/// A float; `inf` and `-inf` are accepted, NaN is not.
pub fn parse_float(arg: &[u8]) -> ZedisResult<f64> {
    parse_score(arg).ok_or(ZedisError::NotFloat)
}

pub fn keyword(arg: &[u8]) -> String {
    String::from_utf8_lossy(arg).to_ascii_uppercase()
}

pub fn text(arg: &[u8]) -> String {
    String::from_utf8_lossy(arg).into_owned()
}

pub fn wrong_args(name: &str) -> ZedisError {
    ZedisError::WrongArgCount(name.to_string())
}

pub fn bool_reply(b: bool) -> Reply {
    Reply::integer(b as i64)
}

pub fn len_reply(n: usize) -> Reply {
    Reply::integer(n as i64)
}

pub fn bulk_array(items: impl IntoIterator<Item = Bytes>) -> Reply {
    Reply::array(items.into_iter().map(Reply::bulk).collect())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::Config;
    use crate::engine::Engine;
    use crate::resp::Reply;
    use bytes::Bytes;

    pub fn engine() -> Engine {
        Engine::new(Config { shards: 16, ..Config::default() })
    }

    pub fn argv(line: &str) -> Vec<Bytes> {
        line.split_whitespace().map(|p| Bytes::copy_from_slice(p.as_bytes())).collect()
    }

    pub async fn call(engine: &Engine, line: &str) -> Reply {
        super::run(engine, &argv(line)).await
    }

    pub fn bulk(s: &str) -> Reply {
        Reply::bulk(Bytes::copy_from_slice(s.as_bytes()))
    }

    pub fn bulks(items: &[&str]) -> Reply {
        Reply::array(items.iter().map(|s| bulk(s)).collect())
    }

    pub fn err_starts(reply: &Reply, prefix: &str) -> bool {
        matches!(reply, Reply::Error(e) if e.starts_with(prefix))
    }
}
