//! The command table: name, arity, flags and key positions for every command.
//!
//! Arity follows the Redis convention: it counts the command name, a positive
//! value is exact and a negative one is a minimum. Key positions are indexes into
//! the full argument vector; a negative `last_key` counts from the end.

use super::{
    Handler, bitmap, geo, graph, hash, hyperloglog, json, key, list, probabilistic, pubsub,
    scripting, server_cmd, set, sorted_set, stream, string, timeseries, vector,
};
use crate::resp::Reply;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy)]
pub enum CommandKind {
    /// Runs against the keyspace through a [`Handler`].
    Data(Handler),
    /// Changes connection state (MULTI, SUBSCRIBE, ...); handled by the session.
    Session,
}

/// Which shards a command must hold while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    /// The shards of the keys at `first_key..=last_key`.
    Keys,
    /// Every shard: keyspace-wide commands and scripts.
    All,
}

#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    pub arity: i64,
    pub flags: &'static [&'static str],
    pub first_key: i64,
    pub last_key: i64,
    pub step: i64,
    pub scope: LockScope,
    pub kind: CommandKind,
}

impl CommandSpec {
    pub fn accepts(&self, argc: usize) -> bool {
        let argc = argc as i64;
        if self.arity >= 0 { argc == self.arity } else { argc >= -self.arity }
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(&flag)
    }

    /// The key arguments of `argv` (which includes the command name).
    pub fn keys<'a>(&self, argv: &'a [Bytes]) -> Vec<&'a Bytes> {
        if self.first_key <= 0 || self.step <= 0 {
            return Vec::new();
        }
        let last = if self.last_key < 0 { argv.len() as i64 + self.last_key } else { self.last_key };
        (self.first_key..=last)
            .step_by(self.step as usize)
            .filter_map(|i| argv.get(i as usize))
            .collect()
    }

    /// One COMMAND INFO entry.
    pub fn info_reply(&self) -> Reply {
        Reply::array(vec![
            Reply::bulk(self.name.to_ascii_lowercase()),
            Reply::integer(self.arity),
            Reply::array(self.flags.iter().map(|f| Reply::status(*f)).collect()),
            Reply::integer(self.first_key),
            Reply::integer(self.last_key),
            Reply::integer(self.step),
        ])
    }
}

const fn data(
    name: &'static str,
    arity: i64,
    flags: &'static [&'static str],
    (first_key, last_key, step): (i64, i64, i64),
    handler: Handler,
) -> CommandSpec {
    CommandSpec {
        name,
        arity,
        flags,
        first_key,
        last_key,
        step,
        scope: LockScope::Keys,
        kind: CommandKind::Data(handler),
    }
}

const fn all_shards(name: &'static str, arity: i64, flags: &'static [&'static str], handler: Handler) -> CommandSpec {
    CommandSpec {
        name,
        arity,
        flags,
        first_key: 0,
        last_key: 0,
        step: 0,
        scope: LockScope::All,
        kind: CommandKind::Data(handler),
    }
}

const fn session(name: &'static str, arity: i64, flags: &'static [&'static str]) -> CommandSpec {
    CommandSpec {
        name,
        arity,
        flags,
        first_key: 0,
        last_key: 0,
        step: 0,
        scope: LockScope::Keys,
        kind: CommandKind::Session,
    }
}

const NONE: (i64, i64, i64) = (0, 0, 0);
const ONE: (i64, i64, i64) = (1, 1, 1);
const ALL: (i64, i64, i64) = (1, -1, 1);

const R: &[&str] = &["readonly"];
const RF: &[&str] = &["readonly", "fast"];
const W: &[&str] = &["write", "denyoom"];
const WF: &[&str] = &["write", "denyoom", "fast"];
const WD: &[&str] = &["write"];
const FAST: &[&str] = &["fast"];
const ADMIN: &[&str] = &["admin", "noscript"];
const PUBSUB: &[&str] = &["pubsub", "noscript"];
const TX: &[&str] = &["noscript", "fast"];

pub static COMMANDS: &[CommandSpec] = &[
    // Connection and server
    data("PING", -1, FAST, NONE, server_cmd::cmd_ping),
    data("ECHO", 2, FAST, NONE, server_cmd::cmd_echo),
    session("QUIT", -1, TX),
    session("CLIENT", -2, ADMIN),
    data("TIME", 1, FAST, NONE, server_cmd::cmd_time),
    data("COMMAND", -1, &["loading", "stale"], NONE, server_cmd::cmd_command),
    data("CONFIG", -2, ADMIN, NONE, server_cmd::cmd_config),
    all_shards("DBSIZE", 1, RF, server_cmd::cmd_dbsize),
    all_shards("FLUSHDB", -1, WD, server_cmd::cmd_flush),
    all_shards("FLUSHALL", -1, WD, server_cmd::cmd_flush),
    all_shards("INFO", -1, &["loading", "stale"], server_cmd::cmd_info),
    // Keys
    data("DEL", -2, WD, ALL, key::cmd_del),
    data("UNLINK", -2, WF, ALL, key::cmd_del),
    data("EXISTS", -2, RF, ALL, key::cmd_exists),
    data("TYPE", 2, RF, ONE, key::cmd_type),
    data("TTL", 2, RF, ONE, key::cmd_ttl),
    data("PTTL", 2, RF, ONE, key::cmd_pttl),
    data("EXPIRETIME", 2, RF, ONE, key::cmd_expiretime),
    data("PEXPIRETIME", 2, RF, ONE, key::cmd_pexpiretime),
    data("EXPIRE", -3, WF, ONE, key::cmd_expire),
    data("PEXPIRE", -3, WF, ONE, key::cmd_pexpire),
    data("EXPIREAT", -3, WF, ONE, key::cmd_expireat),
    data("PEXPIREAT", -3, WF, ONE, key::cmd_pexpireat),
    data("PERSIST", 2, WF, ONE, key::cmd_persist),
    data("RENAME", 3, WD, (1, 2, 1), key::cmd_rename),
    data("RENAMENX", 3, WF, (1, 2, 1), key::cmd_renamenx),
    all_shards("KEYS", 2, R, key::cmd_keys),
    all_shards("RANDOMKEY", 1, R, key::cmd_randomkey),
    // Strings
    data("GET", 2, RF, ONE, string::cmd_get),
    data("SET", -3, W, ONE, string::cmd_set),
    data("SETNX", 3, WF, ONE, string::cmd_setnx),
    data("SETEX", 4, W, ONE, string::cmd_setex),
    data("PSETEX", 4, W, ONE, string::cmd_psetex),
    data("GETSET", 3, WF, ONE, string::cmd_getset),
    data("GETDEL", 2, WF, ONE, string::cmd_getdel),
    data("MGET", -2, RF, ALL, string::cmd_mget),
    data("MSET", -3, W, (1, -1, 2), string::cmd_mset),
    data("MSETNX", -3, W, (1, -1, 2), string::cmd_msetnx),
    data("INCR", 2, WF, ONE, string::cmd_incr),
    data("DECR", 2, WF, ONE, string::cmd_decr),
    data("INCRBY", 3, WF, ONE, string::cmd_incrby),
    data("DECRBY", 3, WF, ONE, string::cmd_decrby),
    data("INCRBYFLOAT", 3, WF, ONE, string::cmd_incrbyfloat),
    data("APPEND", 3, WF, ONE, string::cmd_append),
    data("STRLEN", 2, RF, ONE, string::cmd_strlen),
    data("GETRANGE", 4, R, ONE, string::cmd_getrange),
    data("SETRANGE", 4, W, ONE, string::cmd_setrange),
    // Bitmaps
    data("SETBIT", 4, W, ONE, bitmap::cmd_setbit),
    data("GETBIT", 3, RF, ONE, bitmap::cmd_getbit),
    data("BITCOUNT", -2, R, ONE, bitmap::cmd_bitcount),
    data("BITPOS", -3, R, ONE, bitmap::cmd_bitpos),
    data("BITOP", -4, W, (2, -1, 1), bitmap::cmd_bitop),
    data("BITFIELD", -2, W, ONE, bitmap::cmd_bitfield),
    // Lists
    data("LPUSH", -3, WF, ONE, list::cmd_lpush),
    data("RPUSH", -3, WF, ONE, list::cmd_rpush),
    data("LPUSHX", -3, WF, ONE, list::cmd_lpushx),
    data("RPUSHX", -3, WF, ONE, list::cmd_rpushx),
    data("LPOP", -2, WF, ONE, list::cmd_lpop),
    data("RPOP", -2, WF, ONE, list::cmd_rpop),
    data("LLEN", 2, RF, ONE, list::cmd_llen),
    data("LRANGE", 4, R, ONE, list::cmd_lrange),
    data("LINDEX", 3, R, ONE, list::cmd_lindex),
    data("LSET", 4, W, ONE, list::cmd_lset),
    data("LREM", 4, WD, ONE, list::cmd_lrem),
    data("LTRIM", 4, WD, ONE, list::cmd_ltrim),
    // Hashes
    data("HSET", -4, WF, ONE, hash::cmd_hset),
    data("HMSET", -4, WF, ONE, hash::cmd_hmset),
    data("HSETNX", 4, WF, ONE, hash::cmd_hsetnx),
    data("HGET", 3, RF, ONE, hash::cmd_hget),
    data("HMGET", -3, RF, ONE, hash::cmd_hmget),
    data("HDEL", -3, WF, ONE, hash::cmd_hdel),
    data("HEXISTS", 3, RF, ONE, hash::cmd_hexists),
    data("HLEN", 2, RF, ONE, hash::cmd_hlen),
    data("HSTRLEN", 3, RF, ONE, hash::cmd_hstrlen),
    data("HKEYS", 2, R, ONE, hash::cmd_hkeys),
    data("HVALS", 2, R, ONE, hash::cmd_hvals),
    data("HGETALL", 2, R, ONE, hash::cmd_hgetall),
    data("HINCRBY", 4, WF, ONE, hash::cmd_hincrby),
    data("HINCRBYFLOAT", 4, WF, ONE, hash::cmd_hincrbyfloat),
    // Sets
    data("SADD", -3, WF, ONE, set::cmd_sadd),
    data("SREM", -3, WF, ONE, set::cmd_srem),
    data("SMEMBERS", 2, R, ONE, set::cmd_smembers),
    data("SISMEMBER", 3, RF, ONE, set::cmd_sismember),
    data("SCARD", 2, RF, ONE, set::cmd_scard),
    data("SPOP", -2, WF, ONE, set::cmd_spop),
    data("SINTER", -2, R, ALL, set::cmd_sinter),
    data("SUNION", -2, R, ALL, set::cmd_sunion),
    data("SDIFF", -2, R, ALL, set::cmd_sdiff),
    data("SINTERSTORE", -3, W, ALL, set::cmd_sinterstore),
    data("SUNIONSTORE", -3, W, ALL, set::cmd_sunionstore),
    data("SDIFFSTORE", -3, W, ALL, set::cmd_sdiffstore),
    // Sorted sets
    data("ZADD", -4, WF, ONE, sorted_set::cmd_zadd),
    data("ZREM", -3, WF, ONE, sorted_set::cmd_zrem),
    data("ZSCORE", 3, RF, ONE, sorted_set::cmd_zscore),
    data("ZINCRBY", 4, WF, ONE, sorted_set::cmd_zincrby),
    data("ZCARD", 2, RF, ONE, sorted_set::cmd_zcard),
    data("ZRANK", 3, RF, ONE, sorted_set::cmd_zrank),
    data("ZREVRANK", 3, RF, ONE, sorted_set::cmd_zrevrank),
    data("ZRANGE", -4, R, ONE, sorted_set::cmd_zrange),
    data("ZREVRANGE", -4, R, ONE, sorted_set::cmd_zrevrange),
    data("ZRANGEBYSCORE", -4, R, ONE, sorted_set::cmd_zrangebyscore),
    data("ZREVRANGEBYSCORE", -4, R, ONE, sorted_set::cmd_zrevrangebyscore),
    data("ZCOUNT", 4, RF, ONE, sorted_set::cmd_zcount),
    // HyperLogLog
    data("PFADD", -2, WF, ONE, hyperloglog::cmd_pfadd),
    data("PFCOUNT", -2, R, ALL, hyperloglog::cmd_pfcount),
    data("PFMERGE", -2, W, ALL, hyperloglog::cmd_pfmerge),
    // Geo
    data("GEOADD", -5, W, ONE, geo::cmd_geoadd),
    data("GEOPOS", -2, R, ONE, geo::cmd_geopos),
    data("GEODIST", -4, R, ONE, geo::cmd_geodist),
    data("GEOHASH", -2, R, ONE, geo::cmd_geohash),
    data("GEOSEARCH", -7, R, ONE, geo::cmd_geosearch),
    // Streams
    data("XADD", -5, WF, ONE, stream::cmd_xadd),
    data("XLEN", 2, RF, ONE, stream::cmd_xlen),
    data("XRANGE", -4, R, ONE, stream::cmd_xrange),
    data("XREVRANGE", -4, R, ONE, stream::cmd_xrevrange),
    data("XDEL", -3, WF, ONE, stream::cmd_xdel),
    data("XTRIM", -4, WD, ONE, stream::cmd_xtrim),
    // Probabilistic structures
    data("BF.RESERVE", -4, W, ONE, probabilistic::cmd_bf_reserve),
    data("BF.ADD", 3, W, ONE, probabilistic::cmd_bf_add),
    data("BF.MADD", -3, W, ONE, probabilistic::cmd_bf_madd),
    data("BF.EXISTS", 3, R, ONE, probabilistic::cmd_bf_exists),
    data("BF.MEXISTS", -3, R, ONE, probabilistic::cmd_bf_mexists),
    data("BF.INFO", 2, R, ONE, probabilistic::cmd_bf_info),
    data("CF.RESERVE", -3, W, ONE, probabilistic::cmd_cf_reserve),
    data("CF.ADD", 3, W, ONE, probabilistic::cmd_cf_add),
    data("CF.EXISTS", 3, R, ONE, probabilistic::cmd_cf_exists),
    data("CF.DEL", 3, WD, ONE, probabilistic::cmd_cf_del),
    data("CF.INFO", 2, R, ONE, probabilistic::cmd_cf_info),
    data("CMS.INITBYDIM", 4, W, ONE, probabilistic::cmd_cms_initbydim),
    data("CMS.INCRBY", -4, W, ONE, probabilistic::cmd_cms_incrby),
    data("CMS.QUERY", -3, R, ONE, probabilistic::cmd_cms_query),
    data("CMS.INFO", 2, R, ONE, probabilistic::cmd_cms_info),
    data("TOPK.RESERVE", -3, W, ONE, probabilistic::cmd_topk_reserve),
    data("TOPK.ADD", -3, W, ONE, probabilistic::cmd_topk_add),
    data("TOPK.QUERY", -3, R, ONE, probabilistic::cmd_topk_query),
    data("TOPK.LIST", -2, R, ONE, probabilistic::cmd_topk_list),
    data("TOPK.INFO", 2, R, ONE, probabilistic::cmd_topk_info),
    data("TDIGEST.CREATE", -2, W, ONE, probabilistic::cmd_tdigest_create),
    data("TDIGEST.ADD", -3, W, ONE, probabilistic::cmd_tdigest_add),
    data("TDIGEST.QUANTILE", -3, R, ONE, probabilistic::cmd_tdigest_quantile),
    data("TDIGEST.MIN", 2, R, ONE, probabilistic::cmd_tdigest_min),
    data("TDIGEST.MAX", 2, R, ONE, probabilistic::cmd_tdigest_max),
    data("TDIGEST.INFO", 2, R, ONE, probabilistic::cmd_tdigest_info),
    // JSON documents
    data("JSON.SET", -3, W, ONE, json::cmd_json_set),
    data("JSON.GET", -2, R, ONE, json::cmd_json_get),
    data("JSON.DEL", -2, WD, ONE, json::cmd_json_del),
    data("JSON.TYPE", -2, R, ONE, json::cmd_json_type),
    // Vector sets
    data("VADD", -4, W, ONE, vector::cmd_vadd),
    data("VSEARCH", -4, R, ONE, vector::cmd_vsearch),
    data("VREM", 3, WD, ONE, vector::cmd_vrem),
    data("VCARD", 2, RF, ONE, vector::cmd_vcard),
    data("VDIM", 2, RF, ONE, vector::cmd_vdim),
    // Time series
    data("TS.ADD", 4, W, ONE, timeseries::cmd_ts_add),
    data("TS.GET", 2, R, ONE, timeseries::cmd_ts_get),
    data("TS.RANGE", -4, R, ONE, timeseries::cmd_ts_range),
    data("TS.INFO", 2, R, ONE, timeseries::cmd_ts_info),
    // Graphs
    data("GRAPH.ADD", 4, W, ONE, graph::cmd_graph_add),
    data("GRAPH.DEL", 4, WD, ONE, graph::cmd_graph_del),
    data("GRAPH.NEIGHBORS", 3, R, ONE, graph::cmd_graph_neighbors),
    data("GRAPH.BFS", 4, R, ONE, graph::cmd_graph_bfs),
    // Transactions
    session("MULTI", 1, TX),
    session("EXEC", 1, &["noscript", "loading", "stale"]),
    session("DISCARD", 1, TX),
    // Pub/sub
    session("SUBSCRIBE", -2, PUBSUB),
    session("UNSUBSCRIBE", -1, PUBSUB),
    session("PSUBSCRIBE", -2, PUBSUB),
    session("PUNSUBSCRIBE", -1, PUBSUB),
    data("PUBLISH", 3, &["pubsub", "fast"], NONE, pubsub::cmd_publish),
    data("PUBSUB", -2, &["pubsub"], NONE, pubsub::cmd_pubsub),
    // Scripting
    all_shards("EVAL", -3, &["noscript"], scripting::cmd_eval),
    all_shards("EVALSHA", -3, &["noscript"], scripting::cmd_evalsha),
    data("SCRIPT", -2, &["noscript"], NONE, scripting::cmd_script),
];

static INDEX: LazyLock<HashMap<&'static str, &'static CommandSpec>> =
    LazyLock::new(|| COMMANDS.iter().map(|c| (c.name, c)).collect());

/// Case-insensitive lookup.
pub fn lookup(name: &[u8]) -> Option<&'static CommandSpec> {
    let upper = std::str::from_utf8(name).ok()?.to_ascii_uppercase();
    INDEX.get(upper.as_str()).copied()
}
