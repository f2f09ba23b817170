//! # Zedis
//!
//! A Redis-compatible in-memory engine. Zedis speaks RESP2 and keeps a sharded
//! keyspace of typed values (strings, lists, hashes, sets, sorted sets, streams,
//! probabilistic sketches, JSON documents, vectors, time series and graphs) with
//! lazy and active expiry, MULTI/EXEC transactions, pub/sub and Lua scripting.

pub mod command;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod glob;
pub mod pubsub;
pub mod resp;
pub mod scripting;
pub mod server;
pub mod store;
pub mod types;
