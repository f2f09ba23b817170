//! Everything a connection shares with every other connection.

use crate::command;
use crate::config::{Config, SharedConfig};
use crate::pubsub::{Broker, ClientId};
use crate::resp::Reply;
use crate::scripting::ScriptCache;
use crate::store::Keyspace;
use crate::store::reaper::Reaper;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

#[derive(Debug)]
pub struct Engine {
    pub keyspace: Arc<Keyspace>,
    pub broker: Broker,
    pub scripts: ScriptCache,
    pub config: SharedConfig,
    pub started: Instant,
    next_client: AtomicU64,
    connected: AtomicU64,
    commands_processed: AtomicU64,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Engine {
            keyspace: Arc::new(Keyspace::new(config.shards)),
            broker: Broker::new(),
            scripts: ScriptCache::new(),
            config: Arc::new(RwLock::new(config)),
            started: Instant::now(),
            next_client: AtomicU64::new(1),
            connected: AtomicU64::new(0),
            commands_processed: AtomicU64::new(0),
        }
    }

    /// Start the background expiration task for this keyspace.
    pub fn start_reaper(&self) -> Reaper {
        Reaper::start(self.keyspace.clone(), self.config.clone())
    }

    pub fn next_client_id(&self) -> ClientId {
        self.next_client.fetch_add(1, Ordering::Relaxed)
    }

    /// Ids handed out so far.
    pub fn connections_received(&self) -> u64 {
        self.next_client.load(Ordering::Relaxed) - 1
    }

    pub(crate) fn client_connected(&self) {
        self.connected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn client_disconnected(&self) {
        self.connected.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connected_clients(&self) -> u64 {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> std::sync::RwLockReadGuard<'_, Config> {
        self.config.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config_mut(&self) -> std::sync::RwLockWriteGuard<'_, Config> {
        self.config.write().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn count_command(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn commands_processed(&self) -> u64 {
        self.commands_processed.load(Ordering::Relaxed)
    }

    /// Run one standalone data command, e.g. `engine.execute(&["SET", "k", "v"])`.
    pub async fn execute<S: AsRef<[u8]>>(&self, argv: &[S]) -> Reply {
        let argv: Vec<Bytes> = argv.iter().map(|a| Bytes::copy_from_slice(a.as_ref())).collect();
        self.count_command();
        command::run(self, &argv).await
    }
}
