//! The keyspace: keys spread over independently locked shards.
//!
//! A command locks the shards of every key it touches, always in ascending shard
//! order, and works through a [`KeyspaceGuard`] until it is done. Two commands on
//! disjoint shards run in parallel; two commands that share a shard are totally
//! ordered by that shard's mutex. EXEC and scripts lock the union of their shards
//! up front the same way, so no other command's effects interleave with them.

pub mod entry;
pub mod reaper;

use crate::error::{ZedisError, ZedisResult};
use crate::glob::Pattern;
use crate::types::{Stored, Value};
use bytes::Bytes;
use entry::{Entry, Ttl, now_millis};
use rand::seq::{IteratorRandom, index};
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

pub const DEFAULT_SHARDS: usize = 64;

/// Keys carrying an expiry, addressable by position so a random sample costs
/// O(sample) whatever the number of keys.
#[derive(Debug, Default)]
pub(crate) struct VolatileSet {
    keys: Vec<Bytes>,
    positions: HashMap<Bytes, usize>,
}

impl VolatileSet {
    pub(crate) fn insert(&mut self, key: Bytes) {
        if self.positions.contains_key(&key) {
            return;
        }
        self.positions.insert(key.clone(), self.keys.len());
        self.keys.push(key);
    }

    /// Swap-remove: the last key takes the freed slot.
    pub(crate) fn remove(&mut self, key: &[u8]) {
        let Some(pos) = self.positions.remove(key) else {
            return;
        };
        self.keys.swap_remove(pos);
        if let Some(moved) = self.keys.get(pos) {
            self.positions.insert(moved.clone(), pos);
        }
    }

    pub(crate) fn contains(&self, key: &[u8]) -> bool {
        self.positions.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    fn clear(&mut self) {
        self.keys.clear();
        self.positions.clear();
    }

    /// Up to `n` distinct keys chosen at random.
    pub(crate) fn sample(&self, n: usize) -> Vec<Bytes> {
        let amount = n.min(self.keys.len());
        index::sample(&mut rand::thread_rng(), self.keys.len(), amount)
            .into_iter()
            .map(|i| self.keys[i].clone())
            .collect()
    }
}

/// One slice of the keyspace.
#[derive(Debug, Default)]
pub struct Shard {
    entries: HashMap<Bytes, Entry>,
    /// Keys in `entries` that carry an expiry; the reaper samples from here.
    volatile: VolatileSet,
}

impl Shard {
    fn insert(&mut self, key: Bytes, entry: Entry) {
        if entry.expires_at.is_some() {
            self.volatile.insert(key.clone());
        } else {
            self.volatile.remove(&key);
        }
        self.entries.insert(key, entry);
    }

    fn remove(&mut self, key: &[u8]) -> Option<Entry> {
        self.volatile.remove(key);
        self.entries.remove(key)
    }

    /// Drop `key` if it is logically expired. Returns true if it was.
    fn purge_if_expired(&mut self, key: &[u8], now: u64) -> bool {
        let expired = self.entries.get(key).is_some_and(|e| e.is_expired_at(now));
        if expired {
            self.remove(key);
        }
        expired
    }

    fn live_keys(&self, now: u64) -> impl Iterator<Item = &Bytes> {
        self.entries.iter().filter(move |(_, e)| !e.is_expired_at(now)).map(|(k, _)| k)
    }

    /// Test up to `sample` random volatile keys, removing the expired ones.
    /// Returns `(sampled, expired)`.
    pub(crate) fn expire_sample(&mut self, sample: usize, now: u64) -> (usize, usize) {
        let picked = self.volatile.sample(sample);
        let mut expired = 0;
        for key in &picked {
            if self.purge_if_expired(key, now) {
                expired += 1;
            }
        }
        (picked.len(), expired)
    }

    pub(crate) fn volatile_len(&self) -> usize {
        self.volatile.len()
    }
}

#[derive(Debug)]
pub struct Keyspace {
    shards: Vec<Mutex<Shard>>,
    expired_lazy: AtomicU64,
    expired_active: AtomicU64,
}

impl Keyspace {
    pub fn new(shards: usize) -> Self {
        Keyspace {
            shards: (0..shards.max(1)).map(|_| Mutex::new(Shard::default())).collect(),
            expired_lazy: AtomicU64::new(0),
            expired_active: AtomicU64::new(0),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_of(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Lock the given shards in ascending order. Duplicates are fine.
    pub async fn lock(&self, shards: impl IntoIterator<Item = usize>) -> KeyspaceGuard<'_> {
        let mut ids: Vec<usize> = shards.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        let mut held = Vec::with_capacity(ids.len());
        for id in ids {
            held.push((id, self.shards[id].lock().await));
        }
        KeyspaceGuard { keyspace: self, shards: held, now: now_millis(), written: Vec::new() }
    }

    pub async fn lock_keys<K: AsRef<[u8]>>(&self, keys: &[K]) -> KeyspaceGuard<'_> {
        self.lock(keys.iter().map(|k| self.shard_of(k.as_ref()))).await
    }

    pub async fn lock_all(&self) -> KeyspaceGuard<'_> {
        self.lock(0..self.shards.len()).await
    }

    pub(crate) async fn lock_shard(&self, id: usize) -> MutexGuard<'_, Shard> {
        self.shards[id].lock().await
    }

    pub(crate) fn record_active_expiry(&self, n: usize) {
        self.expired_active.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Keys removed because they expired, as `(lazily, by the reaper)`.
    pub fn expired_counts(&self) -> (u64, u64) {
        (
            self.expired_lazy.load(Ordering::Relaxed),
            self.expired_active.load(Ordering::Relaxed),
        )
    }

    pub async fn get(&self, key: &[u8]) -> Option<Value> {
        let mut db = self.lock_keys(&[key]).await;
        db.get(key).ok().flatten().cloned()
    }

    /// Run `mutation` against the value under `key`, creating it first if absent.
    /// The key is removed again if the mutation leaves it empty.
    pub async fn apply<T, R, F>(&self, key: &Bytes, mutation: F) -> ZedisResult<R>
    where
        T: Stored,
        F: FnOnce(&mut T) -> ZedisResult<R>,
    {
        let mut db = self.lock_keys(&[key]).await;
        let result = mutation(db.write::<T>(key)?);
        db.sweep_empty();
        result
    }

    pub async fn set(&self, key: Bytes, value: Value, ttl: Option<Duration>) {
        let mut db = self.lock_keys(&[&key]).await;
        let expires_at = ttl.map(|d| {
            u64::try_from(d.as_millis())
                .ok()
                .and_then(|ms| db.now().checked_add(ms))
                .unwrap_or(u64::MAX)
        });
        // The key was locked just above, so the lookup cannot miss.
        let _ = db.set(key, value, expires_at);
    }

    pub async fn delete(&self, key: &[u8]) -> bool {
        let mut db = self.lock_keys(&[key]).await;
        db.delete(key).unwrap_or(false)
    }

    pub async fn exists(&self, key: &[u8]) -> bool {
        let mut db = self.lock_keys(&[key]).await;
        db.exists(key).unwrap_or(false)
    }

    /// Remaining lifetime; `None` if the key is missing or has no expiry.
    pub async fn ttl(&self, key: &[u8]) -> Option<Duration> {
        let mut db = self.lock_keys(&[key]).await;
        match db.ttl(key) {
            Ok(Ttl::Expires(d)) => Some(d),
            _ => None,
        }
    }
}

/// Exclusive access to a set of shards, held for the span of one command, one
/// EXEC batch, or one script.
///
/// Time is sampled once when the guard is taken, so every expiry decision made
/// under one guard agrees. Touching a key whose shard is not held is an error.
pub struct KeyspaceGuard<'k> {
    keyspace: &'k Keyspace,
    shards: Vec<(usize, MutexGuard<'k, Shard>)>,
    now: u64,
    /// Keys handed out for writing since the last sweep.
    written: Vec<Bytes>,
}

impl<'k> KeyspaceGuard<'k> {
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn covers(&self, key: &[u8]) -> bool {
        let id = self.keyspace.shard_of(key);
        self.shards.binary_search_by_key(&id, |(i, _)| *i).is_ok()
    }

    fn holds_all(&self) -> bool {
        self.shards.len() == self.keyspace.shard_count()
    }

    fn shard(&mut self, key: &[u8]) -> ZedisResult<&mut Shard> {
        let id = self.keyspace.shard_of(key);
        match self.shards.binary_search_by_key(&id, |(i, _)| *i) {
            Ok(pos) => Ok(&mut *self.shards[pos].1),
            Err(_) => Err(ZedisError::generic("key is outside the locked keyspace")),
        }
    }

    /// The live entry under `key`, after lazy expiry.
    fn entry(&mut self, key: &[u8]) -> ZedisResult<Option<&mut Entry>> {
        let now = self.now;
        let keyspace: &Keyspace = self.keyspace;
        let shard = self.shard(key)?;
        if shard.purge_if_expired(key, now) {
            keyspace.expired_lazy.fetch_add(1, Ordering::Relaxed);
        }
        Ok(shard.entries.get_mut(key))
    }

    pub fn get(&mut self, key: &[u8]) -> ZedisResult<Option<&Value>> {
        Ok(self.entry(key)?.map(|e| &e.value))
    }

    /// Typed read. A key holding another kind is a WRONGTYPE error.
    pub fn read<T: Stored>(&mut self, key: &[u8]) -> ZedisResult<Option<&T>> {
        match self.get(key)? {
            None => Ok(None),
            Some(v) => T::from_value(v).map(Some).ok_or(ZedisError::WrongType),
        }
    }

    /// Typed write access to an existing key only.
    pub fn write_existing<T: Stored>(&mut self, key: &[u8]) -> ZedisResult<Option<&mut T>> {
        self.written.push(Bytes::copy_from_slice(key));
        match self.entry(key)? {
            None => Ok(None),
            Some(e) => T::from_value_mut(&mut e.value).map(Some).ok_or(ZedisError::WrongType),
        }
    }

    /// Typed write access, creating an empty value first if the key is absent.
    ///
    /// Handlers call this only once their arguments are validated; a value created
    /// here and left empty is removed by [`KeyspaceGuard::sweep_empty`].
    pub fn write<T: Stored>(&mut self, key: &Bytes) -> ZedisResult<&mut T> {
        self.written.push(key.clone());
        if self.entry(key)?.is_none() {
            self.shard(key)?.insert(key.clone(), Entry::new(T::create_empty().into_value()));
        }
        match self.entry(key)? {
            Some(e) => T::from_value_mut(&mut e.value).ok_or(ZedisError::WrongType),
            None => Err(ZedisError::NoSuchKey),
        }
    }

    /// Store `value`, replacing whatever was there (and its expiry).
    pub fn set(&mut self, key: Bytes, value: Value, expires_at: Option<u64>) -> ZedisResult<()> {
        self.shard(&key)?.insert(key, Entry::with_expiry(value, expires_at));
        Ok(())
    }

    /// Store `value`, keeping the current expiry of a live key.
    pub fn set_keep_ttl(&mut self, key: Bytes, value: Value) -> ZedisResult<()> {
        let expires_at = self.entry(&key)?.and_then(|e| e.expires_at);
        self.set(key, value, expires_at)
    }

    /// Remove and return a live key with its expiry.
    pub fn take(&mut self, key: &[u8]) -> ZedisResult<Option<Entry>> {
        if self.entry(key)?.is_none() {
            return Ok(None);
        }
        Ok(self.shard(key)?.remove(key))
    }

    pub fn delete(&mut self, key: &[u8]) -> ZedisResult<bool> {
        Ok(self.take(key)?.is_some())
    }

    pub fn exists(&mut self, key: &[u8]) -> ZedisResult<bool> {
        Ok(self.entry(key)?.is_some())
    }

    pub fn type_name(&mut self, key: &[u8]) -> ZedisResult<Option<&'static str>> {
        Ok(self.get(key)?.map(Value::type_name))
    }

    pub fn ttl(&mut self, key: &[u8]) -> ZedisResult<Ttl> {
        let now = self.now;
        Ok(self.entry(key)?.map_or(Ttl::Missing, |e| e.ttl_at(now)))
    }

    /// Give a live key an absolute expiry. A deadline already in the past
    /// deletes the key. Returns false if the key does not exist.
    pub fn expire_at(&mut self, key: &[u8], at_ms: u64) -> ZedisResult<bool> {
        if self.entry(key)?.is_none() {
            return Ok(false);
        }
        if at_ms <= self.now {
            self.shard(key)?.remove(key);
            return Ok(true);
        }
        let shard = self.shard(key)?;
        if let Some(e) = shard.entries.get_mut(key) {
            e.expires_at = Some(at_ms);
        }
        shard.volatile.insert(Bytes::copy_from_slice(key));
        Ok(true)
    }

    /// Drop the expiry of a live key. Returns true if there was one.
    pub fn persist(&mut self, key: &[u8]) -> ZedisResult<bool> {
        let had = match self.entry(key)? {
            Some(e) => e.expires_at.take().is_some(),
            None => false,
        };
        if had {
            self.shard(key)?.volatile.remove(key);
        }
        Ok(had)
    }

    /// Move `src` (value and expiry) to `dst`, overwriting it. False if `src` is missing.
    pub fn rename(&mut self, src: &[u8], dst: Bytes) -> ZedisResult<bool> {
        // Check both shards are held before moving anything.
        self.shard(&dst)?;
        match self.take(src)? {
            Some(entry) => {
                self.shard(&dst)?.insert(dst, entry);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn require_all(&self) -> ZedisResult<()> {
        if self.holds_all() {
            Ok(())
        } else {
            Err(ZedisError::generic("command needs the whole keyspace locked"))
        }
    }

    pub fn keys(&self, pattern: &Pattern) -> ZedisResult<Vec<Bytes>> {
        self.require_all()?;
        let now = self.now;
        Ok(self
            .shards
            .iter()
            .flat_map(|(_, s)| s.live_keys(now))
            .filter(|k| pattern.matches(k))
            .cloned()
            .collect())
    }

    pub fn random_key(&self) -> ZedisResult<Option<Bytes>> {
        self.require_all()?;
        let now = self.now;
        Ok(self
            .shards
            .iter()
            .flat_map(|(_, s)| s.live_keys(now))
            .choose(&mut rand::thread_rng())
            .cloned())
    }

    /// Number of live keys, plus how many of them carry an expiry.
    pub fn len(&self) -> ZedisResult<(usize, usize)> {
        self.require_all()?;
        let now = self.now;
        let mut keys = 0;
        let mut volatile = 0;
        for (_, s) in &self.shards {
            for e in s.entries.values().filter(|e| !e.is_expired_at(now)) {
                keys += 1;
                volatile += e.expires_at.is_some() as usize;
            }
        }
        Ok((keys, volatile))
    }

    pub fn flush(&mut self) -> ZedisResult<()> {
        self.require_all()?;
        for (_, s) in &mut self.shards {
            s.entries.clear();
            s.volatile.clear();
        }
        Ok(())
    }

    /// Remove containers that a command emptied (the last list element popped,
    /// the last hash field deleted, ...). Run after every command.
    pub fn sweep_empty(&mut self) {
        for key in std::mem::take(&mut self.written) {
            if let Ok(shard) = self.shard(&key) {
                if shard.entries.get(&key).is_some_and(|e| e.value.is_empty()) {
                    shard.remove(&key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ListValue, SetValue, StrValue};

    fn s(v: &str) -> Value {
        Value::Str(StrValue::new(v.as_bytes()))
    }

    fn key(k: &'static str) -> Bytes {
        Bytes::from_static(k.as_bytes())
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let ks = Keyspace::new(8);
        assert!(ks.get(b"missing").await.is_none());
        ks.set(key("k"), s("v"), None).await;
        assert!(ks.exists(b"k").await);
        assert!(ks.delete(b"k").await);
        assert!(!ks.delete(b"k").await);
        assert!(ks.get(b"k").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_key_is_never_returned() {
        let ks = Keyspace::new(4);
        ks.set(key("k"), s("v"), Some(Duration::from_millis(30))).await;
        assert!(ks.get(b"k").await.is_some());
        assert!(ks.ttl(b"k").await.is_some());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(ks.get(b"k").await.is_none());
        assert!(ks.ttl(b"k").await.is_none());
        assert_eq!(ks.expired_counts().0, 1);
    }

    #[tokio::test]
    async fn test_apply_creates_and_type_checks() {
        let ks = Keyspace::new(4);
        let n = ks
            .apply::<SetValue, _, _>(&key("s"), |set| {
                set.insert(key("a"));
                set.insert(key("a"));
                set.insert(key("b"));
                Ok(set.len())
            })
            .await
            .unwrap();
        assert_eq!(n, 2);
        let err = ks.apply::<ListValue, _, _>(&key("s"), |l| Ok(l.len())).await;
        assert!(matches!(err, Err(ZedisError::WrongType)));
    }

    #[tokio::test]
    async fn test_emptied_container_is_removed() {
        let ks = Keyspace::new(4);
        ks.apply::<ListValue, _, _>(&key("l"), |l| {
            l.push_back(key("x"));
            Ok(())
        })
        .await
        .unwrap();
        ks.apply::<ListValue, _, _>(&key("l"), |l| Ok(l.pop_front())).await.unwrap();
        assert!(!ks.exists(b"l").await);
        // A failed mutation does not leave an empty key behind either.
        let _ = ks
            .apply::<ListValue, (), _>(&key("m"), |_| Err(ZedisError::Syntax))
            .await;
        assert!(!ks.exists(b"m").await);
    }

    #[tokio::test]
    async fn test_guard_rejects_unlocked_keys() {
        let ks = Keyspace::new(64);
        let mut db = ks.lock_keys(&[b"a"]).await;
        let other = (0..1000)
            .map(|i| format!("k{i}"))
            .find(|k| ks.shard_of(k.as_bytes()) != ks.shard_of(b"a"))
            .unwrap();
        assert!(db.covers(b"a"));
        assert!(db.get(other.as_bytes()).is_err());
        assert!(db.keys(&Pattern::new(b"*")).is_err());
    }

    #[tokio::test]
    async fn test_expire_persist_rename() {
        let ks = Keyspace::new(4);
        let mut db = ks.lock_all().await;
        db.set(key("a"), s("1"), None).unwrap();
        let later = db.now() + 10_000;
        assert!(db.expire_at(b"a", later).unwrap());
        assert!(matches!(db.ttl(b"a").unwrap(), Ttl::Expires(_)));
        assert!(db.rename(b"a", key("b")).unwrap());
        assert!(!db.exists(b"a").unwrap());
        assert!(matches!(db.ttl(b"b").unwrap(), Ttl::Expires(_)));
        assert!(db.persist(b"b").unwrap());
        assert!(!db.persist(b"b").unwrap());
        assert_eq!(db.ttl(b"b").unwrap(), Ttl::Persistent);
        let past = db.now() - 1;
        assert!(db.expire_at(b"b", past).unwrap());
        assert!(!db.exists(b"b").unwrap());
        assert!(!db.rename(b"nope", key("c")).unwrap());
    }

    #[tokio::test]
    async fn test_keys_len_flush() {
        let ks = Keyspace::new(8);
        for k in ["user:1", "user:2", "order:1"] {
            ks.set(Bytes::from(k), s("x"), None).await;
        }
        let mut db = ks.lock_all().await;
        let mut users = db.keys(&Pattern::new(b"user:*")).unwrap();
        users.sort();
        assert_eq!(users, [key("user:1"), key("user:2")]);
        assert_eq!(db.len().unwrap(), (3, 0));
        assert!(db.random_key().unwrap().is_some());
        db.flush().unwrap();
        assert_eq!(db.len().unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn test_disjoint_shards_lock_concurrently() {
        let ks = std::sync::Arc::new(Keyspace::new(64));
        let a = ks.shard_of(b"a");
        let b = (0..64).find(|i| *i != a).unwrap();
        let _held = ks.lock([a]).await;
        let other = tokio::time::timeout(Duration::from_millis(100), ks.lock([b])).await;
        assert!(other.is_ok());
        let same = tokio::time::timeout(Duration::from_millis(50), ks.lock([a])).await;
        assert!(same.is_err());
    }

    #[test]
    fn test_volatile_set_swap_remove_keeps_positions() {
        let mut set = VolatileSet::default();
        for k in ["a", "b", "c", "d"] {
            set.insert(key(k));
        }
        set.insert(key("a"));
        assert_eq!(set.len(), 4);
        set.remove(b"a");
        set.remove(b"a");
        assert_eq!(set.len(), 3);
        assert!(!set.contains(b"a"));
        set.remove(b"d");
        set.remove(b"b");
        assert_eq!(set.sample(10), [key("c")]);
        set.clear();
        assert!(set.sample(5).is_empty());
    }

    #[test]
    fn test_volatile_sample_cost_is_independent_of_size() {
        let mut set = VolatileSet::default();
        for i in 0..200_000 {
            set.insert(Bytes::from(format!("k{i}")));
        }
        let started = std::time::Instant::now();
        for _ in 0..2_000 {
            let picked = set.sample(20);
            assert_eq!(picked.len(), 20);
            assert!(picked.iter().all(|k| set.contains(k)));
        }
        // Walking 200k keys per sample would take tens of seconds here.
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_huge_ttl_saturates_instead_of_overflowing() {
        let ks = Keyspace::new(4);
        ks.set(key("k"), s("v"), Some(Duration::from_secs(u64::MAX))).await;
        assert!(ks.get(b"k").await.is_some());
        let mut db = ks.lock_keys(&[b"k"]).await;
        assert!(matches!(db.ttl(b"k").unwrap(), Ttl::Expires(_)));
    }
}
