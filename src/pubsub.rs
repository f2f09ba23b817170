//! Channel and pattern subscriptions with at-most-once fan-out.
//!
//! There is no backlog: a message goes to whoever is subscribed at the moment of
//! PUBLISH and is gone afterwards. Each subscriber owns a bounded queue; when it is
//! full the message is dropped for that subscriber rather than stalling the
//! publisher.

use crate::glob::glob_match;
use crate::resp::Reply;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

pub type ClientId = u64;
pub type MessageSender = mpsc::Sender<Reply>;
pub type MessageReceiver = mpsc::Receiver<Reply>;

#[derive(Debug, Default)]
struct Registry {
    channels: HashMap<Bytes, HashSet<ClientId>>,
    patterns: HashMap<Bytes, HashSet<ClientId>>,
    senders: HashMap<ClientId, MessageSender>,
    client_channels: HashMap<ClientId, HashSet<Bytes>>,
    client_patterns: HashMap<ClientId, HashSet<Bytes>>,
}

impl Registry {
    fn count(&self, client: ClientId) -> usize {
        self.client_channels.get(&client).map_or(0, HashSet::len)
            + self.client_patterns.get(&client).map_or(0, HashSet::len)
    }

    fn forget_if_idle(&mut self, client: ClientId) {
        if self.count(client) == 0 {
            self.senders.remove(&client);
            self.client_channels.remove(&client);
            self.client_patterns.remove(&client);
        }
    }
}

/// Removes `client` from `name`'s subscriber set, dropping the set once empty.
fn detach(index: &mut HashMap<Bytes, HashSet<ClientId>>, name: &[u8], client: ClientId) {
    if let Some(subs) = index.get_mut(name) {
        subs.remove(&client);
        if subs.is_empty() {
            index.remove(name);
        }
    }
}

#[derive(Debug, Default)]
pub struct Broker {
    inner: RwLock<Registry>,
}

/// Whether a subscription names an exact channel or a glob pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Channel,
    Pattern,
}

impl Broker {
    pub fn new() -> Self {
        Broker::default()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Registry> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Registry> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a subscription. Returns the client's total subscription count.
    pub fn subscribe(&self, client: ClientId, kind: Kind, name: Bytes, sender: &MessageSender) -> usize {
        let mut reg = self.write();
        let reg = &mut *reg;
        reg.senders.entry(client).or_insert_with(|| sender.clone());
        let (index, mine) = match kind {
            Kind::Channel => (&mut reg.channels, &mut reg.client_channels),
            Kind::Pattern => (&mut reg.patterns, &mut reg.client_patterns),
        };
        index.entry(name.clone()).or_default().insert(client);
        mine.entry(client).or_default().insert(name);
        reg.count(client)
    }

    /// Drop a subscription; unknown names are a no-op. Returns the remaining count.
    pub fn unsubscribe(&self, client: ClientId, kind: Kind, name: &[u8]) -> usize {
        let mut reg = self.write();
        let reg = &mut *reg;
        let (index, mine) = match kind {
            Kind::Channel => (&mut reg.channels, &mut reg.client_channels),
            Kind::Pattern => (&mut reg.patterns, &mut reg.client_patterns),
        };
        detach(index, name, client);
        if let Some(set) = mine.get_mut(&client) {
            set.remove(name);
        }
        let left = reg.count(client);
        reg.forget_if_idle(client);
        left
    }

    /// The client's current subscriptions of one kind, sorted.
    pub fn subscriptions(&self, client: ClientId, kind: Kind) -> Vec<Bytes> {
        let reg = self.read();
        let mine = match kind {
            Kind::Channel => &reg.client_channels,
            Kind::Pattern => &reg.client_patterns,
        };
        let mut names: Vec<Bytes> = mine.get(&client).into_iter().flatten().cloned().collect();
        names.sort();
        names
    }

    /// Connection teardown. Safe to call any number of times.
    pub fn unsubscribe_all(&self, client: ClientId) {
        let mut reg = self.write();
        let reg = &mut *reg;
        for ch in reg.client_channels.remove(&client).into_iter().flatten() {
            detach(&mut reg.channels, &ch, client);
        }
        for pat in reg.client_patterns.remove(&client).into_iter().flatten() {
            detach(&mut reg.patterns, &pat, client);
        }
        reg.senders.remove(&client);
    }

    /// Deliver to every current subscriber. Returns how many queues accepted it.
    pub fn publish(&self, channel: &Bytes, message: &Bytes) -> usize {
        let reg = self.read();
        let mut delivered = 0;
        let mut offer = |client: &ClientId, msg: Reply| {
            let Some(tx) = reg.senders.get(client) else {
                return;
            };
            match tx.try_send(msg) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(client, reason = %e, "dropping pub/sub message"),
            }
        };
        for client in reg.channels.get(channel).into_iter().flatten() {
            offer(
                client,
                Reply::array(vec![
                    Reply::bulk("message"),
                    Reply::bulk(channel.clone()),
                    Reply::bulk(message.clone()),
                ]),
            );
        }
        for (pattern, clients) in &reg.patterns {
            if !glob_match(pattern, channel) {
                continue;
            }
            for client in clients {
                offer(
                    client,
                    Reply::array(vec![
                        Reply::bulk("pmessage"),
                        Reply::bulk(pattern.clone()),
                        Reply::bulk(channel.clone()),
                        Reply::bulk(message.clone()),
                    ]),
                );
            }
        }
        delivered
    }

    /// PUBSUB CHANNELS [pattern]: channels with at least one subscriber.
    pub fn channels(&self, pattern: Option<&[u8]>) -> Vec<Bytes> {
        let reg = self.read();
        let mut out: Vec<Bytes> = reg
            .channels
            .keys()
            .filter(|ch| pattern.is_none_or(|p| glob_match(p, ch)))
            .cloned()
            .collect();
        out.sort();
        out
    }

    pub fn numsub(&self, channel: &[u8]) -> usize {
        self.read().channels.get(channel).map_or(0, HashSet::len)
    }

    pub fn numpat(&self) -> usize {
        self.read().patterns.len()
    }

    /// Channels plus patterns the client is subscribed to.
    pub fn subscription_count(&self, client: ClientId) -> usize {
        self.read().count(client)
    }

    /// Clients holding at least one subscription.
    pub fn subscribers(&self) -> usize {
        self.read().senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_delivers_nothing() {
        let broker = Broker::new();
        assert_eq!(broker.publish(&b("news"), &b("early")), 0);
        let (tx, mut rx) = mpsc::channel(8);
        broker.subscribe(1, Kind::Channel, b("news"), &tx);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_channel_and_pattern_delivery() {
        let broker = Broker::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        assert_eq!(broker.subscribe(1, Kind::Channel, b("news.tech"), &tx1), 1);
        assert_eq!(broker.subscribe(2, Kind::Pattern, b("news.*"), &tx2), 1);
        assert_eq!(broker.publish(&b("news.tech"), &b("hi")), 2);
        assert_eq!(
            rx1.recv().await.unwrap(),
            Reply::array(vec![Reply::bulk("message"), Reply::bulk("news.tech"), Reply::bulk("hi")])
        );
        let pm = rx2.recv().await.unwrap();
        assert_eq!(pm.into_command().unwrap()[0], b("pmessage"));
        assert_eq!(broker.publish(&b("sports"), &b("x")), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let broker = Broker::new();
        let (tx, mut rx) = mpsc::channel(1);
        broker.subscribe(1, Kind::Channel, b("c"), &tx);
        assert_eq!(broker.publish(&b("c"), &b("1")), 1);
        assert_eq!(broker.publish(&b("c"), &b("2")), 0);
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_teardown_is_idempotent_and_frees_channels() {
        let broker = Broker::new();
        let (tx, _rx) = mpsc::channel(8);
        broker.subscribe(7, Kind::Channel, b("a"), &tx);
        broker.subscribe(7, Kind::Channel, b("b"), &tx);
        broker.subscribe(7, Kind::Pattern, b("p*"), &tx);
        assert_eq!(broker.subscribers(), 1);
        assert_eq!(broker.unsubscribe(7, Kind::Channel, b"a"), 2);
        assert_eq!(broker.unsubscribe(7, Kind::Channel, b"a"), 2);
        assert_eq!(broker.channels(None), [b("b")]);
        broker.unsubscribe_all(7);
        broker.unsubscribe_all(7);
        assert!(broker.channels(None).is_empty());
        assert_eq!(broker.numpat(), 0);
        assert_eq!(broker.subscribers(), 0);
        assert!(broker.subscriptions(7, Kind::Channel).is_empty());
    }
}
