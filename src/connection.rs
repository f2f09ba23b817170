//! Per-connection session: transaction state, subscribe mode and the routing of
//! session commands. Everything else goes straight to the executor.

use crate::command::transaction::{self, Transaction};
use crate::command::{self, keyword, pubsub};
use crate::engine::Engine;
use crate::error::ZedisError;
use crate::pubsub::{ClientId, Kind, MessageReceiver, MessageSender};
use crate::resp::Reply;
use bytes::Bytes;
use tokio::sync::mpsc;

#[derive(Debug)]
pub struct ClientState {
    pub id: ClientId,
    pub tx: Transaction,
    pub should_close: bool,
    pub name: Option<Bytes>,
    sender: MessageSender,
}

impl ClientState {
    /// A new session plus the receiving end of its pub/sub queue.
    pub fn new(engine: &Engine) -> (Self, MessageReceiver) {
        let capacity = engine.config().pubsub_buffer.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let client = ClientState {
            id: engine.next_client_id(),
            tx: Transaction::default(),
            should_close: false,
            name: None,
            sender,
        };
        (client, receiver)
    }

    pub fn in_subscribe_mode(&self, engine: &Engine) -> bool {
        engine.broker.subscription_count(self.id) > 0
    }
}

const SUBSCRIBE_MODE_ALLOWED: &[&str] = &["SUBSCRIBE", "UNSUBSCRIBE", "PSUBSCRIBE", "PUNSUBSCRIBE", "PING", "QUIT"];

/// Handle one request. Most commands produce a single reply; (UN)SUBSCRIBE
/// produce one per channel.
pub async fn handle(engine: &Engine, client: &mut ClientState, argv: Vec<Bytes>) -> Vec<Reply> {
    engine.count_command();
    let name = keyword(&argv[0]);

    if client.in_subscribe_mode(engine) {
        if !SUBSCRIBE_MODE_ALLOWED.contains(&name.as_str()) {
            return vec![Reply::error(format!(
                "ERR Can't execute '{}': only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT are allowed in this context",
                name.to_ascii_lowercase()
            ))];
        }
        if name == "PING" && argv.len() <= 2 {
            let payload = argv.get(1).cloned().unwrap_or_default();
            return vec![Reply::array(vec![Reply::bulk("pong"), Reply::bulk(payload)])];
        }
    }

    if name == "QUIT" {
        client.should_close = true;
        return vec![Reply::ok()];
    }

    if client.tx.is_queuing() {
        return vec![match name.as_str() {
            "EXEC" => exec(engine, client).await,
            "DISCARD" => client.tx.discard().unwrap_or_else(Reply::from),
            "MULTI" => client.tx.multi().unwrap_or_else(Reply::from),
            _ => client.tx.enqueue(argv),
        }];
    }

    let spec = match command::resolve(&argv) {
        Ok(spec) => spec,
        Err(e) => return vec![e.into()],
    };
    let args = &argv[1..];
    match spec.name {
        "MULTI" => vec![client.tx.multi().unwrap_or_else(Reply::from)],
        "EXEC" => vec![exec(engine, client).await],
        "DISCARD" => vec![client.tx.discard().unwrap_or_else(Reply::from)],
        "SUBSCRIBE" => pubsub::subscribe(&engine.broker, client.id, &client.sender, Kind::Channel, args),
        "PSUBSCRIBE" => pubsub::subscribe(&engine.broker, client.id, &client.sender, Kind::Pattern, args),
        "UNSUBSCRIBE" => pubsub::unsubscribe(&engine.broker, client.id, Kind::Channel, args),
        "PUNSUBSCRIBE" => pubsub::unsubscribe(&engine.broker, client.id, Kind::Pattern, args),
        "CLIENT" => vec![client_command(client.id, &mut client.name, args)],
        _ => vec![command::run(engine, &argv).await],
    }
}

async fn exec(engine: &Engine, client: &mut ClientState) -> Reply {
    let (id, name) = (client.id, &mut client.name);
    transaction::exec(engine, &mut client.tx, |argv| client_command(id, name, &argv[1..])).await
}

/// CLIENT ID | GETNAME | SETNAME name | SETINFO attr value
fn client_command(id: ClientId, name: &mut Option<Bytes>, args: &[Bytes]) -> Reply {
    match (keyword(&args[0]).as_str(), &args[1..]) {
        ("ID", []) => Reply::integer(id as i64),
        ("GETNAME", []) => Reply::bulk_or_nil(name.clone()),
        ("SETNAME", [new]) if new.contains(&b' ') => {
            Reply::error("ERR Client names cannot contain spaces, newlines or special characters.")
        }
        ("SETNAME", [new]) => {
            *name = (!new.is_empty()).then(|| new.clone());
            Reply::ok()
        }
        // Library name and version are accepted and not kept.
        ("SETINFO", [_, _]) => Reply::ok(),
        (sub @ ("ID" | "GETNAME" | "SETNAME" | "SETINFO"), _) => {
            ZedisError::WrongArgCount(format!("client|{}", sub.to_ascii_lowercase())).into()
        }
        _ => ZedisError::UnknownSubcommand(command::text(&args[0]), "CLIENT".into()).into(),
    }
}

/// Connection teardown: drops subscriptions and any open transaction.
pub fn close(engine: &Engine, client: &mut ClientState) {
    engine.broker.unsubscribe_all(client.id);
    if client.tx.is_queuing() {
        let _ = client.tx.discard();
    }
}
