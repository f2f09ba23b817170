use super::{Ctx, keyword, len_reply, text};
use crate::error::{ZedisError, ZedisResult};
use crate::pubsub::{Broker, ClientId, Kind, MessageSender};
use crate::resp::Reply;
use bytes::Bytes;

fn confirmation(verb: &'static str, name: Option<Bytes>, count: usize) -> Reply {
    Reply::array(vec![Reply::bulk(verb), Reply::bulk_or_nil(name), len_reply(count)])
}

/// (P)SUBSCRIBE: one confirmation per name, each carrying the running count.
pub fn subscribe(
    broker: &Broker,
    client: ClientId,
    sender: &MessageSender,
    kind: Kind,
    names: &[Bytes],
) -> Vec<Reply> {
    let verb = match kind {
        Kind::Channel => "subscribe",
        Kind::Pattern => "psubscribe",
    };
    names
        .iter()
        .map(|name| {
            let count = broker.subscribe(client, kind, name.clone(), sender);
            confirmation(verb, Some(name.clone()), count)
        })
        .collect()
}

/// (P)UNSUBSCRIBE. With no names every subscription of that kind is dropped;
/// if there were none a single confirmation with a nil name is sent.
pub fn unsubscribe(broker: &Broker, client: ClientId, kind: Kind, names: &[Bytes]) -> Vec<Reply> {
    let verb = match kind {
        Kind::Channel => "unsubscribe",
        Kind::Pattern => "punsubscribe",
    };
    let names = if names.is_empty() { broker.subscriptions(client, kind) } else { names.to_vec() };
    if names.is_empty() {
        return vec![confirmation(verb, None, broker.subscription_count(client))];
    }
    names
        .into_iter()
        .map(|name| {
            let count = broker.unsubscribe(client, kind, &name);
            confirmation(verb, Some(name), count)
        })
        .collect()
}

/// PUBLISH channel message. Replies with the number of subscribers reached.
pub fn cmd_publish(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    Ok(len_reply(ctx.engine.broker.publish(&args[0], &args[1])))
}

/// PUBSUB CHANNELS [pattern] | NUMSUB [channel ...] | NUMPAT
pub fn cmd_pubsub(ctx: &mut Ctx<'_, '_>, args: &[Bytes]) -> ZedisResult<Reply> {
    let broker = &ctx.engine.broker;
    match (keyword(&args[0]).as_str(), &args[1..]) {
        ("CHANNELS", []) => Ok(super::bulk_array(broker.channels(None))),
        ("CHANNELS", [pattern]) => Ok(super::bulk_array(broker.channels(Some(pattern.as_ref())))),
        ("NUMSUB", channels) => {
            let mut out = Vec::with_capacity(channels.len() * 2);
            for ch in channels {
                out.push(Reply::bulk(ch.clone()));
                out.push(len_reply(broker.numsub(ch)));
            }
            Ok(Reply::array(out))
        }
        ("NUMPAT", []) => Ok(len_reply(broker.numpat())),
        _ => Err(ZedisError::UnknownSubcommand(text(&args[0]), "PUBSUB".into())),
    }
}
