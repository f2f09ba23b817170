use crate::connection::{self, ClientState};
use crate::engine::Engine;
use crate::error::ZedisError;
use crate::resp::{Reply, RespCodec};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

pub async fn run_server(engine: Arc<Engine>) -> std::io::Result<()> {
    let addr = {
        let config = engine.config();
        format!("{}:{}", config.bind, config.port)
    };
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, shards = engine.keyspace.shard_count(), "zedis listening");
    serve(listener, engine).await
}

/// Accept connections on `listener` until ctrl-c.
pub async fn serve(listener: TcpListener, engine: Arc<Engine>) -> std::io::Result<()> {
    let reaper = engine.start_reaper();
    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer) = result?;
                debug!(%peer, "accepted connection");
                let engine = engine.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, &engine).await {
                        debug!(%peer, error = %e, "connection ended with error");
                    }
                    debug!(%peer, "connection closed");
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                reaper.stop();
                return Ok(());
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, engine: &Engine) -> Result<(), ZedisError> {
    let (mut client, mut messages) = ClientState::new(engine);
    engine.client_connected();
    let result = session_loop(&mut Framed::new(stream, RespCodec), engine, &mut client, &mut messages).await;
    connection::close(engine, &mut client);
    engine.client_disconnected();
    result
}

async fn session_loop(
    framed: &mut Framed<TcpStream, RespCodec>,
    engine: &Engine,
    client: &mut ClientState,
    messages: &mut crate::pubsub::MessageReceiver,
) -> Result<(), ZedisError> {
    loop {
        tokio::select! {
            frame = framed.next() => {
                let request = match frame {
                    None => return Ok(()),
                    Some(Ok(request)) => request,
                    Some(Err(e)) => {
                        warn!(client = client.id, error = %e, "protocol error, closing connection");
                        let err = ZedisError::from(e);
                        framed.send(Reply::error(err.to_resp_error())).await?;
                        return Err(err);
                    }
                };
                let Some(argv) = request.into_command() else {
                    framed.send(Reply::error("ERR Protocol error: expected an array of bulk strings")).await?;
                    continue;
                };
                for reply in connection::handle(engine, client, argv).await {
                    framed.feed(reply).await?;
                }
                framed.flush().await?;
                if client.should_close {
                    return Ok(());
                }
            }
            Some(message) = messages.recv() => {
                framed.send(message).await?;
            }
        }
    }
}
