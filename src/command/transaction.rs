//! MULTI / EXEC / DISCARD.
//!
//! Queued commands are only resolved, never run, until EXEC. EXEC hands the whole
//! queue to [`run_batch`](super::run_batch), which takes the union of the shards
//! once and runs every command under it. A failing command becomes an error entry
//! and nothing already applied is undone. CLIENT is the one session command that
//! queues; its reply comes from the connection that owns the transaction.

use super::{CommandKind, resolve};
use crate::engine::Engine;
use crate::error::{ZedisError, ZedisResult};
use crate::resp::Reply;
use bytes::Bytes;
use tracing::debug;

#[derive(Debug, Default)]
pub enum Transaction {
    #[default]
    Idle,
    Queuing {
        queue: Vec<Vec<Bytes>>,
        /// Set by a queue-time error; EXEC will abort.
        dirty: bool,
    },
}

impl Transaction {
    pub fn is_queuing(&self) -> bool {
        matches!(self, Transaction::Queuing { .. })
    }

    pub fn multi(&mut self) -> ZedisResult<Reply> {
        if self.is_queuing() {
            return Err(ZedisError::NestedMulti);
        }
        *self = Transaction::Queuing { queue: Vec::new(), dirty: false };
        Ok(Reply::ok())
    }

    pub fn discard(&mut self) -> ZedisResult<Reply> {
        match std::mem::take(self) {
            Transaction::Idle => Err(ZedisError::WithoutMulti("DISCARD")),
            Transaction::Queuing { queue, .. } => {
                debug!(dropped = queue.len(), "transaction discarded");
                Ok(Reply::ok())
            }
        }
    }

    /// Queue one command. Unknown commands, arity errors and commands that only
    /// make sense outside a transaction are reported now and poison the EXEC.
    pub fn enqueue(&mut self, argv: Vec<Bytes>) -> Reply {
        let Transaction::Queuing { queue, dirty } = self else {
            return ZedisError::WithoutMulti("EXEC").into();
        };
        match resolve(&argv) {
            Ok(spec) if matches!(spec.kind, CommandKind::Session) && !queues_in_session(spec.name) => {
                *dirty = true;
                ZedisError::NotInTransaction.into()
            }
            Ok(_) => {
                queue.push(argv);
                Reply::status("QUEUED")
            }
            Err(e) => {
                *dirty = true;
                e.into()
            }
        }
    }

    /// Leave the transaction, yielding the queue EXEC should run.
    fn take(&mut self) -> ZedisResult<Vec<Vec<Bytes>>> {
        match std::mem::take(self) {
            Transaction::Idle => Err(ZedisError::WithoutMulti("EXEC")),
            Transaction::Queuing { dirty: true, .. } => Err(ZedisError::ExecAbort),
            Transaction::Queuing { queue, dirty: false } => Ok(queue),
        }
    }
}

fn queues_in_session(name: &str) -> bool {
    name == "CLIENT"
}

/// Run the queue. Keyspace commands go through one batch; queued session
/// commands are answered by `session` in their slot.
pub async fn exec(engine: &Engine, tx: &mut Transaction, mut session: impl FnMut(&[Bytes]) -> Reply) -> Reply {
    let queue = match tx.take() {
        Ok(queue) => queue,
        Err(e) => return e.into(),
    };
    let mut replies = super::run_batch(engine, &queue).await;
    for (reply, argv) in replies.iter_mut().zip(&queue) {
        if resolve(argv).is_ok_and(|spec| matches!(spec.kind, CommandKind::Session)) {
            *reply = session(argv);
        }
    }
    Reply::array(replies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::test_support::*;

    fn unused_session(argv: &[Bytes]) -> Reply {
        panic!("no session command queued: {argv:?}")
    }

    #[tokio::test]
    async fn test_queue_then_exec_runs_in_order() {
        let e = engine();
        let mut tx = Transaction::default();
        assert_eq!(tx.multi().unwrap(), Reply::ok());
        assert_eq!(tx.enqueue(argv("SET balance 100")), Reply::status("QUEUED"));
        assert_eq!(tx.enqueue(argv("DECRBY balance 20")), Reply::status("QUEUED"));
        assert_eq!(tx.enqueue(argv("DECRBY balance 10")), Reply::status("QUEUED"));
        assert_eq!(call(&e, "GET balance").await, Reply::nil());
        let r = exec(&e, &mut tx, unused_session).await;
        assert_eq!(r, Reply::array(vec![Reply::ok(), Reply::integer(80), Reply::integer(70)]));
        assert!(!tx.is_queuing());
    }

    #[tokio::test]
    async fn test_runtime_error_does_not_roll_back() {
        let e = engine();
        let mut tx = Transaction::default();
        tx.multi().unwrap();
        tx.enqueue(argv("SET a x"));
        tx.enqueue(argv("INCR a"));
        tx.enqueue(argv("SET b y"));
        let Reply::Array(Some(replies)) = exec(&e, &mut tx, unused_session).await else { panic!("array") };
        assert!(err_starts(&replies[1], "ERR value is not an integer"));
        assert_eq!(call(&e, "GET b").await, bulk("y"));
    }

    #[tokio::test]
    async fn test_queue_time_error_aborts_exec() {
        let e = engine();
        let mut tx = Transaction::default();
        tx.multi().unwrap();
        tx.enqueue(argv("SET a 1"));
        assert!(err_starts(&tx.enqueue(argv("NOSUCH x")), "ERR unknown command"));
        assert!(err_starts(&tx.enqueue(argv("GET")), "ERR wrong number"));
        assert_eq!(
            exec(&e, &mut tx, unused_session).await,
            Reply::error("EXECABORT Transaction discarded because of previous errors.")
        );
        assert!(!tx.is_queuing());
        assert_eq!(call(&e, "EXISTS a").await, Reply::integer(0));
    }

    #[tokio::test]
    async fn test_state_errors() {
        let e = engine();
        let mut tx = Transaction::default();
        assert_eq!(exec(&e, &mut tx, unused_session).await, Reply::error("ERR EXEC without MULTI"));
        assert!(matches!(tx.discard(), Err(ZedisError::WithoutMulti("DISCARD"))));
        tx.multi().unwrap();
        assert!(matches!(tx.multi(), Err(ZedisError::NestedMulti)));
        assert!(tx.is_queuing());
        tx.enqueue(argv("SET a 1"));
        assert_eq!(tx.discard().unwrap(), Reply::ok());
        assert_eq!(call(&e, "EXISTS a").await, Reply::integer(0));
    }

    #[test]
    fn test_subscribe_is_rejected_and_poisons() {
        let mut tx = Transaction::default();
        tx.multi().unwrap();
        let r = tx.enqueue(argv("SUBSCRIBE ch"));
        assert_eq!(r, Reply::error("ERR Command not allowed inside a transaction"));
        assert!(matches!(tx, Transaction::Queuing { dirty: true, .. }));
    }

    #[tokio::test]
    async fn test_client_queues_and_answers_in_its_slot() {
        let e = engine();
        let mut tx = Transaction::default();
        tx.multi().unwrap();
        assert_eq!(tx.enqueue(argv("SET a 1")), Reply::status("QUEUED"));
        assert_eq!(tx.enqueue(argv("CLIENT SETNAME worker")), Reply::status("QUEUED"));
        assert_eq!(tx.enqueue(argv("GET a")), Reply::status("QUEUED"));
        let mut seen = Vec::new();
        let r = exec(&e, &mut tx, |argv| {
            seen.push(argv[1].clone());
            Reply::ok()
        })
        .await;
        assert_eq!(r, Reply::array(vec![Reply::ok(), Reply::ok(), bulk("1")]));
        assert_eq!(seen, [Bytes::from_static(b"SETNAME")]);
    }
}
