use crate::resp::RespError;

/// Every failure a command can produce.
///
/// Only [`ZedisError::Protocol`] and [`ZedisError::Io`] end a connection; everything
/// else is rendered with [`ZedisError::to_resp_error`] and sent back to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ZedisError {
    // Command errors: nothing has been touched yet.
    #[error("ERR unknown command '{0}', with args beginning with: {1}")]
    UnknownCommand(String, String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArgCount(String),

    #[error("ERR unknown subcommand '{0}'. Try {1} HELP.")]
    UnknownSubcommand(String, String),

    // Type errors.
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    // Execution errors.
    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    #[error("ERR value is not a valid float")]
    NotFloat,

    #[error("ERR increment or decrement would overflow")]
    Overflow,

    #[error("ERR increment would produce NaN or Infinity")]
    NanOrInfinity,

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR no such key")]
    NoSuchKey,

    #[error("ERR index out of range")]
    IndexOutOfRange,

    #[error("ERR {0}")]
    Generic(String),

    // Transaction state errors.
    #[error("ERR MULTI calls can not be nested")]
    NestedMulti,

    #[error("ERR {0} without MULTI")]
    WithoutMulti(&'static str),

    #[error("EXECABORT Transaction discarded because of previous errors.")]
    ExecAbort,

    #[error("ERR Command not allowed inside a transaction")]
    NotInTransaction,

    // Scripting.
    #[error("NOSCRIPT No matching script. Please use EVAL.")]
    NoScript,

    #[error("ERR Error running script: {0}")]
    Script(String),

    /// An error reply passed through verbatim, e.g. one raised by a Lua script.
    #[error("{0}")]
    Reply(String),

    // Connection level.
    #[error("ERR Protocol error: {0}")]
    Protocol(#[from] RespError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ZedisError {
    pub fn to_resp_error(&self) -> String {
        self.to_string()
    }

    pub(crate) fn generic(msg: impl Into<String>) -> Self {
        ZedisError::Generic(msg.into())
    }
}

pub type ZedisResult<T> = Result<T, ZedisError>;
