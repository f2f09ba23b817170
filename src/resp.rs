//! RESP2 framing.
//!
//! [`Reply`] is both what the executor hands back and what a client request decodes
//! to (an array of bulk strings). [`RespCodec`] implements the `tokio-util` codec
//! traits so the connection loop can feed it raw socket bytes.

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const MAX_BULK_LEN: usize = 512 * 1024 * 1024;
const MAX_ARRAY_LEN: usize = 1024 * 1024;
const MAX_INLINE_LEN: usize = 64 * 1024;

/// A RESP2 value.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `+OK`
    Status(String),
    /// `-ERR message`
    Error(String),
    /// `:1000`
    Integer(i64),
    /// `$6\r\nfoobar` or `$-1`
    Bulk(Option<Bytes>),
    /// `*2 ...` or `*-1`
    Array(Option<Vec<Reply>>),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(Some(data.into()))
    }

    pub fn nil() -> Self {
        Reply::Bulk(None)
    }

    pub fn nil_array() -> Self {
        Reply::Array(None)
    }

    pub fn array(items: Vec<Reply>) -> Self {
        Reply::Array(Some(items))
    }

    /// A float rendered the way Redis renders scores and INCRBYFLOAT results.
    pub fn double(n: f64) -> Self {
        Reply::bulk(format_double(n))
    }

    pub fn bulk_or_nil(data: Option<impl Into<Bytes>>) -> Self {
        match data {
            Some(d) => Reply::bulk(d),
            None => Reply::nil(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// The payload of a bulk or status value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Bulk(Some(data)) => Some(data),
            Reply::Status(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Turn a decoded request frame into its argument vector.
    ///
    /// Returns `None` for anything that is not a non-empty array of strings.
    pub fn into_command(self) -> Option<Vec<Bytes>> {
        let Reply::Array(Some(items)) = self else {
            return None;
        };
        if items.is_empty() {
            return None;
        }
        items
            .into_iter()
            .map(|item| match item {
                Reply::Bulk(Some(b)) => Some(b),
                Reply::Status(s) => Some(Bytes::from(s)),
                Reply::Integer(n) => Some(Bytes::from(n.to_string())),
                _ => None,
            })
            .collect()
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Reply::Status(s) => {
                buf.put_u8(b'+');
                buf.put_slice(s.as_bytes());
                buf.put_slice(b"\r\n");
            }
            Reply::Error(s) => {
                buf.put_u8(b'-');
                buf.put_slice(s.as_bytes());
                buf.put_slice(b"\r\n");
            }
            Reply::Integer(n) => {
                buf.put_u8(b':');
                buf.put_slice(n.to_string().as_bytes());
                buf.put_slice(b"\r\n");
            }
            Reply::Bulk(None) => buf.put_slice(b"$-1\r\n"),
            Reply::Bulk(Some(data)) => {
                buf.put_u8(b'$');
                buf.put_slice(data.len().to_string().as_bytes());
                buf.put_slice(b"\r\n");
                buf.put_slice(data);
                buf.put_slice(b"\r\n");
            }
            Reply::Array(None) => buf.put_slice(b"*-1\r\n"),
            Reply::Array(Some(items)) => {
                buf.put_u8(b'*');
                buf.put_slice(items.len().to_string().as_bytes());
                buf.put_slice(b"\r\n");
                for item in items {
                    item.encode(buf);
                }
            }
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

impl From<crate::error::ZedisError> for Reply {
    fn from(err: crate::error::ZedisError) -> Self {
        Reply::Error(err.to_resp_error())
    }
}

/// Shortest representation that parses back to the same value.
pub fn format_double(n: f64) -> String {
    if n.is_infinite() {
        return if n > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if n == 0.0 {
        return "0".into();
    }
    let s = format!("{n}");
    if s.parse::<f64>().ok() == Some(n) {
        s
    } else {
        format!("{n:.17}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RespError {
    #[error("invalid type byte '{}'", *.0 as char)]
    InvalidByte(u8),

    #[error("invalid bulk length")]
    BulkLength,

    #[error("invalid multibulk length")]
    MultibulkLength,

    #[error("{0}")]
    InvalidData(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Incremental RESP decoder and encoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct RespCodec;

impl Decoder for RespCodec {
    type Item = Reply;
    type Error = RespError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Reply>, RespError> {
        if src.is_empty() {
            return Ok(None);
        }
        let parsed = match src[0] {
            b'+' | b'-' | b':' | b'$' | b'*' => parse_frame(src, 0)?,
            _ => parse_inline(src)?,
        };
        Ok(parsed.map(|(frame, consumed)| {
            let _ = src.split_to(consumed);
            frame
        }))
    }
}

impl Encoder<Reply> for RespCodec {
    type Error = RespError;

    fn encode(&mut self, item: Reply, dst: &mut BytesMut) -> Result<(), RespError> {
        item.encode(dst);
        Ok(())
    }
}

type Parsed = Option<(Reply, usize)>;

/// Parse the frame starting at `pos`, returning it and the position just past it.
/// Nothing is consumed; incomplete input yields `Ok(None)`.
fn parse_frame(buf: &[u8], pos: usize) -> Result<Parsed, RespError> {
    let Some(&tag) = buf.get(pos) else {
        return Ok(None);
    };
    let Some(line_end) = find_crlf(buf, pos + 1) else {
        return Ok(None);
    };
    let line = &buf[pos + 1..line_end];
    let next = line_end + 2;

    match tag {
        b'+' => Ok(Some((Reply::Status(lossy(line)), next))),
        b'-' => Ok(Some((Reply::Error(lossy(line)), next))),
        b':' => {
            let n = parse_int(line)
                .ok_or_else(|| RespError::InvalidData(format!("invalid integer: {}", lossy(line))))?;
            Ok(Some((Reply::Integer(n), next)))
        }
        b'$' => {
            let len = parse_int(line).ok_or(RespError::BulkLength)?;
            if len == -1 {
                return Ok(Some((Reply::Bulk(None), next)));
            }
            if len < 0 || len as usize > MAX_BULK_LEN {
                return Err(RespError::BulkLength);
            }
            let end = next + len as usize;
            if buf.len() < end + 2 {
                return Ok(None);
            }
            if &buf[end..end + 2] != b"\r\n" {
                return Err(RespError::InvalidData("missing CRLF after bulk string".into()));
            }
            let data = Bytes::copy_from_slice(&buf[next..end]);
            Ok(Some((Reply::Bulk(Some(data)), end + 2)))
        }
        b'*' => {
            let len = parse_int(line).ok_or(RespError::MultibulkLength)?;
            if len < 0 {
                return Ok(Some((Reply::Array(None), next)));
            }
            if len as usize > MAX_ARRAY_LEN {
                return Err(RespError::MultibulkLength);
            }
            let mut items = Vec::with_capacity(len as usize);
            let mut cursor = next;
            for _ in 0..len {
                match parse_frame(buf, cursor)? {
                    Some((item, after)) => {
                        items.push(item);
                        cursor = after;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((Reply::Array(Some(items)), cursor)))
        }
        other => Err(RespError::InvalidByte(other)),
    }
}

/// Telnet-style request: whitespace separated words with optional quoting.
fn parse_inline(buf: &[u8]) -> Result<Parsed, RespError> {
    let Some(line_end) = buf.iter().position(|&b| b == b'\n') else {
        if buf.len() > MAX_INLINE_LEN {
            return Err(RespError::InvalidData("too big inline request".into()));
        }
        return Ok(None);
    };
    let mut line = &buf[..line_end];
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }
    let words = split_inline(line)?
        .into_iter()
        .map(|w| Reply::Bulk(Some(Bytes::from(w))))
        .collect();
    Ok(Some((Reply::Array(Some(words)), line_end + 1)))
}

fn split_inline(line: &[u8]) -> Result<Vec<Vec<u8>>, RespError> {
    let mut words = Vec::new();
    let mut iter = line.iter().copied().peekable();

    loop {
        while iter.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            iter.next();
        }
        let Some(first) = iter.peek().copied() else {
            break;
        };

        let mut word = Vec::new();
        match first {
            b'"' => {
                iter.next();
                let mut closed = false;
                while let Some(b) = iter.next() {
                    match b {
                        b'"' => {
                            closed = true;
                            break;
                        }
                        b'\\' => match iter.next() {
                            Some(b'n') => word.push(b'\n'),
                            Some(b'r') => word.push(b'\r'),
                            Some(b't') => word.push(b'\t'),
                            Some(other) => word.push(other),
                            None => break,
                        },
                        other => word.push(other),
                    }
                }
                if !closed {
                    return Err(RespError::InvalidData("unbalanced quotes in request".into()));
                }
            }
            b'\'' => {
                iter.next();
                let mut closed = false;
                for b in iter.by_ref() {
                    if b == b'\'' {
                        closed = true;
                        break;
                    }
                    word.push(b);
                }
                if !closed {
                    return Err(RespError::InvalidData("unbalanced quotes in request".into()));
                }
            }
            _ => {
                while let Some(b) = iter.next_if(|b| !b.is_ascii_whitespace()) {
                    word.push(b);
                }
            }
        }
        words.push(word);
    }

    Ok(words)
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    if from >= buf.len() {
        return None;
    }
    buf[from..]
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|i| from + i)
}

fn parse_int(line: &[u8]) -> Option<i64> {
    std::str::from_utf8(line).ok()?.parse().ok()
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(input: &str) -> (Option<Reply>, BytesMut) {
        let mut buf = BytesMut::from(input);
        let frame = RespCodec.decode(&mut buf).unwrap();
        (frame, buf)
    }

    fn words(frame: Option<Reply>) -> Vec<String> {
        frame
            .unwrap()
            .into_command()
            .unwrap()
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    fn bulk(s: &str) -> Reply {
        Reply::bulk(Bytes::copy_from_slice(s.as_bytes()))
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode("+OK\r\n").0, Some(Reply::ok()));
        assert_eq!(decode("-ERR nope\r\n").0, Some(Reply::error("ERR nope")));
        assert_eq!(decode(":-42\r\n").0, Some(Reply::Integer(-42)));
        assert_eq!(decode("$6\r\nfoobar\r\n").0, Some(bulk("foobar")));
        assert_eq!(decode("$0\r\n\r\n").0, Some(bulk("")));
        assert_eq!(decode("$-1\r\n").0, Some(Reply::nil()));
        assert_eq!(decode("*-1\r\n").0, Some(Reply::nil_array()));
    }

    #[test]
    fn test_decode_command_array() {
        let (frame, rest) = decode("*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
        assert_eq!(words(frame), ["SET", "k", "v"]);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_partial_input_is_not_consumed() {
        let (frame, rest) = decode("*2\r\n$3\r\nGET\r\n$3\r\nke");
        assert!(frame.is_none());
        assert_eq!(&rest[..], b"*2\r\n$3\r\nGET\r\n$3\r\nke");

        let (frame, _) = decode("$6\r\nfoo");
        assert!(frame.is_none());
    }

    #[test]
    fn test_pipelined_frames_decode_in_order() {
        let mut buf = BytesMut::from("+A\r\n:1\r\n");
        assert_eq!(RespCodec.decode(&mut buf).unwrap(), Some(Reply::status("A")));
        assert_eq!(RespCodec.decode(&mut buf).unwrap(), Some(Reply::Integer(1)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_inline_commands() {
        let (frame, _) = decode("SET key \"hello world\"\r\n");
        assert_eq!(words(frame), ["SET", "key", "hello world"]);

        let (frame, _) = decode("PING\n");
        assert_eq!(words(frame), ["PING"]);

        let (frame, _) = decode("\r\n");
        assert!(frame.unwrap().into_command().is_none());
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        let mut buf = BytesMut::from("$abc\r\n");
        assert!(RespCodec.decode(&mut buf).is_err());
        let mut buf = BytesMut::from("*1\r\n!x\r\n");
        assert!(RespCodec.decode(&mut buf).is_err());
        let mut buf = BytesMut::from("SET \"open\r\n");
        assert!(RespCodec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_encode() {
        let reply = Reply::array(vec![
            bulk("foo"),
            Reply::Integer(42),
            Reply::nil(),
            Reply::error("ERR bad"),
        ]);
        assert_eq!(
            &reply.to_bytes()[..],
            b"*4\r\n$3\r\nfoo\r\n:42\r\n$-1\r\n-ERR bad\r\n"
        );
        assert_eq!(&Reply::nil_array().to_bytes()[..], b"*-1\r\n");
    }

    #[test]
    fn test_format_double() {
        assert_eq!(format_double(3.0), "3");
        assert_eq!(format_double(10.5), "10.5");
        assert_eq!(format_double(-0.0), "0");
        assert_eq!(format_double(f64::INFINITY), "inf");
    }
}
