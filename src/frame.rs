// https://redis.io/docs/reference/protocol-spec

use std::io::{self, BufRead, ErrorKind};
use std::str;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error as ThisError;

use crate::reply::Reply;

pub(crate) static CRLF: &[u8; 2] = b"\r\n";

/// Bulk strings longer than this are refused without reading their payload.
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Arrays nested deeper than this are refused, the decoder recurses once per level.
pub const MAX_DEPTH: usize = 64;

#[derive(Clone, Debug, ThisError)]
pub enum Error {
    /// Reading from the underlying stream failed, including hitting its end.
    #[error("io error: {0}")]
    Io(Arc<io::Error>),
    #[error("invalid frame data type: {0}")]
    InvalidDataType(u8),
    #[error("protocol error; invalid frame format")]
    Parse,
    #[error("response is huge and can't be parsed ({0} bytes)")]
    TooLarge(i64),
    #[error("response nests arrays deeper than {} levels", MAX_DEPTH)]
    TooDeep,
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Io(err) => is_timeout_kind(err.kind()),
            _ => false,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(Arc::new(err))
    }
}

// Depending on the platform, an expired socket deadline is reported as either of these.
pub(crate) fn is_timeout_kind(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

/// Reads replies off a buffered byte stream, one complete message per call.
#[derive(Debug)]
pub struct FrameReader<R> {
    src: R,
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(src: R) -> FrameReader<R> {
        FrameReader { src }
    }

    /// Reads the next reply. Any failure, including a malformed message, is returned as a
    /// [`Reply::Transport`] instead of an error.
    pub fn read(&mut self) -> Reply {
        match parse(&mut self.src) {
            Ok(reply) => reply,
            Err(err) => Reply::Transport(err.into()),
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.src
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.src
    }

    pub fn into_inner(self) -> R {
        self.src
    }
}

/// Consumes exactly one message from `src`, leaving it positioned at the start of the next one.
pub fn parse<R: BufRead>(src: &mut R) -> Result<Reply, Error> {
    parse_nested(src, 0)
}

fn parse_nested<R: BufRead>(src: &mut R, depth: usize) -> Result<Reply, Error> {
    // The first byte in an RESP-serialized payload always identifies its type.
    // Subsequent bytes constitute the type's contents.
    let first_byte = peek_byte(src)?;
    let data_type = DataType::try_from(first_byte)?;

    match data_type {
        DataType::SimpleString => {
            let line = get_line(src)?;
            Ok(Reply::Simple(Bytes::from(line)))
        }
        DataType::SimpleError => {
            let line = get_line(src)?;
            let message = String::from_utf8_lossy(&line).into_owned();
            Ok(Reply::Error(crate::Error::Server(message)))
        }
        DataType::Integer => {
            let integer = get_number(src)?;
            Ok(Reply::Integer(integer))
        }
        // $<length>\r\n<data>\r\n
        DataType::BulkString => {
            let length = get_number(src)?;

            if length > MAX_BULK_LEN {
                return Err(Error::TooLarge(length));
            }
            if length < 0 {
                return Ok(Reply::Nil);
            }

            // The payload is binary-safe, so it is read by length rather than by terminator.
            let mut data = vec![0; length as usize];
            src.read_exact(&mut data)?;

            let mut trail = [0; 2];
            src.read_exact(&mut trail)?;

            Ok(Reply::Bulk(Bytes::from(data)))
        }
        // *<number-of-elements>\r\n<element-1>...<element-n>
        DataType::Array => {
            let length = get_number(src)?;

            if length < 0 {
                return Ok(Reply::Nil);
            }
            if depth >= MAX_DEPTH {
                return Err(Error::TooDeep);
            }

            // The count comes off the wire, don't trust it for allocation.
            let mut items = Vec::with_capacity(length.min(64) as usize);
            for _ in 0..length {
                items.push(parse_nested(src, depth + 1)?);
            }

            Ok(Reply::Array(items))
        }
    }
}

/// Reads a whole `\r\n` terminated line and returns what sits between the type byte and the
/// terminator.
fn get_line<R: BufRead>(src: &mut R) -> Result<Vec<u8>, Error> {
    let mut line = Vec::new();
    src.read_until(b'\n', &mut line)?;

    if line.len() < 1 + CRLF.len() || !line.ends_with(CRLF) {
        return Err(Error::Parse);
    }

    line.truncate(line.len() - CRLF.len());
    line.remove(0);

    Ok(line)
}

fn get_number<R: BufRead>(src: &mut R) -> Result<i64, Error> {
    let line = get_line(src)?;

    str::from_utf8(&line)
        .map_err(|_| Error::Parse)?
        .parse::<i64>()
        .map_err(|_| Error::Parse)
}

fn peek_byte<R: BufRead>(src: &mut R) -> Result<u8, Error> {
    match src.fill_buf()?.first() {
        Some(byte) => Ok(*byte),
        None => Err(io::Error::from(ErrorKind::UnexpectedEof).into()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum DataType {
    SimpleString, // '+'
    SimpleError,  // '-'
    Integer,      // ':'
    BulkString,   // '$'
    Array,        // '*'
}

impl TryFrom<u8> for DataType {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'+' => Ok(Self::SimpleString),
            b'-' => Ok(Self::SimpleError),
            b':' => Ok(Self::Integer),
            b'$' => Ok(Self::BulkString),
            b'*' => Ok(Self::Array),
            _ => Err(Error::InvalidDataType(byte)),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::Integer => b':',
            DataType::BulkString => b'$',
            DataType::Array => b'*',
        }
    }
}
