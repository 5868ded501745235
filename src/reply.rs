// https://redis.io/docs/reference/protocol-spec

use std::collections::HashMap;
use std::fmt;
use std::ops::BitOr;

use bytes::Bytes;
use itertools::Itertools;
use strum::IntoEnumIterator;

use crate::frame::{DataType, CRLF};
use crate::Error;

/// A single decoded reply, or a local failure standing in for one.
///
/// Every command-issuing operation of the client returns a `Reply`, so callers have one result
/// shape to deal with. Check [`Reply::err`] before trusting the payload; the typed accessors do
/// that on their own and hand the error back.
#[derive(Clone, Debug)]
pub enum Reply {
    Simple(Bytes),
    Bulk(Bytes),
    Integer(i64),
    Array(Vec<Reply>),
    Nil,
    /// Error reported by the server, or a usage error such as an empty pipeline.
    Error(Error),
    /// The reply could not be obtained: I/O failure, malformed data or no connection.
    Transport(Error),
}

/// Discriminant of a [`Reply`]. Values are single bits so that they can be grouped in [`Kinds`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumIter)]
#[repr(u8)]
pub enum Kind {
    SimpleString = 1,
    BulkString = 1 << 1,
    Integer = 1 << 2,
    Array = 1 << 3,
    Nil = 1 << 4,
    ProtocolError = 1 << 5,
    TransportError = 1 << 6,
}

/// Set of reply kinds, used with [`Reply::has_kind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Kinds(u8);

impl Kinds {
    pub const SIMPLE_STRING: Kinds = Kinds(Kind::SimpleString as u8);
    pub const BULK_STRING: Kinds = Kinds(Kind::BulkString as u8);
    pub const INTEGER: Kinds = Kinds(Kind::Integer as u8);
    pub const ARRAY: Kinds = Kinds(Kind::Array as u8);
    pub const NIL: Kinds = Kinds(Kind::Nil as u8);
    pub const PROTOCOL_ERROR: Kinds = Kinds(Kind::ProtocolError as u8);
    pub const TRANSPORT_ERROR: Kinds = Kinds(Kind::TransportError as u8);

    /// Any string type.
    pub const STR: Kinds = Kinds(Kind::SimpleString as u8 | Kind::BulkString as u8);
    /// Any error type.
    pub const ERR: Kinds = Kinds(Kind::ProtocolError as u8 | Kind::TransportError as u8);

    pub fn contains(self, kind: Kind) -> bool {
        self.0 & kind as u8 != 0
    }

    /// The kinds in the set, in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Kind> {
        Kind::iter().filter(move |kind| self.contains(*kind))
    }
}

impl fmt::Display for Kinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.iter().join("|"))
    }
}

impl From<Kind> for Kinds {
    fn from(kind: Kind) -> Self {
        Kinds(kind as u8)
    }
}

impl BitOr for Kinds {
    type Output = Kinds;

    fn bitor(self, rhs: Kinds) -> Kinds {
        Kinds(self.0 | rhs.0)
    }
}

impl BitOr for Kind {
    type Output = Kinds;

    fn bitor(self, rhs: Kind) -> Kinds {
        Kinds::from(self) | Kinds::from(rhs)
    }
}

impl Reply {
    pub fn kind(&self) -> Kind {
        match self {
            Reply::Simple(_) => Kind::SimpleString,
            Reply::Bulk(_) => Kind::BulkString,
            Reply::Integer(_) => Kind::Integer,
            Reply::Array(_) => Kind::Array,
            Reply::Nil => Kind::Nil,
            Reply::Error(_) => Kind::ProtocolError,
            Reply::Transport(_) => Kind::TransportError,
        }
    }

    /// Returns whether the reply is of one of the given kinds.
    pub fn has_kind(&self, kinds: impl Into<Kinds>) -> bool {
        kinds.into().contains(self.kind())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    /// The error carried by the reply, if it is of an error kind.
    pub fn err(&self) -> Option<&Error> {
        match self {
            Reply::Error(err) | Reply::Transport(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true if this is a transport error caused by an exceeded deadline.
    pub fn is_timeout(&self) -> bool {
        match self {
            Reply::Transport(err) => err.is_timeout(),
            _ => false,
        }
    }

    fn check(&self) -> Result<(), Error> {
        match self.err() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Raw payload of a string reply.
    pub fn bytes(&self) -> Result<Bytes, Error> {
        self.check()?;

        match self {
            Reply::Simple(bytes) | Reply::Bulk(bytes) => Ok(bytes.clone()),
            Reply::Nil => Err(Error::Nil),
            _ => Err(Error::WrongType),
        }
    }

    pub fn str(&self) -> Result<String, Error> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| Error::NotStr)
    }

    /// Integer value of the reply. String replies are parsed as base-10.
    pub fn int64(&self) -> Result<i64, Error> {
        self.check()?;

        match self {
            Reply::Integer(i) => Ok(*i),
            Reply::Nil => Err(Error::Nil),
            _ => Ok(self.str()?.parse::<i64>()?),
        }
    }

    /// Same as [`Reply::int64`], saturating at `isize::MAX`.
    pub fn int(&self) -> Result<isize, Error> {
        let i = self.int64()?;
        Ok(isize::try_from(i).unwrap_or(if i > 0 { isize::MAX } else { isize::MIN }))
    }

    /// Float value of a string reply.
    ///
    /// Integer replies are rejected even though they are numeric; only byte-string payloads are
    /// parsed.
    pub fn float64(&self) -> Result<f64, Error> {
        self.check()?;

        match self {
            Reply::Simple(bytes) | Reply::Bulk(bytes) => {
                let s = std::str::from_utf8(bytes).map_err(|_| Error::NotStr)?;
                Ok(s.parse::<f64>()?)
            }
            _ => Err(Error::NotStr),
        }
    }

    pub fn array(&self) -> Result<&[Reply], Error> {
        self.check()?;

        match self {
            Reply::Array(items) => Ok(items),
            _ => Err(Error::NotArray),
        }
    }

    /// Array of strings. Nil elements become empty strings.
    pub fn list(&self) -> Result<Vec<String>, Error> {
        self.array()?
            .iter()
            .map(|item| match item {
                Reply::Nil => Ok(String::new()),
                item => item.str(),
            })
            .collect()
    }

    /// Array of raw payloads. Nil elements become `None`.
    pub fn list_bytes(&self) -> Result<Vec<Option<Bytes>>, Error> {
        self.array()?
            .iter()
            .map(|item| match item {
                Reply::Nil => Ok(None),
                item => item.bytes().map(Some),
            })
            .collect()
    }

    /// Alternating key/value array as ordered pairs. Keys must be strings, nil values become
    /// empty strings.
    pub fn pairs(&self) -> Result<Vec<(String, String)>, Error> {
        let items = self.array()?;

        if items.len() % 2 != 0 {
            return Err(Error::NotMap);
        }

        items
            .iter()
            .tuples()
            .map(|(key, value)| {
                let key = key.str()?;
                let value = match value {
                    Reply::Nil => String::new(),
                    value => value.str()?,
                };
                Ok((key, value))
            })
            .collect()
    }

    /// Same as [`Reply::pairs`], collected into a map.
    pub fn map(&self) -> Result<HashMap<String, String>, Error> {
        Ok(self.pairs()?.into_iter().collect())
    }

    /// Renders the reply in RESP wire format.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Reply::Simple(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(u8::from(DataType::SimpleString));
                bytes.extend_from_slice(s);
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Reply::Error(err) | Reply::Transport(err) => {
                let s = err.to_string();
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(u8::from(DataType::SimpleError));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Reply::Integer(i) => {
                let s = i.to_string();
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(u8::from(DataType::Integer));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Reply::Bulk(data) => {
                let length_str = data.len().to_string();
                let mut bytes = Vec::with_capacity(
                    1 + length_str.len() + CRLF.len() + data.len() + CRLF.len(),
                );
                bytes.push(u8::from(DataType::BulkString));
                bytes.extend_from_slice(length_str.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes.extend_from_slice(data);
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Reply::Nil => b"$-1\r\n".to_vec(),
            Reply::Array(items) => {
                let length_str = items.len().to_string();
                let mut bytes = Vec::with_capacity(1 + length_str.len() + CRLF.len());
                bytes.push(u8::from(DataType::Array));
                bytes.extend_from_slice(length_str.as_bytes());
                bytes.extend_from_slice(CRLF);
                for item in items {
                    bytes.extend(item.serialize());
                }
                bytes
            }
        }
    }
}

impl From<Reply> for Vec<u8> {
    fn from(reply: Reply) -> Self {
        reply.serialize()
    }
}

// Errors compare by their message, io errors can't be compared otherwise.
impl PartialEq for Reply {
    fn eq(&self, other: &Reply) -> bool {
        match (self, other) {
            (Reply::Simple(a), Reply::Simple(b)) => a == b,
            (Reply::Bulk(a), Reply::Bulk(b)) => a == b,
            (Reply::Integer(a), Reply::Integer(b)) => a == b,
            (Reply::Array(a), Reply::Array(b)) => a == b,
            (Reply::Nil, Reply::Nil) => true,
            (Reply::Error(a), Reply::Error(b)) => a.to_string() == b.to_string(),
            (Reply::Transport(a), Reply::Transport(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

/// Debug rendering, e.g. `Resp(0:Resp(Str "a") 1:Resp(Int 2))`. Use [`Reply::str`] to read
/// string replies.
impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Error(err) => write!(f, "Resp(RedisErr \"{}\")", err),
            Reply::Transport(err) => write!(f, "Resp(ErrIO \"{}\")", err),
            Reply::Bulk(bytes) => write!(f, "Resp(BulkStr {:?})", String::from_utf8_lossy(bytes)),
            Reply::Simple(bytes) => write!(f, "Resp(Str {:?})", String::from_utf8_lossy(bytes)),
            Reply::Integer(i) => write!(f, "Resp(Int {})", i),
            Reply::Nil => write!(f, "Resp(Nil)"),
            Reply::Array(items) if items.is_empty() => write!(f, "Resp(Empty Array)"),
            Reply::Array(items) => {
                let kids = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| format!("{}:{}", i, item))
                    .join(" ");
                write!(f, "Resp({})", kids)
            }
        }
    }
}
