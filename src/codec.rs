use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{self, Write};

use bytes::Bytes;
use thiserror::Error as ThisError;

use crate::frame::{DataType, CRLF};
use crate::reply::Reply;

/// A command argument.
///
/// Arguments are written as bulk strings. Lists and maps are flattened into the request, so
/// `SADD key [a, b]` goes out as the same four-element request as `SADD key a b`.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Bytes(Bytes),
    Str(String),
    /// Written as `1` or `0`.
    Bool(bool),
    Int(i64),
    UInt(u64),
    /// Written in the shortest decimal form that reads back to the same value.
    Float(f64),
    /// Written as an empty bulk string.
    Nil,
    /// An error, written as its message.
    Error(String),
    /// A reply read earlier, written back as its payload.
    Reply(Reply),
    List(Vec<Arg>),
    /// Key/value pairs, written as key then value for each entry.
    Map(Vec<(Arg, Arg)>),
    /// Textual rendering of any other value.
    Text(String),
}

impl Arg {
    /// Wraps an error so that its message is sent.
    pub fn error<E: std::error::Error + ?Sized>(err: &E) -> Arg {
        Arg::Error(err.to_string())
    }

    /// Falls back to the `Display` rendering of a value.
    pub fn display<T: fmt::Display + ?Sized>(value: &T) -> Arg {
        Arg::Text(value.to_string())
    }

    /// Number of bulk strings this argument turns into once flattened.
    pub fn flattened_len(&self) -> usize {
        match self {
            Arg::List(items) => items.iter().map(Arg::flattened_len).sum(),
            Arg::Map(entries) => entries
                .iter()
                .map(|(key, value)| key.flattened_len() + value.flattened_len())
                .sum(),
            Arg::Reply(reply) => reply_flattened_len(reply),
            _ => 1,
        }
    }
}

fn reply_flattened_len(reply: &Reply) -> usize {
    match reply {
        Reply::Array(items) => items.iter().map(reply_flattened_len).sum(),
        _ => 1,
    }
}

/// A write failure while encoding, along with how much had been written before it.
#[derive(Debug, ThisError)]
#[error("write failed after {written} bytes: {source}")]
pub struct WriteError {
    pub written: usize,
    #[source]
    pub source: io::Error,
}

/// Writes one request: an array header with the flattened element count, the command name and
/// every flattened argument as a bulk string. Returns the number of bytes written.
pub fn write_request<W: Write>(dst: &mut W, name: &str, args: &[Arg]) -> Result<usize, WriteError> {
    let mut encoder = Encoder { dst, written: 0 };
    encoder.request(name, args).map_err(|source| WriteError {
        written: encoder.written,
        source,
    })?;

    Ok(encoder.written)
}

// `f64` renders infinity as `inf`, the server expects the signed `+Inf`/`-Inf` spelling.
fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f == f64::INFINITY {
        "+Inf".to_string()
    } else if f == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        f.to_string()
    }
}

struct Encoder<'a, W> {
    dst: &'a mut W,
    written: usize,
}

impl<W: Write> Encoder<'_, W> {
    fn request(&mut self, name: &str, args: &[Arg]) -> io::Result<()> {
        let elements = 1 + args.iter().map(Arg::flattened_len).sum::<usize>();

        self.array_header(elements)?;
        self.bulk(name.as_bytes())?;
        for arg in args {
            self.arg(arg)?;
        }

        Ok(())
    }

    fn put(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.dst.write_all(bytes)?;
        self.written += bytes.len();
        Ok(())
    }

    fn array_header(&mut self, len: usize) -> io::Result<()> {
        self.put(&[u8::from(DataType::Array)])?;
        self.put(len.to_string().as_bytes())?;
        self.put(CRLF)
    }

    // $<length>\r\n<data>\r\n
    fn bulk(&mut self, data: &[u8]) -> io::Result<()> {
        self.put(&[u8::from(DataType::BulkString)])?;
        self.put(data.len().to_string().as_bytes())?;
        self.put(CRLF)?;
        self.put(data)?;
        self.put(CRLF)
    }

    // Nested containers never get their own array header, the request header already counts
    // their flattened elements.
    fn arg(&mut self, arg: &Arg) -> io::Result<()> {
        match arg {
            Arg::Bytes(bytes) => self.bulk(bytes),
            Arg::Str(s) | Arg::Error(s) | Arg::Text(s) => self.bulk(s.as_bytes()),
            Arg::Bool(true) => self.bulk(b"1"),
            Arg::Bool(false) => self.bulk(b"0"),
            Arg::Int(i) => self.bulk(i.to_string().as_bytes()),
            Arg::UInt(u) => self.bulk(u.to_string().as_bytes()),
            Arg::Float(f) => self.bulk(format_float(*f).as_bytes()),
            Arg::Nil => self.bulk(b""),
            Arg::Reply(reply) => self.reply(reply),
            Arg::List(items) => items.iter().try_for_each(|item| self.arg(item)),
            Arg::Map(entries) => entries.iter().try_for_each(|(key, value)| {
                self.arg(key)?;
                self.arg(value)
            }),
        }
    }

    fn reply(&mut self, reply: &Reply) -> io::Result<()> {
        match reply {
            Reply::Simple(bytes) | Reply::Bulk(bytes) => self.bulk(bytes),
            Reply::Integer(i) => self.bulk(i.to_string().as_bytes()),
            Reply::Array(items) => items.iter().try_for_each(|item| self.reply(item)),
            Reply::Nil => self.bulk(b""),
            Reply::Error(err) | Reply::Transport(err) => self.bulk(err.to_string().as_bytes()),
        }
    }
}

/// Builds a heterogeneous argument list.
///
/// ```
/// let args = redy::args!["key", 10, true, vec!["a", "b"]];
/// assert_eq!(args.len(), 4);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Arg>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::Arg::from($arg)),+]
    };
}

impl From<Bytes> for Arg {
    fn from(bytes: Bytes) -> Self {
        Arg::Bytes(bytes)
    }
}

impl From<&[u8]> for Arg {
    fn from(bytes: &[u8]) -> Self {
        Arg::Bytes(Bytes::copy_from_slice(bytes))
    }
}

impl<const N: usize> From<&[u8; N]> for Arg {
    fn from(bytes: &[u8; N]) -> Self {
        Arg::Bytes(Bytes::copy_from_slice(bytes))
    }
}

impl From<Vec<u8>> for Arg {
    fn from(bytes: Vec<u8>) -> Self {
        Arg::Bytes(Bytes::from(bytes))
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Str(s)
    }
}

impl From<&String> for Arg {
    fn from(s: &String) -> Self {
        Arg::Str(s.clone())
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Arg::Bool(b)
    }
}

impl From<f64> for Arg {
    fn from(f: f64) -> Self {
        Arg::Float(f)
    }
}

impl From<f32> for Arg {
    fn from(f: f32) -> Self {
        Arg::Float(f64::from(f))
    }
}

impl From<Reply> for Arg {
    fn from(reply: Reply) -> Self {
        Arg::Reply(reply)
    }
}

impl From<&Reply> for Arg {
    fn from(reply: &Reply) -> Self {
        Arg::Reply(reply.clone())
    }
}

impl From<crate::Error> for Arg {
    fn from(err: crate::Error) -> Self {
        Arg::Error(err.to_string())
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        value.map_or(Arg::Nil, Into::into)
    }
}

impl From<()> for Arg {
    fn from(_: ()) -> Self {
        Arg::Nil
    }
}

macro_rules! impl_from_int {
    ($variant:ident, $target:ty, $($t:ty),+) => {
        $(
            impl From<$t> for Arg {
                fn from(i: $t) -> Self {
                    Arg::$variant(i as $target)
                }
            }
        )+
    };
}

impl_from_int!(Int, i64, i8, i16, i32, i64, isize);
impl_from_int!(UInt, u64, u8, u16, u32, u64, usize);

// Sequences of anything but bytes become lists; byte sequences are a single bulk string.
macro_rules! impl_from_seq {
    ($($t:ty),+) => {
        $(
            impl From<Vec<$t>> for Arg {
                fn from(items: Vec<$t>) -> Self {
                    Arg::List(items.into_iter().map(Arg::from).collect())
                }
            }

            impl From<&[$t]> for Arg {
                fn from(items: &[$t]) -> Self {
                    Arg::List(items.iter().cloned().map(Arg::from).collect())
                }
            }

            impl<const N: usize> From<[$t; N]> for Arg {
                fn from(items: [$t; N]) -> Self {
                    Arg::List(items.into_iter().map(Arg::from).collect())
                }
            }
        )+
    };
}

impl_from_seq!(
    Arg, &str, String, Bytes, Vec<u8>, bool, f32, f64, i8, i16, i32, i64, isize, u16, u32, u64,
    usize, Reply
);

impl<K: Into<Arg>, V: Into<Arg>> From<HashMap<K, V>> for Arg {
    fn from(map: HashMap<K, V>) -> Self {
        Arg::Map(map.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<Arg>, V: Into<Arg>> From<BTreeMap<K, V>> for Arg {
    fn from(map: BTreeMap<K, V>) -> Self {
        Arg::Map(map.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<Arg>, V: Into<Arg>> From<Vec<(K, V)>> for Arg {
    fn from(pairs: Vec<(K, V)>) -> Self {
        Arg::Map(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
