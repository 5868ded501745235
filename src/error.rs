use std::io;
use std::num::{ParseFloatError, ParseIntError};
use std::sync::Arc;

use thiserror::Error as ThisError;

use crate::frame;

/// Every failure a caller can observe, either carried inside a [`Reply`](crate::reply::Reply) or
/// returned by one of its accessors.
///
/// Errors are cloneable so that a single reply can hand the same error out from every accessor.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
    /// Error reply sent by the server. The inner value is the message as received.
    #[error("{0}")]
    Server(String),
    /// The reply could not be read off the stream.
    #[error(transparent)]
    Frame(#[from] frame::Error),
    /// Establishing the transport or writing to it failed.
    #[error("io error: {0}")]
    Io(Arc<io::Error>),
    #[error("client not connected")]
    NotConnected,
    #[error("pipeline is empty")]
    EmptyPipeline,
    #[error("wrong type")]
    WrongType,
    #[error("response is nil")]
    Nil,
    #[error("couldn't convert response to string")]
    NotStr,
    #[error("couldn't convert response to int: {0}")]
    NotInt(#[from] ParseIntError),
    #[error("couldn't convert response to float: {0}")]
    NotFloat(#[from] ParseFloatError),
    #[error("couldn't convert response to array")]
    NotArray,
    #[error("couldn't convert response to map (reply has odd number of elements)")]
    NotMap,
    #[error("CONFIG command response must have array type")]
    WrongConfigResponse,
}

impl Error {
    /// Returns true if the error is a read or write deadline being exceeded.
    ///
    /// A timeout leaves the stream in an unknown position, but unlike other transport failures
    /// the socket itself may still be healthy.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Frame(err) => err.is_timeout(),
            Error::Io(err) => frame::is_timeout_kind(err.kind()),
            _ => false,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
