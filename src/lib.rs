//! Blocking client for servers speaking the Redis serialization protocol (RESP).
//!
//! A [`Client`] owns a single connection. Commands go out one at a time with [`Client::cmd`] or
//! in batches through the pipeline calls, and every reply comes back as a [`Reply`] value that
//! can also carry an error, either one sent by the server or one hit while talking to it.
//!
//! ```no_run
//! use redy::{args, Client};
//!
//! let mut client = Client::open("127.0.0.1:6379")?;
//! client.cmd("SET", args!["greeting", "hello"]);
//! assert_eq!(client.cmd("GET", args!["greeting"]).str()?, "hello");
//! # Ok::<(), redy::Error>(())
//! ```

pub mod client;
pub mod codec;
pub mod command;
pub mod connection;
pub mod error;
pub mod frame;
pub mod options;
pub mod reply;

pub use client::Client;
pub use codec::Arg;
pub use command::Request;
pub use error::{Error, Result};
pub use options::Options;
pub use reply::{Kind, Kinds, Reply};
