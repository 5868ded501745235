use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_ADDR: &str = "127.0.0.1:6379";

/// Kind of socket to dial.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Network {
    /// `addr` is `host:port`.
    #[default]
    Tcp,
    /// `addr` is the filesystem path of a Unix domain socket.
    Unix,
}

/// Where and how a [`Client`](crate::client::Client) connects.
#[derive(Clone)]
pub struct Options {
    pub network: Network,
    /// Server address as `host:port`, or a socket path for [`Network::Unix`].
    pub addr: String,
    /// Connect over TLS with this configuration. The host part of `addr` is used as server name.
    pub tls: Option<Arc<rustls::ClientConfig>>,
    /// Deadline for reading a single reply. `None` blocks indefinitely.
    pub read_timeout: Option<Duration>,
    /// Deadline for writing a request or a pipeline batch.
    pub write_timeout: Option<Duration>,
    /// Deadline for establishing the connection. Unix sockets connect without one.
    pub dial_timeout: Option<Duration>,
}

impl Options {
    pub fn new(addr: impl Into<String>) -> Options {
        Options {
            addr: addr.into(),
            ..Options::default()
        }
    }

    /// Connects to the Unix domain socket at `path`.
    pub fn unix(path: impl Into<String>) -> Options {
        Options::new(path).with_network(Network::Unix)
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    pub fn with_tls(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls = Some(config);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = non_zero(timeout);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = non_zero(timeout);
        self
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = non_zero(timeout);
        self
    }

    /// Host part of the address, without port.
    pub(crate) fn host(&self) -> &str {
        match self.addr.rsplit_once(':') {
            Some((host, _)) => host.trim_start_matches('[').trim_end_matches(']'),
            None => &self.addr,
        }
    }
}

// Sockets reject a zero timeout, it means "no timeout" here.
fn non_zero(timeout: Duration) -> Option<Duration> {
    if timeout.is_zero() {
        None
    } else {
        Some(timeout)
    }
}

impl Default for Options {
    fn default() -> Self {
        Options {
            network: Network::Tcp,
            addr: DEFAULT_ADDR.to_string(),
            tls: None,
            read_timeout: None,
            write_timeout: None,
            dial_timeout: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("network", &self.network)
            .field("addr", &self.addr)
            .field("tls", &self.tls.is_some())
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("dial_timeout", &self.dial_timeout)
            .finish()
    }
}
