use std::collections::VecDeque;
use std::mem;

use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::codec::Arg;
use crate::command::Request;
use crate::connection::Connection;
use crate::options::Options;
use crate::reply::Reply;
use crate::Error;

enum State {
    Disconnected,
    Connected(Connection),
}

/// Synchronous client owning at most one connection.
///
/// Commands are either sent one at a time with [`Client::cmd`], or queued with
/// [`Client::pipe_append`] and sent together on the first [`Client::pipe_resp`], which then hands
/// the replies back one by one in the order the commands were queued.
///
/// Any I/O failure while talking to the server is fatal for the connection: it is closed, the
/// error is kept in [`Client::last_critical`] and every following call reports
/// [`Error::NotConnected`] until [`Client::connect`] succeeds again.
///
/// The client is not meant to be shared between threads without external locking, replies would
/// end up with the wrong caller.
pub struct Client {
    options: Options,
    state: State,
    last_critical: Option<Error>,

    /// Commands queued but not sent yet.
    pending: Vec<Request>,
    /// Replies received but not handed out yet, in the order they came in.
    completed: VecDeque<Reply>,
}

impl Client {
    /// Creates a disconnected client.
    pub fn new(options: Options) -> Client {
        Client {
            options,
            state: State::Disconnected,
            last_critical: None,
            pending: Vec::new(),
            completed: VecDeque::new(),
        }
    }

    /// Creates a client for `addr` and connects it.
    pub fn open(addr: &str) -> Result<Client, Error> {
        let mut client = Client::new(Options::new(addr));
        client.connect()?;
        Ok(client)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, State::Connected(_))
    }

    /// Id of the live connection, mostly useful to correlate logs.
    pub fn connection_id(&self) -> Option<Uuid> {
        match &self.state {
            State::Connected(conn) => Some(conn.id()),
            State::Disconnected => None,
        }
    }

    /// The error that closed the connection last, until the next successful connect.
    pub fn last_critical(&self) -> Option<&Error> {
        self.last_critical.as_ref()
    }

    /// Connects to the server. Queued commands and unclaimed replies are dropped.
    ///
    /// A previously open connection is replaced.
    pub fn connect(&mut self) -> Result<(), Error> {
        let conn = Connection::open(&self.options)?;

        if let State::Connected(old) = mem::replace(&mut self.state, State::Connected(conn)) {
            let _ = old.shutdown();
        }

        self.pending.clear();
        self.completed.clear();
        self.last_critical = None;

        Ok(())
    }

    /// Closes the connection. Closing a client that isn't connected is an error.
    pub fn close(&mut self) -> Result<(), Error> {
        match mem::replace(&mut self.state, State::Disconnected) {
            State::Connected(conn) => Ok(conn.shutdown()?),
            State::Disconnected => Err(Error::NotConnected),
        }
    }

    /// Sends one command and waits for its reply.
    #[instrument(level = "debug", skip(self, args))]
    pub fn cmd<I, A>(&mut self, name: &str, args: I) -> Reply
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        if !self.is_connected() {
            return Reply::Transport(Error::NotConnected);
        }

        let request = Request::new(name, args);
        if let Err(err) = self.write_requests(&[request]) {
            return Reply::Transport(err);
        }

        self.read_reply(true)
    }

    /// Queues a command for the next pipeline flush. Nothing is sent.
    pub fn pipe_append<I, A>(&mut self, name: &str, args: I)
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.pending.push(Request::new(name, args));
    }

    /// Returns the reply to the oldest queued command.
    ///
    /// If no reply is buffered, all queued commands are written in one batch and all their
    /// replies are read before the first one is returned. With nothing queued and nothing
    /// buffered, an [`Error::EmptyPipeline`] reply is returned and the connection is left alone.
    pub fn pipe_resp(&mut self) -> Reply {
        if let Some(reply) = self.completed.pop_front() {
            return reply;
        }

        if self.pending.is_empty() {
            return Reply::Error(Error::EmptyPipeline);
        }

        if !self.is_connected() {
            return Reply::Transport(Error::NotConnected);
        }

        self.flush_pipeline();
        self.pipe_resp()
    }

    #[instrument(level = "debug", skip(self), fields(requests = self.pending.len()))]
    fn flush_pipeline(&mut self) {
        let pending = mem::take(&mut self.pending);

        if let Err(err) = self.write_requests(&pending) {
            self.completed.push_back(Reply::Transport(err));
            return;
        }

        // Every request gets exactly one reply. Once the connection is lost, the rest are
        // reported as not connected rather than being skipped.
        for _ in 0..pending.len() {
            let reply = if self.is_connected() {
                self.read_reply(true)
            } else {
                Reply::Transport(Error::NotConnected)
            };
            self.completed.push_back(reply);
        }
    }

    /// Drops queued commands and unclaimed replies without any I/O. Returns how many of each
    /// were dropped.
    pub fn pipe_clear(&mut self) -> (usize, usize) {
        let counts = (self.pending.len(), self.completed.len());

        self.pending.clear();
        self.completed.clear();

        counts
    }

    /// Sends `<command> GET *` and returns the raw reply, which must be an array of alternating
    /// parameter names and values.
    pub fn get_config(&mut self, command: &str) -> Result<Reply, Error> {
        let reply = self.cmd(command, ["GET", "*"]);

        if let Some(err) = reply.err() {
            return Err(err.clone());
        }
        if !matches!(reply, Reply::Array(_)) {
            return Err(Error::WrongConfigResponse);
        }

        Ok(reply)
    }

    /// Sends `INFO` and returns the raw reply.
    pub fn info(&mut self) -> Reply {
        self.cmd("INFO", crate::args![])
    }

    fn write_requests(&mut self, requests: &[Request]) -> Result<usize, Error> {
        let timeout = self.options.write_timeout;

        let result = match &mut self.state {
            State::Connected(conn) => conn.write_requests(requests, timeout),
            State::Disconnected => return Err(Error::NotConnected),
        };

        result.map_err(|err| {
            let err = Error::from(err);
            self.fail(err.clone());
            err
        })
    }

    /// Reads one reply. A transport error closes the connection, unless `strict` is off and the
    /// error is a timeout.
    fn read_reply(&mut self, strict: bool) -> Reply {
        let timeout = self.options.read_timeout;

        let reply = match &mut self.state {
            State::Connected(conn) => conn.read_reply(timeout),
            State::Disconnected => return Reply::Transport(Error::NotConnected),
        };

        if let Reply::Transport(err) = &reply {
            if strict || !err.is_timeout() {
                self.fail(err.clone());
            } else {
                debug!(error = %err, "read timed out, keeping connection");
            }
        }

        reply
    }

    fn fail(&mut self, err: Error) {
        warn!(error = %err, "closing connection after fatal error");

        if let State::Connected(conn) = mem::replace(&mut self.state, State::Disconnected) {
            // The stream is already broken, a failing shutdown adds nothing.
            let _ = conn.shutdown();
        }

        self.last_critical = Some(err);
    }
}
