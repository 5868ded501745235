use std::collections::HashMap;
use std::io::{BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use redy::{args, Client, Error, Options, Reply};

type Store = Arc<Mutex<HashMap<Bytes, Bytes>>>;

/// Starts a tiny in-memory server on a random port and returns its address. Every accepted
/// connection is served on its own thread until the client hangs up or sends `QUIT`.
fn start_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let store = Store::default();

    thread::spawn(move || {
        for socket in listener.incoming() {
            let Ok(socket) = socket else { return };
            let store = store.clone();
            thread::spawn(move || serve(socket, store));
        }
    });

    addr
}

fn serve<S: Read + Write>(socket: S, store: Store) {
    let mut reader = BufReader::new(socket);

    while let Ok(request) = redy::frame::parse(&mut reader) {
        let words: Vec<Bytes> = request
            .list_bytes()
            .unwrap()
            .into_iter()
            .map(|word| word.unwrap_or_default())
            .collect();

        let name = String::from_utf8_lossy(&words[0]).to_uppercase();
        let reply = match (name.as_str(), &words[1..]) {
            ("QUIT", _) => return,
            ("PING", []) => Reply::Simple(Bytes::from("PONG")),
            ("ECHO", [message]) => Reply::Bulk(message.clone()),
            ("SLEEP", [ms]) => {
                let ms = String::from_utf8_lossy(ms).parse().unwrap();
                thread::sleep(Duration::from_millis(ms));
                Reply::Simple(Bytes::from("OK"))
            }
            ("SET", [key, value]) => {
                store.lock().unwrap().insert(key.clone(), value.clone());
                Reply::Simple(Bytes::from("OK"))
            }
            ("GET", [key]) => match store.lock().unwrap().get(key) {
                Some(value) => Reply::Bulk(value.clone()),
                None => Reply::Nil,
            },
            ("INCR", [key]) => {
                let mut store = store.lock().unwrap();
                let current = store
                    .get(key)
                    .map(|value| String::from_utf8_lossy(value).parse::<i64>().unwrap())
                    .unwrap_or(0);
                store.insert(key.clone(), Bytes::from((current + 1).to_string()));
                Reply::Integer(current + 1)
            }
            ("RPUSH", [_key, items @ ..]) => Reply::Integer(items.len() as i64),
            ("CONFIG", [_, _]) => Reply::Array(vec![
                Reply::Bulk(Bytes::from("maxmemory")),
                Reply::Bulk(Bytes::from("0")),
                Reply::Bulk(Bytes::from("appendonly")),
                Reply::Bulk(Bytes::from("no")),
            ]),
            ("BADCONFIG", [_, _]) => Reply::Simple(Bytes::from("OK")),
            ("INFO", []) => Reply::Bulk(Bytes::from("# Server\r\nredis_version:7.2.4\r\n")),
            _ => Reply::Error(Error::Server(format!("ERR unknown command '{}'", name))),
        };

        if reader.get_mut().write_all(&reply.serialize()).is_err() {
            return;
        }
    }
}

/// Accepts connections and never reads from them, so writes eventually block.
fn start_silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    thread::spawn(move || {
        let mut sockets: Vec<TcpStream> = Vec::new();
        for socket in listener.incoming() {
            let Ok(socket) = socket else { return };
            sockets.push(socket);
        }
    });

    addr
}

fn connect(addr: &str) -> Client {
    let options = Options::new(addr)
        .with_read_timeout(Duration::from_secs(5))
        .with_write_timeout(Duration::from_secs(5));
    let mut client = Client::new(options);
    client.connect().unwrap();
    client
}

#[test]
fn echo() {
    let addr = start_server();
    let mut client = connect(&addr);

    let reply = client.cmd("ECHO", ["abc"]);
    assert_eq!(reply.str().unwrap(), "abc");
    assert_eq!(reply.to_string(), "Resp(Str \"abc\")");

    client.close().unwrap();
}

#[test]
fn binary_payloads() {
    let addr = start_server();
    let mut client = connect(&addr);
    let mut rng = rand::thread_rng();

    for _ in 0..20 {
        let mut payload = vec![0u8; rng.gen_range(0..16 * 1024)];
        rng.fill(&mut payload[..]);

        let reply = client.cmd("ECHO", [payload.clone()]);
        assert_eq!(reply.bytes().unwrap(), payload);
    }

    client.close().unwrap();
}

#[test]
fn set_get_incr() {
    let addr = start_server();
    let mut client = connect(&addr);

    assert_eq!(client.cmd("SET", args!["counter", 41]).str().unwrap(), "OK");
    assert_eq!(client.cmd("INCR", args!["counter"]).int64().unwrap(), 42);
    assert_eq!(client.cmd("GET", args!["counter"]).int().unwrap(), 42);

    let missing = client.cmd("GET", args!["missing"]);
    assert!(missing.is_nil());
    assert!(matches!(missing.str(), Err(Error::Nil)));

    client.close().unwrap();
}

#[test]
fn server_error_keeps_connection() {
    let addr = start_server();
    let mut client = connect(&addr);

    let reply = client.cmd("NOPE", args![]);
    assert!(matches!(reply.err(), Some(Error::Server(msg)) if msg.starts_with("ERR unknown")));
    assert!(client.is_connected());
    assert!(client.last_critical().is_none());

    assert_eq!(client.cmd("PING", args![]).str().unwrap(), "PONG");
    client.close().unwrap();
}

#[test]
fn nested_args_are_flattened() {
    let addr = start_server();
    let mut client = connect(&addr);

    let reply = client.cmd("RPUSH", args!["list", vec!["a", "b"], vec![1, 2, 3]]);
    assert_eq!(reply.int64().unwrap(), 5);

    client.close().unwrap();
}

#[test]
fn pipeline_preserves_order() {
    let addr = start_server();
    let mut client = connect(&addr);

    for round in 0..3 {
        for i in 0..10 {
            client.pipe_append("ECHO", [format!("{}-{}", round, i)]);
        }
        for i in 0..10 {
            assert_eq!(client.pipe_resp().str().unwrap(), format!("{}-{}", round, i));
        }
        assert!(matches!(client.pipe_resp(), Reply::Error(Error::EmptyPipeline)));
    }

    assert!(client.is_connected());
    client.close().unwrap();
}

#[test]
fn pipeline_mixes_with_single_commands() {
    let addr = start_server();
    let mut client = connect(&addr);

    client.pipe_append("SET", args!["k", "v"]);
    client.pipe_append("GET", args!["k"]);

    // Nothing was sent yet, so the key isn't there.
    assert!(client.cmd("GET", args!["k"]).is_nil());

    assert_eq!(client.pipe_resp().str().unwrap(), "OK");
    assert_eq!(client.cmd("GET", args!["k"]).str().unwrap(), "v");
    assert_eq!(client.pipe_resp().str().unwrap(), "v");

    client.close().unwrap();
}

#[test]
fn pipeline_clear() {
    let addr = start_server();
    let mut client = connect(&addr);

    client.pipe_append("PING", args![]);
    client.pipe_append("PING", args![]);
    client.pipe_append("PING", args![]);
    assert_eq!(client.pipe_clear(), (3, 0));
    assert!(matches!(client.pipe_resp(), Reply::Error(Error::EmptyPipeline)));

    client.pipe_append("ECHO", ["a"]);
    client.pipe_append("ECHO", ["b"]);
    client.pipe_append("ECHO", ["c"]);
    assert_eq!(client.pipe_resp().str().unwrap(), "a");
    assert_eq!(client.pipe_clear(), (0, 2));

    client.close().unwrap();
}

#[test]
fn fatal_error_until_reconnect() {
    let addr = start_server();
    let mut client = connect(&addr);

    let reply = client.cmd("QUIT", args![]);
    assert!(matches!(reply, Reply::Transport(_)));
    assert!(!client.is_connected());
    assert!(client.last_critical().is_some());

    assert!(matches!(client.cmd("PING", args![]), Reply::Transport(Error::NotConnected)));

    client.pipe_append("PING", args![]);
    assert!(matches!(client.pipe_resp(), Reply::Transport(Error::NotConnected)));

    client.connect().unwrap();
    assert!(client.last_critical().is_none());
    assert_eq!(client.pipe_clear(), (0, 0));
    assert_eq!(client.cmd("PING", args![]).str().unwrap(), "PONG");

    client.close().unwrap();
}

#[test]
fn reconnect_after_close() {
    let addr = start_server();
    let mut client = connect(&addr);

    client.cmd("SET", args!["k", "v"]);
    let first = client.connection_id();
    client.close().unwrap();

    assert!(matches!(client.close(), Err(Error::NotConnected)));
    assert!(client.last_critical().is_none());

    client.connect().unwrap();
    assert_ne!(client.connection_id(), first);
    assert_eq!(client.cmd("GET", args!["k"]).str().unwrap(), "v");

    client.close().unwrap();
}

#[test]
fn read_timeout_is_fatal() {
    let addr = start_server();
    let options = Options::new(addr.clone()).with_read_timeout(Duration::from_millis(50));
    let mut client = Client::new(options);
    client.connect().unwrap();

    let reply = client.cmd("SLEEP", args![300]);
    assert!(reply.is_timeout());
    assert!(!client.is_connected());
    assert!(client.last_critical().unwrap().is_timeout());
}

#[test]
fn dial_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let mut client = Client::new(Options::new(addr));
    assert!(matches!(client.connect(), Err(Error::Io(_))));
    assert!(!client.is_connected());
}

#[test]
fn config_and_info() {
    let addr = start_server();
    let mut client = connect(&addr);

    let config = client.get_config("CONFIG").unwrap();
    let values = config.map().unwrap();
    assert_eq!(values["maxmemory"], "0");
    assert_eq!(values["appendonly"], "no");

    assert!(matches!(client.get_config("BADCONFIG"), Err(Error::WrongConfigResponse)));
    assert!(matches!(client.get_config("NOCONFIG"), Err(Error::Server(_))));

    let info = client.info();
    assert!(info.str().unwrap().contains("redis_version:7.2.4"));

    client.close().unwrap();
}

#[test]
fn write_failure_is_fatal() {
    let addr = start_silent_server();
    let options = Options::new(addr).with_write_timeout(Duration::from_millis(100));
    let mut client = Client::new(options);
    // Far more than the socket buffers on both ends can hold.
    let payload = vec![b'x'; 64 * 1024 * 1024];

    client.connect().unwrap();
    let reply = client.cmd("SET", args!["big", payload.clone()]);
    assert!(matches!(reply, Reply::Transport(Error::Io(_))));
    assert!(!client.is_connected());
    assert!(client.last_critical().unwrap().is_timeout());

    client.connect().unwrap();
    client.pipe_append("SET", args!["big", payload]);
    client.pipe_append("PING", args![]);
    client.pipe_append("PING", args![]);

    // A failed batch write yields one reply for the whole batch.
    assert!(matches!(client.pipe_resp(), Reply::Transport(Error::Io(_))));
    assert!(!client.is_connected());
    assert!(client.last_critical().is_some());
    assert!(matches!(client.pipe_resp(), Reply::Error(Error::EmptyPipeline)));
    assert!(matches!(client.cmd("PING", args![]), Reply::Transport(Error::NotConnected)));
}

#[cfg(unix)]
#[test]
fn unix_socket() {
    use std::os::unix::net::UnixListener;

    let path = std::env::temp_dir().join(format!("redy-test-{}.sock", uuid::Uuid::new_v4()));
    let listener = UnixListener::bind(&path).unwrap();
    let store = Store::default();
    thread::spawn(move || {
        for socket in listener.incoming() {
            let Ok(socket) = socket else { return };
            let store = store.clone();
            thread::spawn(move || serve(socket, store));
        }
    });

    let mut client = Client::new(Options::unix(path.to_string_lossy()));
    client.connect().unwrap();

    assert_eq!(client.cmd("SET", args!["k", "v"]).str().unwrap(), "OK");
    client.pipe_append("GET", args!["k"]);
    client.pipe_append("ECHO", ["abc"]);
    assert_eq!(client.pipe_resp().str().unwrap(), "v");
    assert_eq!(client.pipe_resp().str().unwrap(), "abc");

    client.close().unwrap();
    std::fs::remove_file(&path).unwrap();
}
