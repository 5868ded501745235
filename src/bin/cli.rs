use std::time::Duration;

use clap::Parser;
use redy::options::{Network, DEFAULT_ADDR};
use redy::{Client, Error, Options};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(about = "Send commands to a RESP server and print the replies")]
struct Args {
    /// Server address as host:port, or a socket path with `--network unix`
    #[arg(short, long, env = "REDIS_ADDR", default_value = DEFAULT_ADDR)]
    addr: String,

    /// Socket kind: tcp or unix
    #[arg(short, long, env = "REDIS_NETWORK", default_value_t = Network::Tcp)]
    network: Network,

    /// Read timeout in milliseconds, 0 waits forever
    #[arg(long, env = "REDIS_READ_TIMEOUT_MS", default_value_t = 0)]
    read_timeout: u64,

    /// Write timeout in milliseconds, 0 waits forever
    #[arg(long, env = "REDIS_WRITE_TIMEOUT_MS", default_value_t = 0)]
    write_timeout: u64,

    /// Connect timeout in milliseconds, 0 waits forever
    #[arg(long, env = "REDIS_DIAL_TIMEOUT_MS", default_value_t = 0)]
    dial_timeout: u64,

    /// Command words. Separate commands with `;` to send them as one pipeline
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let args = Args::parse();

    let options = Options::new(args.addr)
        .with_network(args.network)
        .with_read_timeout(Duration::from_millis(args.read_timeout))
        .with_write_timeout(Duration::from_millis(args.write_timeout))
        .with_dial_timeout(Duration::from_millis(args.dial_timeout));

    let commands = split_commands(&args.command);

    let mut client = Client::new(options);
    client.connect()?;

    if let [(name, rest)] = commands.as_slice() {
        println!("{}", client.cmd(name, rest.iter()));
    } else {
        for (name, rest) in &commands {
            client.pipe_append(name, rest.iter());
        }
        for _ in 0..commands.len() {
            println!("{}", client.pipe_resp());
        }
    }

    match client.last_critical() {
        Some(err) => Err(err.clone()),
        None => client.close(),
    }
}

/// Splits `SET a 1 ; GET a` into `[("SET", ["a", "1"]), ("GET", ["a"])]`. A `;` glued to the end of
/// a word also ends the command.
fn split_commands(words: &[String]) -> Vec<(String, Vec<String>)> {
    let mut commands = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for word in words {
        let (word, ends) = match word.strip_suffix(';') {
            Some(stripped) => (stripped, true),
            None => (word.as_str(), false),
        };

        if !word.is_empty() {
            current.push(word.to_string());
        }
        if ends && !current.is_empty() {
            commands.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        commands.push(current);
    }

    commands
        .into_iter()
        .map(|mut words| {
            let name = words.remove(0);
            (name, words)
        })
        .collect()
}
