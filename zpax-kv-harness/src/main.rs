//! Drives a JSON-scripted test scenario against one or more `zpax-kv-cli`
//! processes, adapted from the teacher's `harness/src/main.rs` (which did
//! the same for `chatroom`'s server binary over a bincode wire format;
//! here the wire format is this crate's JSON request/reply shapes).

mod command;

use std::collections::HashMap;

use clap::Parser;
use futures::{SinkExt, StreamExt};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use command::{Command, Execution};

#[derive(Parser)]
#[command(name = "zpax-kv-harness")]
struct Opt {
    /// Path to the zpax-kv-cli binary to spawn
    #[arg(short = 's', long = "server")]
    server: std::path::PathBuf,

    /// Path to the JSON scenario file
    #[arg(short = 'f', long = "file")]
    file: std::path::PathBuf,
}

/// A spawned replica process, killed when dropped so a scenario never
/// leaks background servers on early exit or panic.
struct Server(std::process::Child);

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.0.kill();
    }
}

impl Server {
    fn spawn(binary: &std::path::Path, uid: &str, config: &std::path::Path) -> std::io::Result<Self> {
        std::process::Command::new(binary)
            .args(["--id", uid])
            .args(["--config", &config.to_string_lossy()])
            .spawn()
            .map(Server)
    }
}

type Connection = Framed<tokio::net::TcpStream, LengthDelimitedCodec>;

#[tokio::main]
async fn main() {
    let opt = Opt::parse();

    let execution: Execution = serde_json::from_reader(std::fs::File::open(&opt.file).expect("could not open scenario file"))
        .expect("could not parse scenario file");

    let mut servers: HashMap<String, Server> = HashMap::new();
    let mut connections: HashMap<String, Connection> = HashMap::new();

    for command in execution.0 {
        println!("executing {command:?}");
        match command {
            Command::Start { uid, config } => {
                let server = Server::spawn(&opt.server, &uid, &config).expect("failed to spawn replica");
                servers.insert(uid, server);
            }
            Command::Connect { uid, addr } => {
                let stream = tokio::net::TcpStream::connect(&addr).await.expect("failed to connect");
                connections.insert(uid, Framed::new(stream, LengthDelimitedCodec::new()));
            }
            Command::Disconnect { uid } => {
                connections.remove(&uid);
            }
            Command::Propose { uid, key, value } => {
                let request = serde_json::json!({ "header_type": "propose_value", "key": key, "value": value });
                send_and_print(&mut connections, &uid, request).await;
            }
            Command::Query { uid, key } => {
                let request = serde_json::json!({ "header_type": "query_value", "key": key });
                send_and_print(&mut connections, &uid, request).await;
            }
            Command::Crash { uid } => {
                servers.remove(&uid);
            }
            Command::Sleep { ms } => {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            }
        }
    }
}

async fn send_and_print(connections: &mut HashMap<String, Connection>, uid: &str, request: serde_json::Value) {
    let Some(connection) = connections.get_mut(uid) else {
        eprintln!("no connection open to {uid}");
        return;
    };
    let bytes = serde_json::to_vec(&request).expect("request did not serialize");
    if let Err(error) = connection.send(bytes::Bytes::from(bytes)).await {
        eprintln!("send to {uid} failed: {error}");
        return;
    }
    match connection.next().await {
        Some(Ok(frame)) => match serde_json::from_slice::<serde_json::Value>(&frame) {
            Ok(reply) => println!("{uid} replied: {reply}"),
            Err(error) => eprintln!("{uid} sent an unparseable reply: {error}"),
        },
        Some(Err(error)) => eprintln!("read from {uid} failed: {error}"),
        None => eprintln!("{uid} closed the connection"),
    }
}
