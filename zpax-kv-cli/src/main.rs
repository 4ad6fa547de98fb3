//! Bootstrap binary: wires the `zpax-kv` engine to a TCP transport and
//! drives it from a single-task event loop (SPEC_FULL.md §5). Logging
//! setup and CLI parsing follow the teacher's `chatroom/src/main.rs`
//! (fern dispatch keyed on a `-v` occurrence count), with `clap`'s
//! derive API standing in for the teacher's `structopt`.

mod driver;
mod error;
mod transport;

use error::CliError;

use std::collections::BTreeSet;
use std::time::Duration;

use clap::Parser;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use zpax_kv::message::{ClientReply, ClientRequest, PeerReply, PeerRequest};
use zpax_kv::{DurableMap, Engine, EngineOptions, Heartbeat};

use crate::driver::SingleNodeDriver;
use crate::transport::TcpTransport;

#[derive(Parser)]
#[command(name = "zpax-kv-cli")]
struct Opt {
    /// This replica's unique ID, matching a `uid` in the cluster config
    #[arg(short = 'i', long = "id")]
    uid: String,

    /// Path to the initial cluster configuration blob (§6.4)
    #[arg(short = 'c', long = "config")]
    config: std::path::PathBuf,

    /// Path to a snapshot file for durable storage; omit for in-memory only
    #[arg(short = 's', long = "snapshot")]
    snapshot: Option<std::path::PathBuf>,

    /// Heartbeat period, in milliseconds
    #[arg(short = 't', long = "heartbeat-ms", default_value_t = 1000)]
    heartbeat_ms: u64,

    /// Logging verbosity (repeat for more)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbosity: u8,
}

fn init_logging(uid: &str, verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let uid = uid.to_string();
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!("[{}][{}][{}]: {}", uid, record.level(), record.target(), message))
        })
        .level_for("zpax_kv", level)
        .level_for("zpax_kv_cli", level)
        .level_for("tokio_util", log::LevelFilter::Off)
        .level_for("mio", log::LevelFilter::Off)
        .chain(std::io::stdout())
        .apply()
        .expect("logging already initialized");
}

#[tokio::main]
async fn main() {
    let opt = Opt::parse();
    init_logging(&opt.uid, opt.verbosity);

    let config_blob = std::fs::read_to_string(&opt.config).expect("could not read config file");

    let map = match &opt.snapshot {
        Some(path) => DurableMap::with_snapshot(path).expect("could not open snapshot file"),
        None => DurableMap::in_memory(),
    };

    let (tx_commands, mut rx_commands) = mpsc::unbounded_channel();
    let mut engine: Engine<SingleNodeDriver> = Engine::new(
        opt.uid.clone(),
        SingleNodeDriver::default(),
        map,
        EngineOptions::default(),
    )
    .with_transport(TcpTransport::new(tx_commands));

    if engine.durable_map().get(zpax_kv::CONFIG_KEY).is_none() {
        engine.initialize(&config_blob).expect("bootstrap failed");
    }

    let mut reply_listener: Option<tokio::net::TcpListener> = None;
    let mut peer_addrs: BTreeSet<String> = BTreeSet::new();
    let mut heartbeat_timer = tokio::time::interval(Duration::from_millis(opt.heartbeat_ms));

    log::info!("replica {} starting event loop", engine.uid());

    loop {
        let retry_sleep = match engine.catchup_state().retry_deadline() {
            Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)),
            None => tokio::time::sleep(Duration::from_secs(3600)),
        };
        tokio::pin!(retry_sleep);

        // `accept(&reply_listener)` borrows `reply_listener` for the
        // whole select!, so no arm below may mutate it directly; a
        // rebind is staged here and applied once the select! returns.
        let mut rebind: Option<String> = None;

        tokio::select! {
            Some(command) = rx_commands.recv() => {
                match command {
                    transport::TransportCommand::RebindReply(addr) => rebind = Some(addr),
                    transport::TransportCommand::ReconnectPeers(addrs) => {
                        log::info!("reconnecting peer fan-out to {} peers", addrs.len());
                        peer_addrs = addrs;
                    }
                }
            }

            Ok((stream, _)) = accept(&reply_listener) => {
                if let Err(error) = handle_connection(stream, &mut engine, &mut peer_addrs).await {
                    log::warn!("[{}] connection error: {error}", engine.uid());
                }
            }

            _ = heartbeat_timer.tick() => {
                broadcast_heartbeat(&engine.heartbeat_payload(), &peer_addrs).await;
            }

            _ = &mut retry_sleep, if engine.catchup_state().retry_deadline().is_some() => {
                if let Some(request) = engine.catchup_retry_fired() {
                    send_catchup_request(request, &peer_addrs, &mut engine).await;
                }
            }
        }

        if let Some(addr) = rebind {
            match transport::bind(&addr).await {
                Ok(listener) => {
                    log::info!("rebound reply socket to {addr}");
                    reply_listener = Some(listener);
                }
                Err(error) => log::error!("failed to bind reply socket at {addr}: {error}"),
            }
        }

        // The driver surfaces resolved proposals (and any heartbeat /
        // behind-in-sequence events it raises itself) as queued events
        // rather than calling back into the engine directly; drain them
        // once per tick so a resolved write actually reaches the Durable
        // Map instead of sitting in the driver forever.
        for request in engine.drain_driver_events() {
            send_catchup_request(request, &peer_addrs, &mut engine).await;
        }
    }
}

/// `select!` needs a future even when there's no listener bound yet;
/// this stays pending forever in that case rather than erroring.
async fn accept(listener: &Option<tokio::net::TcpListener>) -> std::io::Result<(tokio::net::TcpStream, std::net::SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

/// Reads exactly one request frame off `stream`, dispatches it, and
/// writes back the reply. Connections are handled one at a time on the
/// event loop's own task rather than spawned, since nothing in the core
/// may be driven from more than one place at once (§5).
async fn handle_connection(
    stream: tokio::net::TcpStream,
    engine: &mut Engine<SingleNodeDriver>,
    peer_addrs: &mut BTreeSet<String>,
) -> Result<(), CliError> {
    let mut codec = transport::value_codec(stream);
    let value = match codec.next().await {
        Some(value) => value?,
        None => return Ok(()),
    };

    let header_type = value.get("header_type").and_then(serde_json::Value::as_str).unwrap_or("");

    let reply = match header_type {
        "propose_value" | "query_value" => {
            let request: ClientRequest = serde_json::from_value(value)?;
            let reply = handle_client_request(request, engine);
            Some(serde_json::to_value(reply)?)
        }
        "catchup_request" => {
            let request: PeerRequest = serde_json::from_value(value)?;
            let PeerRequest::CatchupRequest { last_known_seq } = request;
            Some(serde_json::to_value(engine.catchup_request_handler(last_known_seq))?)
        }
        "heartbeat" => {
            let heartbeat: Heartbeat = serde_json::from_value(value)?;
            if let Some(request) = engine.on_heartbeat(heartbeat) {
                send_catchup_request(request, peer_addrs, engine).await;
            }
            None
        }
        other => {
            log::warn!("[{}] dropping message with unknown header_type {other:?}", engine.uid());
            None
        }
    };

    if let Some(reply) = reply {
        codec.send(reply).await?;
    }
    Ok(())
}

fn handle_client_request(request: ClientRequest, engine: &mut Engine<SingleNodeDriver>) -> ClientReply {
    match request {
        ClientRequest::ProposeValue { key, value } => match engine.propose(&key, &value) {
            Ok(outcome) => ClientReply::Proposed {
                proposed: outcome.proposed,
                message: outcome.message,
            },
            Err(error) => ClientReply::Denied { error: error.to_string() },
        },
        ClientRequest::QueryValue { key } => match engine.query(&key) {
            Ok(value) => ClientReply::Value { value },
            Err(error) => ClientReply::Denied { error: error.to_string() },
        },
    }
}

async fn broadcast_heartbeat(heartbeat: &Heartbeat, peer_addrs: &BTreeSet<String>) {
    for addr in peer_addrs {
        let payload = serde_json::json!({ "header_type": "heartbeat", "seq_num": heartbeat.seq_num });
        if let Err(error) = send_one_way(addr, &payload).await {
            log::debug!("heartbeat to {addr} failed: {error}");
        }
    }
}

async fn send_catchup_request(
    request: PeerRequest,
    peer_addrs: &BTreeSet<String>,
    engine: &mut Engine<SingleNodeDriver>,
) {
    let Some(addr) = peer_addrs.iter().next() else {
        log::warn!("[{}] no peers to catch up from", engine.uid());
        return;
    };
    match send_and_receive(addr, &request).await {
        Ok(reply) => {
            let PeerReply::CatchupData { from_seq, key_val_seq_list } = reply;
            if let Err(error) = engine.on_catchup_data(from_seq, key_val_seq_list) {
                log::warn!("[{}] discarded catch-up reply: {error}", engine.uid());
            }
        }
        Err(error) => log::warn!("[{}] catch-up request to {addr} failed: {error}", engine.uid()),
    }
}

async fn send_one_way(addr: &str, payload: &serde_json::Value) -> Result<(), CliError> {
    let stream = transport::connect(addr).await?;
    let mut codec = transport::value_codec(stream);
    codec.send(payload.clone()).await?;
    Ok(())
}

async fn send_and_receive(addr: &str, request: &PeerRequest) -> Result<PeerReply, CliError> {
    let stream = transport::connect(addr).await?;
    let mut codec = transport::value_codec(stream);
    codec.send(serde_json::to_value(request)?).await?;
    let value = codec
        .next()
        .await
        .ok_or_else(|| CliError::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "peer closed connection")))??;
    Ok(serde_json::from_value(value)?)
}
