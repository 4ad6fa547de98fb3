//! Scripted test scenario format, adapted from the teacher's
//! `harness::command` (`Start`/`Connect`/`Disconnect`/`Get`/`Put`/`Crash`/
//! `Sleep`) to this crate's request vocabulary (`propose`/`query`
//! replacing `put`/`get`).

use serde_derive::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Execution(pub Vec<Command>);

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Spawn a `zpax-kv-cli` process for replica `uid`, using the shared
    /// cluster config at `config` and its own snapshot file.
    Start { uid: String, config: std::path::PathBuf },

    /// Open a client connection to replica `uid` at `addr` (its
    /// `kv_rep_addr`), so later `Propose`/`Query` commands can target it.
    Connect { uid: String, addr: String },

    /// Close the client connection to replica `uid`.
    Disconnect { uid: String },

    /// Send `ProposeValue { key, value }` to replica `uid`.
    Propose { uid: String, key: String, value: String },

    /// Send `QueryValue { key }` to replica `uid`.
    Query { uid: String, key: String },

    /// Kill replica `uid`'s process.
    Crash { uid: String },

    /// Sleep the harness for `ms` milliseconds.
    Sleep { ms: u64 },
}
