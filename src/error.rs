//! Error taxonomy for the bridge.
//!
//! Most of the named errors in the design are self-healing (the adapter or
//! the FSM reacts to them directly) and never reach here as an `Err`. What
//! `BridgeError` covers is exactly the subset that is fatal: a socket error
//! other than the expected non-blocking/unreachable noise, and a malformed
//! peer configuration.
use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read peer map {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed peer map {path:?} at record {record}: {source}")]
    Csv {
        path: PathBuf,
        record: usize,
        #[source]
        source: csv::Error,
    },
    #[error("peer map {path:?} has no entries")]
    Empty { path: PathBuf },
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("configuration error")]
    Config(#[from] ConfigError),

    #[error("fatal socket error on {socket}")]
    FatalSocket {
        socket: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Classifies a socket error the way spec.md §7 does: transient errors are
/// expected under non-blocking I/O (or from an offline drone sending back
/// ICMP unreachable) and must be swallowed; anything else is fatal.
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::ConnectionRefused
    )
}
