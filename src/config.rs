//! Command-line surface and peer-map loading.
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::error::ConfigError;
use crate::peer::{PeerRecord, PeerTable};
use crate::proto::{DEFAULT_BIND_HOST, DEFAULT_MAV_PORT, DEFAULT_PEER_FILE};

/// Bridges one or more AR.Drone 2.0 quadcopters onto a single MAVLink
/// ground control station endpoint.
#[derive(Debug, Parser)]
#[command(name = "ardrone-bridge", version)]
pub struct Args {
    /// CSV peer map: `name,ip,synth_port`, one line per drone.
    #[arg(short = 'f', long = "peer-file", value_name = "FILE", default_value = DEFAULT_PEER_FILE)]
    pub peer_file: PathBuf,

    /// UDP port the bridge's single shared MAVLink socket binds to.
    #[arg(short = 'p', long = "port", default_value_t = DEFAULT_MAV_PORT)]
    pub mav_port: u16,

    /// Local address the bridge binds its sockets to. A MAVLink sender
    /// whose source IP matches this host is the ground control station;
    /// any other sender is a drone looked up by IP.
    #[arg(short = 'l', long = "local-host", default_value = DEFAULT_BIND_HOST)]
    pub bind_host: String,

    /// Verbosity: 0 is silent, higher values log more per-frame detail.
    #[arg(short = 'v', long = "verbose", default_value_t = 0)]
    pub verbosity: u8,

    /// Run the one-shot bootstrap routine against a factory-default drone
    /// instead of the bridge's normal event loop.
    #[arg(short = 't', long = "test-mode", default_value_t = false)]
    pub test_mode: bool,
}

/// Loads the headerless `name,ip,synth_port` peer map.
pub fn load_peer_table(path: &Path) -> Result<PeerTable, ConfigError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source: io_error_from_csv(source),
        })?;

    let mut records = Vec::new();
    for (index, result) in reader.deserialize::<PeerRecord>().enumerate() {
        let record = result.map_err(|source| ConfigError::Csv {
            path: path.to_path_buf(),
            record: index,
            source,
        })?;
        records.push(record);
    }

    if records.is_empty() {
        return Err(ConfigError::Empty {
            path: path.to_path_buf(),
        });
    }

    Ok(PeerTable::from_records(records))
}

fn io_error_from_csv(err: csv::Error) -> std::io::Error {
    match err.into_kind() {
        csv::ErrorKind::Io(io_err) => io_err,
        other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
    }
}
