//! Per-drone state: the `Peer` record and the dual-indexed `PeerTable` that
//! owns it.
//!
//! The table is an arena plus two index maps of shared handles (design
//! note in SPEC_FULL.md §9): one `Peer` is referenced both by its drone IP
//! and by the synthetic GCS-facing port, but it only ever lives in one
//! place — the arena `Vec`. `Rc<RefCell<_>>` is enough here since the whole
//! bridge runs on a single thread (§5).
use std::cell::RefCell;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Rc;
use std::time::Instant;

/// Steady state of a peer's mode machine. There is no terminal state:
/// peers live for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    NoLink,
    Autopilot,
    Manual,
}

/// MAVLink metadata cached from the last HEARTBEAT/MISSION_CURRENT the
/// drone's own autopilot sent, reused when synthesising telemetry.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachedMeta {
    pub base_mode: mavlink::common::MavModeFlag,
    pub custom_mode: u32,
    pub system_status: mavlink::common::MavState,
    pub mission_seq: u16,
}

#[derive(Debug)]
pub struct Peer {
    pub name: String,
    pub ip: Ipv4Addr,
    pub synth_port: u16,

    pub last_drone_addr: Option<SocketAddr>,
    pub mode: Mode,

    /// Monotonically increasing AT sequence number. Starts at 1; never
    /// reset for the life of the peer.
    at_seq: u32,

    pub last_mavlink_from_drone: Option<Instant>,
    pub last_synth_emit: Option<Instant>,
    pub last_navdata_request: Option<Instant>,
    pub demo_fail_since: Option<Instant>,

    pub cached: CachedMeta,
}

impl Peer {
    fn new(name: String, ip: Ipv4Addr, synth_port: u16) -> Peer {
        Peer {
            name,
            ip,
            synth_port,
            last_drone_addr: None,
            mode: Mode::NoLink,
            at_seq: 1,
            last_mavlink_from_drone: None,
            last_synth_emit: None,
            last_navdata_request: None,
            demo_fail_since: None,
            cached: CachedMeta::default(),
        }
    }

    /// Hands out the next `repeat` AT sequence numbers and advances the
    /// counter past them. Returns the first of the block; the caller sends
    /// one frame per value in `first..first + repeat`.
    pub fn reserve_at_seq(&mut self, repeat: u32) -> u32 {
        let first = self.at_seq;
        self.at_seq = self.at_seq.saturating_add(repeat.max(1));
        first
    }

    #[cfg(test)]
    pub fn at_seq(&self) -> u32 {
        self.at_seq
    }
}

/// One record of the CSV peer map: `name,ip,synth_port`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PeerRecord {
    pub name: String,
    pub ip: Ipv4Addr,
    pub synth_port: u16,
}

pub struct PeerTable {
    arena: Vec<Rc<RefCell<Peer>>>,
    by_ip: HashMap<Ipv4Addr, Rc<RefCell<Peer>>>,
    by_port: HashMap<u16, Rc<RefCell<Peer>>>,
}

impl PeerTable {
    pub fn from_records<I: IntoIterator<Item = PeerRecord>>(records: I) -> PeerTable {
        let mut arena = Vec::new();
        let mut by_ip = HashMap::new();
        let mut by_port = HashMap::new();

        for record in records {
            let peer = Rc::new(RefCell::new(Peer::new(
                record.name,
                record.ip,
                record.synth_port,
            )));
            by_ip.insert(record.ip, Rc::clone(&peer));
            by_port.insert(record.synth_port, Rc::clone(&peer));
            arena.push(peer);
        }

        PeerTable {
            arena,
            by_ip,
            by_port,
        }
    }

    pub fn lookup_by_ip(&self, ip: &Ipv4Addr) -> Option<Rc<RefCell<Peer>>> {
        self.by_ip.get(ip).cloned()
    }

    pub fn lookup_by_port(&self, port: u16) -> Option<Rc<RefCell<Peer>>> {
        self.by_port.get(&port).cloned()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<RefCell<Peer>>> {
        self.arena.iter()
    }
}
