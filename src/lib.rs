//! # ardrone-mavlink-bridge
//!
//! Bridges one or more AR.Drone 2.0 quadrotors onto a single MAVLink ground
//! control station endpoint. Each drone is addressed over its vendor AT
//! command / navdata protocol; this crate multiplexes them behind MAVLink
//! so a GCS sees an ordinary fleet of autopilots.
//!
//! The bridge runs as a single-threaded, non-blocking event loop
//! ([`dispatcher::Dispatcher`]) over one shared MAVLink socket plus the
//! shared navdata and AT-command sockets. A [`peer::PeerFSM`]
//! (re-exported from [`fsm`]) arbitrates, per drone, between passing
//! native MAVLink telemetry straight through and diverting GCS commands
//! into AT frames while a [`adapter::NavdataAdapter`] synthesises MAVLink
//! telemetry from the binary navdata stream.
pub mod adapter;
pub mod at;
pub mod bootstrap;
pub mod bundle;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fsm;
pub mod mavio;
pub mod navdata;
pub mod net;
pub mod peer;
pub mod proto;

pub use bootstrap::BootstrapRoutine;
pub use config::Args;
pub use dispatcher::Dispatcher;
pub use error::BridgeError;
pub use peer::PeerTable;
