//! Tiny best-effort send helper shared by the adapter, the FSM and the
//! bootstrap routine. UDP sends essentially never fail in a way this
//! bridge can act on (the kernel buffers or the datagram is dropped on
//! the wire either way) so a failure here is logged, never propagated.
use log::warn;
use std::net::{SocketAddr, UdpSocket};

pub fn send_best_effort(socket: &UdpSocket, addr: SocketAddr, bytes: &[u8]) {
    if let Err(err) = socket.send_to(bytes, addr) {
        if !crate::error::is_transient(&err) {
            warn!("send to {} failed: {}", addr, err);
        }
    }
}

/// Sends one AT frame and, at verbosity>2, logs its exact text — mirroring
/// `arproxy.py`'s `invoke_sdk`, which prints every frame it emits under the
/// same verbosity tier (spec.md §6: "3 + every MAVLink and AT frame").
pub fn send_at_frame(socket: &UdpSocket, addr: SocketAddr, frame: &str, peer_name: &str, verbosity: u8) {
    if verbosity > 2 {
        log::debug!("{} {}", peer_name, frame.trim_end_matches('\r'));
    }
    send_best_effort(socket, addr, frame.as_bytes());
}
