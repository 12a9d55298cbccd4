//! One-shot bootstrap routine (spec.md §4.6) for bringing a factory-default
//! drone onto the navdata demo stream before it has a peer-map entry to its
//! name. Run with `-t`, against the drone's fixed factory address rather
//! than through the normal per-peer dispatch.
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use crate::at::{AtEncoder, NAVDATA_REQUEST_PACKET};
use crate::error::{is_transient, BridgeError};
use crate::navdata;
use crate::proto::{BOOTSTRAP_COMMAND_LIMIT, FACTORY_DRONE_IP, NAVDATA_PORT};

const POLL_IDLE: Duration = Duration::from_millis(20);

/// What to send in response to one received frame, per spec.md §4.6's
/// three checks: request demo mode (command mask clear, or demo mask
/// hasn't caught up to it yet), and re-request the option mask once demo
/// mode is up but the GPS block hasn't arrived. Both can fire for the same
/// frame. Pure so the decision table is testable without a socket.
fn decide(state: navdata::ArdroneState, has_gps: bool) -> (bool, bool) {
    let demo_mask = state.demo_mask();
    let send_demo = !state.command_mask() || !demo_mask;
    let send_options = demo_mask && !has_gps;
    (send_demo, send_options)
}

pub struct BootstrapRoutine {
    navdata_socket: UdpSocket,
    at_socket: UdpSocket,
    drone_addr: SocketAddr,
    at_addr: SocketAddr,
    repeat: u32,
    verbosity: u8,
}

impl BootstrapRoutine {
    pub fn new(repeat: u32, verbosity: u8) -> Result<BootstrapRoutine, BridgeError> {
        let navdata_socket =
            UdpSocket::bind(("0.0.0.0", NAVDATA_PORT)).map_err(|source| BridgeError::FatalSocket {
                socket: "navdata",
                source,
            })?;
        navdata_socket
            .set_nonblocking(true)
            .map_err(|source| BridgeError::FatalSocket {
                socket: "navdata",
                source,
            })?;
        let at_socket = UdpSocket::bind("0.0.0.0:0").map_err(|source| BridgeError::FatalSocket {
            socket: "at",
            source,
        })?;
        at_socket
            .set_nonblocking(true)
            .map_err(|source| BridgeError::FatalSocket {
                socket: "at",
                source,
            })?;

        let drone_addr = SocketAddr::new(FACTORY_DRONE_IP.into(), NAVDATA_PORT);
        let at_addr = SocketAddr::new(FACTORY_DRONE_IP.into(), crate::proto::AT_PORT);

        Ok(BootstrapRoutine {
            navdata_socket,
            at_socket,
            drone_addr,
            at_addr,
            repeat: repeat.max(1),
            verbosity,
        })
    }

    /// Drives the handshake to completion: init the stream, request the
    /// option blocks, then on each received frame walk the three checks
    /// spec.md §4.6 lists in order (demo-mode request, demo-mode re-request,
    /// options re-request) until `BOOTSTRAP_COMMAND_LIMIT` commands have
    /// been spent, at which point it tells the drone to leave demo mode and
    /// halts. Returns whether the demo mask was ever observed set.
    pub fn run(&self) -> Result<bool, BridgeError> {
        crate::net::send_best_effort(&self.navdata_socket, self.drone_addr, &NAVDATA_REQUEST_PACKET);

        let mut seq: u32 = 1;
        self.send_repeated(&mut seq, AtEncoder::navdata_options);

        let mut commands_sent = self.repeat;
        let mut demo_ever_seen = false;
        let mut buf = [0u8; 4096];

        loop {
            match self.navdata_socket.recv_from(&mut buf) {
                Ok((len, _from)) => {
                    let frame = match navdata::decode(&buf[..len]) {
                        Ok(frame) => frame,
                        Err(err) => {
                            if self.verbosity > 0 {
                                log::info!("bootstrap: unparsable navdata frame: {err}");
                            }
                            continue;
                        }
                    };

                    demo_ever_seen |= frame.ardrone_state.demo_mask();
                    let (send_demo, send_options) = decide(frame.ardrone_state, frame.gps.is_some());

                    if send_demo {
                        self.send_repeated(&mut seq, AtEncoder::navdata_command);
                        commands_sent += self.repeat;
                    }
                    if send_options {
                        self.send_repeated(&mut seq, AtEncoder::navdata_options);
                        commands_sent += self.repeat;
                    }

                    if commands_sent >= BOOTSTRAP_COMMAND_LIMIT {
                        log::warn!("bootstrap: command limit reached, telling drone to leave demo mode");
                        self.send_repeated(&mut seq, AtEncoder::navdata_command_off);
                        return Ok(demo_ever_seen);
                    }
                }
                Err(err) if is_transient(&err) => {
                    std::thread::sleep(POLL_IDLE);
                }
                Err(err) => {
                    return Err(map_fatal(err));
                }
            }
        }
    }

    fn send_repeated(&self, seq: &mut u32, fmt: impl FnMut(u32) -> String) {
        for frame in AtEncoder::repeat_frames(*seq, self.repeat, fmt) {
            crate::net::send_at_frame(&self.at_socket, self.at_addr, &frame, "bootstrap", self.verbosity);
        }
        *seq += self.repeat;
    }
}

fn map_fatal(source: io::Error) -> BridgeError {
    BridgeError::FatalSocket {
        socket: "navdata",
        source,
    }
}
