//! The event loop (spec.md §5): one cooperative, single-threaded pass over
//! a single shared MAVLink socket plus the shared navdata socket, in a
//! fixed read order, every tick. The AT socket is shared too, but it is
//! write-only — nothing in the loop ever reads from it.
//!
//! There is exactly one MAVLink-facing UDP socket for the whole bridge,
//! bound to `bind_host:mav_port`. A datagram's sender tells the dispatcher
//! who it's from: if the sender's IP is `bind_host` itself, it's the GCS,
//! and the peer it's addressing is found by matching the sender's own
//! source port against `PeerTable::lookup_by_port` (the CSV's
//! `synth_port`, the port the GCS uses to speak to that one drone through
//! the bridge's single endpoint). Any other sender IP is a drone, looked
//! up by `PeerTable::lookup_by_ip`.
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use mavlink::common::MavMessage;
use mavlink::MavHeader;

use crate::adapter::NavdataAdapter;
use crate::error::{is_transient, BridgeError};
use crate::fsm::PeerFSM;
use crate::mavio::{self, DecodedFrame};
use crate::navdata;
use crate::net::send_best_effort;
use crate::peer::{Peer, PeerTable};
use crate::proto::NAVDATA_PORT;

const READ_BUF_LEN: usize = 4096;
const IDLE_SLEEP: Duration = Duration::from_millis(5);

pub struct Dispatcher {
    peers: PeerTable,
    bind_host: Ipv4Addr,
    mav_socket: UdpSocket,
    navdata_socket: UdpSocket,
    at_socket: UdpSocket,
    repeat: u32,
    verbosity: u8,
}

impl Dispatcher {
    pub fn new(
        peers: PeerTable,
        bind_host: Ipv4Addr,
        mav_port: u16,
        repeat: u32,
        verbosity: u8,
    ) -> Result<Dispatcher, BridgeError> {
        let mav_socket = bind_nonblocking((bind_host, mav_port), "mavlink")?;
        let navdata_socket = bind_nonblocking((bind_host, NAVDATA_PORT), "navdata")?;
        let at_socket = bind_nonblocking((bind_host, 0), "at")?;

        Ok(Dispatcher {
            peers,
            bind_host,
            mav_socket,
            navdata_socket,
            at_socket,
            repeat,
            verbosity,
        })
    }

    fn gcs_addr(&self, peer: &Peer) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.bind_host), peer.synth_port)
    }

    /// Blocks until the first MAVLink HEARTBEAT arrives on the ingress
    /// socket. Spec.md §5 treats this initial handshake as the one place
    /// the bridge is allowed to block.
    pub fn wait_heartbeat(&mut self) -> Result<(), BridgeError> {
        let mut buf = [0u8; READ_BUF_LEN];
        loop {
            match self.mav_socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    if let DecodedFrame::Frame(header, msg) = mavio::decode(&buf[..len]) {
                        let is_heartbeat = matches!(msg, MavMessage::HEARTBEAT(_));
                        self.route_mav_frame(header, msg, from);
                        if is_heartbeat {
                            return Ok(());
                        }
                    }
                }
                Err(err) if is_transient(&err) => std::thread::sleep(IDLE_SLEEP),
                Err(err) => {
                    return Err(BridgeError::FatalSocket {
                        socket: "mavlink",
                        source: err,
                    })
                }
            }
        }
    }

    /// Runs the loop forever. Only returns on a fatal socket error.
    pub fn run(&mut self) -> Result<(), BridgeError> {
        let mut buf = [0u8; READ_BUF_LEN];
        loop {
            let mut did_work = self.poll_mav(&mut buf)?;
            did_work |= self.poll_navdata(&mut buf)?;

            if !did_work {
                std::thread::sleep(IDLE_SLEEP);
            }
        }
    }

    fn poll_mav(&mut self, buf: &mut [u8]) -> Result<bool, BridgeError> {
        match self.mav_socket.recv_from(buf) {
            Ok((len, from)) => {
                match mavio::decode(&buf[..len]) {
                    DecodedFrame::Frame(header, msg) => self.route_mav_frame(header, msg, from),
                    DecodedFrame::BadData(raw) => log_bad_data("mavlink", &raw),
                }
                Ok(true)
            }
            Err(err) if is_transient(&err) => Ok(false),
            Err(err) => Err(BridgeError::FatalSocket {
                socket: "mavlink",
                source: err,
            }),
        }
    }

    /// Dispatches one already-decoded MAVLink frame to the peer it belongs
    /// to, per spec.md §4.5's sender-address routing rule.
    fn route_mav_frame(&self, header: MavHeader, msg: MavMessage, from: SocketAddr) {
        let is_gcs = matches!(from.ip(), IpAddr::V4(v4) if v4 == self.bind_host);

        if is_gcs {
            let Some(peer) = self.peers.lookup_by_port(from.port()) else {
                log::warn!("MAVLink frame from GCS port {} has no matching peer", from.port());
                return;
            };
            PeerFSM::on_gcs_frame(
                &peer,
                header,
                msg,
                &self.mav_socket,
                &self.navdata_socket,
                &self.at_socket,
                self.repeat,
                self.verbosity,
            );
        } else {
            let IpAddr::V4(ip) = from.ip() else {
                log::warn!("MAVLink frame from IPv6 sender {from}, no IPv4 peer can match it");
                return;
            };
            let Some(peer) = self.peers.lookup_by_ip(&ip) else {
                log::warn!("MAVLink frame from unknown sender {from}");
                return;
            };
            let gcs_addr = self.gcs_addr(&peer.borrow());
            PeerFSM::on_drone_frame(&peer, header, msg, from, gcs_addr, &self.mav_socket, self.verbosity);
        }
    }

    fn poll_navdata(&mut self, buf: &mut [u8]) -> Result<bool, BridgeError> {
        match self.navdata_socket.recv_from(buf) {
            Ok((len, from)) => {
                let ip = match from.ip() {
                    IpAddr::V4(v4) => v4,
                    IpAddr::V6(_) => return Ok(true),
                };
                let Some(peer) = self.peers.lookup_by_ip(&ip) else {
                    log::warn!("navdata from unknown sender {}", from);
                    return Ok(true);
                };
                match navdata::decode(&buf[..len]) {
                    Ok(frame) => {
                        if let Some(bundle) = NavdataAdapter::on_frame(
                            &peer,
                            frame,
                            Instant::now(),
                            &self.at_socket,
                            self.repeat,
                            self.verbosity,
                        ) {
                            let gcs_addr = self.gcs_addr(&peer.borrow());
                            emit_bundle(&self.mav_socket, gcs_addr, bundle);
                        }
                    }
                    Err(err) => {
                        if self.verbosity > 0 {
                            log::info!("unparsable navdata frame from {}: {}", from, err);
                        }
                    }
                }
                Ok(true)
            }
            Err(err) if is_transient(&err) => Ok(false),
            Err(err) => Err(BridgeError::FatalSocket {
                socket: "navdata",
                source: err,
            }),
        }
    }
}

fn emit_bundle(mav_socket: &UdpSocket, gcs_addr: SocketAddr, bundle: [MavMessage; 6]) {
    for (index, msg) in bundle.into_iter().enumerate() {
        let header = MavHeader {
            system_id: 1,
            component_id: 1,
            sequence: index as u8,
        };
        let bytes = mavio::pack(header, &msg);
        send_best_effort(mav_socket, gcs_addr, &bytes);
    }
}

fn bind_nonblocking<A: std::net::ToSocketAddrs>(addr: A, name: &'static str) -> Result<UdpSocket, BridgeError> {
    let socket = UdpSocket::bind(addr).map_err(|source| BridgeError::FatalSocket { socket: name, source })?;
    socket
        .set_nonblocking(true)
        .map_err(|source| BridgeError::FatalSocket { socket: name, source })?;
    Ok(socket)
}

fn log_bad_data(socket: &str, raw: &[u8]) {
    if mavio::is_printable(raw) {
        println!("BAD_DATA[{}]: {}", socket, String::from_utf8_lossy(raw));
    } else {
        log::debug!("BAD_DATA[{}]: {} bytes", socket, raw.len());
    }
}
