//! Navdata-driven telemetry synthesis and stream self-healing
//! (spec.md §4.3).
//!
//! `NavdataAdapter` decides, for every decoded navdata frame, whether to
//! drop it (the burst right after a stream reinit), re-request the option
//! blocks it's missing, emit a synthesised MAVLink bundle, or escalate a
//! prolonged demo-mask outage back to Autopilot. It never reads a socket
//! itself — the dispatcher hands it an already-decoded frame.
use std::cell::RefCell;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::rc::Rc;
use std::time::Instant;

use mavlink::common::MavMessage;

use crate::at::AtEncoder;
use crate::navdata::NavdataFrame;
use crate::net::send_at_frame;
use crate::peer::{Mode, Peer};
use crate::proto::{AT_PORT, DEMO_STALL_TIMEOUT, MAV_INTERVAL, NAVDATA_DAMPEN};

pub struct NavdataAdapter;

impl NavdataAdapter {
    /// Processes one decoded navdata frame for `peer`. Returns the
    /// synthesised bundle when this frame earned one.
    pub fn on_frame(
        peer: &Rc<RefCell<Peer>>,
        frame: NavdataFrame,
        now: Instant,
        at_socket: &UdpSocket,
        repeat: u32,
        verbosity: u8,
    ) -> Option<[MavMessage; 6]> {
        let mut p = peer.borrow_mut();

        if let Some(requested_at) = p.last_navdata_request {
            if now.duration_since(requested_at) < NAVDATA_DAMPEN {
                return None;
            }
        }

        let at_addr = SocketAddr::new(IpAddr::V4(p.ip), AT_PORT);

        if frame.ardrone_state.demo_mask() {
            p.demo_fail_since = None;
            if !frame.has_required_options() {
                if verbosity > 2 {
                    log::info!("{}: No NAVDATA", p.name);
                }
                reissue_options(&mut p, at_socket, at_addr, repeat, verbosity);
                return None;
            }
            let due = p
                .last_synth_emit
                .map_or(true, |last| now.duration_since(last) >= MAV_INTERVAL);
            if !due {
                return None;
            }
            let bundle = crate::bundle::build_bundle(&p.cached, &frame);
            p.last_synth_emit = Some(now);
            if verbosity > 2 {
                log::info!("{}: Make MAVLink", p.name);
            }
            Some(bundle)
        } else {
            if p.demo_fail_since.is_none() {
                p.demo_fail_since = Some(now);
            }
            if let Some(since) = p.demo_fail_since {
                if now.duration_since(since) > DEMO_STALL_TIMEOUT && p.mode == Mode::Manual {
                    log::warn!(
                        "{}: navdata demo mask gone for more than 2s, forcing Autopilot",
                        p.name
                    );
                    p.mode = Mode::Autopilot;
                }
            }
            log::info!("{}: navdata demo mask gone wrong", p.name);
            reissue_options(&mut p, at_socket, at_addr, repeat, verbosity);
            None
        }
    }
}

/// Issues the NAVDATA_COMMAND / NAVDATA_OPTIONS / ACK triple the adapter
/// falls back on whenever the demo stream is missing blocks or has
/// dropped out entirely.
fn reissue_options(
    peer: &mut Peer,
    at_socket: &UdpSocket,
    at_addr: SocketAddr,
    repeat: u32,
    verbosity: u8,
) {
    let seq = peer.reserve_at_seq(repeat);
    for frame in AtEncoder::repeat_frames(seq, repeat, AtEncoder::navdata_command) {
        send_at_frame(at_socket, at_addr, &frame, &peer.name, verbosity);
    }
    let seq = peer.reserve_at_seq(repeat);
    for frame in AtEncoder::repeat_frames(seq, repeat, AtEncoder::navdata_options) {
        send_at_frame(at_socket, at_addr, &frame, &peer.name, verbosity);
    }
    let seq = peer.reserve_at_seq(repeat);
    for frame in AtEncoder::repeat_frames(seq, repeat, AtEncoder::ack) {
        send_at_frame(at_socket, at_addr, &frame, &peer.name, verbosity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navdata::testsupport::{build, FakeDemo, FakeGps};
    use crate::peer::PeerRecord;
    use crate::peer::PeerTable;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn table() -> PeerTable {
        PeerTable::from_records(vec![PeerRecord {
            name: "drone1".into(),
            ip: Ipv4Addr::new(127, 0, 0, 1),
            synth_port: 14551,
        }])
    }

    fn at_socket() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").unwrap()
    }

    fn healthy_frame(battery: i32) -> NavdataFrame {
        let packet = build(
            crate::proto::ARDRONE_NAVDATA_DEMO_MASK,
            Some(FakeDemo {
                phi: 0,
                theta: 0,
                psi: 0,
                altitude: 0,
                vx: 0.0,
                vy: 0.0,
                vz: 0.0,
                battery,
            }),
            Some(FakeGps {
                latitude: 0.0,
                longitude: 0.0,
                elevation: 0.0,
                hdop: 0.0,
                vdop: 0.0,
                speed: 0.0,
                degree: 0.0,
                last_frame_time: 0.0,
            }),
            Some(0),
        );
        crate::navdata::decode(&packet).unwrap()
    }

    #[test]
    fn healthy_frame_emits_exactly_once_within_the_interval() {
        let table = table();
        let peer = table.lookup_by_ip(&Ipv4Addr::new(127, 0, 0, 1)).unwrap();
        let sock = at_socket();
        let start = Instant::now();

        let mut emitted = 0;
        for i in 0..10 {
            let now = start + Duration::from_millis(10 * i);
            if NavdataAdapter::on_frame(&peer, healthy_frame(80), now, &sock, 1, 0).is_some() {
                emitted += 1;
            }
        }
        assert_eq!(emitted, 1);
    }

    #[test]
    fn dampening_drops_frames_right_after_a_navdata_request() {
        let table = table();
        let peer = table.lookup_by_ip(&Ipv4Addr::new(127, 0, 0, 1)).unwrap();
        let sock = at_socket();
        let now = Instant::now();
        peer.borrow_mut().last_navdata_request = Some(now);

        let result = NavdataAdapter::on_frame(&peer, healthy_frame(80), now, &sock, 1, 0);
        assert!(result.is_none());
    }

    #[test]
    fn missing_required_blocks_reissues_options_without_emitting() {
        let table = table();
        let peer = table.lookup_by_ip(&Ipv4Addr::new(127, 0, 0, 1)).unwrap();
        let sock = at_socket();
        let packet = build(crate::proto::ARDRONE_NAVDATA_DEMO_MASK, None, None, None);
        let frame = crate::navdata::decode(&packet).unwrap();

        let seq_before = peer.borrow().at_seq();
        let result = NavdataAdapter::on_frame(&peer, frame, Instant::now(), &sock, 1, 0);
        assert!(result.is_none());
        assert!(peer.borrow().at_seq() > seq_before);
    }

    #[test]
    fn demo_stall_past_two_seconds_forces_autopilot() {
        let table = table();
        let peer = table.lookup_by_ip(&Ipv4Addr::new(127, 0, 0, 1)).unwrap();
        peer.borrow_mut().mode = Mode::Manual;
        let sock = at_socket();

        let packet = build(0, None, None, None);
        let frame = crate::navdata::decode(&packet).unwrap();
        let t0 = Instant::now();
        NavdataAdapter::on_frame(&peer, frame.clone(), t0, &sock, 1, 0);
        assert_eq!(peer.borrow().mode, Mode::Manual);

        let later = t0 + Duration::from_millis(2100);
        NavdataAdapter::on_frame(&peer, frame, later, &sock, 1, 0);
        assert_eq!(peer.borrow().mode, Mode::Autopilot);
    }
}
