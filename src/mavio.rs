//! Thin wrapper over the `mavlink` crate's codec, isolating the rest of
//! the bridge from its exact API surface. Exposes exactly the collaborator
//! interface spec.md §6 asks for: `decode(bytes) -> Frame | BadData` and
//! `pack(header, message) -> bytes`.
use mavlink::common::MavMessage;
use mavlink::MavHeader;
use std::io::Cursor;

pub enum DecodedFrame {
    Frame(MavHeader, MavMessage),
    /// The codec rejected the datagram (bad CRC, unknown message id,
    /// truncated payload, …). Carries the raw bytes so the dispatcher can
    /// apply the "printable payload goes to stdout" debug rule.
    BadData(Vec<u8>),
}

/// Decodes one UDP datagram, which is expected to hold exactly one framed
/// MAVLink message (true for every sender on this link: the GCS and every
/// drone autopilot each send one frame per packet).
pub fn decode(packet: &[u8]) -> DecodedFrame {
    let mut cursor = Cursor::new(packet);
    match mavlink::read_v2_msg::<MavMessage, _>(&mut cursor) {
        Ok((header, msg)) => DecodedFrame::Frame(header, msg),
        Err(_) => DecodedFrame::BadData(packet.to_vec()),
    }
}

/// Serialises a message for transmission, MAVLink v2 framed.
pub fn pack(header: MavHeader, msg: &MavMessage) -> Vec<u8> {
    let mut buf = Vec::new();
    mavlink::write_v2_msg(&mut buf, header, msg).expect("in-memory write never fails");
    buf
}

/// A printable ASCII/UTF-8 payload, as opposed to raw binary noise. Used
/// to decide whether a `BAD_DATA` frame is worth echoing to stdout.
pub fn is_printable(bytes: &[u8]) -> bool {
    !bytes.is_empty()
        && bytes
            .iter()
            .all(|b| matches!(b, 0x09 | 0x0A | 0x0D | 0x20..=0x7E))
}

/// High-rate telemetry types excluded from the `-v 3` per-frame log,
/// mirroring `arproxy.py`'s own `SKIP_TYPES` — logging these at their
/// native rate floods the console without adding anything a human
/// reading along would want.
pub fn is_high_rate(msg: &MavMessage) -> bool {
    matches!(
        msg,
        MavMessage::SYS_STATUS(_)
            | MavMessage::ATTITUDE(_)
            | MavMessage::GPS_RAW_INT(_)
            | MavMessage::GLOBAL_POSITION_INT(_)
    )
}
