//! Binary navdata decoding.
//!
//! The full AR.Drone 2.0 navdata wire format carries dozens of optional
//! blocks; this bridge only ever asks for three (`general:navdata_options`
//! pins the request to `DEMO`, `GPS`, `TIME` — see [`crate::proto::NAVDATA_OPTIONS`]),
//! so that is all `decode` bothers to parse. Unknown option tags are
//! skipped using their declared block size rather than rejected, so a
//! drone that ignores the requested option mask (or still has bootstrap
//! blocks turned on) does not break decoding.
use byteorder::{ByteOrder, LittleEndian};
use std::collections::HashMap;

const NAVDATA_HEADER_MAGIC: u32 = 0x5566_7788;
const TAG_DEMO: u16 = 0;
const TAG_TIME: u16 = 1;
const TAG_GPS: u16 = 27;
const TAG_CHECKSUM: u16 = 0xFFFF;

#[derive(Debug, thiserror::Error)]
pub enum NavdataError {
    #[error("navdata packet too short ({len} bytes)")]
    TooShort { len: usize },
    #[error("navdata packet missing header magic")]
    BadMagic,
    #[error("navdata option block truncated")]
    TruncatedBlock,
}

/// The `ARDRONE_STATE` bitmask carried in the navdata header.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArdroneState(pub u32);

impl ArdroneState {
    pub fn bootstrap(self) -> bool {
        self.0 & crate::proto::ARDRONE_NAVDATA_BOOTSTRAP != 0
    }
    pub fn command_mask(self) -> bool {
        self.0 & crate::proto::ARDRONE_COMMAND_MASK != 0
    }
    pub fn demo_mask(self) -> bool {
        self.0 & crate::proto::ARDRONE_NAVDATA_DEMO_MASK != 0
    }
}

/// The `DEMO` option block: attitude, altitude, velocity and battery in
/// their raw SDK units (milli-degrees, millimeters, mm/s).
#[derive(Debug, Clone, Copy, Default)]
pub struct Demo {
    pub phi: i32,
    pub theta: i32,
    pub psi: i32,
    pub altitude: i32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub battery: i32,
}

/// The `GPS` option block, in SDK units (degrees, meters, m/s).
#[derive(Debug, Clone, Copy, Default)]
pub struct Gps {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    pub hdop: f64,
    pub vdop: f64,
    pub speed: f64,
    pub degree: f64,
    pub last_frame_time: f64,
}

/// Decoded output of one navdata packet: `ARDRONE_STATE` plus whichever of
/// `DEMO`, `GPS`, `TIME` were present.
#[derive(Debug, Clone, Default)]
pub struct NavdataFrame {
    pub ardrone_state: ArdroneState,
    pub demo: Option<Demo>,
    pub gps: Option<Gps>,
    pub time: Option<u32>,
}

impl NavdataFrame {
    pub fn has_required_options(&self) -> bool {
        self.demo.is_some() && self.gps.is_some() && self.time.is_some()
    }
}

/// Decodes one UDP navdata datagram into its option blocks. Blocks this
/// bridge does not understand are skipped by their declared size rather
/// than rejected.
pub fn decode(packet: &[u8]) -> Result<NavdataFrame, NavdataError> {
    if packet.len() < 16 {
        return Err(NavdataError::TooShort { len: packet.len() });
    }
    let header = LittleEndian::read_u32(&packet[0..4]);
    if header != NAVDATA_HEADER_MAGIC {
        return Err(NavdataError::BadMagic);
    }
    let state = LittleEndian::read_u32(&packet[4..8]);

    let mut frame = NavdataFrame {
        ardrone_state: ArdroneState(state),
        ..Default::default()
    };

    let mut offset = 16;
    while offset + 4 <= packet.len() {
        let tag = LittleEndian::read_u16(&packet[offset..offset + 2]);
        let size = LittleEndian::read_u16(&packet[offset + 2..offset + 4]) as usize;
        if size < 4 || offset + size > packet.len() {
            return Err(NavdataError::TruncatedBlock);
        }
        let payload = &packet[offset + 4..offset + size];

        match tag {
            TAG_DEMO if payload.len() >= 32 => {
                frame.demo = Some(Demo {
                    phi: LittleEndian::read_i32(&payload[8..12]),
                    theta: LittleEndian::read_i32(&payload[4..8]),
                    psi: LittleEndian::read_i32(&payload[12..16]),
                    altitude: LittleEndian::read_i32(&payload[16..20]),
                    vx: LittleEndian::read_f32(&payload[20..24]),
                    vy: LittleEndian::read_f32(&payload[24..28]),
                    vz: LittleEndian::read_f32(&payload[28..32]),
                    battery: LittleEndian::read_i32(&payload[0..4]),
                });
            }
            TAG_GPS if payload.len() >= 64 => {
                frame.gps = Some(Gps {
                    latitude: LittleEndian::read_f64(&payload[0..8]),
                    longitude: LittleEndian::read_f64(&payload[8..16]),
                    elevation: LittleEndian::read_f64(&payload[16..24]),
                    hdop: LittleEndian::read_f64(&payload[24..32]),
                    vdop: LittleEndian::read_f64(&payload[32..40]),
                    speed: LittleEndian::read_f64(&payload[40..48]),
                    degree: LittleEndian::read_f64(&payload[48..56]),
                    last_frame_time: LittleEndian::read_f64(&payload[56..64]),
                });
            }
            TAG_TIME if payload.len() >= 4 => {
                frame.time = Some(LittleEndian::read_u32(&payload[0..4]));
            }
            TAG_CHECKSUM => break,
            _ => (),
        }

        offset += size;
    }

    Ok(frame)
}

/// Decoded option blocks keyed by name, matching the collaborator
/// interface described in spec.md §6 (`decode(bytes) -> {optionName ->
/// record}`) for callers that want to inspect presence generically rather
/// than through the typed `NavdataFrame` fields.
pub fn option_names(frame: &NavdataFrame) -> HashMap<&'static str, bool> {
    let mut names = HashMap::new();
    names.insert("DEMO", frame.demo.is_some());
    names.insert("GPS", frame.gps.is_some());
    names.insert("TIME", frame.time.is_some());
    names.insert("ARDRONE_STATE", true);
    names
}
