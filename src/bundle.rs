//! Synthesises the six-message MAVLink bundle that stands in for the
//! drone's own telemetry while a peer is in Manual mode.
//!
//! Every narrowing conversion here is a two's-complement truncation, not a
//! saturating one (spec.md §4.3.1, §9): a float or wide int that overflows
//! the target width wraps around silently, exactly like the vendor's own
//! `struct.unpack(fmt, struct.pack(fmt, value))` round-trip it was ported
//! from. `wrap_i32`/`wrap_i16`/`wrap_u16` exist so that guarantee lives in
//! one place instead of being re-derived at each call site.
use mavlink::common::{
    GpsFixType, MavAutopilot, MavMessage, MavModeFlag, MavType, ATTITUDE_DATA,
    GLOBAL_POSITION_INT_DATA, GPS_RAW_INT_DATA, HEARTBEAT_DATA, MISSION_CURRENT_DATA,
    SYS_STATUS_DATA,
};
use std::f64::consts::PI;

use crate::navdata::NavdataFrame;
use crate::peer::CachedMeta;

/// Rounds to the nearest integer and truncates to `i32` by way of `i64`,
/// so overflow wraps (two's complement) instead of saturating the way a
/// direct `f64 as i32` cast does since Rust 1.45.
fn wrap_i32(v: f64) -> i32 {
    v.round() as i64 as i32
}

fn wrap_i16(v: f64) -> i16 {
    v.round() as i64 as i16
}

fn wrap_u16(v: f64) -> u16 {
    v.round() as i64 as u16
}

/// The six messages synthesised from one healthy navdata frame, in the
/// order spec.md §4.3.1 lists them.
pub fn build_bundle(cached: &CachedMeta, frame: &NavdataFrame) -> [MavMessage; 6] {
    let demo = frame.demo.unwrap_or_default();
    let gps = frame.gps.unwrap_or_default();
    let time = frame.time.unwrap_or_default();

    let heartbeat = MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: cached.custom_mode,
        mavtype: MavType::MAV_TYPE_QUADROTOR,
        autopilot: MavAutopilot::MAV_AUTOPILOT_GENERIC,
        base_mode: cached.base_mode | MavModeFlag::MAV_MODE_FLAG_MANUAL_INPUT_ENABLED,
        system_status: cached.system_status,
        mavlink_version: 3,
    });

    let mission_current = MavMessage::MISSION_CURRENT(MISSION_CURRENT_DATA {
        seq: cached.mission_seq,
        ..Default::default()
    });

    let attitude = MavMessage::ATTITUDE(ATTITUDE_DATA {
        time_boot_ms: time,
        roll: demo.phi as f64 * PI / 180_000.0,
        pitch: demo.theta as f64 * PI / 180_000.0,
        yaw: demo.psi as f64 * PI / 180_000.0,
        rollspeed: 0.0,
        pitchspeed: 0.0,
        yawspeed: 0.0,
    });

    let sys_status = MavMessage::SYS_STATUS(SYS_STATUS_DATA {
        onboard_control_sensors_present: sensor_bits(),
        onboard_control_sensors_enabled: sensor_bits(),
        onboard_control_sensors_health: sensor_bits(),
        current_battery: -1,
        battery_remaining: wrap_i16(demo.battery as f64) as i8,
        ..Default::default()
    });

    let global_position_int = MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA {
        time_boot_ms: time,
        lat: wrap_i32(gps.latitude * 1e7),
        lon: wrap_i32(gps.longitude * 1e7),
        alt: wrap_i32(gps.elevation * 1e3),
        relative_alt: wrap_i32(demo.altitude as f64),
        vx: wrap_i16(demo.vx as f64 / 10.0),
        vy: wrap_i16(demo.vy as f64 / 10.0),
        vz: wrap_i16(demo.vz as f64 / 10.0),
        hdg: 0,
    });

    let gps_raw_int = MavMessage::GPS_RAW_INT(GPS_RAW_INT_DATA {
        time_usec: (gps.last_frame_time * 1e3) as u64,
        // spec.md §4.3.1 requires the literal wire value 0, which this
        // dialect's GPS_FIX_TYPE enum names NO_GPS, not NO_FIX (=1).
        fix_type: GpsFixType::GPS_FIX_TYPE_NO_GPS,
        lat: wrap_i32(gps.latitude * 1e7),
        lon: wrap_i32(gps.longitude * 1e7),
        alt: wrap_i32(gps.elevation * 1e3),
        eph: wrap_u16(gps.hdop * 100.0),
        epv: wrap_u16(gps.vdop * 100.0),
        vel: wrap_u16(gps.speed * 100.0),
        cog: wrap_u16(gps.degree * 100.0),
        // The vendor field overflows a byte in practice; forcing it to 0
        // here is a known open question (SPEC_FULL.md §9), not a bug.
        satellites_visible: 0,
        ..Default::default()
    });

    [
        heartbeat,
        mission_current,
        attitude,
        sys_status,
        global_position_int,
        gps_raw_int,
    ]
}

fn sensor_bits() -> mavlink::common::MavSysStatusSensor {
    mavlink::common::MavSysStatusSensor::from_bits_truncate((1u32 << 17) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navdata::testsupport::{build, FakeDemo, FakeGps};

    fn cached() -> CachedMeta {
        CachedMeta {
            mission_seq: 4,
            ..Default::default()
        }
    }

    #[test]
    fn battery_truncates_instead_of_saturating() {
        // 70000 overflows i16, and must wrap, not clamp at i16::MAX.
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
                battery: 70_000,
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
        let frame = crate::navdata::decode(&packet).unwrap();
        let bundle = build_bundle(&cached(), &frame);
        let expected = (70_000i64 as i16) as i8;
        if let MavMessage::SYS_STATUS(data) = &bundle[3] {
            assert_eq!(data.battery_remaining, expected);
        } else {
            panic!("expected SYS_STATUS in slot 3");
        }
    }

    #[test]
    fn attitude_converts_millidegrees_to_radians() {
        let packet = build(
            crate::proto::ARDRONE_NAVDATA_DEMO_MASK,
            Some(FakeDemo {
                phi: 180_000,
                theta: 0,
                psi: 0,
                altitude: 0,
                vx: 0.0,
                vy: 0.0,
                vz: 0.0,
                battery: 0,
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
        let frame = crate::navdata::decode(&packet).unwrap();
        let bundle = build_bundle(&cached(), &frame);
        if let MavMessage::ATTITUDE(data) = &bundle[2] {
            assert!((data.roll - PI).abs() < 1e-9);
        } else {
            panic!("expected ATTITUDE in slot 2");
        }
    }

    #[test]
    fn mission_current_echoes_cached_seq() {
        let packet = build(crate::proto::ARDRONE_NAVDATA_DEMO_MASK, None, None, None);
        let frame = crate::navdata::decode(&packet).unwrap();
        let bundle = build_bundle(&cached(), &frame);
        if let MavMessage::MISSION_CURRENT(data) = &bundle[1] {
            assert_eq!(data.seq, 4);
        } else {
            panic!("expected MISSION_CURRENT in slot 1");
        }
    }

    #[test]
    fn gps_raw_int_fix_type_wire_value_is_zero() {
        let packet = build(crate::proto::ARDRONE_NAVDATA_DEMO_MASK, None, None, None);
        let frame = crate::navdata::decode(&packet).unwrap();
        let bundle = build_bundle(&cached(), &frame);
        if let MavMessage::GPS_RAW_INT(data) = &bundle[5] {
            assert_eq!(data.fix_type as u8, 0);
        } else {
            panic!("expected GPS_RAW_INT in slot 5");
        }
    }
}
