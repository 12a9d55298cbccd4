//! Wire-level constants shared by the AT encoder, the navdata adapter and
//! the bootstrap routine. Values come from the AR.Drone 2.0 SDK and are
//! vendor-defined, not something this bridge gets to choose.
use std::net::Ipv4Addr;
use std::time::Duration;

/// UDP port the drone's binary navdata stream is pushed to/pulled from.
pub const NAVDATA_PORT: u16 = 5554;
/// UDP port that accepts plaintext AT commands.
pub const AT_PORT: u16 = 5556;

/// Bit index of each navdata option block in `general:navdata_options`,
/// per the SDK's `navdata_tag_t` enumeration.
pub const OPT_DEMO: u32 = 0;
pub const OPT_TIME: u32 = 1;
pub const OPT_GPS: u32 = 27;

/// `DEMO`, `GPS`, `TIME` or-ed together: the only option blocks this bridge
/// ever asks the drone for.
pub const NAVDATA_OPTIONS: u32 = (1 << OPT_DEMO) | (1 << OPT_TIME) | (1 << OPT_GPS);

/// Bits of `ARDRONE_STATE` this bridge inspects.
pub const ARDRONE_COMMAND_MASK: u32 = 1 << 6;
pub const ARDRONE_NAVDATA_DEMO_MASK: u32 = 1 << 9;
pub const ARDRONE_NAVDATA_BOOTSTRAP: u32 = 1 << 10;

/// `AT*REF` argument that commands takeoff.
pub const COMMAND_TAKEOFF: u32 = 290_718_208;
/// `AT*REF` argument that commands landing.
pub const COMMAND_LAND: u32 = 290_717_696;

/// Minimum spacing between synthesised MAVLink bundles for one peer.
pub const MAV_INTERVAL: Duration = Duration::from_millis(250);
/// Navdata frames arriving within this long of a NAVDATA_REQUEST are the
/// burst that follows stream (re)initialisation and are dropped.
pub const NAVDATA_DAMPEN: Duration = Duration::from_millis(200);
/// How long the demo mask may stay clear before the peer is forced back to
/// Autopilot.
pub const DEMO_STALL_TIMEOUT: Duration = Duration::from_secs(2);
/// How long after a NAVDATA_REQUEST a drone MAVLink frame must arrive
/// before it is treated as "demo mode fell over, drone resumed its own
/// autopilot telemetry".
pub const MANUAL_REVERT_GUARD: Duration = Duration::from_secs(1);

/// Fixed factory address of a cold AR.Drone 2.0, used by the bootstrap
/// test-mode routine.
pub const FACTORY_DRONE_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

/// Number of emitted commands after which the bootstrap routine gives up
/// and tells the drone to leave demo mode.
pub const BOOTSTRAP_COMMAND_LIMIT: u32 = 100;

/// Default CLI values (`-f`, `-p`, `-l`). AT command repeat count is not a
/// CLI flag; every caller that builds AT frames uses `DEFAULT_REPEAT`.
pub const DEFAULT_PEER_FILE: &str = "map.csv";
pub const DEFAULT_MAV_PORT: u16 = 14550;
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";
pub const DEFAULT_REPEAT: u32 = 1;
