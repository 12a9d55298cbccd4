//! AT command encoding.
//!
//! AT frames are CR-terminated ASCII strings of the form
//! `AT*<VERB>=<seq>[,<args>]`. `AtEncoder` owns the string formatting and
//! the repeat policy; it never touches a socket itself, which keeps the
//! bit-cast and sequencing logic testable without a loopback UDP pair.
use crate::proto::NAVDATA_OPTIONS;

/// The 4-byte packet that (re)initialises the drone's navdata stream. Not
/// an AT frame — it carries no sequence number and is sent to the navdata
/// port rather than the AT port.
pub const NAVDATA_REQUEST_PACKET: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Converts one RC channel in `[1000, 2000]` to the IEEE-754 bit pattern of
/// its `[-1.0, 1.0]` float equivalent, reinterpreted as `i32`. This is a
/// wire-format requirement of the vendor SDK: the float is never
/// numerically converted to an integer, only bit-cast.
pub fn rc_channel_bitcast(chan: u16) -> i32 {
    let normalized = (chan as f32 - 1500.0) / 500.0;
    normalized.to_bits() as i32
}

pub struct AtEncoder;

impl AtEncoder {
    /// `AT*CONFIG=<seq>,"general:navdata_demo","TRUE"`
    pub fn navdata_command(seq: u32) -> String {
        format!("AT*CONFIG={},\"general:navdata_demo\",\"TRUE\"\r", seq)
    }

    /// `AT*CONFIG=<seq>,"general:navdata_demo","FALSE"`, sent by the
    /// bootstrap routine when it gives up on seeing the demo mask.
    pub fn navdata_command_off(seq: u32) -> String {
        format!("AT*CONFIG={},\"general:navdata_demo\",\"FALSE\"\r", seq)
    }

    /// `AT*CONFIG=<seq>,"general:navdata_options","<NAVDATA_OPTIONS>"`
    pub fn navdata_options(seq: u32) -> String {
        format!(
            "AT*CONFIG={},\"general:navdata_options\",\"{}\"\r",
            seq, NAVDATA_OPTIONS
        )
    }

    /// `AT*CTRL=<seq>,0,0`
    pub fn ack(seq: u32) -> String {
        format!("AT*CTRL={},0,0\r", seq)
    }

    /// `AT*REF=<seq>,<ref_arg>`
    pub fn reference(seq: u32, ref_arg: u32) -> String {
        format!("AT*REF={},{}\r", seq, ref_arg)
    }

    /// `AT*PCMD=<seq>,1,<i1>,<i2>,<i3>,<i4>`
    pub fn pcmd4(seq: u32, channels: [u16; 4]) -> String {
        let ints: Vec<String> = channels
            .iter()
            .map(|c| rc_channel_bitcast(*c).to_string())
            .collect();
        format!("AT*PCMD={},1,{}\r", seq, ints.join(","))
    }

    /// `AT*PCMD_MAG=<seq>,1,<i1>,…,<i6>`
    pub fn pcmd6(seq: u32, channels: [u16; 6]) -> String {
        let ints: Vec<String> = channels
            .iter()
            .map(|c| rc_channel_bitcast(*c).to_string())
            .collect();
        format!("AT*PCMD_MAG={},1,{}\r", seq, ints.join(","))
    }

    /// Formats one logical command into `repeat` back-to-back frames, each
    /// with its own sequential seq value starting at `first_seq`.
    pub fn repeat_frames(first_seq: u32, repeat: u32, mut fmt: impl FnMut(u32) -> String) -> Vec<String> {
        (0..repeat.max(1)).map(|i| fmt(first_seq + i)).collect()
    }
}
