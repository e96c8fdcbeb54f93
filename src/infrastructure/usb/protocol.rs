//! Nreal Air frame protocol.
//!
//! Both channels speak fixed 64-byte frames. The IMU frame layout was
//! reverse engineered from observed traffic; the marker bytes below are
//! constant across firmware revisions seen so far.
//!
//! ```text
//! [0  ...  1] = 01 02
//! [2  ...  3] : counter, unused
//! [4  ... 11] : device uptime (u64 little-endian, nanoseconds)
//! [12 ... 17] = A0 0F .. .. .. ..
//! [18 ... 26] : angular velocity X/Y/Z (24-bit signed, little-endian)
//! [27 ... 32] = 20 .. .. .. .. ..
//! [33 ... 41] : acceleration X/Y/Z (24-bit signed, little-endian)
//! [42 ... 47] = 00 .. .. .. .. ..
//! [48 ... 53] : magnetometer X/Y/Z (u16 little-endian)
//! [54 ... 57] : counter, unused
//! [58 ... 63] : trailer, all zero except byte 62 which may be 0 or 1
//! ```

use crate::domain::models::{Button, ButtonEvent, RawImuSample};
use thiserror::Error;
use tracing::debug;

/// Fixed frame size on both endpoints.
pub const FRAME_LEN: usize = 64;

/// Device clock tick, seconds per unit.
pub const TICK_SCALE_S: f32 = 1.0 / 1e9;
/// Angular velocity, deg/s per unit. 24-bit signed with FSR +/-2000 dps.
pub const GYRO_SCALE_DPS: f32 = 2000.0 / 8_388_608.0;
/// Acceleration, g per unit. 24-bit signed with FSR +/-16 g.
pub const ACCEL_SCALE_G: f32 = 16.0 / 8_388_608.0;

/// Magic payload that starts the periodic IMU stream, written to the IMU
/// output endpoint. Compared to hid_write captures this omits the leading
/// report-id byte, which belongs to the HID library, not the wire.
pub const START_IMU_COMMAND: [u8; 9] = [0xAA, 0xC5, 0xD1, 0x21, 0x42, 0x04, 0x00, 0x19, 0x01];

/// Marker bytes an IMU frame must carry, as (offset, value) pairs.
const IMU_FRAME_MARKERS: [(usize, u8); 6] = [
    (0, 0x01),
    (1, 0x02),
    (12, 0xA0),
    (13, 0x0F),
    (27, 0x20),
    (42, 0x00),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// A marker byte did not match. Per-frame, non-fatal: log and skip.
    #[error("unexpected IMU frame marker at offset {offset}: {value:#04x}")]
    UnexpectedHeader { offset: usize, value: u8 },
}

/// Little-endian 24-bit two's complement, widened to i32.
fn read_i24_le(frame: &[u8; FRAME_LEN], offset: usize) -> i32 {
    let unsigned =
        frame[offset] as i32 | (frame[offset + 1] as i32) << 8 | (frame[offset + 2] as i32) << 16;
    (unsigned << 8) >> 8
}

fn read_u16_le(frame: &[u8; FRAME_LEN], offset: usize) -> u16 {
    u16::from_le_bytes([frame[offset], frame[offset + 1]])
}

/// Decode one IMU frame.
///
/// Marker validation first; field extraction only on frames that pass. The
/// trailer bytes get a diagnostic-only check that never fails the decode.
pub fn decode_imu_packet(frame: &[u8; FRAME_LEN]) -> Result<RawImuSample, FrameError> {
    for (offset, value) in IMU_FRAME_MARKERS {
        if frame[offset] != value {
            return Err(FrameError::UnexpectedHeader {
                offset,
                value: frame[offset],
            });
        }
    }

    let uptime_ns = u64::from_le_bytes(frame[4..12].try_into().unwrap());

    let ang_vel = [
        read_i24_le(frame, 18),
        read_i24_le(frame, 21),
        read_i24_le(frame, 24),
    ];
    let accel = [
        read_i24_le(frame, 33),
        read_i24_le(frame, 36),
        read_i24_le(frame, 39),
    ];
    let mag = [
        read_u16_le(frame, 48),
        read_u16_le(frame, 50),
        read_u16_le(frame, 52),
    ];

    if has_unexpected_trailer(frame) {
        debug!("Unexpected IMU trailer bytes: {:02X?}", &frame[58..]);
    }

    Ok(RawImuSample {
        accel,
        ang_vel,
        mag,
        uptime_ns,
    })
}

/// Trailer bytes 58..63 are zero on every observed frame, except byte 62
/// which toggles between 0 and 1.
fn has_unexpected_trailer(frame: &[u8; FRAME_LEN]) -> bool {
    frame[58] != 0
        || frame[59] != 0
        || frame[60] != 0
        || frame[61] != 0
        || (frame[62] != 0 && frame[62] != 1)
        || frame[63] != 0
}

/// Decode one auxiliary-channel frame into a button event, if it carries
/// one.
///
/// The byte-index semantics (22 = button index, 30 = value) are inferred
/// from observed traffic; unknown indices deliberately produce no event.
pub fn decode_auxiliary_packet(frame: &[u8; FRAME_LEN]) -> Option<ButtonEvent> {
    let index = frame[22];
    let value = frame[30] as i32;

    match index {
        1 => match value {
            // Power press reports the resulting screen state.
            0 | 1 => Some(ButtonEvent {
                button: Button::Power,
                value,
            }),
            _ => {
                debug!("Unknown screen state: {value}");
                None
            }
        },
        2 => Some(ButtonEvent {
            button: Button::BrightnessUp,
            value,
        }),
        3 => Some(ButtonEvent {
            button: Button::BrightnessDown,
            value,
        }),
        _ => None,
    }
}
