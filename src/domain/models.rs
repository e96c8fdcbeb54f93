//! Value types shared between the driver and its consumer.
//!
//! Everything crossing the worker/consumer boundary is a plain `Clone` value;
//! the reader thread keeps its scratch buffers to itself.

/// One decoded IMU frame, raw device units.
///
/// Angular velocity and acceleration come from 24-bit signed fields widened
/// to `i32`; the magnetometer axes are unsigned 16-bit. Only meaningful for
/// frames that passed marker validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawImuSample {
    pub accel: [i32; 3],
    pub ang_vel: [i32; 3],
    pub mag: [u16; 3],
    /// Monotonic device clock, nanoseconds.
    pub uptime_ns: u64,
}

/// Derived quantities from two consecutive raw samples.
///
/// Not produced for the first frame of a session - there is no previous
/// timestamp to difference against.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessedImuSample {
    /// Angular rates in deg/s (X, Y, Z body axes).
    pub roll_rate: f32,
    pub pitch_rate: f32,
    pub yaw_rate: f32,
    /// Acceleration in g.
    pub accel: [f32; 3],
    /// Auto-calibrated, low-pass filtered magnetometer vector.
    pub mag_normalized: [f32; 3],
    /// Seconds elapsed on the device clock since the previous frame.
    pub delta_time_s: f32,
}

/// Buttons reported on the auxiliary channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Power,
    BrightnessUp,
    BrightnessDown,
}

/// A button press decoded from an auxiliary frame.
///
/// For [`Button::Power`] the value is the resulting screen state (1 on,
/// 0 off); for the brightness buttons it is the reported level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: Button,
    pub value: i32,
}

/// Everything the driver reports to its consumer.
///
/// Delivered in order on the bounded event channel handed out by
/// [`crate::DeviceManager::new`]; the receiving side is the one consumer
/// context.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    DeviceConnected,
    DeviceDisconnected,
    PermissionDenied,
    /// Fatal to the current session or connect attempt. Never auto-retried.
    ConnectionError(String),
    /// Informational, human-readable.
    Message(String),
    NewSample {
        raw: RawImuSample,
        processed: ProcessedImuSample,
    },
    ButtonPressed(ButtonEvent),
}

/// Connection lifecycle as tracked by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Streaming,
    Stopping,
    Stopped,
    Failed(String),
}

impl SessionState {
    /// True for states in which a connect attempt or live session exists.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Connected | SessionState::Streaming
        )
    }
}
