//! One claimed connection's read loop.
//!
//! A session owns a validated endpoint set and a dedicated reader thread:
//! start the IMU stream, block on the periodic IMU endpoint, decode, feed
//! the magnetometer calibrator, poll the auxiliary endpoint, emit events.
//! Stopping is cooperative - a flag checked each iteration plus a bounded
//! join.

use crate::domain::magnetometer::MagnetometerCalibrator;
use crate::domain::models::{DeviceEvent, ProcessedImuSample, RawImuSample};
use crate::domain::settings::DriverConfig;
use crate::infrastructure::usb::protocol::{
    self, ACCEL_SCALE_G, FRAME_LEN, GYRO_SCALE_DPS, TICK_SCALE_S,
};
use crate::infrastructure::usb::transport::{DeviceEndpoints, TransportError, UsbTransport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, trace, warn};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Running,
    Quitting,
    Exited,
}

/// Event delivery towards the one consumer context.
///
/// Wraps the bounded channel so callers pick a policy per event kind:
/// samples are droppable (the stream is periodic, a fresh one is 2 ms
/// away), everything else is not.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<DeviceEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<DeviceEvent>) -> Self {
        Self { tx }
    }

    /// Deliver a lifecycle or button event from the reader thread, waiting
    /// for queue space if the consumer is behind.
    pub fn send(&self, event: DeviceEvent) {
        if self.tx.blocking_send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }

    /// Deliver a sample; dropped with a trace log when the queue is full.
    pub fn send_sample(&self, raw: RawImuSample, processed: ProcessedImuSample) {
        match self.tx.try_send(DeviceEvent::NewSample { raw, processed }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => trace!("Event queue full, dropping sample"),
            Err(TrySendError::Closed(_)) => debug!("Event receiver dropped"),
        }
    }

    /// Deliver an event from the manager without blocking its caller.
    pub fn post(&self, event: DeviceEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => warn!("Event queue full, dropping {event:?}"),
            Err(TrySendError::Closed(_)) => debug!("Event receiver dropped"),
        }
    }
}

/// Timing knobs the session needs, lifted out of [`DriverConfig`].
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub imu_read_timeout: Duration,
    pub aux_read_timeout: Duration,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
}

impl From<&DriverConfig> for SessionConfig {
    fn from(config: &DriverConfig) -> Self {
        Self {
            imu_read_timeout: Duration::from_millis(config.imu_read_timeout_ms),
            aux_read_timeout: Duration::from_millis(config.aux_read_timeout_ms),
            start_timeout: Duration::from_millis(config.start_timeout_ms),
            stop_timeout: Duration::from_millis(config.stop_timeout_ms),
        }
    }
}

pub struct DeviceSession {
    transport: Arc<dyn UsbTransport>,
    endpoints: DeviceEndpoints,
    sink: EventSink,
    config: SessionConfig,
    /// Present until `start` moves it into the reader thread.
    calibrator: Option<MagnetometerCalibrator>,
    /// Written by the reader thread on every exit path.
    saved_calibration: Arc<Mutex<Option<[i32; 6]>>>,
    quit: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DeviceSession {
    pub fn new(
        transport: Arc<dyn UsbTransport>,
        endpoints: DeviceEndpoints,
        sink: EventSink,
        config: SessionConfig,
        calibrator: MagnetometerCalibrator,
    ) -> Self {
        Self {
            transport,
            endpoints,
            sink,
            config,
            calibrator: Some(calibrator),
            saved_calibration: Arc::new(Mutex::new(None)),
            quit: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Restore persisted extrema into the calibrator. Only valid before
    /// `start`; afterwards the calibrator belongs to the reader thread.
    pub fn restore_calibration(&mut self, data: &[i32]) -> anyhow::Result<()> {
        let calibrator = self
            .calibrator
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("session already started"))?;
        calibrator.restore_calibration(data)?;
        Ok(())
    }

    /// Spawn the reader thread. A second call is a logged no-op.
    pub fn start(&mut self) {
        let Some(calibrator) = self.calibrator.take() else {
            error!("Reader thread already running");
            return;
        };
        let worker = Worker {
            transport: self.transport.clone(),
            endpoints: self.endpoints,
            sink: self.sink.clone(),
            config: self.config,
            calibrator,
            quit: self.quit.clone(),
            saved_calibration: self.saved_calibration.clone(),
            imu_buf: [0u8; FRAME_LEN],
            aux_buf: [0u8; FRAME_LEN],
            last_uptime_ns: 0,
        };
        match thread::Builder::new()
            .name("nreal-imu-reader".into())
            .spawn(move || worker.run())
        {
            Ok(handle) => self.handle = Some(handle),
            Err(e) => {
                error!("Could not spawn reader thread: {e}");
                self.sink
                    .post(DeviceEvent::ConnectionError("Could not start reading the IMU".into()));
            }
        }
    }

    /// Request a cooperative stop and wait up to the configured bound for
    /// the reader thread to exit. Returns false if it did not; teardown
    /// proceeds regardless and the thread is left to die with its blocked
    /// read.
    pub fn stop(&mut self) -> bool {
        self.quit.store(true, Ordering::Relaxed);
        let Some(handle) = self.handle.take() else {
            return true;
        };

        let deadline = Instant::now() + self.config.stop_timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        if handle.is_finished() {
            let _ = handle.join();
            true
        } else {
            warn!(
                "Reader thread did not exit within {:?}, abandoning it",
                self.config.stop_timeout
            );
            self.handle = Some(handle);
            false
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match &self.handle {
            None => SessionPhase::Exited,
            Some(handle) if handle.is_finished() => SessionPhase::Exited,
            Some(_) if self.quit.load(Ordering::Relaxed) => SessionPhase::Quitting,
            Some(_) => SessionPhase::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// The calibration snapshot the reader thread left behind on exit, for
    /// the owner to persist. None while the thread is still running.
    pub fn saved_calibration(&self) -> Option<[i32; 6]> {
        *self.saved_calibration.lock().unwrap()
    }
}

/// Everything the reader thread owns. Scratch buffers are reused every
/// iteration and never leave the thread; emitted samples are fresh values.
struct Worker {
    transport: Arc<dyn UsbTransport>,
    endpoints: DeviceEndpoints,
    sink: EventSink,
    config: SessionConfig,
    calibrator: MagnetometerCalibrator,
    quit: Arc<AtomicBool>,
    saved_calibration: Arc<Mutex<Option<[i32; 6]>>>,
    imu_buf: [u8; FRAME_LEN],
    aux_buf: [u8; FRAME_LEN],
    last_uptime_ns: u64,
}

impl Worker {
    fn run(mut self) {
        if let Err(e) = self.start_imu_stream() {
            error!("IMU start command failed: {e}");
            self.sink
                .send(DeviceEvent::ConnectionError("Could not start reading the IMU".into()));
            self.snapshot_calibration();
            return;
        }

        // The stream is periodic: every read must complete within the
        // timeout, so a failed read means the device is gone and the
        // session is over. No retries.
        while !self.quit.load(Ordering::Relaxed) {
            match self.transport.read(
                self.endpoints.imu_in.address,
                &mut self.imu_buf,
                self.config.imu_read_timeout,
            ) {
                Ok(_) => self.process_imu_frame(),
                Err(e) => {
                    error!("IMU read failed: {e}");
                    self.sink
                        .send(DeviceEvent::ConnectionError("Could not read the IMU".into()));
                    break;
                }
            }

            self.poll_auxiliary();
        }

        self.snapshot_calibration();
        debug!("Reader thread finished");
    }

    fn start_imu_stream(&self) -> Result<(), TransportError> {
        self.transport
            .write(
                self.endpoints.imu_out.address,
                &protocol::START_IMU_COMMAND,
                self.config.start_timeout,
            )
            .map(|_| ())
    }

    fn process_imu_frame(&mut self) {
        let raw = match protocol::decode_imu_packet(&self.imu_buf) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping IMU frame: {e}");
                return;
            }
        };

        // First frame of the session only seeds the clock; there is nothing
        // to difference against yet.
        if self.last_uptime_ns == 0 {
            self.last_uptime_ns = raw.uptime_ns;
            return;
        }
        let delta_time_s =
            (raw.uptime_ns as i64 - self.last_uptime_ns as i64) as f32 * TICK_SCALE_S;
        self.last_uptime_ns = raw.uptime_ns;

        let mag_raw = [raw.mag[0] as i32, raw.mag[1] as i32, raw.mag[2] as i32];
        let mag_normalized = self.calibrator.process(mag_raw, delta_time_s);

        let processed = ProcessedImuSample {
            roll_rate: raw.ang_vel[0] as f32 * GYRO_SCALE_DPS,
            pitch_rate: raw.ang_vel[1] as f32 * GYRO_SCALE_DPS,
            yaw_rate: raw.ang_vel[2] as f32 * GYRO_SCALE_DPS,
            accel: [
                raw.accel[0] as f32 * ACCEL_SCALE_G,
                raw.accel[1] as f32 * ACCEL_SCALE_G,
                raw.accel[2] as f32 * ACCEL_SCALE_G,
            ],
            mag_normalized,
            delta_time_s,
        };
        self.sink.send_sample(raw, processed);
    }

    /// Low-timeout poll of the auxiliary endpoint; a quiet or failing
    /// endpoint is routine here, only a positive byte count is decoded.
    fn poll_auxiliary(&mut self) {
        match self.transport.read(
            self.endpoints.aux_in.address,
            &mut self.aux_buf,
            self.config.aux_read_timeout,
        ) {
            Ok(n) if n > 0 => {
                if let Some(event) = protocol::decode_auxiliary_packet(&self.aux_buf) {
                    self.sink.send(DeviceEvent::ButtonPressed(event));
                }
            }
            Ok(_) => {}
            Err(TransportError::TimedOut) => {}
            Err(e) => trace!("Auxiliary read error, ignored: {e}"),
        }
    }

    fn snapshot_calibration(&self) {
        *self.saved_calibration.lock().unwrap() = self.calibrator.save_calibration();
    }
}
