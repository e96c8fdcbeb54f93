//! Connection lifecycle.
//!
//! The manager owns the platform host, the calibration store and at most one
//! session. `connect` runs discovery and kicks off the platform's permission
//! flow; the broker answers through [`DeviceManager::on_permission_result`],
//! after which the manager validates the descriptor, claims both interfaces
//! and starts the reader thread. All manager entry points are expected to be
//! called from the consumer context, the same one that drains the event
//! channel. On a [`DeviceEvent::ConnectionError`] from a live session the
//! consumer finishes teardown by calling [`DeviceManager::close`].

use crate::domain::magnetometer::MagnetometerCalibrator;
use crate::domain::models::{DeviceEvent, SessionState};
use crate::domain::settings::DriverConfig;
use crate::infrastructure::storage::CalibrationStore;
use crate::infrastructure::usb::protocol::FRAME_LEN;
use crate::infrastructure::usb::session::{DeviceSession, EventSink};
use crate::infrastructure::usb::transport::{
    find_hid_interface, find_interface_endpoints, DeviceEndpoints, TransferType, UsbDeviceInfo,
    UsbHost, UsbTransport,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct DeviceManager {
    host: Box<dyn UsbHost>,
    config: DriverConfig,
    store: Box<dyn CalibrationStore>,
    sink: EventSink,
    state: SessionState,
    /// Device awaiting a permission answer between `connect` and
    /// [`Self::on_permission_result`].
    pending: Option<UsbDeviceInfo>,
    transport: Option<Arc<dyn UsbTransport>>,
    session: Option<DeviceSession>,
}

impl DeviceManager {
    /// Build a manager and the event channel its consumer drains. Queue
    /// depth comes from the config; samples are dropped when the consumer
    /// falls that far behind, other events are not.
    pub fn new(
        host: Box<dyn UsbHost>,
        config: DriverConfig,
        store: Box<dyn CalibrationStore>,
    ) -> (Self, mpsc::Receiver<DeviceEvent>) {
        let (tx, rx) = mpsc::channel(config.event_queue_depth);
        let manager = Self {
            host,
            config,
            store,
            sink: EventSink::new(tx),
            state: SessionState::Idle,
            pending: None,
            transport: None,
            session: None,
        };
        (manager, rx)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// True while a device is open and claimed.
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// True while the reader thread is alive.
    pub fn is_streaming(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_running())
    }

    /// Look for the glasses and start the permission flow. A second call
    /// while a connect attempt or session is live is a no-op.
    pub fn connect(&mut self) {
        if self.state.is_live() {
            debug!("Connect ignored, already {:?}", self.state);
            return;
        }

        let Some(device) = self
            .host
            .find_device(self.config.vendor_id, self.config.product_id)
        else {
            self.fail(format!(
                "Device {:04x}:{:04x} not found",
                self.config.vendor_id, self.config.product_id
            ));
            return;
        };

        info!(
            "Found device {:04x}:{:04x}, requesting permission",
            device.vendor_id, device.product_id
        );
        self.state = SessionState::Connecting;
        self.host.request_permission(&device);
        self.pending = Some(device);
    }

    /// The permission broker's answer. Ignored unless a connect attempt is
    /// actually waiting for one.
    pub fn on_permission_result(&mut self, granted: bool) {
        let Some(device) = self.pending.take() else {
            warn!("Permission result with no pending connect, ignored");
            return;
        };

        if !granted {
            info!("Permission denied by the user");
            self.state = SessionState::Idle;
            self.sink.post(DeviceEvent::PermissionDenied);
            return;
        }

        self.open_session(device);
    }

    /// Stop the session, persist calibration, release the device. Safe to
    /// call in any state; only the call that actually tears something down
    /// reports a disconnect.
    pub fn close(&mut self) {
        let mut had_connection = false;

        if let Some(mut session) = self.session.take() {
            had_connection = true;
            self.state = SessionState::Stopping;
            session.stop();
            match session.saved_calibration() {
                Some(data) => {
                    if let Err(e) = self.store.save(data) {
                        warn!("Could not persist calibration: {e:#}");
                    }
                }
                None => debug!("No calibration to persist"),
            }
        }

        if let Some(transport) = self.transport.take() {
            had_connection = true;
            transport.close();
        }
        let had_pending = self.pending.take().is_some();

        if had_connection {
            self.state = SessionState::Stopped;
            self.sink.post(DeviceEvent::DeviceDisconnected);
            info!("Device released");
        } else if had_pending {
            // A connect attempt still waiting for its permission answer was
            // cancelled; nothing was held, so a fresh connect is allowed.
            debug!("Pending connect attempt cancelled");
            self.state = SessionState::Idle;
        }
    }

    fn open_session(&mut self, device: UsbDeviceInfo) {
        let transport = match self.host.open_device(&device) {
            Ok(transport) => transport,
            Err(e) => {
                self.fail(format!("Could not open device: {e}"));
                return;
            }
        };

        let endpoints = match self.validate_descriptor(&device) {
            Ok(endpoints) => endpoints,
            Err(message) => {
                transport.close();
                self.fail(message);
                return;
            }
        };

        for number in [self.config.imu_interface, self.config.aux_interface] {
            if let Err(e) = transport.claim_interface(number, true) {
                error!("Claiming interface {number} failed: {e}");
                transport.close();
                self.fail(format!("Could not claim interface {number}"));
                return;
            }
        }

        self.state = SessionState::Connected;
        self.sink.post(DeviceEvent::DeviceConnected);

        let calibrator =
            MagnetometerCalibrator::new(self.config.mag_cutoff_hz, self.config.mag_min_range);
        let mut session = DeviceSession::new(
            transport.clone(),
            endpoints,
            self.sink.clone(),
            (&self.config).into(),
            calibrator,
        );

        match self.store.load() {
            Ok(Some(data)) => match session.restore_calibration(&data) {
                Ok(()) => {
                    self.sink
                        .post(DeviceEvent::Message("Restored calibration".into()));
                }
                Err(e) => warn!("Stored calibration rejected: {e:#}"),
            },
            Ok(None) => debug!("No stored calibration"),
            Err(e) => warn!("Could not load calibration: {e:#}"),
        }

        session.start();
        self.transport = Some(transport);
        self.session = Some(session);
        self.state = SessionState::Streaming;
    }

    /// Check that the descriptor carries both HID interfaces with the
    /// expected endpoint shape, and that the inbound endpoints move whole
    /// frames per transfer.
    fn validate_descriptor(&self, device: &UsbDeviceInfo) -> Result<DeviceEndpoints, String> {
        let imu_interface = find_hid_interface(
            device,
            self.config.imu_interface,
            self.config.interface_subclass,
        )
        .ok_or("Could not find IMU interface")?;
        let (imu_in, imu_out) = find_interface_endpoints(
            imu_interface,
            TransferType::Interrupt,
            self.config.imu_in_address,
            self.config.imu_out_address,
        )
        .filter(|(ep_in, _)| ep_in.max_packet_size as usize == FRAME_LEN)
        .ok_or("Could not find IMU endpoints")?;

        let aux_interface = find_hid_interface(
            device,
            self.config.aux_interface,
            self.config.interface_subclass,
        )
        .ok_or("Could not find auxiliary interface")?;
        let (aux_in, _) = find_interface_endpoints(
            aux_interface,
            TransferType::Interrupt,
            self.config.aux_in_address,
            self.config.aux_out_address,
        )
        .filter(|(ep_in, _)| ep_in.max_packet_size as usize == FRAME_LEN)
        .ok_or("Could not find auxiliary endpoints")?;

        Ok(DeviceEndpoints {
            imu_in,
            imu_out,
            aux_in,
        })
    }

    fn fail(&mut self, message: String) {
        error!("Connect failed: {message}");
        self.state = SessionState::Failed(message.clone());
        self.sink.post(DeviceEvent::ConnectionError(message));
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.close();
    }
}
