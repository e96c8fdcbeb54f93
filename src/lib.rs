//! USB HID driver for the Nreal Air glasses.
//!
//! Decodes the proprietary 64-byte IMU frames into calibrated angular-rate,
//! acceleration, and magnetometer data, keeps a running magnetometer
//! auto-calibration, and surfaces connection and button events to a single
//! consumer through a bounded event channel.
//!
//! The crate never talks to a USB stack directly: the embedder supplies the
//! platform side behind [`infrastructure::usb::transport::UsbHost`] and
//! [`infrastructure::usb::transport::UsbTransport`], and the calibration
//! store behind [`infrastructure::storage::CalibrationStore`].
//!
//! ```no_run
//! use nreal_air_driver::{DeviceManager, DriverConfig};
//! use nreal_air_driver::infrastructure::storage::JsonCalibrationStore;
//! # fn platform_usb_host() -> Box<dyn nreal_air_driver::infrastructure::usb::transport::UsbHost> { unimplemented!() }
//!
//! let store = Box::new(JsonCalibrationStore::new().unwrap());
//! let (mut manager, mut events) = DeviceManager::new(platform_usb_host(), DriverConfig::default(), store);
//! manager.connect();
//! while let Some(event) = events.blocking_recv() {
//!     println!("{event:?}");
//! }
//! ```

pub mod domain;
pub mod infrastructure;

pub use domain::models::{
    Button, ButtonEvent, DeviceEvent, ProcessedImuSample, RawImuSample, SessionState,
};
pub use domain::settings::DriverConfig;
pub use infrastructure::usb::manager::DeviceManager;
