//! Platform USB boundary.
//!
//! Enumeration, permission brokering, and transfers are the host platform's
//! business; the driver sees them through [`UsbHost`] and [`UsbTransport`]
//! plus a minimal descriptor model. Endpoint validation lives here too, next
//! to the types it inspects.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// USB HID interface class.
pub const USB_CLASS_HID: u8 = 0x03;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The transfer window elapsed with no data. Fatal on the periodic IMU
    /// endpoint, routine on the auxiliary one.
    #[error("transfer timed out")]
    TimedOut,
    #[error("device disconnected")]
    Disconnected,
    #[error("{0}")]
    Other(String),
}

/// Endpoint direction, device-relative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbEndpointInfo {
    pub address: u8,
    pub direction: Direction,
    pub transfer_type: TransferType,
    pub max_packet_size: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbInterfaceInfo {
    pub number: u8,
    pub class: u8,
    pub subclass: u8,
    pub endpoints: Vec<UsbEndpointInfo>,
}

/// Descriptor snapshot of one attached device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    pub interfaces: Vec<UsbInterfaceInfo>,
}

/// The platform's device list and permission broker.
///
/// `request_permission` is asynchronous: the broker answers later by calling
/// [`crate::DeviceManager::on_permission_result`] on the consumer context.
pub trait UsbHost: Send {
    fn find_device(&self, vendor_id: u16, product_id: u16) -> Option<UsbDeviceInfo>;
    fn request_permission(&mut self, device: &UsbDeviceInfo);
    fn open_device(&mut self, device: &UsbDeviceInfo)
        -> Result<Arc<dyn UsbTransport>, TransportError>;
}

/// One opened connection. Transfers address endpoints directly; the handle
/// is shared between the manager (for teardown) and the reader thread.
pub trait UsbTransport: Send + Sync {
    fn claim_interface(&self, number: u8, force: bool) -> Result<(), TransportError>;
    fn write(&self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, TransportError>;
    fn read(&self, endpoint: u8, buf: &mut [u8], timeout: Duration)
        -> Result<usize, TransportError>;
    fn close(&self);
}

/// The validated endpoint set a session is bound to. Built once by the
/// manager, immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceEndpoints {
    pub imu_in: UsbEndpointInfo,
    pub imu_out: UsbEndpointInfo,
    pub aux_in: UsbEndpointInfo,
}

/// Find the HID interface with the given fixed id and subclass.
pub fn find_hid_interface(
    device: &UsbDeviceInfo,
    number: u8,
    subclass: u8,
) -> Option<&UsbInterfaceInfo> {
    device.interfaces.iter().find(|i| {
        i.class == USB_CLASS_HID && i.number == number && i.subclass == subclass
    })
}

/// Validate that an interface exposes exactly one IN and one OUT endpoint of
/// the expected transfer type, and return the pair.
///
/// Expected addresses are informational: a present-but-mismatched address is
/// accepted with a warning. Any endpoint of the wrong type rejects the whole
/// interface.
pub fn find_interface_endpoints(
    interface: &UsbInterfaceInfo,
    expected_type: TransferType,
    expected_in: u8,
    expected_out: u8,
) -> Option<(UsbEndpointInfo, UsbEndpointInfo)> {
    let mut endpoint_in = None;
    let mut endpoint_out = None;

    for endpoint in &interface.endpoints {
        if endpoint.transfer_type != expected_type {
            warn!(
                "Skipping interface {}: endpoint {:#04x} is {:?}, expected {:?}",
                interface.number, endpoint.address, endpoint.transfer_type, expected_type
            );
            return None;
        }
        match endpoint.direction {
            Direction::In => {
                if endpoint.address != expected_in {
                    warn!(
                        "Using input endpoint {:#04x} instead of expected {:#04x}",
                        endpoint.address, expected_in
                    );
                }
                endpoint_in = Some(*endpoint);
            }
            Direction::Out => {
                if endpoint.address != expected_out {
                    warn!(
                        "Using output endpoint {:#04x} instead of expected {:#04x}",
                        endpoint.address, expected_out
                    );
                }
                endpoint_out = Some(*endpoint);
            }
        }
    }

    match (endpoint_in, endpoint_out) {
        (Some(i), Some(o)) => Some((i, o)),
        _ => None,
    }
}
