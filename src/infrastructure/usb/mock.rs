//! Scripted USB host and transport for driver tests.
//!
//! The transport replays queued reads per endpoint; the host hands out one
//! device descriptor and records permission requests. Everything observable
//! is behind `Arc` so tests keep handles after moving the host into a
//! manager.

use super::protocol::FRAME_LEN;
use super::transport::{
    Direction, TransferType, TransportError, UsbDeviceInfo, UsbEndpointInfo, UsbHost,
    UsbInterfaceInfo, UsbTransport,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) const IMU_IN: u8 = 0x84;
pub(crate) const IMU_OUT: u8 = 0x05;
pub(crate) const AUX_IN: u8 = 0x86;
pub(crate) const AUX_OUT: u8 = 0x07;

/// Valid-marker IMU frame with the given fields.
pub(crate) fn imu_frame(
    uptime_ns: u64,
    ang_vel: [i32; 3],
    accel: [i32; 3],
    mag: [u16; 3],
) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = 0x01;
    frame[1] = 0x02;
    frame[12] = 0xA0;
    frame[13] = 0x0F;
    frame[27] = 0x20;
    frame[42] = 0x00;
    frame[4..12].copy_from_slice(&uptime_ns.to_le_bytes());
    for (i, base) in [18usize, 21, 24].into_iter().enumerate() {
        frame[base..base + 3].copy_from_slice(&ang_vel[i].to_le_bytes()[..3]);
    }
    for (i, base) in [33usize, 36, 39].into_iter().enumerate() {
        frame[base..base + 3].copy_from_slice(&accel[i].to_le_bytes()[..3]);
    }
    for (i, base) in [48usize, 50, 52].into_iter().enumerate() {
        frame[base..base + 2].copy_from_slice(&mag[i].to_le_bytes());
    }
    frame
}

pub(crate) fn aux_frame(index: u8, value: u8) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[22] = index;
    frame[30] = value;
    frame
}

/// What the transport does when the IMU read script runs dry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnExhausted {
    /// Keep returning an uptime-zero frame, paced like a real stream.
    IdleFrames,
    /// Fail the read, as a disconnected device would.
    Disconnect,
    /// Block for the given time before returning an idle frame, like a
    /// stalled endpoint that ignores its timeout.
    Hang(Duration),
}

pub(crate) struct ScriptedTransport {
    imu_reads: Mutex<VecDeque<Result<[u8; FRAME_LEN], TransportError>>>,
    aux_reads: Mutex<VecDeque<[u8; FRAME_LEN]>>,
    on_exhausted: OnExhausted,
    pub writes: Mutex<Vec<(u8, Vec<u8>)>>,
    pub claimed: Mutex<Vec<u8>>,
    pub fail_claim: Option<u8>,
    pub fail_writes: AtomicBool,
    pub closed: AtomicBool,
}

impl ScriptedTransport {
    pub fn new(on_exhausted: OnExhausted) -> Self {
        Self {
            imu_reads: Mutex::new(VecDeque::new()),
            aux_reads: Mutex::new(VecDeque::new()),
            on_exhausted,
            writes: Mutex::new(Vec::new()),
            claimed: Mutex::new(Vec::new()),
            fail_claim: None,
            fail_writes: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn push_imu_frame(&self, frame: [u8; FRAME_LEN]) {
        self.imu_reads.lock().unwrap().push_back(Ok(frame));
    }

    pub fn push_imu_error(&self, error: TransportError) {
        self.imu_reads.lock().unwrap().push_back(Err(error));
    }

    pub fn push_aux_frame(&self, frame: [u8; FRAME_LEN]) {
        self.aux_reads.lock().unwrap().push_back(frame);
    }
}

impl UsbTransport for ScriptedTransport {
    fn claim_interface(&self, number: u8, _force: bool) -> Result<(), TransportError> {
        if self.fail_claim == Some(number) {
            return Err(TransportError::Other("access denied".into()));
        }
        self.claimed.lock().unwrap().push(number);
        Ok(())
    }

    fn write(&self, endpoint: u8, data: &[u8], _timeout: Duration) -> Result<usize, TransportError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(TransportError::Other("write failed".into()));
        }
        self.writes.lock().unwrap().push((endpoint, data.to_vec()));
        Ok(data.len())
    }

    fn read(
        &self,
        endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        match endpoint {
            IMU_IN => match self.imu_reads.lock().unwrap().pop_front() {
                Some(Ok(frame)) => {
                    buf[..FRAME_LEN].copy_from_slice(&frame);
                    Ok(FRAME_LEN)
                }
                Some(Err(error)) => Err(error),
                None => match self.on_exhausted {
                    OnExhausted::IdleFrames => {
                        std::thread::sleep(Duration::from_millis(2));
                        buf[..FRAME_LEN].copy_from_slice(&imu_frame(0, [0; 3], [0; 3], [0; 3]));
                        Ok(FRAME_LEN)
                    }
                    OnExhausted::Disconnect => Err(TransportError::Disconnected),
                    OnExhausted::Hang(delay) => {
                        std::thread::sleep(delay);
                        buf[..FRAME_LEN].copy_from_slice(&imu_frame(0, [0; 3], [0; 3], [0; 3]));
                        Ok(FRAME_LEN)
                    }
                },
            },
            AUX_IN => match self.aux_reads.lock().unwrap().pop_front() {
                Some(frame) => {
                    buf[..FRAME_LEN].copy_from_slice(&frame);
                    Ok(FRAME_LEN)
                }
                None => Err(TransportError::TimedOut),
            },
            other => Err(TransportError::Other(format!(
                "read on unexpected endpoint {other:#04x}"
            ))),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

fn interrupt_endpoint(address: u8, direction: Direction) -> UsbEndpointInfo {
    UsbEndpointInfo {
        address,
        direction,
        transfer_type: TransferType::Interrupt,
        max_packet_size: 64,
    }
}

/// Descriptor snapshot matching the real glasses layout.
pub(crate) fn glasses_device_info() -> UsbDeviceInfo {
    UsbDeviceInfo {
        vendor_id: 0x3318,
        product_id: 0x0424,
        interfaces: vec![
            UsbInterfaceInfo {
                number: 3,
                class: 0x03,
                subclass: 0,
                endpoints: vec![
                    interrupt_endpoint(IMU_IN, Direction::In),
                    interrupt_endpoint(IMU_OUT, Direction::Out),
                ],
            },
            UsbInterfaceInfo {
                number: 4,
                class: 0x03,
                subclass: 0,
                endpoints: vec![
                    interrupt_endpoint(AUX_IN, Direction::In),
                    interrupt_endpoint(AUX_OUT, Direction::Out),
                ],
            },
        ],
    }
}

pub(crate) struct MockHost {
    pub device: Option<UsbDeviceInfo>,
    pub transport: Arc<ScriptedTransport>,
    pub permission_requests: Arc<AtomicUsize>,
    pub fail_open: bool,
}

impl MockHost {
    pub fn new(device: Option<UsbDeviceInfo>, transport: Arc<ScriptedTransport>) -> Self {
        Self {
            device,
            transport,
            permission_requests: Arc::new(AtomicUsize::new(0)),
            fail_open: false,
        }
    }
}

impl UsbHost for MockHost {
    fn find_device(&self, vendor_id: u16, product_id: u16) -> Option<UsbDeviceInfo> {
        self.device
            .clone()
            .filter(|d| d.vendor_id == vendor_id && d.product_id == product_id)
    }

    fn request_permission(&mut self, _device: &UsbDeviceInfo) {
        self.permission_requests.fetch_add(1, Ordering::Relaxed);
    }

    fn open_device(
        &mut self,
        _device: &UsbDeviceInfo,
    ) -> Result<Arc<dyn UsbTransport>, TransportError> {
        if self.fail_open {
            return Err(TransportError::Other("open refused".into()));
        }
        Ok(self.transport.clone())
    }
}
