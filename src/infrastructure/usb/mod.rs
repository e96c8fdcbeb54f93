//! USB driver for the glasses.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     DeviceManager                        │
//! │   (discovery, permission, validation, session lifetime)  │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼──────────────┐
//!         │             │              │
//!         ▼             ▼              ▼
//! ┌───────────┐  ┌─────────────┐  ┌──────────┐
//! │ Transport │  │   Session   │  │ Protocol │
//! │           │  │             │  │          │
//! │ - UsbHost │  │ - reader    │  │ - frame  │
//! │   boundary│  │   thread    │  │   decode │
//! │ - endpoint│  │ - start/stop│  │ - button │
//! │   checks  │  │ - calib.    │  │   decode │
//! └───────────┘  └─────────────┘  └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - 64-byte frame decoding, scaling constants, start command
//! - [`transport`] - platform USB boundary traits and endpoint validation
//! - [`session`] - one claimed connection's blocking read loop
//! - [`manager`] - connect/close lifecycle and event delivery

pub mod manager;
pub mod protocol;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;
