//! Ringflow Host - BLE transport and session driver
//!
//! This crate connects the transport-independent controller from
//! `ringflow-core` to a physical ring over Bluetooth Low Energy:
//! - [`ble`]: scanning, connection and characteristic I/O (btleplug)
//! - [`session`]: the single-task driver feeding notifications into the
//!   controller and flushing its commands back to the ring
//! - [`error`]: transport error types
//!
//! # Example
//!
//! ```rust,ignore
//! use ringflow_host::session::{RingSession, SessionConfig};
//!
//! let (session, mut events) = RingSession::connect(SessionConfig::default()).await?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! session.disconnect().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ble;
pub mod error;
pub mod session;

pub use ble::{scan_for_rings, DiscoveredRing, RingLink};
pub use error::LinkError;
pub use session::{RingEvent, RingSession, SessionConfig};
