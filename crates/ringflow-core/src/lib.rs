//! Ringflow Core - gesture recognition for the Ringflow smart ring
//!
//! This crate contains the transport-independent heart of the Ringflow input
//! device: the 16-byte wire protocol spoken by the ring, the accelerometer
//! feature extractor, and the control state machine that turns a stream of
//! triaxial samples plus on-ring wave events into scroll and selection
//! intents. It is designed to work in `no_std` environments as well as `std`
//! environments; the host transport lives in `ringflow-host`.
//!
//! # Modules
//!
//! - [`types`]: Core data types (samples, features, states, control events)
//! - [`error`]: Frame-level error types
//! - [`protocol`]: Inbound frame parsing and outbound command encoding
//! - [`features`]: Per-sample feature extraction and gesture predicates
//! - [`controller`]: The control state machine and its sink interfaces
//!
//! # Example
//!
//! ```rust
//! use ringflow_core::protocol::{parse_frame, RingFrame};
//!
//! let frame = [
//!     0xA1, 0x03, 0x00, 0x0C, 0x1F, 0x06, 0xFB, 0x03,
//!     0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xD3,
//! ];
//! let parsed = parse_frame(&frame).unwrap();
//! assert!(matches!(parsed, RingFrame::Accel(_)));
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

#[cfg(feature = "std")]
extern crate std;

pub mod controller;
pub mod error;
pub mod features;
pub mod protocol;
pub mod types;

// Re-export commonly used types at crate root
pub use controller::{
    CommandSink, ControlSink, FrameDisposition, NoRawSink, RawSampleSink, RingController,
    StateSink,
};
pub use error::FrameError;
pub use features::{tunables, FeatureExtractor, WindowMode};
pub use protocol::{Command, RingFrame, FRAME_LEN};
pub use types::{ControlEvent, ControllerState, RawSample, RawSnapshot, WindowFeatures};
