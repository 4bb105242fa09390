//! Frame-level error types
//!
//! Errors raised while validating inbound frames. These never escape to the
//! host as failures: the session driver logs them and drops the frame, so
//! the controller state is untouched by malformed input.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::FRAME_LEN;

/// Errors raised while validating an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameError {
    /// Frame length is not the fixed 16 bytes.
    Length {
        /// Number of bytes received.
        got: usize,
    },
    /// Leading opcode pair is not one the ring emits.
    UnknownOpcode {
        /// First byte of the frame.
        opcode: u8,
        /// Second byte of the frame.
        subcode: u8,
    },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length { got } => {
                write!(f, "frame length {got}, expected {FRAME_LEN}")
            }
            Self::UnknownOpcode { opcode, subcode } => {
                write!(f, "unknown opcode 0x{opcode:02X} 0x{subcode:02X}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FrameError {}
