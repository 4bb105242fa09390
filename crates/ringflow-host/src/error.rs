//! Transport error types

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the BLE transport.
#[derive(Debug, Error)]
pub enum LinkError {
    /// No Bluetooth adapter is available on this host.
    #[error("no Bluetooth adapter found")]
    NoAdapter,

    /// Scanning finished without seeing an advertising ring.
    #[error("no ring found during scan")]
    NoRingFound,

    /// The peripheral is missing a required GATT characteristic.
    #[error("ring is missing characteristic {uuid}")]
    MissingCharacteristic {
        /// UUID of the absent characteristic.
        uuid: Uuid,
    },

    /// Underlying Bluetooth failure.
    #[error("bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),
}

/// Result type for transport operations.
pub type LinkResult<T> = Result<T, LinkError>;
