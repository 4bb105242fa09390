//! BLE link to the ring
//!
//! Handles Bluetooth Low Energy communication with the ring.
//!
//! # BLE layout
//!
//! The ring exposes a Nordic-UART-shaped custom service:
//! - `6e40fff0-b5a3-f393-e0a9-e50e24dcca9e` - ring service
//! - `6e400002-b5a3-f393-e0a9-e50e24dcca9e` - command characteristic (write)
//! - `6e400003-b5a3-f393-e0a9-e50e24dcca9e` - data characteristic (notify)
//!
//! Rings advertise under names matching `R0<digit>_<4 alphanumerics>`, for
//! example `R02_AB3F`; scanning filters on that pattern rather than on the
//! service, which is absent from the advertisement.

use std::pin::Pin;
use std::sync::OnceLock;
use std::time::Duration;

use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification,
    WriteType,
};
use btleplug::platform::{Manager, Peripheral};
use futures::stream::Stream;
use regex::Regex;
use uuid::Uuid;

use ringflow_core::protocol::Command;

use crate::error::{LinkError, LinkResult};

/// Ring custom service UUID.
pub const RING_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e40_fff0_b5a3_f393_e0a9_e50e_24dc_ca9e);

/// Command characteristic UUID (write).
pub const WRITE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6e40_0002_b5a3_f393_e0a9_e50e_24dc_ca9e);

/// Data characteristic UUID (notify).
pub const NOTIFY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6e40_0003_b5a3_f393_e0a9_e50e_24dc_ca9e);

/// Whether an advertised name matches the ring naming scheme.
pub fn is_ring_name(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^R0\d_[0-9A-Z]{4}$").expect("ring name pattern is valid"))
        .is_match(name)
}

/// A ring seen during scanning.
#[derive(Clone, Debug)]
pub struct DiscoveredRing {
    /// Peripheral address as reported by the platform.
    pub address: String,
    /// Advertised name.
    pub name: String,
    /// Signal strength at discovery time (RSSI in dBm), if reported.
    pub rssi: Option<i16>,
    peripheral: Peripheral,
}

/// Scan for advertising rings.
///
/// Starts a scan on the first adapter, waits for `duration`, and returns
/// every peripheral whose advertised name matches the ring pattern.
pub async fn scan_for_rings(duration: Duration) -> LinkResult<Vec<DiscoveredRing>> {
    let manager = Manager::new().await?;
    let adapter = manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or(LinkError::NoAdapter)?;

    tracing::info!("scanning for rings ({duration:?})...");
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(duration).await;
    adapter.stop_scan().await?;

    let mut rings = Vec::new();
    for peripheral in adapter.peripherals().await? {
        let Some(properties) = peripheral.properties().await? else {
            continue;
        };
        let Some(name) = properties.local_name else {
            continue;
        };
        if is_ring_name(&name) {
            rings.push(DiscoveredRing {
                address: peripheral.address().to_string(),
                name,
                rssi: properties.rssi,
                peripheral,
            });
        }
    }

    tracing::info!("scan complete: found {} ring(s)", rings.len());
    Ok(rings)
}

/// An established link to one ring.
#[derive(Clone)]
pub struct RingLink {
    peripheral: Peripheral,
    write_char: Characteristic,
    notify_char: Characteristic,
}

impl RingLink {
    /// Connect to a discovered ring, resolve its characteristics and
    /// subscribe to notifications.
    pub async fn connect(ring: &DiscoveredRing) -> LinkResult<Self> {
        tracing::info!("connecting to {} ({})", ring.name, ring.address);
        ring.peripheral.connect().await?;
        ring.peripheral.discover_services().await?;

        let mut write_char = None;
        let mut notify_char = None;
        for service in ring.peripheral.services() {
            for characteristic in &service.characteristics {
                match characteristic.uuid {
                    uuid if uuid == WRITE_CHARACTERISTIC_UUID => {
                        write_char = Some(characteristic.clone());
                    }
                    uuid if uuid == NOTIFY_CHARACTERISTIC_UUID => {
                        notify_char = Some(characteristic.clone());
                    }
                    _ => {}
                }
            }
        }

        let write_char = write_char.ok_or(LinkError::MissingCharacteristic {
            uuid: WRITE_CHARACTERISTIC_UUID,
        })?;
        let notify_char = notify_char.ok_or(LinkError::MissingCharacteristic {
            uuid: NOTIFY_CHARACTERISTIC_UUID,
        })?;

        ring.peripheral.subscribe(&notify_char).await?;
        tracing::debug!("subscribed to ring notifications");

        Ok(Self {
            peripheral: ring.peripheral.clone(),
            write_char,
            notify_char,
        })
    }

    /// Connect with one bounded retry on a transient failure.
    pub async fn connect_with_retry(
        ring: &DiscoveredRing,
        retry_delay: Duration,
    ) -> LinkResult<Self> {
        match Self::connect(ring).await {
            Ok(link) => Ok(link),
            Err(first) => {
                tracing::warn!("connect failed ({first}), retrying once in {retry_delay:?}");
                tokio::time::sleep(retry_delay).await;
                Self::connect(ring).await
            }
        }
    }

    /// Encode and write one command to the ring.
    pub async fn write_command(&self, command: Command) -> LinkResult<()> {
        self.peripheral
            .write(&self.write_char, &command.encode(), WriteType::WithResponse)
            .await?;
        Ok(())
    }

    /// Notification stream for this peripheral.
    ///
    /// The stream carries notifications from every subscribed
    /// characteristic; callers filter on
    /// [`NOTIFY_CHARACTERISTIC_UUID`].
    pub async fn notifications(
        &self,
    ) -> LinkResult<Pin<Box<dyn Stream<Item = ValueNotification> + Send>>> {
        Ok(self.peripheral.notifications().await?)
    }

    /// Unsubscribe and drop the connection.
    pub async fn disconnect(&self) -> LinkResult<()> {
        // Unsubscribing can fail if the link already dropped; the
        // disconnect below is what must go through.
        if let Err(e) = self.peripheral.unsubscribe(&self.notify_char).await {
            tracing::debug!("unsubscribe failed: {e}");
        }
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_name_pattern() {
        assert!(is_ring_name("R02_AB3F"));
        assert!(is_ring_name("R09_0000"));
        assert!(is_ring_name("R01_ZZZZ"));

        assert!(!is_ring_name("R2_AB3F"));
        assert!(!is_ring_name("R02_ab3f"));
        assert!(!is_ring_name("R02_AB3"));
        assert!(!is_ring_name("R02_AB3F7"));
        assert!(!is_ring_name("R0X_AB3F"));
        assert!(!is_ring_name("XR02_AB3F"));
    }

    #[test]
    fn test_characteristic_uuids() {
        assert!(!RING_SERVICE_UUID.is_nil());
        assert!(!WRITE_CHARACTERISTIC_UUID.is_nil());
        assert!(!NOTIFY_CHARACTERISTIC_UUID.is_nil());
        assert_ne!(WRITE_CHARACTERISTIC_UUID, NOTIFY_CHARACTERISTIC_UUID);
    }
}
