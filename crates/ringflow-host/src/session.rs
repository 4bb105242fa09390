//! Ring session driver
//!
//! [`RingSession`] owns the connected link and the single task that drives
//! the controller: notifications are stamped with a monotonic millisecond
//! clock and fed into [`RingController::handle_frame`]; commands the
//! controller queues are flushed to the write characteristic after each
//! frame, one write at a time, so at most one raw-data request is ever in
//! flight.
//!
//! Controller callbacks are adapted onto an unbounded channel of
//! [`RingEvent`]s, so the core never blocks on a slow consumer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

use ringflow_core::controller::{
    CommandSink, ControlSink, FrameDisposition, RawSampleSink, RingController, StateSink,
};
use ringflow_core::protocol::Command;
use ringflow_core::types::{ControlEvent, ControllerState, RawSnapshot};

use crate::ble::{scan_for_rings, DiscoveredRing, RingLink, NOTIFY_CHARACTERISTIC_UUID};
use crate::error::{LinkError, LinkResult};

// ============================================================================
// Configuration
// ============================================================================

/// Session tuning knobs.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// How long to scan for advertising rings.
    pub scan_duration: Duration,
    /// Delay before the single reconnect attempt.
    pub reconnect_delay: Duration,
    /// Attempt one reconnect when the link drops unexpectedly.
    pub auto_reconnect: bool,
    /// Forward per-sample diagnostics as [`RingEvent::Raw`].
    pub forward_raw_samples: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_duration: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(2),
            auto_reconnect: true,
            forward_raw_samples: false,
        }
    }
}

// ============================================================================
// Events and Sink Adapters
// ============================================================================

/// Events delivered to the host application.
#[derive(Clone, Debug, PartialEq)]
pub enum RingEvent {
    /// The controller entered a new state.
    State(ControllerState),
    /// A control event fired.
    Control(ControlEvent),
    /// Per-sample diagnostics (only with
    /// [`SessionConfig::forward_raw_samples`]).
    Raw(RawSnapshot),
}

/// State sink writing into the session event channel.
pub(crate) struct StateTx(pub mpsc::UnboundedSender<RingEvent>);

impl StateSink for StateTx {
    fn on_state_change(&mut self, state: ControllerState) {
        let _ = self.0.send(RingEvent::State(state));
    }
}

/// Control sink writing into the session event channel.
pub(crate) struct ControlTx(pub mpsc::UnboundedSender<RingEvent>);

impl ControlSink for ControlTx {
    fn on_control_event(&mut self, event: ControlEvent) {
        let _ = self.0.send(RingEvent::Control(event));
    }
}

/// Raw-sample sink; drops snapshots unless forwarding is enabled.
pub(crate) struct RawTx {
    pub tx: mpsc::UnboundedSender<RingEvent>,
    pub enabled: bool,
}

impl RawSampleSink for RawTx {
    fn on_raw_sample(&mut self, snapshot: &RawSnapshot) {
        if self.enabled {
            let _ = self.tx.send(RingEvent::Raw(*snapshot));
        }
    }
}

/// Command sink queueing writes for the driver task.
pub(crate) struct CommandTx(pub mpsc::UnboundedSender<Command>);

impl CommandSink for CommandTx {
    fn send_command(&mut self, command: Command) {
        let _ = self.0.send(command);
    }
}

type SessionController = RingController<StateTx, ControlTx, RawTx, CommandTx>;

// ============================================================================
// Session
// ============================================================================

/// A live session with one ring.
pub struct RingSession {
    shutdown: Arc<Notify>,
    driver: JoinHandle<()>,
}

impl RingSession {
    /// Scan, connect to the first advertising ring and start the driver.
    ///
    /// Returns the session handle and the event stream. The controller walks
    /// `Scanning -> Connecting -> Connected -> Idle` on the way up, so those
    /// states appear on the stream before any gesture traffic.
    pub async fn connect(
        config: SessionConfig,
    ) -> LinkResult<(Self, mpsc::UnboundedReceiver<RingEvent>)> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let mut controller = RingController::new(
            StateTx(event_tx.clone()),
            ControlTx(event_tx.clone()),
            RawTx {
                tx: event_tx,
                enabled: config.forward_raw_samples,
            },
            CommandTx(command_tx),
        );

        controller.begin_scanning();
        let ring = scan_for_rings(config.scan_duration)
            .await?
            .into_iter()
            .next()
            .ok_or(LinkError::NoRingFound)?;

        controller.begin_connecting();
        let link = RingLink::connect_with_retry(&ring, config.reconnect_delay).await?;

        let shutdown = Arc::new(Notify::new());
        let driver = tokio::spawn(drive(
            controller,
            command_rx,
            link,
            ring,
            config,
            Arc::clone(&shutdown),
        ));

        Ok((Self { shutdown, driver }, event_rx))
    }

    /// Tear the session down: stop the driver, unsubscribe and disconnect.
    ///
    /// The final [`RingEvent::State`] on the stream is `Disconnected`.
    pub async fn disconnect(self) {
        self.shutdown.notify_one();
        let _ = self.driver.await;
    }
}

/// The single logical task mutating the controller.
async fn drive(
    mut controller: SessionController,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
    mut link: RingLink,
    ring: DiscoveredRing,
    config: SessionConfig,
    shutdown: Arc<Notify>,
) {
    let clock = Instant::now();
    let mut notifications = match link.notifications().await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("notification stream unavailable: {e}");
            controller.link_lost();
            return;
        }
    };

    controller.link_established();
    flush_commands(&mut command_rx, &link).await;

    // One reconnect attempt per disconnect event, never more.
    let mut reconnect_budget = usize::from(config.auto_reconnect);

    loop {
        tokio::select! {
            () = shutdown.notified() => {
                if let Err(e) = link.disconnect().await {
                    tracing::debug!("disconnect failed: {e}");
                }
                controller.link_lost();
                break;
            }
            notification = notifications.next() => match notification {
                Some(n) if n.uuid == NOTIFY_CHARACTERISTIC_UUID => {
                    let now_ms = clock.elapsed().as_millis() as u64;
                    match controller.handle_frame(&n.value, now_ms) {
                        Ok(FrameDisposition::Processed) => {}
                        Ok(FrameDisposition::Ignored) => {
                            tracing::debug!("ignored frame in {:?}", controller.state());
                        }
                        Err(e) => tracing::debug!("dropped frame: {e}"),
                    }
                    flush_commands(&mut command_rx, &link).await;
                }
                Some(_) => {}
                None => {
                    tracing::warn!("notification stream ended");
                    if reconnect_budget > 0 {
                        reconnect_budget -= 1;
                        tokio::time::sleep(config.reconnect_delay).await;
                        match reattach(&ring).await {
                            Ok((new_link, stream)) => {
                                tracing::info!("reconnected to {}", ring.name);
                                link = new_link;
                                notifications = stream;
                                controller.link_established();
                                flush_commands(&mut command_rx, &link).await;
                                // The bound is per disconnect event: a later
                                // drop gets its own attempt.
                                reconnect_budget = usize::from(config.auto_reconnect);
                                continue;
                            }
                            Err(e) => tracing::warn!("reconnect failed: {e}"),
                        }
                    }
                    controller.link_lost();
                    break;
                }
            }
        }
    }
}

/// Re-establish the link and notification stream after a drop.
async fn reattach(
    ring: &DiscoveredRing,
) -> LinkResult<(
    RingLink,
    std::pin::Pin<Box<dyn futures::Stream<Item = btleplug::api::ValueNotification> + Send>>,
)> {
    let link = RingLink::connect(ring).await?;
    let stream = link.notifications().await?;
    Ok((link, stream))
}

/// Write every queued command, one at a time.
///
/// A failed write is logged and dropped; the controller state machine is
/// never informed of transport failures mid-session.
async fn flush_commands(command_rx: &mut mpsc::UnboundedReceiver<Command>, link: &RingLink) {
    while let Ok(command) = command_rx.try_recv() {
        if let Err(e) = link.write_command(command).await {
            tracing::warn!("command write failed: {e}");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ringflow_core::protocol::{frame_checksum, FRAME_LEN};

    fn wave_frame() -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        frame[0] = 0x02;
        frame[1] = 0x02;
        frame[FRAME_LEN - 1] = frame_checksum(&frame);
        frame
    }

    fn channel_controller(
        forward_raw: bool,
    ) -> (
        SessionController,
        mpsc::UnboundedReceiver<RingEvent>,
        mpsc::UnboundedReceiver<Command>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let controller = RingController::new(
            StateTx(event_tx.clone()),
            ControlTx(event_tx.clone()),
            RawTx {
                tx: event_tx,
                enabled: forward_raw,
            },
            CommandTx(command_tx),
        );
        (controller, event_rx, command_rx)
    }

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.scan_duration, Duration::from_secs(5));
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert!(config.auto_reconnect);
        assert!(!config.forward_raw_samples);
    }

    #[tokio::test]
    async fn test_channel_sinks_preserve_order() {
        let (mut controller, mut events, mut commands) = channel_controller(false);

        controller.begin_scanning();
        controller.begin_connecting();
        controller.link_established();
        controller.handle_frame(&wave_frame(), 0).unwrap();

        let expected = [
            RingEvent::State(ControllerState::Scanning),
            RingEvent::State(ControllerState::Connecting),
            RingEvent::State(ControllerState::Connected),
            RingEvent::State(ControllerState::Idle),
            RingEvent::Control(ControlEvent::ProvisionalWakeupIntent),
            RingEvent::State(ControllerState::VerifyWakeup),
        ];
        for expectation in expected {
            assert_eq!(events.try_recv().unwrap(), expectation);
        }
        assert!(events.try_recv().is_err());

        let expected_commands = [
            Command::EnableWave,
            Command::AwaitWave,
            Command::DisableWave,
            Command::RequestRawData,
        ];
        for expectation in expected_commands {
            assert_eq!(commands.try_recv().unwrap(), expectation);
        }
        assert!(commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_raw_forwarding_is_opt_in() {
        fn rest_frame() -> [u8; FRAME_LEN] {
            let mut frame = [0u8; FRAME_LEN];
            frame[0] = 0xA1;
            frame[1] = 0x03;
            // 512 counts on X: one g at angle zero.
            frame[6] = 0x20;
            frame[FRAME_LEN - 1] = frame_checksum(&frame);
            frame
        }

        let (mut controller, mut events, _commands) = channel_controller(false);
        controller.link_established();
        controller.handle_frame(&wave_frame(), 0).unwrap();
        controller.handle_frame(&rest_frame(), 30).unwrap();
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, RingEvent::Raw(_)));
        }

        let (mut controller, mut events, _commands) = channel_controller(true);
        controller.link_established();
        controller.handle_frame(&wave_frame(), 0).unwrap();
        controller.handle_frame(&rest_frame(), 30).unwrap();
        let mut saw_raw = false;
        while let Ok(event) = events.try_recv() {
            if let RingEvent::Raw(snapshot) = event {
                assert_eq!(snapshot.raw_x, 512);
                assert_eq!(snapshot.delta_ms, 0);
                saw_raw = true;
            }
        }
        assert!(saw_raw);
    }
}
