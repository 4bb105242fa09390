//! Control state machine
//!
//! [`RingController`] owns the feature extractor and the verification
//! bookkeeping, consumes raw 16-byte frames plus a caller-supplied monotonic
//! clock, and drives four injected ports: a state sink, a control-event sink,
//! an optional raw-sample sink, and a command sink for outbound writes.
//!
//! All mutation happens in the caller's task; a frame is classified,
//! transitioned and dispatched as one synchronous step. For any consumed
//! sample the callback order is fixed: raw-sample sink, then control events,
//! then the state-change notification, then outbound commands.

use core::f32::consts::{FRAC_PI_2, PI};

use crate::error::FrameError;
use crate::features::{scroll_threshold, tunables, FeatureExtractor, WindowMode};
use crate::protocol::{parse_frame, Command, RingFrame};
use crate::types::{ControlEvent, ControllerState, RawSample, RawSnapshot, WindowFeatures};

const TAU: f32 = 2.0 * PI;

/// Quarter-revolution progress thresholds and the events they emit.
const MILESTONES: [(f32, ControlEvent); 3] = [
    (FRAC_PI_2, ControlEvent::VerifyIntent25),
    (PI, ControlEvent::VerifyIntent50),
    (3.0 * FRAC_PI_2, ControlEvent::VerifyIntent75),
];

// ============================================================================
// Sink Interfaces
// ============================================================================

/// Receives state-change notifications.
pub trait StateSink {
    /// Called after the controller enters `state`.
    fn on_state_change(&mut self, state: ControllerState);
}

/// Receives control events.
pub trait ControlSink {
    /// Called for each emitted control event, before any state change the
    /// same frame causes.
    fn on_control_event(&mut self, event: ControlEvent);
}

/// Receives per-sample diagnostics. Optional; see [`NoRawSink`].
pub trait RawSampleSink {
    /// Called for every consumed accelerometer sample, before control
    /// events.
    fn on_raw_sample(&mut self, snapshot: &RawSnapshot);
}

/// Issues outbound commands to the ring.
pub trait CommandSink {
    /// Enqueue one command for transmission. Must not block.
    fn send_command(&mut self, command: Command);
}

/// Raw-sample sink for hosts that do not consume diagnostics.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoRawSink;

impl RawSampleSink for NoRawSink {
    fn on_raw_sample(&mut self, _snapshot: &RawSnapshot) {}
}

/// What the controller did with an inbound frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameDisposition {
    /// The frame advanced the pipeline.
    Processed,
    /// The frame was valid but dropped: a wave outside `Idle`, a sample
    /// while polling is off, or a bare acknowledgement.
    Ignored,
}

// ============================================================================
// Controller
// ============================================================================

/// The gesture control state machine.
pub struct RingController<S, C, R, L> {
    state: ControllerState,
    extractor: FeatureExtractor,
    verify_start_pos: f32,
    verify_start_time_ms: u64,
    milestones_emitted: usize,
    state_sink: S,
    control_sink: C,
    raw_sink: R,
    command_sink: L,
}

impl<S, C, R, L> RingController<S, C, R, L>
where
    S: StateSink,
    C: ControlSink,
    R: RawSampleSink,
    L: CommandSink,
{
    /// Create a controller in `Disconnected` with the given ports.
    pub fn new(state_sink: S, control_sink: C, raw_sink: R, command_sink: L) -> Self {
        Self {
            state: ControllerState::Disconnected,
            extractor: FeatureExtractor::new(),
            verify_start_pos: 0.0,
            verify_start_time_ms: 0,
            milestones_emitted: 0,
            state_sink,
            control_sink,
            raw_sink,
            command_sink,
        }
    }

    /// Current controller state.
    #[must_use]
    pub const fn state(&self) -> ControllerState {
        self.state
    }

    /// The transport started scanning for a ring.
    pub fn begin_scanning(&mut self) {
        self.transition(ControllerState::Scanning);
    }

    /// The transport selected a ring and is connecting.
    pub fn begin_connecting(&mut self) {
        self.transition(ControllerState::Connecting);
    }

    /// The link is up and notifications are subscribed. Lands in `Idle`
    /// with wave detection armed.
    pub fn link_established(&mut self) {
        self.extractor.reset();
        self.transition(ControllerState::Connected);
        self.enter_idle();
    }

    /// The link dropped. No frame produces callbacks until the next
    /// [`link_established`](Self::link_established).
    pub fn link_lost(&mut self) {
        self.transition(ControllerState::Disconnected);
    }

    /// Consume one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] for malformed frames; the controller state
    /// is untouched in that case.
    pub fn handle_frame(
        &mut self,
        payload: &[u8],
        now_ms: u64,
    ) -> Result<FrameDisposition, FrameError> {
        let frame = parse_frame(payload)?;
        Ok(match frame {
            RingFrame::WaveDetected => self.handle_wave(now_ms),
            RingFrame::Accel(raw) => self.handle_sample(raw, now_ms),
            RingFrame::WaveAck => FrameDisposition::Ignored,
        })
    }

    fn transition(&mut self, next: ControllerState) {
        if next != self.state {
            self.state = next;
            self.state_sink.on_state_change(next);
        }
    }

    fn emit(&mut self, event: ControlEvent) {
        self.control_sink.on_control_event(event);
    }

    /// Enter `Idle` and re-arm the on-ring wave detector.
    fn enter_idle(&mut self) {
        self.transition(ControllerState::Idle);
        self.command_sink.send_command(Command::EnableWave);
        self.command_sink.send_command(Command::AwaitWave);
    }

    fn open_verification(&mut self, now_ms: u64) {
        self.verify_start_pos = self.extractor.abs_pos();
        self.verify_start_time_ms = now_ms;
        self.milestones_emitted = 0;
    }

    fn handle_wave(&mut self, now_ms: u64) -> FrameDisposition {
        if self.state != ControllerState::Idle {
            return FrameDisposition::Ignored;
        }

        self.emit(ControlEvent::ProvisionalWakeupIntent);
        self.open_verification(now_ms);
        self.transition(ControllerState::VerifyWakeup);
        self.command_sink.send_command(Command::DisableWave);
        // Prime the self-driving polling loop with its first request.
        self.command_sink.send_command(Command::RequestRawData);
        FrameDisposition::Processed
    }

    fn handle_sample(&mut self, raw: RawSample, now_ms: u64) -> FrameDisposition {
        if !self.state.polling_active() {
            return FrameDisposition::Ignored;
        }

        let mode = if self.state.accumulates_position() {
            WindowMode::Verification
        } else {
            WindowMode::Interactive
        };
        let features = self.extractor.ingest(raw, now_ms, mode);

        let snapshot = RawSnapshot::new(raw, &features);
        self.raw_sink.on_raw_sample(&snapshot);

        match self.state {
            ControllerState::UserInput => self.interactive_step(&features, now_ms),
            ControllerState::VerifyWakeup | ControllerState::VerifySelect => {
                self.verification_step(&features, now_ms);
            }
            _ => {}
        }

        // One new request per consumed sample keeps exactly one request
        // outstanding while polling remains on.
        if self.state.polling_active() {
            self.command_sink.send_command(Command::RequestRawData);
        }
        FrameDisposition::Processed
    }

    fn interactive_step(&mut self, features: &WindowFeatures, now_ms: u64) {
        if features.is_tap {
            self.emit(ControlEvent::ProvisionalSelectionIntent);
            self.open_verification(now_ms);
            self.transition(ControllerState::VerifySelect);
        } else if features.is_scroll_up {
            self.emit(ControlEvent::ScrollUp);
        } else if features.is_scroll_down {
            self.emit(ControlEvent::ScrollDown);
        }
    }

    fn verification_step(&mut self, features: &WindowFeatures, now_ms: u64) {
        let progress = self.extractor.abs_pos() - self.verify_start_pos;
        let advancing = features.filtered_scroll_diff > scroll_threshold(features.delta_ms)
            && features.filtered_net_g == 0.0;

        if advancing {
            if progress >= TAU {
                self.confirm_verification();
                return;
            }
            while self.milestones_emitted < MILESTONES.len()
                && progress >= MILESTONES[self.milestones_emitted].0
            {
                let event = MILESTONES[self.milestones_emitted].1;
                self.emit(event);
                self.verify_start_time_ms += tunables::INTENT_EXTRA_MS;
                self.milestones_emitted += 1;
            }
        }

        if progress < -tunables::CANCEL_THRESHOLD_RAD {
            self.abort_verification(ControlEvent::CancelIntent);
            return;
        }

        if now_ms.saturating_sub(self.verify_start_time_ms) > tunables::INTENT_INITIAL_MS {
            self.abort_verification(ControlEvent::Timeout);
        }
    }

    /// A full revolution completed within the window.
    fn confirm_verification(&mut self) {
        match self.state {
            ControllerState::VerifyWakeup => {
                self.emit(ControlEvent::ConfirmWakeupIntent);
                self.transition(ControllerState::UserInput);
            }
            ControllerState::VerifySelect => {
                self.emit(ControlEvent::ConfirmSelectionIntent);
                self.enter_idle();
            }
            _ => {}
        }
    }

    /// The rotation reversed or the window elapsed.
    fn abort_verification(&mut self, event: ControlEvent) {
        self.emit(event);
        match self.state {
            ControllerState::VerifyWakeup => self.enter_idle(),
            ControllerState::VerifySelect => self.transition(ControllerState::UserInput),
            _ => {}
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
