//! Core types for the Ringflow controller
//!
//! This module provides the fundamental types flowing through the gesture
//! pipeline:
//! - Raw accelerometer samples as decoded from the wire
//! - Per-sample feature windows (net g-force, angular position, predicates)
//! - Controller states and the invariants tied to them
//! - Control events delivered to the host

use serde::{Deserialize, Serialize};

// ============================================================================
// Raw Samples
// ============================================================================

/// One decoded accelerometer reading.
///
/// Each axis is a signed 12-bit value; one g equals 512 counts (the sensor
/// runs at ±4 g over a 12-bit range). Axes follow the ring's mounting: Z runs
/// through the finger, Y is tangent to the ring band, X points up when worn.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    /// Vertical axis, signed 12-bit counts.
    pub x: i16,
    /// Tangential axis, signed 12-bit counts.
    pub y: i16,
    /// Finger axis, signed 12-bit counts.
    pub z: i16,
}

/// Accelerometer counts per g.
pub const COUNTS_PER_G: f32 = 512.0;

impl RawSample {
    /// Create a sample from per-axis counts.
    #[must_use]
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    /// Net g-force: magnitude of the acceleration vector with the 1 g
    /// gravity contribution removed isotropically.
    #[must_use]
    pub fn net_g(self) -> f32 {
        let x = f32::from(self.x);
        let y = f32::from(self.y);
        let z = f32::from(self.z);
        let magnitude = libm::sqrtf(x * x + y * y + z * z) / COUNTS_PER_G;
        libm::fabsf(magnitude - 1.0)
    }

    /// Rotation about the finger axis, `atan2(y, x)` in `[-pi, pi]`.
    #[must_use]
    pub fn scroll_pos(self) -> f32 {
        libm::atan2f(f32::from(self.y), f32::from(self.x))
    }
}

// ============================================================================
// Feature Windows
// ============================================================================

/// Derived features for one consumed sample.
///
/// Rebuilt per sample from the sliding pair of the current reading and the
/// retained history. `filtered_*` values are the band-classified versions of
/// their `raw_*` counterparts; `abs_pos` is the unwrapped angular position.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowFeatures {
    /// Session identity; increments whenever the inter-sample gap exceeds
    /// the session gap and history is re-initialised.
    pub session: u32,
    /// Index of this sample within its session, starting at 0.
    pub sample_number: u32,
    /// Interval since the previous sample in the same session, in
    /// milliseconds. Zero on the first sample of a session.
    pub delta_ms: u64,
    /// Net g-force before band classification.
    pub raw_net_g: f32,
    /// Angular position before band classification, `[-pi, pi]`.
    pub raw_scroll_pos: f32,
    /// Band-classified angular position.
    pub filtered_scroll_pos: f32,
    /// Wrap-aware angular delta from the previous filtered position,
    /// `(-pi, pi]`.
    pub filtered_scroll_diff: f32,
    /// Thresholded net g-force (zero at rest, raw magnitude on impact).
    pub filtered_net_g: f32,
    /// Unwrapped absolute position after this sample.
    pub abs_pos: f32,
    /// A tap was recognised on this sample.
    pub is_tap: bool,
    /// A scroll-up step was recognised on this sample.
    pub is_scroll_up: bool,
    /// A scroll-down step was recognised on this sample.
    pub is_scroll_down: bool,
}

/// Diagnostic record forwarded to the optional raw-sample sink.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshot {
    /// Vertical axis counts.
    pub raw_x: i16,
    /// Tangential axis counts.
    pub raw_y: i16,
    /// Finger axis counts.
    pub raw_z: i16,
    /// Angular position before classification.
    pub raw_scroll_pos: f32,
    /// Angular position after classification.
    pub filtered_scroll_pos: f32,
    /// Wrap-aware angular delta.
    pub filtered_scroll_diff: f32,
    /// Net g-force before classification.
    pub raw_net_g: f32,
    /// Net g-force after classification.
    pub filtered_net_g: f32,
    /// Whether this sample was classified as a tap.
    pub is_tap: bool,
    /// Interval since the previous sample, in milliseconds.
    pub delta_ms: u64,
}

impl RawSnapshot {
    /// Build a snapshot from a raw sample and its feature window.
    #[must_use]
    pub fn new(raw: RawSample, features: &WindowFeatures) -> Self {
        Self {
            raw_x: raw.x,
            raw_y: raw.y,
            raw_z: raw.z,
            raw_scroll_pos: features.raw_scroll_pos,
            filtered_scroll_pos: features.filtered_scroll_pos,
            filtered_scroll_diff: features.filtered_scroll_diff,
            raw_net_g: features.raw_net_g,
            filtered_net_g: features.filtered_net_g,
            is_tap: features.is_tap,
            delta_ms: features.delta_ms,
        }
    }
}

// ============================================================================
// Controller States
// ============================================================================

/// State of the ring controller.
///
/// Three invariants are tied to the current state:
/// - on-ring wave detection is enabled iff the state is [`Idle`](Self::Idle);
/// - raw-data polling runs iff the state is one of
///   [`UserInput`](Self::UserInput), [`VerifyWakeup`](Self::VerifyWakeup) or
///   [`VerifySelect`](Self::VerifySelect);
/// - the absolute position accumulates iff the state is one of the two
///   verification states.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerState {
    /// Searching for an advertising ring.
    Scanning,
    /// A ring was selected and the link is being established.
    Connecting,
    /// Link up, services discovered, notifications subscribed.
    Connected,
    /// Armed: waiting for the on-ring wave detector to fire.
    Idle,
    /// A wave was reported; waiting for the confirmation rotation.
    VerifyWakeup,
    /// Awake: scrolls and taps are delivered to the host.
    UserInput,
    /// A tap was recognised; waiting for the confirmation rotation.
    VerifySelect,
    /// No link.
    Disconnected,
}

impl ControllerState {
    /// Whether the ring's wave-gesture detector should be enabled here.
    #[must_use]
    pub const fn wave_detection_enabled(self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Whether raw accelerometer polling runs in this state.
    #[must_use]
    pub const fn polling_active(self) -> bool {
        matches!(self, Self::UserInput | Self::VerifyWakeup | Self::VerifySelect)
    }

    /// Whether the absolute position accumulates angular deltas here.
    #[must_use]
    pub const fn accumulates_position(self) -> bool {
        matches!(self, Self::VerifyWakeup | Self::VerifySelect)
    }
}

// ============================================================================
// Control Events
// ============================================================================

/// Control events delivered to the host.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlEvent {
    /// One scroll step away from the user.
    ScrollUp,
    /// One scroll step towards the user.
    ScrollDown,
    /// The ring reported a wave; the wakeup rotation gate is now open.
    ProvisionalWakeupIntent,
    /// A tap was recognised; the selection rotation gate is now open.
    ProvisionalSelectionIntent,
    /// A quarter of the confirmation rotation is complete.
    VerifyIntent25,
    /// Half of the confirmation rotation is complete.
    VerifyIntent50,
    /// Three quarters of the confirmation rotation are complete.
    VerifyIntent75,
    /// The wakeup rotation completed a full revolution.
    ConfirmWakeupIntent,
    /// The selection rotation completed a full revolution.
    ConfirmSelectionIntent,
    /// The rotation reversed past the cancel threshold.
    CancelIntent,
    /// The rotation window elapsed without confirmation.
    Timeout,
}

// ============================================================================
// Tests
// ============================================================================
