//! Per-sample feature extraction and gesture predicates
//!
//! Each consumed accelerometer reading is reduced to a [`WindowFeatures`]
//! value: net g-force and angular position, their band-classified versions,
//! the wrap-aware angular delta, the unwrapped absolute position, and the
//! tap/scroll predicates. Only the two most recent filtered values are
//! retained; a gap longer than [`tunables::SESSION_GAP_MS`] between samples
//! re-initialises the history and starts a new session.

use core::f32::consts::PI;

use crate::types::{RawSample, WindowFeatures};

/// Compile-time thresholds of the gesture pipeline.
pub mod tunables {
    /// Initial confirmation window, in milliseconds.
    pub const INTENT_INITIAL_MS: u64 = 2_000;
    /// Window extension granted per completed quarter revolution.
    pub const INTENT_EXTRA_MS: u64 = 500;
    /// Angular rate a sample must exceed to count as a scroll step, rad/s.
    pub const SCROLL_RATE_RAD_PER_S: f32 = 5.0;
    /// Absolute floor on the per-sample scroll threshold, rad.
    pub const SCROLL_FLOOR_RAD: f32 = 0.4;
    /// Reverse rotation that cancels a confirmation, rad.
    pub const CANCEL_THRESHOLD_RAD: f32 = core::f32::consts::FRAC_PI_4;
    /// Upper edge of the rest band, g.
    pub const REST_BAND_MAX_G: f32 = 0.50;
    /// Lower edge of the impact band, g.
    pub const IMPACT_BAND_MIN_G: f32 = 1.25;
    /// Force above which a single sample is a tap regardless of context, g.
    pub const EXTREME_TAP_G: f32 = 3.0;
    /// Inter-sample gap that starts a new session, milliseconds.
    pub const SESSION_GAP_MS: u64 = 2_000;
}

// ============================================================================
// Angular Math
// ============================================================================

/// Wrap-aware angular delta between two positions in `[-pi, pi]`.
///
/// The result lies in `(-pi, pi]` and keeps the sign of the shorter way
/// around the circle, so a rotation crossing the `+pi`/`-pi` seam is not
/// mistaken for a near-full turn in the opposite direction.
#[must_use]
pub fn wrap_delta(current: f32, previous: f32) -> f32 {
    const TAU: f32 = 2.0 * PI;

    if current <= 0.0 && previous >= 0.0 {
        if previous - current < PI {
            current - previous
        } else {
            TAU + (current - previous)
        }
    } else if current >= 0.0 && previous <= 0.0 {
        if current - previous < PI {
            current - previous
        } else {
            (current - previous) - TAU
        }
    } else {
        current - previous
    }
}

/// Per-sample angular threshold for scroll recognition.
///
/// Scales with the inter-sample interval so the required angular *rate*
/// stays constant, with an absolute floor for fast polling.
#[must_use]
pub fn scroll_threshold(delta_ms: u64) -> f32 {
    let rate_term = tunables::SCROLL_RATE_RAD_PER_S * (delta_ms as f32 / 1000.0);
    if rate_term > tunables::SCROLL_FLOOR_RAD {
        rate_term
    } else {
        tunables::SCROLL_FLOOR_RAD
    }
}

// ============================================================================
// History
// ============================================================================

/// Two-slot ring holding the two most recent values of one series.
///
/// `push` coalesces: a value exactly equal to the stored newest one does not
/// shift the ring. This keeps an isolated impact spike visible between two
/// rest samples even when fast polling reads the same force twice.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TwoSlot {
    older: f32,
    newest: f32,
}

impl TwoSlot {
    /// Push a value, coalescing exact repeats of the newest slot.
    pub fn push(&mut self, value: f32) {
        if value != self.newest {
            self.older = self.newest;
            self.newest = value;
        }
    }

    /// Most recent stored value.
    #[must_use]
    pub const fn newest(self) -> f32 {
        self.newest
    }

    /// Second most recent stored value.
    #[must_use]
    pub const fn older(self) -> f32 {
        self.older
    }
}

/// Retained history: the two most recent filtered values of each series.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct History {
    /// Filtered net g-force.
    pub net_g: TwoSlot,
    /// Filtered angular position.
    pub scroll_pos: TwoSlot,
    /// Filtered angular delta.
    pub scroll_diff: TwoSlot,
}

// ============================================================================
// Feature Extractor
// ============================================================================

/// How the current controller state classifies samples.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WindowMode {
    /// Awake input handling: three-band classification and gesture
    /// predicates.
    Interactive,
    /// Confirmation rotation: every sample is treated as rest and the
    /// absolute position accumulates.
    Verification,
}

/// Stateful per-sample feature extractor.
#[derive(Clone, Debug, Default)]
pub struct FeatureExtractor {
    history: History,
    session: u32,
    sample_number: u32,
    last_seen_ms: Option<u64>,
    abs_pos: f32,
}

impl FeatureExtractor {
    /// Create an extractor with empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current unwrapped absolute position.
    #[must_use]
    pub const fn abs_pos(&self) -> f32 {
        self.abs_pos
    }

    /// Current session identity.
    #[must_use]
    pub const fn session(&self) -> u32 {
        self.session
    }

    /// Retained history, newest values last pushed.
    #[must_use]
    pub const fn history(&self) -> &History {
        &self.history
    }

    /// Forget everything, including the absolute position anchor.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn start_new_session(&mut self) {
        self.history = History::default();
        self.sample_number = 0;
        self.session = self.session.wrapping_add(1);
    }

    /// Consume one reading and produce its feature window.
    ///
    /// `now_ms` is a monotonic timestamp supplied by the caller; a gap above
    /// [`tunables::SESSION_GAP_MS`] since the previous reading starts a new
    /// session before classification.
    pub fn ingest(&mut self, raw: RawSample, now_ms: u64, mode: WindowMode) -> WindowFeatures {
        let delta_ms = match self.last_seen_ms {
            Some(prev) if now_ms.saturating_sub(prev) > tunables::SESSION_GAP_MS => {
                self.start_new_session();
                0
            }
            Some(prev) => now_ms.saturating_sub(prev),
            None => 0,
        };
        self.last_seen_ms = Some(now_ms);

        let raw_net_g = raw.net_g();
        let raw_scroll_pos = raw.scroll_pos();
        let previous_pos = self.history.scroll_pos.newest();
        let first_of_session = self.sample_number == 0;
        let bootstrap = self.sample_number < 2;

        let (filtered_pos, filtered_diff, filtered_net_g, at_rest) = match mode {
            WindowMode::Verification => {
                let diff = if first_of_session {
                    0.0
                } else {
                    wrap_delta(raw_scroll_pos, previous_pos)
                };
                (raw_scroll_pos, diff, 0.0, true)
            }
            WindowMode::Interactive if bootstrap => {
                // Rest handling, but with the raw force kept above the rest
                // band so the history starts from real values.
                let net = if raw_net_g < tunables::REST_BAND_MAX_G {
                    0.0
                } else {
                    raw_net_g
                };
                let diff = if first_of_session {
                    0.0
                } else {
                    wrap_delta(raw_scroll_pos, previous_pos)
                };
                (raw_scroll_pos, diff, net, true)
            }
            WindowMode::Interactive => {
                if raw_net_g < tunables::REST_BAND_MAX_G {
                    let diff = wrap_delta(raw_scroll_pos, previous_pos);
                    (raw_scroll_pos, diff, 0.0, true)
                } else if raw_net_g > tunables::IMPACT_BAND_MIN_G {
                    (previous_pos, 0.0, raw_net_g, false)
                } else {
                    // Ambiguous band: hold position, report nothing.
                    (previous_pos, 0.0, 0.0, false)
                }
            }
        };

        match mode {
            WindowMode::Verification => self.abs_pos += filtered_diff,
            WindowMode::Interactive if at_rest => self.abs_pos = filtered_pos,
            WindowMode::Interactive => {}
        }

        let mut is_tap = false;
        let mut is_scroll_up = false;
        let mut is_scroll_down = false;
        if mode == WindowMode::Interactive && !bootstrap {
            let older = self.history.net_g.older();
            let newest = self.history.net_g.newest();
            // A single-sample spike preceded and followed by rest, or an
            // extreme force on the previous sample.
            is_tap = newest > tunables::EXTREME_TAP_G
                || (older == 0.0
                    && newest > tunables::IMPACT_BAND_MIN_G
                    && filtered_net_g == 0.0);
            if !is_tap {
                let threshold = scroll_threshold(delta_ms);
                is_scroll_up = filtered_diff > threshold;
                is_scroll_down = filtered_diff < -threshold;
            }
        }

        self.history.net_g.push(filtered_net_g);
        self.history.scroll_pos.push(filtered_pos);
        self.history.scroll_diff.push(filtered_diff);

        let sample_number = self.sample_number;
        self.sample_number += 1;

        WindowFeatures {
            session: self.session,
            sample_number,
            delta_ms,
            raw_net_g,
            raw_scroll_pos,
            filtered_scroll_pos: filtered_pos,
            filtered_scroll_diff: filtered_diff,
            filtered_net_g,
            abs_pos: self.abs_pos,
            is_tap,
            is_scroll_up,
            is_scroll_down,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    fn sample_at(angle: f32, magnitude: f32) -> RawSample {
        let (sin, cos) = libm::sincosf(angle);
        RawSample::new((magnitude * cos) as i16, (magnitude * sin) as i16, 0)
    }

    fn rest_at(angle: f32) -> RawSample {
        sample_at(angle, 512.0)
    }

    #[test]
    fn test_wrap_delta_same_sign() {
        assert!((wrap_delta(1.0, 0.4) - 0.6).abs() < EPS);
        assert!((wrap_delta(-1.0, -0.4) + 0.6).abs() < EPS);
    }

    #[test]
    fn test_wrap_delta_seam_crossing() {
        // Short way across the +pi/-pi seam keeps the rotation sign.
        assert!((wrap_delta(-3.0, 3.0) - 0.2832).abs() < 1e-3);
        assert!((wrap_delta(3.0, -3.0) + 0.2832).abs() < 1e-3);
        // Short way through zero.
        assert!((wrap_delta(-0.2, 0.3) + 0.5).abs() < EPS);
        assert!((wrap_delta(0.3, -0.2) - 0.5).abs() < EPS);
    }

    #[test]
    fn test_wrap_delta_properties() {
        // Result in (-pi, pi] and antisymmetric modulo a full turn.
        let mut angle = -3.1f32;
        while angle < 3.1 {
            let mut other = -3.1f32;
            while other < 3.1 {
                let forward = wrap_delta(angle, other);
                let backward = wrap_delta(other, angle);
                assert!(forward > -PI - EPS && forward <= PI + EPS);
                let cycle = (forward + backward).abs();
                assert!(cycle < EPS || (cycle - 2.0 * PI).abs() < EPS);
                other += 0.37;
            }
            angle += 0.37;
        }
    }

    #[test]
    fn test_scroll_threshold_floor_and_rate() {
        // Floor governs at fast polling, the rate term at slow polling.
        assert!((scroll_threshold(30) - 0.4).abs() < EPS);
        assert!((scroll_threshold(80) - 0.4).abs() < EPS);
        assert!((scroll_threshold(100) - 0.5).abs() < EPS);
        assert!((scroll_threshold(250) - 1.25).abs() < EPS);
        assert!((scroll_threshold(0) - 0.4).abs() < EPS);
    }

    #[test]
    fn test_two_slot_coalescing() {
        let mut slot = TwoSlot::default();
        slot.push(0.0);
        slot.push(1.6);
        assert_eq!(slot.older(), 0.0);
        assert_eq!(slot.newest(), 1.6);

        // Exact repeat does not shift the spike out.
        slot.push(1.6);
        assert_eq!(slot.older(), 0.0);
        assert_eq!(slot.newest(), 1.6);

        slot.push(0.0);
        assert_eq!(slot.older(), 1.6);
        assert_eq!(slot.newest(), 0.0);
    }

    #[test]
    fn test_session_reset_on_gap() {
        let mut extractor = FeatureExtractor::new();
        let first = extractor.ingest(rest_at(0.0), 1_000, WindowMode::Interactive);
        assert_eq!(first.session, 0);
        assert_eq!(first.sample_number, 0);
        assert_eq!(first.delta_ms, 0);

        let second = extractor.ingest(rest_at(0.2), 1_100, WindowMode::Interactive);
        assert_eq!(second.session, 0);
        assert_eq!(second.sample_number, 1);
        assert_eq!(second.delta_ms, 100);

        // A gap above two seconds starts a new interaction.
        let third = extractor.ingest(rest_at(0.4), 3_200, WindowMode::Interactive);
        assert_eq!(third.session, 1);
        assert_eq!(third.sample_number, 0);
        assert_eq!(third.delta_ms, 0);
        assert_eq!(third.filtered_scroll_diff, 0.0);
    }

    #[test]
    fn test_bootstrap_keeps_strong_force() {
        let mut extractor = FeatureExtractor::new();
        let strong = extractor.ingest(sample_at(0.0, 1331.0), 0, WindowMode::Interactive);
        assert!(strong.filtered_net_g > 1.5);

        let mut extractor = FeatureExtractor::new();
        let weak = extractor.ingest(sample_at(0.0, 612.0), 0, WindowMode::Interactive);
        assert_eq!(weak.filtered_net_g, 0.0);
    }

    #[test]
    fn test_band_classification() {
        let mut extractor = FeatureExtractor::new();
        extractor.ingest(rest_at(0.0), 0, WindowMode::Interactive);
        extractor.ingest(rest_at(0.1), 30, WindowMode::Interactive);

        // Impact: position held, delta zero, force reported.
        let impact = extractor.ingest(sample_at(1.0, 1331.0), 60, WindowMode::Interactive);
        assert!((impact.filtered_scroll_pos - 0.1).abs() < 0.01);
        assert_eq!(impact.filtered_scroll_diff, 0.0);
        assert!(impact.filtered_net_g > 1.5);

        // Ambiguous: position held, everything else zero.
        let ambiguous = extractor.ingest(sample_at(1.0, 950.0), 90, WindowMode::Interactive);
        assert!((ambiguous.filtered_scroll_pos - 0.1).abs() < 0.01);
        assert_eq!(ambiguous.filtered_scroll_diff, 0.0);
        assert_eq!(ambiguous.filtered_net_g, 0.0);

        // Rest: position follows the reading again.
        let rest = extractor.ingest(rest_at(0.3), 120, WindowMode::Interactive);
        assert!((rest.filtered_scroll_pos - 0.3).abs() < 0.01);
        assert!((rest.filtered_scroll_diff - 0.2).abs() < 0.01);
        assert_eq!(rest.filtered_net_g, 0.0);
    }

    #[test]
    fn test_tap_spike_between_rest() {
        let mut extractor = FeatureExtractor::new();
        for i in 0..3 {
            let window = extractor.ingest(rest_at(0.0), i * 30, WindowMode::Interactive);
            assert!(!window.is_tap);
        }
        let impact = extractor.ingest(sample_at(0.0, 1331.0), 90, WindowMode::Interactive);
        assert!(!impact.is_tap);

        let release = extractor.ingest(rest_at(0.0), 120, WindowMode::Interactive);
        assert!(release.is_tap);
        assert!(!release.is_scroll_up && !release.is_scroll_down);
    }

    #[test]
    fn test_tap_extreme_force() {
        let mut extractor = FeatureExtractor::new();
        for i in 0..3 {
            extractor.ingest(rest_at(0.0), i * 30, WindowMode::Interactive);
        }
        // A spike past the extreme threshold needs more than one axis: a
        // single axis tops out at 2047 counts, just under 3 net g. Two
        // axes at 1500 counts net about 3.14 g.
        let spike = extractor.ingest(RawSample::new(1500, 1500, 0), 90, WindowMode::Interactive);
        assert!(spike.filtered_net_g > tunables::EXTREME_TAP_G);

        // The next sample taps no matter what it reads, even another
        // impact-band reading.
        let next = extractor.ingest(sample_at(0.0, 1331.0), 120, WindowMode::Interactive);
        assert!(next.filtered_net_g > tunables::IMPACT_BAND_MIN_G);
        assert!(next.is_tap);
    }

    #[test]
    fn test_no_tap_after_sustained_impact() {
        let mut extractor = FeatureExtractor::new();
        for i in 0..3 {
            extractor.ingest(rest_at(0.0), i * 30, WindowMode::Interactive);
        }
        // Two different impact readings in a row shift the rest out of the
        // history, so this is not an isolated spike.
        extractor.ingest(sample_at(0.0, 1331.0), 90, WindowMode::Interactive);
        extractor.ingest(sample_at(0.0, 1440.0), 120, WindowMode::Interactive);
        let release = extractor.ingest(rest_at(0.0), 150, WindowMode::Interactive);
        assert!(!release.is_tap);
    }

    #[test]
    fn test_scroll_threshold_edge_is_strict() {
        // At 60 ms spacing the 0.4 rad floor governs: a delta of exactly
        // 0.40 is not a scroll, 0.41 is.
        let mut extractor = FeatureExtractor::new();
        for i in 0..2 {
            extractor.ingest(rest_at(0.0), i * 60, WindowMode::Interactive);
        }
        let at_floor = extractor.ingest(rest_at(0.40), 120, WindowMode::Interactive);
        assert!((at_floor.filtered_scroll_diff - 0.40).abs() < 0.005);
        assert!(!at_floor.is_scroll_up);

        let mut extractor = FeatureExtractor::new();
        for i in 0..2 {
            extractor.ingest(rest_at(0.0), i * 60, WindowMode::Interactive);
        }
        let above = extractor.ingest(rest_at(0.412), 120, WindowMode::Interactive);
        assert!(above.filtered_scroll_diff > 0.405);
        assert!(above.is_scroll_up);
        assert!(!above.is_scroll_down);
    }

    #[test]
    fn test_scroll_down() {
        let mut extractor = FeatureExtractor::new();
        for i in 0..2 {
            extractor.ingest(rest_at(0.0), i * 30, WindowMode::Interactive);
        }
        let window = extractor.ingest(rest_at(-0.6), 60, WindowMode::Interactive);
        assert!(window.is_scroll_down);
        assert!(!window.is_scroll_up && !window.is_tap);
    }

    #[test]
    fn test_verification_accumulates_position() {
        let mut extractor = FeatureExtractor::new();
        extractor.ingest(rest_at(0.0), 0, WindowMode::Verification);
        let anchor = extractor.abs_pos();

        // Fourteen steps of 0.5 rad walk well past a full turn even though
        // every reading stays wrapped in [-pi, pi].
        let mut summed = 0.0f32;
        for i in 1..=14u64 {
            let window =
                extractor.ingest(rest_at(0.5 * i as f32), i * 30, WindowMode::Verification);
            assert_eq!(window.filtered_net_g, 0.0);
            summed += window.filtered_scroll_diff;
        }
        let travelled = extractor.abs_pos() - anchor;
        assert!((travelled - 7.0).abs() < 0.05);
        assert!((travelled - summed).abs() < EPS);
    }

    #[test]
    fn test_interactive_rest_tracks_position() {
        let mut extractor = FeatureExtractor::new();
        extractor.ingest(rest_at(0.0), 0, WindowMode::Interactive);
        extractor.ingest(rest_at(1.2), 30, WindowMode::Interactive);
        assert!((extractor.abs_pos() - 1.2).abs() < 0.01);

        // Impact holds the absolute position rather than assigning it.
        extractor.ingest(sample_at(2.8, 1331.0), 60, WindowMode::Interactive);
        assert!((extractor.abs_pos() - 1.2).abs() < 0.01);
    }
}
