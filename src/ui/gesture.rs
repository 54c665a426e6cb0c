//! Slide-to-cancel thresholds for the record button.

use serde::{Deserialize, Serialize};

/// Leftward displacement (logical units) past which release cancels.
pub const CANCEL_OFFSET_THRESHOLD: f32 = -100.0;

/// Leftward release velocity (units/sec) past which release cancels.
pub const CANCEL_VELOCITY_THRESHOLD: f32 = -500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideOutcome {
    Cancel,
    SpringBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SlideToCancel {
    pub offset_threshold: f32,
    pub velocity_threshold: f32,
}

impl Default for SlideToCancel {
    fn default() -> Self {
        Self {
            offset_threshold: CANCEL_OFFSET_THRESHOLD,
            velocity_threshold: CANCEL_VELOCITY_THRESHOLD,
        }
    }
}

impl SlideToCancel {
    /// Visual offset for a drag translation. Only leftward movement shows.
    pub fn track(&self, translation_x: f32) -> f32 {
        if translation_x.is_finite() {
            translation_x.min(0.0)
        } else {
            0.0
        }
    }

    /// Decide what happens when the finger lifts.
    pub fn on_release(&self, translation_x: f32, velocity_x: f32) -> SlideOutcome {
        if self.track(translation_x) < self.offset_threshold
            || velocity_x < self.velocity_threshold
        {
            SlideOutcome::Cancel
        } else {
            SlideOutcome::SpringBack
        }
    }

    /// How far toward the cancel threshold the offset is, 0.0..=1.0.
    pub fn cancel_progress(&self, offset: f32) -> f32 {
        if self.offset_threshold >= 0.0 {
            return 0.0;
        }
        (offset / self.offset_threshold).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_slow_drag_springs_back() {
        let slide = SlideToCancel::default();
        assert_eq!(slide.on_release(-40.0, -100.0), SlideOutcome::SpringBack);
        assert_eq!(slide.on_release(-100.0, 0.0), SlideOutcome::SpringBack);
    }

    #[test]
    fn crossing_offset_threshold_cancels() {
        let slide = SlideToCancel::default();
        assert_eq!(slide.on_release(-101.0, 0.0), SlideOutcome::Cancel);
    }

    #[test]
    fn fast_flick_cancels_even_when_short() {
        let slide = SlideToCancel::default();
        assert_eq!(slide.on_release(-20.0, -650.0), SlideOutcome::Cancel);
    }

    #[test]
    fn rightward_drag_never_cancels() {
        let slide = SlideToCancel::default();
        assert_eq!(slide.track(80.0), 0.0);
        assert_eq!(slide.on_release(300.0, 900.0), SlideOutcome::SpringBack);
    }

    #[test]
    fn cancel_progress_is_clamped() {
        let slide = SlideToCancel::default();
        assert_eq!(slide.cancel_progress(0.0), 0.0);
        assert_eq!(slide.cancel_progress(-50.0), 0.5);
        assert_eq!(slide.cancel_progress(-250.0), 1.0);
    }
}
