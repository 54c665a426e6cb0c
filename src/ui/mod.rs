//! UI coordination for the recorder and player widgets
//!
//! Rendering is left to the host toolkit. This module owns the gesture
//! thresholds, the recorder widget state machine and the player widget's
//! derived view state.

pub mod gesture;
pub mod player;
pub mod recorder;
pub mod runner;

pub use gesture::{SlideOutcome, SlideToCancel};
pub use player::{PlayerAction, PlayerView};
pub use recorder::{reduce, RecorderConfig, RecorderEffect, RecorderEvent, RecorderState, RecorderUi};
pub use runner::{
    forward_recording_updates, run_recorder_loop, ControllerEffectRunner, RecorderCallbacks,
    RecorderEffectRunner, RecorderHandle,
};

/// Format seconds as `m:ss`.
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(9.9), "0:09");
        assert_eq!(format_duration(65.0), "1:05");
        assert_eq!(format_duration(300.0), "5:00");
        assert_eq!(format_duration(-3.0), "0:00");
    }
}
