//! Live waveform window and level computation
//!
//! While recording, one amplitude sample is appended every 100ms. Only the
//! most recent `WAVEFORM_CAPACITY` samples are kept for the recorder widget
//! and attached to the finished message.

use std::collections::VecDeque;

/// Number of samples retained during live capture.
pub const WAVEFORM_CAPACITY: usize = 50;

/// Sliding window of amplitude samples, oldest dropped first.
#[derive(Debug, Clone)]
pub struct WaveformWindow {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl WaveformWindow {
    pub fn new() -> Self {
        Self::with_capacity(WAVEFORM_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append one sample, clamped to 0.0..=1.0.
    pub fn push(&mut self, sample: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        let sample = if sample.is_finite() {
            sample.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.samples.push_back(sample);
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.samples.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for WaveformWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// RMS of a block of PCM samples, normalized to 0.0..=1.0.
pub fn rms_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let normalized = s as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    let rms = (sum_squares / samples.len() as f64).sqrt();
    (rms as f32).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_bounded() {
        let mut window = WaveformWindow::new();
        for i in 0..100 {
            window.push(i as f32 / 100.0);
        }
        assert_eq!(window.len(), WAVEFORM_CAPACITY);
    }

    #[test]
    fn window_drops_oldest_first() {
        let mut window = WaveformWindow::with_capacity(3);
        for s in [0.1, 0.2, 0.3, 0.4] {
            window.push(s);
        }
        assert_eq!(window.to_vec(), vec![0.2, 0.3, 0.4]);
    }

    #[test]
    fn window_clamps_samples() {
        let mut window = WaveformWindow::new();
        window.push(1.7);
        window.push(-0.2);
        window.push(f32::NAN);
        assert_eq!(window.to_vec(), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn window_clear() {
        let mut window = WaveformWindow::new();
        window.push(0.5);
        window.clear();
        assert!(window.is_empty());
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms_level(&[]), 0.0);
        assert_eq!(rms_level(&[0; 480]), 0.0);
    }

    #[test]
    fn rms_of_full_scale_is_one() {
        let level = rms_level(&[i16::MAX; 480]);
        assert!(level >= 0.99 && level <= 1.0, "got {}", level);
    }

    #[test]
    fn rms_of_sine_is_in_range() {
        let samples: Vec<i16> = (0..1000)
            .map(|i| ((i as f32 / 100.0).sin() * 16000.0) as i16)
            .collect();
        let level = rms_level(&samples);
        assert!(level > 0.0 && level < 1.0, "got {}", level);
    }
}
