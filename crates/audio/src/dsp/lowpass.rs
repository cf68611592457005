//! Tiefpass erster Ordnung
//!
//! Begrenzt das Signal auf das Sprachband. Rekurrenz pro Sample und Kanal:
//! `y_n = alpha * x_n + (1 - alpha) * y_{n-1}` mit
//! `alpha = dt / (RC + dt)`, `RC = 1 / (2*pi*f_lp)`, `dt = 1 / rate`.

use super::AudioProcessor;

/// Tiefpass-Filter mit Zustand pro Kanal
pub struct LowPass {
    alpha: f32,
    channels: usize,
    /// y_{n-1} pro Kanal
    last_output: Vec<f32>,
}

impl LowPass {
    /// Erstellt den Filter fuer `channels` Kanaele.
    pub fn new(channels: usize, cutoff_hz: f32, sample_rate: u32) -> Self {
        let dt = 1.0 / sample_rate as f32;
        let rc = 1.0 / (std::f32::consts::TAU * cutoff_hz);
        Self {
            alpha: dt / (rc + dt),
            channels,
            last_output: vec![0.0; channels],
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }
}

impl AudioProcessor for LowPass {
    fn process(&mut self, samples: &mut [f32]) {
        let frames = samples.len() / self.channels;
        let one_minus_alpha = 1.0 - self.alpha;
        for i in 0..frames {
            for ch in 0..self.channels {
                let idx = i * self.channels + ch;
                let y = self.alpha * samples[idx] + one_minus_alpha * self.last_output[ch];
                self.last_output[ch] = y;
                samples[idx] = y;
            }
        }
    }

    fn reset(&mut self) {
        self.last_output.fill(0.0);
    }
}
