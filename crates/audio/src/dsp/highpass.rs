//! Hochpass erster Ordnung
//!
//! Entfernt Rumpeln, Trittschall und Netzbrummen unterhalb der
//! Grenzfrequenz. Rekurrenz pro Sample und Kanal:
//! `y_n = alpha * (y_{n-1} + x_n - x_{n-1})` mit
//! `alpha = RC / (RC + dt)`, `RC = 1 / (2*pi*f_hp)`, `dt = 1 / rate`.

use super::AudioProcessor;

/// Hochpass-Filter mit Zustand pro Kanal
pub struct HighPass {
    alpha: f32,
    channels: usize,
    /// x_{n-1} pro Kanal
    last_input: Vec<f32>,
    /// y_{n-1} pro Kanal
    last_output: Vec<f32>,
}

impl HighPass {
    /// Erstellt den Filter fuer `channels` Kanaele.
    pub fn new(channels: usize, cutoff_hz: f32, sample_rate: u32) -> Self {
        let dt = 1.0 / sample_rate as f32;
        let rc = 1.0 / (std::f32::consts::TAU * cutoff_hz);
        Self {
            alpha: rc / (rc + dt),
            channels,
            last_input: vec![0.0; channels],
            last_output: vec![0.0; channels],
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }
}

impl AudioProcessor for HighPass {
    fn process(&mut self, samples: &mut [f32]) {
        let frames = samples.len() / self.channels;
        for i in 0..frames {
            for ch in 0..self.channels {
                let idx = i * self.channels + ch;
                let x = samples[idx];
                let y = self.alpha * (self.last_output[ch] + x - self.last_input[ch]);
                self.last_input[ch] = x;
                self.last_output[ch] = y;
                samples[idx] = y;
            }
        }
    }

    fn reset(&mut self) {
        self.last_input.fill(0.0);
        self.last_output.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sinus(freq: f32, rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (i as f32 / rate * freq * std::f32::consts::TAU).sin() * 0.5)
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn gleichanteil_wird_entfernt() {
        let mut hp = HighPass::new(1, 300.0, 48000);
        let mut samples = vec![0.8f32; 4800];
        // Mehrere Frames, damit der Filter einschwingt
        for _ in 0..10 {
            hp.process(&mut samples);
            samples.iter_mut().for_each(|s| *s = 0.8);
        }
        hp.process(&mut samples);
        assert!(
            rms(&samples[2400..]) < 0.05,
            "DC muss nach dem Einschwingen verschwinden"
        );
    }

    #[test]
    fn hohe_frequenz_passiert() {
        let mut hp = HighPass::new(1, 300.0, 48000);
        let eingang = sinus(2000.0, 48000.0, 4800);
        let mut samples = eingang.clone();
        hp.process(&mut samples);
        assert!(
            rms(&samples) > rms(&eingang) * 0.7,
            "2 kHz liegt weit ueber der Grenzfrequenz"
        );
    }

    #[test]
    fn zustand_ueber_frames_stetig() {
        // Ein langes Signal in zwei Haelften gefiltert muss dasselbe
        // Ergebnis liefern wie am Stueck
        let signal = sinus(440.0, 48000.0, 960);

        let mut ganz = signal.clone();
        let mut hp1 = HighPass::new(1, 300.0, 48000);
        hp1.process(&mut ganz);

        let mut geteilt = signal;
        let mut hp2 = HighPass::new(1, 300.0, 48000);
        let (a, b) = geteilt.split_at_mut(480);
        hp2.process(a);
        hp2.process(b);

        for (x, y) in ganz.iter().zip(geteilt.iter()) {
            assert!((x - y).abs() < 1e-6, "Frame-Grenze darf keinen Sprung erzeugen");
        }
    }

    #[test]
    fn reset_loescht_historie() {
        let mut hp = HighPass::new(2, 300.0, 48000);
        let mut samples = vec![0.5f32; 96];
        hp.process(&mut samples);
        hp.reset();
        assert_eq!(hp.last_input, vec![0.0, 0.0]);
        assert_eq!(hp.last_output, vec![0.0, 0.0]);
    }

    #[test]
    fn alpha_formel() {
        let hp = HighPass::new(1, 300.0, 48000);
        let dt = 1.0f32 / 48000.0;
        let rc = 1.0 / (std::f32::consts::TAU * 300.0);
        assert!((hp.alpha() - rc / (rc + dt)).abs() < 1e-7);
    }
}
