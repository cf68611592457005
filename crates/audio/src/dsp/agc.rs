//! Automatic Gain Control (AGC)
//!
//! Regelt den Pegel blockweise auf einen Ziel-RMS: jeder Frame wird in
//! zehn gleiche Bloecke geteilt, pro Block und Kanal wird der RMS gemessen
//! und der Gain mit Attack/Release-Glaettung nachgefuehrt. Ein Hold-Zaehler
//! verhindert das Hochpumpen in kurzen Sprechpausen. Nach dem AGC begrenzt
//! ein Peak-Limiter den gesamten Frame.

use super::AudioProcessor;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Attack-Zeitkonstante in Sekunden (Gain-Reduktion)
pub const AGC_ATTACK_TIME: f32 = 0.0001;

/// Release-Zeitkonstante in Sekunden (Gain-Anhebung)
pub const AGC_RELEASE_TIME: f32 = 0.002;

/// Hold-Zeit in Sekunden vor Beginn des Release
pub const AGC_HOLD_TIME: f32 = 0.001;

/// RMS-Schwelle, unterhalb derer der Gain unveraendert bleibt
pub const AGC_TRIGGER_LEVEL: f32 = 0.003;

/// Absolutes Peak-Limit nach der Gain-Stufe
pub const AGC_PEAK_LIMIT: f32 = 0.75;

/// Anzahl der Bloecke pro Frame
pub const AGC_BLOCK_TARGET: usize = 10;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Abgeleitete AGC-Konstanten fuer eine Abtastrate
#[derive(Debug, Clone, Copy)]
pub struct AgcConfig {
    /// Ziel-RMS linear (aus dBFS)
    pub target_linear: f32,
    /// Maximaler Gain linear (aus dB)
    pub max_gain_linear: f32,
    /// Attack-Koeffizient pro Block
    pub attack_coeff: f32,
    /// Release-Koeffizient pro Block
    pub release_coeff: f32,
    /// Hold-Dauer in Samples (pro Kanal)
    pub hold_samples: i32,
}

impl AgcConfig {
    /// Leitet die Koeffizienten aus Zielpegel, Maximal-Gain und Rate ab.
    ///
    /// Glaettungskoeffizienten: `1 - exp(-1 / (T * rate))`.
    pub fn new(target_db: f32, max_gain_db: f32, sample_rate: u32) -> Self {
        let rate = sample_rate as f32;
        Self {
            target_linear: 10.0f32.powf(target_db / 10.0),
            max_gain_linear: 10.0f32.powf(max_gain_db / 10.0),
            attack_coeff: 1.0 - (-1.0 / (AGC_ATTACK_TIME * rate)).exp(),
            release_coeff: 1.0 - (-1.0 / (AGC_RELEASE_TIME * rate)).exp(),
            hold_samples: (AGC_HOLD_TIME * rate) as i32,
        }
    }
}

// ---------------------------------------------------------------------------
// Agc
// ---------------------------------------------------------------------------

/// Block-AGC mit Hold und Peak-Limiter
pub struct Agc {
    config: AgcConfig,
    channels: usize,
    current_gain: Vec<f32>,
    hold_counter: Vec<i32>,
}

impl Agc {
    pub fn new(channels: usize, config: AgcConfig) -> Self {
        Self {
            config,
            channels,
            current_gain: vec![1.0; channels],
            hold_counter: vec![0; channels],
        }
    }

    /// Aktueller Gain des Kanals (fuer Diagnose und Tests)
    pub fn current_gain(&self, channel: usize) -> f32 {
        self.current_gain[channel]
    }

    fn process_block(&mut self, samples: &mut [f32], start: usize, end: usize) {
        let block_frames = end - start;
        for ch in 0..self.channels {
            let mut sum_squares = 0.0f32;
            for i in start..end {
                let s = samples[i * self.channels + ch];
                sum_squares += s * s;
            }
            let rms = (sum_squares / block_frames as f32).sqrt();

            let target_gain = if rms > 1e-9 && rms > AGC_TRIGGER_LEVEL {
                (self.config.target_linear / rms).min(self.config.max_gain_linear)
            } else {
                self.current_gain[ch]
            };

            if target_gain < self.current_gain[ch] {
                // Attack: Gain schnell reduzieren, Hold neu aufziehen
                self.current_gain[ch] = self.config.attack_coeff * target_gain
                    + (1.0 - self.config.attack_coeff) * self.current_gain[ch];
                self.hold_counter[ch] = self.config.hold_samples;
            } else if self.hold_counter[ch] > 0 {
                self.hold_counter[ch] -= block_frames as i32;
            } else {
                // Release: Gain langsam anheben
                self.current_gain[ch] = self.config.release_coeff * target_gain
                    + (1.0 - self.config.release_coeff) * self.current_gain[ch];
            }

            let gain = self.current_gain[ch];
            for i in start..end {
                samples[i * self.channels + ch] *= gain;
            }
        }
    }

    fn limit_peaks(&self, samples: &mut [f32]) {
        let frames = samples.len() / self.channels;
        for ch in 0..self.channels {
            let mut peak = 0.0f32;
            for i in 0..frames {
                let a = samples[i * self.channels + ch].abs();
                if a > peak {
                    peak = a;
                }
            }
            if peak > AGC_PEAK_LIMIT {
                let scale = AGC_PEAK_LIMIT / peak;
                for i in 0..frames {
                    samples[i * self.channels + ch] *= scale;
                }
            }
        }
    }
}

impl AudioProcessor for Agc {
    fn process(&mut self, samples: &mut [f32]) {
        let frames = samples.len() / self.channels;
        if frames == 0 {
            return;
        }

        let block_size = (frames / AGC_BLOCK_TARGET).max(1);
        for block in 0..AGC_BLOCK_TARGET {
            let start = block * block_size;
            let end = if block == AGC_BLOCK_TARGET - 1 {
                frames
            } else {
                ((block + 1) * block_size).min(frames)
            };
            if start >= end {
                continue;
            }
            self.process_block(samples, start, end);
        }

        self.limit_peaks(samples);
    }

    fn reset(&mut self) {
        self.current_gain.fill(1.0);
        self.hold_counter.fill(0);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sinus(amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (i as f32 / 48000.0 * 440.0 * std::f32::consts::TAU).sin() * amplitude)
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    fn standard_agc() -> Agc {
        Agc::new(1, AgcConfig::new(-12.0, 12.0, 48000))
    }

    #[test]
    fn leises_signal_wird_angehoben() {
        let mut agc = standard_agc();
        let mut frame = sinus(0.02, 960);
        // Release ist langsam – viele Frames zum Einregeln
        for _ in 0..200 {
            frame = sinus(0.02, 960);
            agc.process(&mut frame);
        }
        assert!(
            rms(&frame) > 0.03,
            "Leises Signal muss Richtung Zielpegel angehoben werden: rms={}",
            rms(&frame)
        );
        assert!(agc.current_gain(0) > 1.5);
    }

    #[test]
    fn lautes_signal_wird_schnell_reduziert() {
        let mut agc = standard_agc();
        for _ in 0..5 {
            let mut frame = sinus(0.9, 960);
            agc.process(&mut frame);
        }
        assert!(
            agc.current_gain(0) < 0.2,
            "Attack muss den Gain schnell druecken: {}",
            agc.current_gain(0)
        );
    }

    #[test]
    fn unter_trigger_level_bleibt_gain() {
        let mut agc = standard_agc();
        let mut frame = sinus(0.001, 960); // RMS unter 0.003
        agc.process(&mut frame);
        assert!(
            (agc.current_gain(0) - 1.0).abs() < 1e-6,
            "Unterhalb des Trigger-Levels darf sich der Gain nicht bewegen"
        );
    }

    #[test]
    fn max_gain_begrenzt() {
        let mut agc = Agc::new(1, AgcConfig::new(-12.0, 12.0, 48000));
        let max = agc.config.max_gain_linear;
        for _ in 0..500 {
            let mut frame = sinus(0.005, 960);
            agc.process(&mut frame);
        }
        assert!(
            agc.current_gain(0) <= max + 0.01,
            "Gain darf das Maximum nicht ueberschreiten: {}",
            agc.current_gain(0)
        );
    }

    #[test]
    fn peak_limiter_haelt_limit() {
        let mut agc = standard_agc();
        let mut frame = vec![0.95f32; 960];
        agc.process(&mut frame);
        for s in &frame {
            assert!(
                s.abs() <= AGC_PEAK_LIMIT + 1e-6,
                "Limiter versagt: {}",
                s
            );
        }
    }

    #[test]
    fn reset_setzt_gain_und_hold() {
        let mut agc = standard_agc();
        let mut frame = sinus(0.9, 960);
        agc.process(&mut frame);
        agc.reset();
        assert!((agc.current_gain(0) - 1.0).abs() < f32::EPSILON);
        assert_eq!(agc.hold_counter[0], 0);
    }

    #[test]
    fn kurzer_frame_ein_block() {
        // Weniger Frames als Bloecke: block_size wird 1, Rest uebernimmt
        // der letzte Block
        let mut agc = standard_agc();
        let mut frame = sinus(0.5, 7);
        agc.process(&mut frame);
    }

    #[test]
    fn koeffizienten_formel() {
        let config = AgcConfig::new(-12.0, 12.0, 48000);
        let erwartet_attack = 1.0 - (-1.0f32 / (0.0001 * 48000.0)).exp();
        let erwartet_release = 1.0 - (-1.0f32 / (0.002 * 48000.0)).exp();
        assert!((config.attack_coeff - erwartet_attack).abs() < 1e-7);
        assert!((config.release_coeff - erwartet_release).abs() < 1e-7);
        assert_eq!(config.hold_samples, 48);
    }
}
