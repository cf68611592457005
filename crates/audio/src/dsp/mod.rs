//! DSP-Module fuer die Sprach-Filterkette
//!
//! Alle Stufen implementieren das `AudioProcessor` Trait fuer eine
//! einheitliche Ketten-Integration. Die Reihenfolge der Kette ist fest:
//! Hochpass → Tiefpass → AGC, anschliessend Peak-Limiter. Der gesamte
//! Zustand ist pro Kanal und bleibt ueber Frames desselben Stroms
//! erhalten; bei Rekonfiguration wird er zurueckgesetzt.

pub mod agc;
pub mod highpass;
pub mod lowpass;

pub use agc::{Agc, AgcConfig};
pub use highpass::HighPass;
pub use lowpass::LowPass;

/// Gemeinsames Trait fuer alle Filter-Stufen
///
/// Alle Stufen verarbeiten interleaved f32-Samples in-place und sind
/// Send fuer die Nutzung im Audio-Callback-Thread.
pub trait AudioProcessor: Send {
    /// Verarbeitet einen Puffer interleaved Samples in-place
    fn process(&mut self, samples: &mut [f32]);

    /// Setzt den internen Zustand zurueck (Filter-Historie, Gains)
    fn reset(&mut self);
}

// ---------------------------------------------------------------------------
// VoiceFilterChain
// ---------------------------------------------------------------------------

/// Konfiguration der Sprach-Filterkette
#[derive(Debug, Clone, Copy)]
pub struct FilterChainConfig {
    /// Hochpass-Grenzfrequenz in Hz (entfernt Rumpeln und Netzbrummen)
    pub hp_cutoff_hz: f32,
    /// Tiefpass-Grenzfrequenz in Hz (Sprachband-Begrenzung)
    pub lp_cutoff_hz: f32,
    /// AGC-Zielpegel in dBFS
    pub agc_target_db: f32,
    /// Maximale AGC-Verstaerkung in dB
    pub agc_max_gain_db: f32,
}

impl Default for FilterChainConfig {
    fn default() -> Self {
        Self {
            hp_cutoff_hz: 300.0,
            lp_cutoff_hz: 3400.0,
            agc_target_db: -12.0,
            agc_max_gain_db: 12.0,
        }
    }
}

/// Sprach-Filterkette: Hochpass → Tiefpass → AGC mit Peak-Limiter
///
/// Arbeitet in-place auf int16-Frames: int16 → f32 in [-1, 1] in einen
/// Scratch-Puffer, die drei Stufen, dann zurueck nach int16 mit Clamping.
pub struct VoiceFilterChain {
    hochpass: HighPass,
    tiefpass: LowPass,
    agc: Agc,
    scratch: Vec<f32>,
}

impl VoiceFilterChain {
    /// Erstellt die Kette fuer `channels` Kanaele bei `sample_rate` Hz.
    ///
    /// `frame_samples` dimensioniert den Scratch-Puffer vor, damit der
    /// Callback-Pfad nicht allokiert.
    pub fn new(
        channels: usize,
        sample_rate: u32,
        frame_samples: usize,
        config: FilterChainConfig,
    ) -> Self {
        Self {
            hochpass: HighPass::new(channels, config.hp_cutoff_hz, sample_rate),
            tiefpass: LowPass::new(channels, config.lp_cutoff_hz, sample_rate),
            agc: Agc::new(
                channels,
                AgcConfig::new(config.agc_target_db, config.agc_max_gain_db, sample_rate),
            ),
            scratch: vec![0.0; frame_samples],
        }
    }

    /// Verarbeitet einen int16-Frame in-place.
    pub fn process_frame(&mut self, samples: &mut [i16]) {
        if samples.is_empty() {
            return;
        }
        if self.scratch.len() < samples.len() {
            self.scratch.resize(samples.len(), 0.0);
        }
        let arbeit = &mut self.scratch[..samples.len()];

        for (f, s) in arbeit.iter_mut().zip(samples.iter()) {
            *f = *s as f32 / 32768.0;
        }

        self.hochpass.process(arbeit);
        self.tiefpass.process(arbeit);
        self.agc.process(arbeit);

        for (s, f) in samples.iter_mut().zip(arbeit.iter()) {
            *s = (f.clamp(-1.0, 1.0) * 32767.0) as i16;
        }
    }

    /// Setzt den Zustand aller Stufen zurueck.
    pub fn reset(&mut self) {
        self.hochpass.reset();
        self.tiefpass.reset();
        self.agc.reset();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sinus_i16(freq: f32, rate: f32, amplitude: f32, len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = i as f32 / rate;
                ((t * freq * std::f32::consts::TAU).sin() * amplitude * 32767.0) as i16
            })
            .collect()
    }

    fn rms(samples: &[i16]) -> f32 {
        let sum: f64 = samples
            .iter()
            .map(|&s| {
                let f = s as f64 / 32768.0;
                f * f
            })
            .sum();
        ((sum / samples.len() as f64) as f32).sqrt()
    }

    #[test]
    fn kette_laesst_sprachband_durch() {
        let mut kette = VoiceFilterChain::new(1, 48000, 960, FilterChainConfig::default());
        let mut frame = sinus_i16(1000.0, 48000.0, 0.3, 960);
        // Einschwingphase
        for _ in 0..5 {
            kette.process_frame(&mut frame);
            frame = sinus_i16(1000.0, 48000.0, 0.3, 960);
        }
        kette.process_frame(&mut frame);
        assert!(
            rms(&frame) > 0.05,
            "1 kHz liegt im Sprachband und darf nicht verschwinden: rms={}",
            rms(&frame)
        );
    }

    #[test]
    fn kette_daempft_tiefe_frequenzen() {
        let mut kette = VoiceFilterChain::new(1, 48000, 960, FilterChainConfig::default());
        let eingang = sinus_i16(50.0, 48000.0, 0.5, 960);
        let eingangs_rms = rms(&eingang);
        let mut frame = eingang;
        for _ in 0..10 {
            kette.process_frame(&mut frame);
        }
        assert!(
            rms(&frame) < eingangs_rms * 0.5,
            "50 Hz muss deutlich gedaempft werden: {} vs {}",
            rms(&frame),
            eingangs_rms
        );
    }

    #[test]
    fn stille_bleibt_stille() {
        let mut kette = VoiceFilterChain::new(1, 48000, 960, FilterChainConfig::default());
        let mut frame = vec![0i16; 960];
        kette.process_frame(&mut frame);
        assert!(
            rms(&frame) < 0.001,
            "AGC darf Stille nicht aufblasen (Trigger-Level)"
        );
    }

    #[test]
    fn peak_limiter_begrenzt() {
        let mut kette = VoiceFilterChain::new(1, 48000, 960, FilterChainConfig::default());
        let mut frame = vec![i16::MAX; 960];
        kette.process_frame(&mut frame);
        let peak = frame
            .iter()
            .map(|&s| (s as f32 / 32767.0).abs())
            .fold(0.0f32, f32::max);
        assert!(peak <= 0.76, "Peak muss unter dem Limit liegen: {}", peak);
    }

    #[test]
    fn stereo_kanaele_unabhaengig() {
        let mut kette = VoiceFilterChain::new(2, 48000, 1920, FilterChainConfig::default());
        // Links Sprachband, rechts Stille
        let links = sinus_i16(1000.0, 48000.0, 0.3, 960);
        let mut frame = vec![0i16; 1920];
        for i in 0..960 {
            frame[2 * i] = links[i];
        }
        for _ in 0..5 {
            kette.process_frame(&mut frame);
        }
        let rechts: Vec<i16> = frame.iter().skip(1).step_by(2).copied().collect();
        assert!(
            rms(&rechts) < 0.01,
            "Der stille Kanal darf nicht vom lauten angeregt werden"
        );
    }

    #[test]
    fn leerer_frame_ist_noop() {
        let mut kette = VoiceFilterChain::new(1, 48000, 0, FilterChainConfig::default());
        let mut leer: Vec<i16> = Vec::new();
        kette.process_frame(&mut leer);
    }
}
