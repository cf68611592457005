//! fernsprech-audio – Echtzeit-Audio-Engine
//!
//! Der Kern zwischen Mikrofon/Lautsprecher und dem Paket-Transport:
//! - Capture-Engine: Burst→Frame-Ausrichtung, Filterkette, Encode im
//!   RT-Callback
//! - Playback-Engine: Partial-Frame-Wiedergabe, Decode, begrenztes PLC
//! - zwei lock-freie SPSC Ring-Puffer (PCM-Frames und kodierte Pakete)
//! - Codec-Fassade ueber Opus und Codec2
//!
//! Die RT-Callbacks sind allokationsfrei, lock-frei (bis auf ein einziges
//! try_lock fuer PLC) und loggen nicht; Diagnose laeuft ueber Zaehler.

pub mod capture;
pub mod codec;
pub mod device;
pub mod dsp;
pub mod error;
pub mod playback;
pub mod ring;

// Bequeme Re-Exporte der wichtigsten Typen
pub use capture::{CaptureConfig, CaptureEngine, CaptureStats};
pub use codec::VoiceCodec;
pub use dsp::{FilterChainConfig, VoiceFilterChain};
pub use error::{AudioError, AudioResult};
pub use playback::{PlaybackConfig, PlaybackEngine, PlaybackStats};
pub use ring::{
    EncodedConsumer, EncodedProducer, EncodedRingBuffer, PcmConsumer, PcmProducer, PcmRingBuffer,
    RingReadError, RingWriteError, WriteOutcome,
};

/// Log-Drosselung fuer Fehlerpfade, die pro Paket feuern koennen:
/// die ersten `first_n` Vorkommen loggen, danach nur jedes `every`-te.
pub(crate) struct LogThrottle {
    count: u64,
    first_n: u64,
    every: u64,
}

impl LogThrottle {
    pub(crate) fn new(first_n: u64, every: u64) -> Self {
        Self {
            count: 0,
            first_n,
            every,
        }
    }

    pub(crate) fn should_log(&mut self) -> bool {
        self.count += 1;
        self.count <= self.first_n || self.count % self.every == 0
    }
}
