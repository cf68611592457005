//! Einheitliche Codec-Fassade ueber Opus und Codec2
//!
//! Kapselt audiopus und codec2 hinter einer gemeinsamen
//! Encode/Decode-Flaeche. Die Parameter kommen aus dem ausgehandelten
//! Profil (`fernsprech-protocol`); hier wird kein Codec-Tag geschrieben –
//! das Taggen der Transport-Pakete ist Sache der Pipeline.
//!
//! Besonderheiten:
//! - Opus-Encode mit Mono→Stereo-Upmix: die Capture-Seite liefert mono,
//!   Stereo-Profile verdoppeln die Samples in einen vorab allokierten
//!   Scratch (keine Allokation im Callback-Pfad).
//! - Codec2-Decode schaltet den Mode beim Header-Wechsel auf der Leitung
//!   um: Instanz verwerfen, neu erstellen, Frame-Groessen nachziehen.
//!   Mode-Wechsel sind selten (fallen mit Profilwechseln zusammen), daher
//!   wird bewusst NICHT pro Mode gecacht.
//! - PLC (Verlustverdeckung) gibt es nur fuer Opus: Decode mit Null-Paket.

use audiopus::coder::{Decoder as OpusLibDecoder, Encoder as OpusLibEncoder};
use audiopus::{Application, Bitrate, Channels, SampleRate as OpusSampleRate};
use codec2::{Codec2, Codec2Mode as LibCodec2Mode};
use tracing::{debug, info};

use fernsprech_protocol::{
    ChannelCount, Codec2Mode, CodecKind, CodecParams, OpusApplication, OpusParams, SampleRate,
};

use crate::error::{AudioError, AudioResult};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Groesster Opus-Frame: 60 ms bei 48 kHz stereo
pub const MAX_OPUS_FRAME_SAMPLES: usize = 5760;

/// Bis zu dieser Laenge gilt die Eingabe als ein Mono-Frame und wird fuer
/// Stereo-Codecs hochgemischt (60 ms bei 48 kHz mono)
const MONO_UPMIX_LIMIT: usize = 2880;

// ---------------------------------------------------------------------------
// Zustaende
// ---------------------------------------------------------------------------

/// Opus-Zustand: Encoder und Decoder teilen Rate und Kanalzahl
pub struct OpusState {
    encoder: OpusLibEncoder,
    decoder: OpusLibDecoder,
    sample_rate: SampleRate,
    channels: ChannelCount,
    upmix_scratch: Vec<i16>,
}

/// Codec2-Zustand: mutiert beim Header-Wechsel waehrend des Decodes
pub struct Codec2State {
    codec: Codec2,
    mode: Codec2Mode,
    samples_per_frame: usize,
    bytes_per_frame: usize,
}

/// Einheitliche Codec-Fassade
pub enum VoiceCodec {
    Opus(OpusState),
    Codec2(Codec2State),
}

// ---------------------------------------------------------------------------
// Erstellung
// ---------------------------------------------------------------------------

impl VoiceCodec {
    /// Erstellt den Codec aus den Profil-Parametern einer Stromrichtung.
    pub fn from_params(params: &CodecParams) -> AudioResult<Self> {
        match params {
            CodecParams::Opus(p) => Self::create_opus(p),
            CodecParams::Codec2(mode) => Self::create_codec2(*mode),
        }
    }

    /// Erstellt einen Opus-Codec (Encoder + Decoder).
    pub fn create_opus(params: &OpusParams) -> AudioResult<Self> {
        if params.complexity > 10 {
            return Err(AudioError::Konfiguration(format!(
                "Opus-Komplexitaet muss zwischen 0 und 10 liegen (war: {})",
                params.complexity
            )));
        }

        let rate = opus_sample_rate(params.sample_rate);
        let channels = opus_channels(params.channels);
        let application = opus_application(params.application);

        let mut encoder = OpusLibEncoder::new(rate, channels, application)
            .map_err(|e| AudioError::Konfiguration(e.to_string()))?;
        encoder
            .set_bitrate(Bitrate::BitsPerSecond(params.bitrate_bps as i32))
            .map_err(|e| AudioError::Konfiguration(e.to_string()))?;
        encoder
            .set_complexity(params.complexity)
            .map_err(|e| AudioError::Konfiguration(e.to_string()))?;

        let decoder = OpusLibDecoder::new(rate, channels)
            .map_err(|e| AudioError::Konfiguration(e.to_string()))?;

        debug!(
            rate = params.sample_rate.hz(),
            channels = params.channels.count(),
            bitrate = params.bitrate_bps,
            complexity = params.complexity,
            "Opus-Codec erstellt"
        );

        Ok(VoiceCodec::Opus(OpusState {
            encoder,
            decoder,
            sample_rate: params.sample_rate,
            channels: params.channels,
            upmix_scratch: vec![0i16; MAX_OPUS_FRAME_SAMPLES],
        }))
    }

    /// Erstellt einen Codec2-Codec; laeuft immer bei 8 kHz mono.
    pub fn create_codec2(mode: Codec2Mode) -> AudioResult<Self> {
        let codec = Codec2::new(lib_codec2_mode(mode));
        let samples_per_frame = codec.samples_per_frame();
        let bytes_per_frame = (codec.bits_per_frame() + 7) / 8;

        debug!(
            mode = mode.library_mode(),
            header = mode.wire_header(),
            samples_per_frame,
            bytes_per_frame,
            "Codec2-Codec erstellt"
        );

        Ok(VoiceCodec::Codec2(Codec2State {
            codec,
            mode,
            samples_per_frame,
            bytes_per_frame,
        }))
    }

    pub fn kind(&self) -> CodecKind {
        match self {
            VoiceCodec::Opus(_) => CodecKind::Opus,
            VoiceCodec::Codec2(_) => CodecKind::Codec2,
        }
    }

    pub fn is_opus(&self) -> bool {
        matches!(self, VoiceCodec::Opus(_))
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

impl VoiceCodec {
    /// Kodiert einen PCM-Frame nach `out`; liefert die Byte-Laenge.
    pub fn encode(&mut self, pcm: &[i16], out: &mut [u8]) -> AudioResult<usize> {
        match self {
            VoiceCodec::Opus(st) => {
                // Capture ist mono; erwartet der Codec stereo, werden die
                // Samples verdoppelt: [s0, s1, ...] → [s0, s0, s1, s1, ...]
                let input: &[i16] =
                    if st.channels == ChannelCount::Stereo && pcm.len() <= MONO_UPMIX_LIMIT {
                        for (i, &s) in pcm.iter().enumerate() {
                            st.upmix_scratch[2 * i] = s;
                            st.upmix_scratch[2 * i + 1] = s;
                        }
                        &st.upmix_scratch[..pcm.len() * 2]
                    } else {
                        pcm
                    };

                st.encoder
                    .encode(input, out)
                    .map_err(|e| AudioError::KodierFehler(e.to_string()))
            }
            VoiceCodec::Codec2(st) => {
                let n_sub = pcm.len() / st.samples_per_frame;
                let total = 1 + n_sub * st.bytes_per_frame;
                if total > out.len() {
                    return Err(AudioError::KodierFehler(format!(
                        "Ausgabepuffer zu klein ({} > {})",
                        total,
                        out.len()
                    )));
                }

                out[0] = st.mode.wire_header();
                for i in 0..n_sub {
                    let bits =
                        &mut out[1 + i * st.bytes_per_frame..1 + (i + 1) * st.bytes_per_frame];
                    let speech = &pcm[i * st.samples_per_frame..(i + 1) * st.samples_per_frame];
                    st.codec.encode(bits, speech);
                }
                Ok(total)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

impl VoiceCodec {
    /// Dekodiert ein Codec-Paket nach `out`; liefert die Gesamtzahl der
    /// interleaved Samples.
    pub fn decode(&mut self, encoded: &[u8], out: &mut [i16]) -> AudioResult<usize> {
        match self {
            VoiceCodec::Opus(st) => {
                let per_channel = st
                    .decoder
                    .decode(Some(encoded), &mut out[..], false)
                    .map_err(|e| AudioError::DekodierFehler(e.to_string()))?;
                Ok(per_channel * st.channels.count())
            }
            VoiceCodec::Codec2(st) => {
                if encoded.is_empty() {
                    return Err(AudioError::DekodierFehler("leeres Codec2-Paket".into()));
                }

                // Erstes Byte ist der Mode-Header der Leitung
                let header = encoded[0];
                if header != st.mode.wire_header() {
                    let neuer_mode = Codec2Mode::from_wire_header(header).ok_or_else(|| {
                        AudioError::DekodierFehler(format!(
                            "Unbekannter Codec2 Mode-Header: 0x{:02x}",
                            header
                        ))
                    })?;
                    info!(
                        header = format!("0x{:02x}", header),
                        mode = neuer_mode.library_mode(),
                        "Codec2 Mode-Wechsel"
                    );
                    st.codec = Codec2::new(lib_codec2_mode(neuer_mode));
                    st.mode = neuer_mode;
                    st.samples_per_frame = st.codec.samples_per_frame();
                    st.bytes_per_frame = (st.codec.bits_per_frame() + 7) / 8;
                }

                let data = &encoded[1..];
                let n_sub = data.len() / st.bytes_per_frame;
                let total = n_sub * st.samples_per_frame;
                if total > out.len() {
                    return Err(AudioError::DekodierFehler(format!(
                        "Ausgabepuffer zu klein ({} > {})",
                        total,
                        out.len()
                    )));
                }

                for i in 0..n_sub {
                    let speech =
                        &mut out[i * st.samples_per_frame..(i + 1) * st.samples_per_frame];
                    let bits = &data[i * st.bytes_per_frame..(i + 1) * st.bytes_per_frame];
                    st.codec.decode(speech, bits);
                }
                Ok(total)
            }
        }
    }

    /// Erzeugt einen PLC-Frame aus dem Decoder-Zustand (nur Opus).
    ///
    /// Liefert `samples_per_channel * channels` Samples oder einen Fehler.
    pub fn decode_plc(&mut self, out: &mut [i16], samples_per_channel: usize) -> AudioResult<usize> {
        match self {
            VoiceCodec::Opus(st) => {
                let needed = samples_per_channel * st.channels.count();
                if needed > out.len() {
                    return Err(AudioError::DekodierFehler(format!(
                        "Ausgabepuffer zu klein ({} > {})",
                        needed,
                        out.len()
                    )));
                }
                let per_channel = st
                    .decoder
                    .decode(None::<&[u8]>, &mut out[..needed], false)
                    .map_err(|e| AudioError::DekodierFehler(e.to_string()))?;
                Ok(per_channel * st.channels.count())
            }
            VoiceCodec::Codec2(_) => Err(AudioError::DekodierFehler(
                "Codec2 unterstuetzt kein PLC".into(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Konvertierungs-Hilfsfunktionen
// ---------------------------------------------------------------------------

fn opus_sample_rate(rate: SampleRate) -> OpusSampleRate {
    match rate {
        SampleRate::Hz8000 => OpusSampleRate::Hz8000,
        SampleRate::Hz12000 => OpusSampleRate::Hz12000,
        SampleRate::Hz16000 => OpusSampleRate::Hz16000,
        SampleRate::Hz24000 => OpusSampleRate::Hz24000,
        SampleRate::Hz48000 => OpusSampleRate::Hz48000,
    }
}

fn opus_channels(channels: ChannelCount) -> Channels {
    match channels {
        ChannelCount::Mono => Channels::Mono,
        ChannelCount::Stereo => Channels::Stereo,
    }
}

fn opus_application(app: OpusApplication) -> Application {
    match app {
        OpusApplication::Voip => Application::Voip,
        OpusApplication::Audio => Application::Audio,
        OpusApplication::RestrictedLowdelay => Application::LowDelay,
    }
}

fn lib_codec2_mode(mode: Codec2Mode) -> LibCodec2Mode {
    match mode {
        Codec2Mode::Mode3200 => LibCodec2Mode::MODE_3200,
        Codec2Mode::Mode2400 => LibCodec2Mode::MODE_2400,
        Codec2Mode::Mode1600 => LibCodec2Mode::MODE_1600,
        Codec2Mode::Mode1400 => LibCodec2Mode::MODE_1400,
        Codec2Mode::Mode1300 => LibCodec2Mode::MODE_1300,
        Codec2Mode::Mode1200 => LibCodec2Mode::MODE_1200,
        Codec2Mode::Mode700C => LibCodec2Mode::MODE_700C,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
