//! Profil-Tabelle fuer die Audio-Uebertragung
//!
//! Ein Profil buendelt alles, was beide Seiten ueber den Audio-Strom
//! wissen muessen: Codec, Frame-Dauer, Encode- und Decode-Parameter.
//! Jedes Profil traegt eine global eindeutige Ein-Byte-ID, die bei der
//! Verhandlung auf der Leitung verwendet wird.
//!
//! Encode- und Decode-Seite duerfen sich unterscheiden: die sparsamen
//! Opus-Profile kodieren bei 24 kHz mono und dekodieren bei 48 kHz mono –
//! Opus resampelt intern, und der Lautsprecher laeuft fest bei seiner
//! Hardware-Rate. Implementierungen duerfen die beiden Seiten NICHT auf
//! eine gemeinsame Rate "normalisieren".

use serde::{Deserialize, Serialize};

use crate::wire::{CODEC_TAG_CODEC2, CODEC_TAG_OPUS};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Mindestanzahl an Frames, die vor Playback-Start gepuffert sein muessen
pub const MIN_PREBUFFER_FRAMES: u32 = 5;

/// Ziel-Vorpufferung in Millisekunden (faengt typischen Transport-Jitter ab)
pub const PREBUFFER_TARGET_MS: u32 = 300;

// ---------------------------------------------------------------------------
// Basis-Typen
// ---------------------------------------------------------------------------

/// Abtastrate der Codec-Seite
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleRate {
    /// 8 kHz – Schmalband (Codec2, Telefon-Qualitaet)
    Hz8000 = 8000,
    /// 12 kHz – Mittelband
    Hz12000 = 12000,
    /// 16 kHz – Breitband
    Hz16000 = 16000,
    /// 24 kHz – Superbreitband
    Hz24000 = 24000,
    /// 48 kHz – Vollband (Hardware-Rate der Lautsprecherseite)
    #[default]
    Hz48000 = 48000,
}

impl SampleRate {
    /// Gibt die Rate als u32 in Hz zurueck
    pub fn hz(&self) -> u32 {
        *self as u32
    }
}

/// Anzahl der Audio-Kanaele (interleaved)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelCount {
    /// Mono – Standard fuer Sprache
    #[default]
    Mono = 1,
    /// Stereo – nur das SHQ-Profil
    Stereo = 2,
}

impl ChannelCount {
    pub fn count(&self) -> usize {
        *self as usize
    }
}

/// Opus-Anwendungsmodus
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpusApplication {
    /// Optimiert fuer Sprachverstaendlichkeit
    #[default]
    Voip,
    /// Optimiert fuer allgemeine Audio-Qualitaet
    Audio,
    /// Minimale Verarbeitungsverzoegerung
    RestrictedLowdelay,
}

/// Frame-Dauer in Millisekunden
///
/// Die langen Frames (200–400 ms) gehoeren zu den Codec2-Profilen und
/// buendeln mehrere Codec2-Subframes in ein Transport-Paket.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameTime {
    /// 10 ms – Ultra-Low-Latency
    Ms10 = 10,
    /// 20 ms – Low-Latency
    Ms20 = 20,
    /// 60 ms – Standard der Opus-Profile
    #[default]
    Ms60 = 60,
    /// 200 ms – Codec2 LBW
    Ms200 = 200,
    /// 320 ms – Codec2 VLBW
    Ms320 = 320,
    /// 400 ms – Codec2 ULBW
    Ms400 = 400,
}

impl FrameTime {
    /// Gibt die Frame-Dauer in Millisekunden zurueck
    pub fn as_ms(&self) -> u32 {
        *self as u32
    }

    /// Anzahl interleaved int16-Samples eines Frames bei gegebener
    /// Rate und Kanalanzahl
    pub fn frame_samples(&self, rate: SampleRate, channels: ChannelCount) -> usize {
        (rate.hz() as usize * self.as_ms() as usize / 1000) * channels.count()
    }
}

// ---------------------------------------------------------------------------
// Codec2 Modes
// ---------------------------------------------------------------------------

/// Codec2 Library-Mode
///
/// Der Diskriminant ist der Mode-Wert der Codec2-Bibliothek. Auf der
/// Leitung steht stattdessen der Ein-Byte-Mode-Header; die Abbildung
/// zwischen beiden ist eine feste Bijektion und Teil des Wire-Kontrakts –
/// beide Seiten MUESSEN dieselbe Tabelle verwenden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec2Mode {
    /// 3200 bit/s
    Mode3200 = 0,
    /// 2400 bit/s
    Mode2400 = 1,
    /// 1600 bit/s
    Mode1600 = 2,
    /// 1400 bit/s
    Mode1400 = 3,
    /// 1300 bit/s
    Mode1300 = 4,
    /// 1200 bit/s
    Mode1200 = 5,
    /// 700 bit/s (Variante C)
    Mode700C = 8,
}

impl Codec2Mode {
    /// Library-Mode-Wert (Argument fuer die Codec2-Bibliothek)
    pub fn library_mode(&self) -> i32 {
        *self as i32
    }

    /// Nominale Bitrate in bit/s
    pub fn bitrate_bps(&self) -> u32 {
        match self {
            Codec2Mode::Mode3200 => 3200,
            Codec2Mode::Mode2400 => 2400,
            Codec2Mode::Mode1600 => 1600,
            Codec2Mode::Mode1400 => 1400,
            Codec2Mode::Mode1300 => 1300,
            Codec2Mode::Mode1200 => 1200,
            Codec2Mode::Mode700C => 700,
        }
    }

    /// Mode-Header-Byte auf der Leitung
    pub fn wire_header(&self) -> u8 {
        match self {
            Codec2Mode::Mode700C => 0x00,
            Codec2Mode::Mode1200 => 0x01,
            Codec2Mode::Mode1300 => 0x02,
            Codec2Mode::Mode1400 => 0x03,
            Codec2Mode::Mode1600 => 0x04,
            Codec2Mode::Mode2400 => 0x05,
            Codec2Mode::Mode3200 => 0x06,
        }
    }

    /// Umkehrung von [`wire_header`](Self::wire_header)
    ///
    /// Unbekannte Header liefern `None` – der zugehoerige Decode schlaegt
    /// dann fehl, statt einen falschen Mode zu raten.
    pub fn from_wire_header(header: u8) -> Option<Self> {
        match header {
            0x00 => Some(Codec2Mode::Mode700C),
            0x01 => Some(Codec2Mode::Mode1200),
            0x02 => Some(Codec2Mode::Mode1300),
            0x03 => Some(Codec2Mode::Mode1400),
            0x04 => Some(Codec2Mode::Mode1600),
            0x05 => Some(Codec2Mode::Mode2400),
            0x06 => Some(Codec2Mode::Mode3200),
            _ => None,
        }
    }

    /// Mode aus dem Library-Mode-Wert
    pub fn from_library_mode(mode: i32) -> Option<Self> {
        match mode {
            0 => Some(Codec2Mode::Mode3200),
            1 => Some(Codec2Mode::Mode2400),
            2 => Some(Codec2Mode::Mode1600),
            3 => Some(Codec2Mode::Mode1400),
            4 => Some(Codec2Mode::Mode1300),
            5 => Some(Codec2Mode::Mode1200),
            8 => Some(Codec2Mode::Mode700C),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Codec-Parameter
// ---------------------------------------------------------------------------

/// Codec-Familie eines Profils
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecKind {
    Opus,
    Codec2,
}

impl CodecKind {
    /// Codec-Tag-Byte jedes Transport-Pakets
    pub fn tag_byte(&self) -> u8 {
        match self {
            CodecKind::Opus => CODEC_TAG_OPUS,
            CodecKind::Codec2 => CODEC_TAG_CODEC2,
        }
    }
}

/// Vollstaendige Opus-Parameter einer Stromrichtung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpusParams {
    pub sample_rate: SampleRate,
    pub channels: ChannelCount,
    /// Ziel-Bitrate in bit/s
    pub bitrate_bps: u32,
    pub application: OpusApplication,
    /// Encoder-Komplexitaet (0–10)
    pub complexity: u8,
}

/// Codec-Parameter einer Stromrichtung (Encode oder Decode)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecParams {
    Opus(OpusParams),
    /// Codec2 laeuft immer bei 8 kHz mono
    Codec2(Codec2Mode),
}

impl CodecParams {
    pub fn kind(&self) -> CodecKind {
        match self {
            CodecParams::Opus(_) => CodecKind::Opus,
            CodecParams::Codec2(_) => CodecKind::Codec2,
        }
    }

    pub fn sample_rate(&self) -> SampleRate {
        match self {
            CodecParams::Opus(p) => p.sample_rate,
            CodecParams::Codec2(_) => SampleRate::Hz8000,
        }
    }

    pub fn channels(&self) -> ChannelCount {
        match self {
            CodecParams::Opus(p) => p.channels,
            CodecParams::Codec2(_) => ChannelCount::Mono,
        }
    }
}

// ---------------------------------------------------------------------------
// Profil
// ---------------------------------------------------------------------------

/// Ausgehandelte Strom-Konfiguration
///
/// Jedes Feld ist Teil des Wire-Kontrakts; beide Seiten MUESSEN
/// uebereinstimmen. Das Codec-Tag ist rein informativ – die tatsaechlichen
/// Decode-Parameter kommen aus dem ausgehandelten Profil, nicht aus dem
/// Tag-Byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Wire-ID (ein Byte, global eindeutig)
    pub id: u8,
    pub frame_time: FrameTime,
    pub encode: CodecParams,
    pub decode: CodecParams,
}

impl Profile {
    pub fn codec_kind(&self) -> CodecKind {
        self.encode.kind()
    }

    pub fn codec_tag(&self) -> u8 {
        self.codec_kind().tag_byte()
    }

    /// Interleaved Samples eines Frames auf der Encode-Seite
    pub fn encode_frame_samples(&self) -> usize {
        self.frame_time
            .frame_samples(self.encode.sample_rate(), self.encode.channels())
    }

    /// Interleaved Samples eines Frames auf der Decode-Seite
    pub fn decode_frame_samples(&self) -> usize {
        self.frame_time
            .frame_samples(self.decode.sample_rate(), self.decode.channels())
    }

    /// Anzahl Frames, die vor dem Playback-Start gepuffert werden
    ///
    /// `max(MIN_PREBUFFER_FRAMES, PREBUFFER_TARGET_MS / frame_time)` –
    /// 30 Frames fuer das 10-ms-Profil, 5 fuer die 60-ms-Profile.
    pub fn prebuffer_frames(&self) -> u32 {
        MIN_PREBUFFER_FRAMES.max(PREBUFFER_TARGET_MS / self.frame_time.as_ms())
    }

    /// Validiert die Profil-Parameter
    pub fn validieren(&self) -> Result<(), String> {
        for params in [&self.encode, &self.decode] {
            if let CodecParams::Opus(p) = params {
                if p.bitrate_bps < 500 || p.bitrate_bps > 512_000 {
                    return Err(format!(
                        "Opus-Bitrate muss zwischen 500 und 512000 bit/s liegen (war: {})",
                        p.bitrate_bps
                    ));
                }
                if p.complexity > 10 {
                    return Err(format!(
                        "Opus-Komplexitaet muss zwischen 0 und 10 liegen (war: {})",
                        p.complexity
                    ));
                }
            }
        }
        if self.encode.kind() != self.decode.kind() {
            return Err("Encode- und Decode-Seite muessen dieselbe Codec-Familie nutzen".into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Profil-Tabelle
// ---------------------------------------------------------------------------

/// Die acht ausgehandelten Profile, in Zyklus-Reihenfolge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileId {
    /// Ultra Low Bandwidth – Codec2 700C, 400 ms
    Ulbw,
    /// Very Low Bandwidth – Codec2 1600, 320 ms
    Vlbw,
    /// Low Bandwidth – Codec2 3200, 200 ms
    Lbw,
    /// Medium Quality – Opus 24 kHz → 48 kHz, 60 ms
    Mq,
    /// High Quality – Opus 48 kHz, 60 ms
    Hq,
    /// Stereo High Quality – Opus 48 kHz stereo, 60 ms
    Shq,
    /// Ultra Low Latency – Opus, 10 ms
    Ull,
    /// Low Latency – Opus, 20 ms
    Ll,
}

/// Opus-Parameter der sparsamen Encode-Seite (24 kHz mono, 8 kbit/s)
const OPUS_ENC_LEAN: OpusParams = OpusParams {
    sample_rate: SampleRate::Hz24000,
    channels: ChannelCount::Mono,
    bitrate_bps: 8_000,
    application: OpusApplication::Voip,
    complexity: 5,
};

/// Opus-Parameter der Lautsprecherseite (48 kHz mono, 16 kbit/s)
const OPUS_DEC_FULL: OpusParams = OpusParams {
    sample_rate: SampleRate::Hz48000,
    channels: ChannelCount::Mono,
    bitrate_bps: 16_000,
    application: OpusApplication::Voip,
    complexity: 5,
};

impl ProfileId {
    /// Alle Profile in Zyklus-Reihenfolge
    pub const ALLE: [ProfileId; 8] = [
        ProfileId::Ulbw,
        ProfileId::Vlbw,
        ProfileId::Lbw,
        ProfileId::Mq,
        ProfileId::Hq,
        ProfileId::Shq,
        ProfileId::Ull,
        ProfileId::Ll,
    ];

    /// Standard-Profil fuer einen Anruf ohne Vorgabe
    pub const STANDARD: ProfileId = ProfileId::Mq;

    /// Wire-ID des Profils
    pub fn id(&self) -> u8 {
        match self {
            ProfileId::Ulbw => 0x10,
            ProfileId::Vlbw => 0x20,
            ProfileId::Lbw => 0x30,
            ProfileId::Mq => 0x40,
            ProfileId::Hq => 0x50,
            ProfileId::Shq => 0x60,
            ProfileId::Ull => 0x70,
            ProfileId::Ll => 0x80,
        }
    }

    /// Profil aus der Wire-ID
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALLE.iter().copied().find(|p| p.id() == id)
    }

    /// Naechstes Profil im Zyklus (mit Wraparound)
    pub fn naechstes(&self) -> ProfileId {
        let idx = Self::ALLE.iter().position(|p| p == self).unwrap_or(0);
        Self::ALLE[(idx + 1) % Self::ALLE.len()]
    }

    /// Menschenlesbarer Name
    pub fn bezeichnung(&self) -> &'static str {
        match self {
            ProfileId::Ulbw => "ULBW",
            ProfileId::Vlbw => "VLBW",
            ProfileId::Lbw => "LBW",
            ProfileId::Mq => "MQ",
            ProfileId::Hq => "HQ",
            ProfileId::Shq => "SHQ",
            ProfileId::Ull => "ULL",
            ProfileId::Ll => "LL",
        }
    }

    /// Gibt das vollstaendige [`Profile`] fuer diese ID zurueck
    pub fn config(&self) -> Profile {
        match self {
            ProfileId::Ulbw => Profile {
                id: self.id(),
                frame_time: FrameTime::Ms400,
                encode: CodecParams::Codec2(Codec2Mode::Mode700C),
                decode: CodecParams::Codec2(Codec2Mode::Mode700C),
            },
            ProfileId::Vlbw => Profile {
                id: self.id(),
                frame_time: FrameTime::Ms320,
                encode: CodecParams::Codec2(Codec2Mode::Mode1600),
                decode: CodecParams::Codec2(Codec2Mode::Mode1600),
            },
            ProfileId::Lbw => Profile {
                id: self.id(),
                frame_time: FrameTime::Ms200,
                encode: CodecParams::Codec2(Codec2Mode::Mode3200),
                decode: CodecParams::Codec2(Codec2Mode::Mode3200),
            },
            ProfileId::Mq => Profile {
                id: self.id(),
                frame_time: FrameTime::Ms60,
                encode: CodecParams::Opus(OPUS_ENC_LEAN),
                decode: CodecParams::Opus(OPUS_DEC_FULL),
            },
            ProfileId::Hq => Profile {
                id: self.id(),
                frame_time: FrameTime::Ms60,
                encode: CodecParams::Opus(OpusParams {
                    sample_rate: SampleRate::Hz48000,
                    channels: ChannelCount::Mono,
                    bitrate_bps: 16_000,
                    application: OpusApplication::Voip,
                    complexity: 5,
                }),
                decode: CodecParams::Opus(OpusParams {
                    sample_rate: SampleRate::Hz48000,
                    channels: ChannelCount::Mono,
                    bitrate_bps: 16_000,
                    application: OpusApplication::Voip,
                    complexity: 5,
                }),
            },
            ProfileId::Shq => Profile {
                id: self.id(),
                frame_time: FrameTime::Ms60,
                encode: CodecParams::Opus(OpusParams {
                    sample_rate: SampleRate::Hz48000,
                    channels: ChannelCount::Stereo,
                    bitrate_bps: 32_000,
                    application: OpusApplication::Audio,
                    complexity: 5,
                }),
                decode: CodecParams::Opus(OpusParams {
                    sample_rate: SampleRate::Hz48000,
                    channels: ChannelCount::Stereo,
                    bitrate_bps: 32_000,
                    application: OpusApplication::Audio,
                    complexity: 5,
                }),
            },
            ProfileId::Ull => Profile {
                id: self.id(),
                frame_time: FrameTime::Ms10,
                encode: CodecParams::Opus(OpusParams {
                    application: OpusApplication::RestrictedLowdelay,
                    ..OPUS_ENC_LEAN
                }),
                decode: CodecParams::Opus(OpusParams {
                    application: OpusApplication::RestrictedLowdelay,
                    ..OPUS_DEC_FULL
                }),
            },
            ProfileId::Ll => Profile {
                id: self.id(),
                frame_time: FrameTime::Ms20,
                encode: CodecParams::Opus(OPUS_ENC_LEAN),
                decode: CodecParams::Opus(OPUS_DEC_FULL),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profil_ids_eindeutig() {
        for (i, a) in ProfileId::ALLE.iter().enumerate() {
            for b in &ProfileId::ALLE[i + 1..] {
                assert_ne!(a.id(), b.id(), "{:?} und {:?} teilen eine ID", a, b);
            }
        }
    }

    #[test]
    fn profil_wire_ids() {
        assert_eq!(ProfileId::Ulbw.id(), 0x10);
        assert_eq!(ProfileId::Mq.id(), 0x40);
        assert_eq!(ProfileId::Ll.id(), 0x80);
        assert_eq!(ProfileId::from_id(0x60), Some(ProfileId::Shq));
        assert_eq!(ProfileId::from_id(0xFF), None);
    }

    #[test]
    fn standard_profil_ist_mq() {
        assert_eq!(ProfileId::STANDARD, ProfileId::Mq);
        assert_eq!(ProfileId::STANDARD.id(), 0x40);
    }

    #[test]
    fn profil_zyklus_wraparound() {
        let mut p = ProfileId::STANDARD;
        for _ in 0..ProfileId::ALLE.len() {
            p = p.naechstes();
        }
        assert_eq!(p, ProfileId::STANDARD, "Zyklus muss zum Start zurueckkehren");
        assert_eq!(ProfileId::Ll.naechstes(), ProfileId::Ulbw);
    }

    #[test]
    fn alle_profile_validierbar() {
        for id in ProfileId::ALLE {
            let profil = id.config();
            assert!(
                profil.validieren().is_ok(),
                "Profil {:?} hat ungueltige Parameter",
                id
            );
            assert_eq!(profil.id, id.id());
        }
    }

    #[test]
    fn mq_profil_asymmetrisch() {
        let mq = ProfileId::Mq.config();
        assert_eq!(mq.encode.sample_rate(), SampleRate::Hz24000);
        assert_eq!(mq.decode.sample_rate(), SampleRate::Hz48000);
        // 60 ms: 1440 Samples rein, 2880 Samples raus
        assert_eq!(mq.encode_frame_samples(), 1440);
        assert_eq!(mq.decode_frame_samples(), 2880);
    }

    #[test]
    fn shq_profil_stereo() {
        let shq = ProfileId::Shq.config();
        assert_eq!(shq.encode.channels(), ChannelCount::Stereo);
        // 60 ms bei 48 kHz stereo = 5760 interleaved Samples
        assert_eq!(shq.decode_frame_samples(), 5760);
    }

    #[test]
    fn codec2_profile_8khz_mono() {
        for id in [ProfileId::Ulbw, ProfileId::Vlbw, ProfileId::Lbw] {
            let p = id.config();
            assert_eq!(p.codec_kind(), CodecKind::Codec2);
            assert_eq!(p.encode.sample_rate(), SampleRate::Hz8000);
            assert_eq!(p.encode.channels(), ChannelCount::Mono);
        }
    }

    #[test]
    fn prebuffer_formel() {
        // 10 ms → 30 Frames, 60 ms → 5 Frames, 400 ms → min. 5 Frames
        assert_eq!(ProfileId::Ull.config().prebuffer_frames(), 30);
        assert_eq!(ProfileId::Mq.config().prebuffer_frames(), 5);
        assert_eq!(ProfileId::Ulbw.config().prebuffer_frames(), 5);
        assert_eq!(ProfileId::Lbw.config().prebuffer_frames(), 5);
        assert_eq!(ProfileId::Ll.config().prebuffer_frames(), 15);
    }

    #[test]
    fn codec2_header_bijektion_total() {
        // Hin- und Rueckrichtung ueber alle sieben Modes
        for header in 0x00..=0x06u8 {
            let mode = Codec2Mode::from_wire_header(header)
                .expect("Header 0x00–0x06 muessen bekannt sein");
            assert_eq!(mode.wire_header(), header);
        }
        for lib in [0, 1, 2, 3, 4, 5, 8] {
            let mode = Codec2Mode::from_library_mode(lib).expect("Library-Mode bekannt");
            assert_eq!(mode.library_mode(), lib);
            assert_eq!(
                Codec2Mode::from_wire_header(mode.wire_header()),
                Some(mode)
            );
        }
    }

    #[test]
    fn codec2_header_unbekannt() {
        assert_eq!(Codec2Mode::from_wire_header(0x07), None);
        assert_eq!(Codec2Mode::from_wire_header(0xFF), None);
        assert_eq!(Codec2Mode::from_library_mode(6), None);
        assert_eq!(Codec2Mode::from_library_mode(7), None);
    }

    #[test]
    fn codec2_header_tabelle() {
        assert_eq!(Codec2Mode::Mode700C.wire_header(), 0x00);
        assert_eq!(Codec2Mode::Mode1200.wire_header(), 0x01);
        assert_eq!(Codec2Mode::Mode1300.wire_header(), 0x02);
        assert_eq!(Codec2Mode::Mode1400.wire_header(), 0x03);
        assert_eq!(Codec2Mode::Mode1600.wire_header(), 0x04);
        assert_eq!(Codec2Mode::Mode2400.wire_header(), 0x05);
        assert_eq!(Codec2Mode::Mode3200.wire_header(), 0x06);
    }

    #[test]
    fn frame_samples_berechnung() {
        // 20 ms bei 48 kHz mono = 960 Samples
        assert_eq!(
            FrameTime::Ms20.frame_samples(SampleRate::Hz48000, ChannelCount::Mono),
            960
        );
        // 400 ms bei 8 kHz mono = 3200 Samples
        assert_eq!(
            FrameTime::Ms400.frame_samples(SampleRate::Hz8000, ChannelCount::Mono),
            3200
        );
        // 60 ms bei 48 kHz stereo = 5760 Samples
        assert_eq!(
            FrameTime::Ms60.frame_samples(SampleRate::Hz48000, ChannelCount::Stereo),
            5760
        );
    }

    #[test]
    fn validierung_ungueltige_bitrate() {
        let mut p = ProfileId::Hq.config();
        if let CodecParams::Opus(ref mut opus) = p.encode {
            opus.bitrate_bps = 100;
        }
        assert!(p.validieren().is_err());
    }

    #[test]
    fn validierung_gemischte_codecs() {
        let mut p = ProfileId::Mq.config();
        p.decode = CodecParams::Codec2(Codec2Mode::Mode3200);
        assert!(p.validieren().is_err());
    }

    #[test]
    fn profil_serde_round_trip() {
        let p = ProfileId::Mq.config();
        let json = serde_json::to_string(&p).unwrap();
        let decoded: Profile = serde_json::from_str(&json).unwrap();
        assert_eq!(p, decoded);
    }
}
