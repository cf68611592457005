//! Lautsprecher-Playback-Engine
//!
//! Besitzt den cpal-Ausgabestream und dessen Echtzeit-Callback. Der
//! Callback bedient die Hardware-Bursts aus logischen Frames des
//! PCM-Rings und verfolgt dabei einen Partial-Frame ueber mehrere
//! Callbacks (das Gegenstueck zum Akkumulations-Puffer der Capture-Seite).
//! Bei leerem Ring ueberbrueckt begrenztes Opus-PLC kurze Luecken, danach
//! kommt Stille.
//!
//! Der Decoder wird vom Schreib-Pfad (`write_encoded_packet`, nicht RT)
//! und vom Callback (PLC) geteilt: der Callback versucht ein einziges
//! nicht-blockierendes `try_lock` und faellt bei Konkurrenz auf Stille
//! zurueck. Das Fenster ist winzig, weil Konkurrenz einen leeren Ring
//! voraussetzt und dann kein Decode-Druck besteht.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, Stream, StreamConfig};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use fernsprech_protocol::CodecParams;

use crate::codec::VoiceCodec;
use crate::device;
use crate::error::{AudioError, AudioResult};
use crate::ring::{PcmConsumer, PcmProducer, PcmRingBuffer, RingWriteError, WriteOutcome};
use crate::LogThrottle;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Obergrenze aufeinanderfolgender PLC-Frames
///
/// Jenseits von etwa fuenf synthetischen Frames kippt die Opus-PLC-Qualitaet;
/// danach ist Stille ehrlicher als synthetisches Gebrabbel.
pub const MAX_CONSECUTIVE_PLC: u32 = 5;

// ---------------------------------------------------------------------------
// Konfiguration und Statistik
// ---------------------------------------------------------------------------

/// Konfiguration der Playback-Engine
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Name des Ausgabegeraets (None = Standard)
    pub device_name: Option<String>,
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Kanalanzahl
    pub channels: u16,
    /// Interleaved int16-Samples pro logischem Frame
    pub frame_samples: usize,
    /// Kapazitaet des PCM-Rings in Frames
    pub max_buffer_frames: usize,
    /// Frames, die vor dem Stream-Start gepuffert sein sollen
    pub prebuffer_frames: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            sample_rate: 48000,
            channels: 1,
            frame_samples: 2880, // 60 ms bei 48 kHz mono
            max_buffer_frames: 32,
            prebuffer_frames: 5,
        }
    }
}

/// Diagnose-Zaehler, geteilt mit dem Callback (nur Relaxed-Zugriffe)
#[derive(Default)]
struct PlaybackCounters {
    decoded_frames: AtomicU64,
    callback_invocations: AtomicU64,
    callback_silence: AtomicU64,
    callback_plc: AtomicU64,
    frames_dropped: AtomicU64,
}

/// Snapshot der Playback-Statistik
#[derive(Debug, Clone, Default)]
pub struct PlaybackStats {
    /// Erfolgreich dekodierte Pakete
    pub decoded_frames: u64,
    /// Callback-Aufrufe seit Start
    pub callback_invocations: u64,
    /// Callbacks, die weder Ring-Daten noch PLC liefern konnten
    pub callback_silence_count: u64,
    /// Erzeugte PLC-Frames
    pub callback_plc_count: u64,
    /// Per Drop-Oldest verworfene Frames
    pub frames_dropped: u64,
    /// Aktuell lesbare Frames im Ring
    pub buffered_frames: usize,
}

// ---------------------------------------------------------------------------
// Callback-Worker
// ---------------------------------------------------------------------------

/// Zustand des Echtzeit-Callbacks
///
/// Partial-Frame-Zustand (`partial`, `offset`, `valid`) gehoert exklusiv
/// dem Callback-Thread und braucht keine Atomics. Der Producer nutzt
/// seinen eigenen Drop-Scratch – niemals diesen Puffer.
struct PlaybackWorker {
    channels: usize,
    frame_samples: usize,
    consumer: PcmConsumer,
    partial: Vec<i16>,
    offset: usize,
    valid: usize,
    consecutive_plc: u32,
    decoder: Arc<Mutex<Option<VoiceCodec>>>,
    playing: Arc<AtomicBool>,
    muted: Arc<AtomicBool>,
    destroyed: Arc<AtomicBool>,
    counters: Arc<PlaybackCounters>,
}

impl PlaybackWorker {
    /// Fuellt einen Ausgabe-Burst beliebiger Groesse.
    fn on_output(&mut self, out: &mut [i16]) {
        // destroyed-Fence: ein spaeter Callback-Eintritt nach destroy()
        // darf nur noch Stille liefern
        if self.destroyed.load(Ordering::Acquire) {
            out.fill(0);
            return;
        }

        self.counters
            .callback_invocations
            .fetch_add(1, Ordering::Relaxed);

        // Nach stop_stream (playing=false, Stream noch nicht zu) nur noch
        // Stille liefern
        if !self.playing.load(Ordering::Relaxed) || self.muted.load(Ordering::Relaxed) {
            out.fill(0);
            return;
        }

        let total = out.len();
        let mut written = 0;
        let mut frames_from_ring = 0usize;

        while written < total {
            let remaining = total - written;

            // 1) Reste eines angebrochenen Frames zuerst
            if self.valid > 0 {
                let available = self.valid - self.offset;
                let to_copy = remaining.min(available);
                out[written..written + to_copy]
                    .copy_from_slice(&self.partial[self.offset..self.offset + to_copy]);
                written += to_copy;
                self.offset += to_copy;
                if self.offset >= self.valid {
                    self.offset = 0;
                    self.valid = 0;
                }
                continue;
            }

            // 2) Neuen Frame aus dem Ring holen
            if remaining >= self.frame_samples {
                // Direkt in die Ausgabe lesen
                if self
                    .consumer
                    .read(&mut out[written..written + self.frame_samples])
                    .is_ok()
                {
                    written += self.frame_samples;
                    frames_from_ring += 1;
                } else {
                    break; // Ring leer
                }
            } else {
                // Burst kleiner als ein Frame: in den Partial-Puffer lesen
                // und den Rest fuer die naechsten Callbacks aufheben
                if self.consumer.read(&mut self.partial[..]).is_ok() {
                    out[written..total].copy_from_slice(&self.partial[..remaining]);
                    self.offset = remaining;
                    self.valid = self.frame_samples;
                    written = total;
                    frames_from_ring += 1;
                } else {
                    break; // Ring leer
                }
            }
        }

        // Jeder echte Frame setzt die PLC-Folge zurueck
        if frames_from_ring > 0 {
            self.consecutive_plc = 0;
        }

        // 3) Unterlauf: begrenzte Verlustverdeckung versuchen
        let mut plc_geliefert = false;
        if written < total {
            plc_geliefert = self.try_plc(out, &mut written);
        }

        // 4) Rest mit Stille fuellen
        if written < total {
            out[written..].fill(0);
        }
        if frames_from_ring == 0 && !plc_geliefert {
            self.counters.callback_silence.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Versucht einen PLC-Frame zu synthetisieren.
    ///
    /// Nur Opus, nur unterhalb der PLC-Obergrenze, und nur mit einem
    /// einzigen nicht-blockierenden try_lock auf den Decoder.
    fn try_plc(&mut self, out: &mut [i16], written: &mut usize) -> bool {
        if self.consecutive_plc >= MAX_CONSECUTIVE_PLC {
            return false;
        }
        let Some(mut guard) = self.decoder.try_lock() else {
            return false;
        };
        let Some(codec) = guard.as_mut() else {
            return false;
        };
        if !codec.is_opus() {
            return false;
        }

        let samples_per_channel = self.frame_samples / self.channels;
        let n = match codec.decode_plc(&mut self.partial, samples_per_channel) {
            Ok(n) if n > 0 => n,
            _ => return false,
        };
        drop(guard);

        let remaining = out.len() - *written;
        let to_copy = remaining.min(n);
        out[*written..*written + to_copy].copy_from_slice(&self.partial[..to_copy]);
        *written += to_copy;
        if to_copy < n {
            // Rest des PLC-Frames fuer die naechsten Callbacks aufheben
            self.offset = to_copy;
            self.valid = n;
        } else {
            self.offset = 0;
            self.valid = 0;
        }

        self.consecutive_plc += 1;
        self.counters.callback_plc.fetch_add(1, Ordering::Relaxed);
        true
    }
}

// ---------------------------------------------------------------------------
// PlaybackEngine
// ---------------------------------------------------------------------------

/// Playback-Engine: PCM-Ring, Decoder, Ausgabestream, PLC
pub struct PlaybackEngine {
    config: Option<PlaybackConfig>,
    decoder_params: Option<CodecParams>,
    decoder: Arc<Mutex<Option<VoiceCodec>>>,
    decode_scratch: Vec<i16>,

    pcm_producer: Option<PcmProducer>,

    playing: Arc<AtomicBool>,
    muted: Arc<AtomicBool>,
    destroyed: Arc<AtomicBool>,
    route_error: Arc<AtomicBool>,
    counters: Arc<PlaybackCounters>,

    stream: Option<Stream>,

    decode_warn: LogThrottle,
    laenge_warn: LogThrottle,
}

impl PlaybackEngine {
    pub fn new() -> Self {
        Self {
            config: None,
            decoder_params: None,
            decoder: Arc::new(Mutex::new(None)),
            decode_scratch: Vec::new(),
            pcm_producer: None,
            playing: Arc::new(AtomicBool::new(false)),
            muted: Arc::new(AtomicBool::new(false)),
            destroyed: Arc::new(AtomicBool::new(false)),
            route_error: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(PlaybackCounters::default()),
            stream: None,
            decode_warn: LogThrottle::new(5, 50),
            laenge_warn: LogThrottle::new(1, 50),
        }
    }

    /// Allokiert Ring und Scratches; oeffnet noch keinen Stream.
    pub fn create(&mut self, config: PlaybackConfig) -> AudioResult<()> {
        if self.config.is_some() {
            warn!("Engine bereits erstellt – wird zuerst zerstoert");
            self.destroy();
        }

        let (producer, _consumer) =
            PcmRingBuffer::new(config.max_buffer_frames, config.frame_samples);
        // Die Consumer-Haelfte entsteht beim Stream-Start neu aus der
        // Producer-Sicht; bis dahin liest niemand.
        drop(_consumer);
        self.pcm_producer = Some(producer);
        self.counters = Arc::new(PlaybackCounters::default());
        self.destroyed.store(false, Ordering::Release);

        info!(
            rate = config.sample_rate,
            channels = config.channels,
            frame_samples = config.frame_samples,
            max_frames = config.max_buffer_frames,
            prebuffer = config.prebuffer_frames,
            "Playback-Engine erstellt"
        );
        self.config = Some(config);
        Ok(())
    }

    /// Konfiguriert den Decoder fuer den Paket-Pfad.
    ///
    /// Der Decode-Scratch deckt den groessten Opus-Frame (60 ms) oder den
    /// nominalen Frame ab, je nachdem was groesser ist.
    pub fn configure_decoder(&mut self, params: CodecParams) -> AudioResult<()> {
        let config = self.config.as_ref().ok_or(AudioError::NichtErstellt)?;

        let codec = VoiceCodec::from_params(&params)?;
        let worst_case = params.sample_rate().hz() as usize * 60 / 1000
            * params.channels().count();
        self.decode_scratch = vec![0i16; worst_case.max(config.frame_samples)];
        *self.decoder.lock() = Some(codec);
        self.decoder_params = Some(params);

        info!(?params, "Decoder konfiguriert");
        Ok(())
    }

    /// Entfernt den Decoder; die Engine faellt auf den PCM-Pfad zurueck.
    pub fn destroy_decoder(&mut self) {
        *self.decoder.lock() = None;
        self.decoder_params = None;
    }

    // -- Producer-Seite (Kontroll-/Worker-Thread) --------------------------

    /// Schreibt einen dekodierten PCM-Frame in den Ring (Drop-Oldest).
    pub fn write_samples(&mut self, pcm: &[i16]) -> AudioResult<WriteOutcome> {
        let producer = self.pcm_producer.as_mut().ok_or(AudioError::NichtErstellt)?;
        match producer.write_drop_oldest(pcm) {
            Ok(WriteOutcome::DroppedOldest) => {
                self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                Ok(WriteOutcome::DroppedOldest)
            }
            Ok(outcome) => Ok(outcome),
            Err(RingWriteError::SizeMismatch) => Err(AudioError::Konfiguration(format!(
                "Frame muss {} Samples lang sein (war: {})",
                producer.frame_samples(),
                pcm.len()
            ))),
            Err(e) => Err(AudioError::StreamFehler(format!(
                "Ring-Schreibfehler: {:?}",
                e
            ))),
        }
    }

    /// Dekodiert ein Codec-Paket (ohne Tag-Byte) und schreibt das PCM in
    /// den Ring.
    ///
    /// Der blockierende Lock ist hier in Ordnung – dieser Pfad laeuft auf
    /// dem Worker-Thread, nicht im RT-Callback.
    pub fn write_encoded_packet(&mut self, packet: &[u8]) -> AudioResult<WriteOutcome> {
        let config = self.config.as_ref().ok_or(AudioError::NichtErstellt)?;
        let frame_samples = config.frame_samples;

        let decoded = {
            let mut guard = self.decoder.lock();
            let codec = guard
                .as_mut()
                .ok_or_else(|| AudioError::Konfiguration("kein Decoder konfiguriert".into()))?;
            match codec.decode(packet, &mut self.decode_scratch) {
                Ok(n) => n,
                Err(e) => {
                    drop(guard);
                    // Drosselung: bei pathologischem Paketverlust nicht
                    // das Log fluten
                    if self.decode_warn.should_log() {
                        warn!("Paket verworfen, Dekodieren fehlgeschlagen: {}", e);
                    }
                    return Err(e);
                }
            }
        };

        self.counters.decoded_frames.fetch_add(1, Ordering::Relaxed);

        if decoded != frame_samples && self.laenge_warn.should_log() {
            warn!(
                decoded,
                frame_samples, "Dekodierte Laenge weicht vom nominalen Frame ab"
            );
        }

        // Vollstaendige Frames schreiben; ein Rest unterhalb der
        // Frame-Groesse wird verworfen
        let mut outcome = WriteOutcome::Stored;
        let mut offset = 0;
        while decoded - offset >= frame_samples {
            let chunk = &self.decode_scratch[offset..offset + frame_samples];
            let producer = self.pcm_producer.as_mut().ok_or(AudioError::NichtErstellt)?;
            match producer.write_drop_oldest(chunk) {
                Ok(WriteOutcome::DroppedOldest) => {
                    self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    outcome = WriteOutcome::DroppedOldest;
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(AudioError::StreamFehler(format!(
                        "Ring-Schreibfehler: {:?}",
                        e
                    )))
                }
            }
            offset += frame_samples;
        }
        Ok(outcome)
    }

    // -- Stream-Verwaltung -------------------------------------------------

    /// Oeffnet den Ausgabestream und beginnt die Wiedergabe.
    ///
    /// Sollte erst nach der Vorpufferung aufgerufen werden; ab jetzt
    /// konsumiert der Callback den Ring.
    pub fn start_stream(&mut self) -> AudioResult<()> {
        let config = self.config.as_ref().ok_or(AudioError::NichtErstellt)?;
        if self.playing.load(Ordering::Relaxed) {
            warn!("Stream laeuft bereits");
            return Ok(());
        }

        let mut worker = PlaybackWorker {
            channels: config.channels as usize,
            frame_samples: config.frame_samples,
            consumer: self
                .pcm_producer
                .as_ref()
                .expect("create hat den Ring allokiert")
                .make_consumer(),
            partial: vec![0i16; config.frame_samples],
            offset: 0,
            valid: 0,
            consecutive_plc: 0,
            decoder: Arc::clone(&self.decoder),
            playing: Arc::clone(&self.playing),
            muted: Arc::clone(&self.muted),
            destroyed: Arc::clone(&self.destroyed),
            counters: Arc::clone(&self.counters),
        };

        let device = device::output_device(config.device_name.as_deref())?;
        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: BufferSize::Default,
        };

        let route_error = Arc::clone(&self.route_error);
        let err_fn = move |err: cpal::StreamError| {
            error!("Playback-Stream-Fehler: {}", err);
            route_error.store(true, Ordering::Release);
        };

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| worker.on_output(data),
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

        // playing VOR dem Start setzen: der RT-Callback kann sofort feuern
        self.playing.store(true, Ordering::Release);
        self.route_error.store(false, Ordering::Release);

        if let Err(e) = stream.play() {
            self.playing.store(false, Ordering::Release);
            return Err(AudioError::StreamFehler(e.to_string()));
        }

        self.stream = Some(stream);
        info!(
            rate = config.sample_rate,
            channels = config.channels,
            "Playback-Stream gestartet"
        );
        Ok(())
    }

    /// Stoppt und schliesst den Ausgabestream; Ring-Inhalte bleiben.
    pub fn stop_stream(&mut self) {
        self.playing.store(false, Ordering::Release);
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            drop(stream);
            debug!("Playback-Stream geschlossen");
        }
    }

    /// Schliesst den Stream und oeffnet ihn neu (Audio-Routing-Wechsel).
    ///
    /// Idempotent in dem Sinne, dass ein nicht laufender Stream mit
    /// `NichtAktiv` gemeldet wird statt einen zu starten.
    pub fn restart_stream(&mut self) -> AudioResult<()> {
        if !self.playing.load(Ordering::Relaxed) {
            return Err(AudioError::NichtAktiv);
        }
        self.stop_stream();
        self.start_stream()
    }

    /// Gibt alle Ressourcen frei.
    ///
    /// Der destroyed-Fence wird mit Release VOR dem Schliessen gesetzt,
    /// damit ein spaeter Callback-Eintritt sauber mit Stille aussteigt.
    pub fn destroy(&mut self) {
        let war_erstellt = self.config.is_some();
        self.destroyed.store(true, Ordering::Release);
        self.stop_stream();
        self.destroy_decoder();
        self.pcm_producer = None;
        self.decode_scratch = Vec::new();
        self.config = None;
        if war_erstellt {
            info!("Playback-Engine zerstoert");
        }
    }

    // -- Flags und Diagnose ------------------------------------------------

    /// Mute-Flag; der Callback liefert dann Stille.
    pub fn set_playback_mute(&self, mute: bool) {
        self.muted.store(mute, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    pub fn is_created(&self) -> bool {
        self.config.is_some()
    }

    /// Stream-Fehler seit dem letzten Start (Geraetewechsel o.ae.)
    pub fn has_route_error(&self) -> bool {
        self.route_error.load(Ordering::Acquire)
    }

    /// Anzahl aktuell lesbarer Frames (Vorpufferungs-Kriterium)
    pub fn buffered_frame_count(&self) -> usize {
        self.pcm_producer
            .as_ref()
            .map(|p| p.available_frames())
            .unwrap_or(0)
    }

    /// Snapshot der Diagnose-Zaehler
    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            decoded_frames: self.counters.decoded_frames.load(Ordering::Relaxed),
            callback_invocations: self.counters.callback_invocations.load(Ordering::Relaxed),
            callback_silence_count: self.counters.callback_silence.load(Ordering::Relaxed),
            callback_plc_count: self.counters.callback_plc.load(Ordering::Relaxed),
            frames_dropped: self.counters.frames_dropped.load(Ordering::Relaxed),
            buffered_frames: self.buffered_frame_count(),
        }
    }
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
