//! Mikrofon-Capture-Engine
//!
//! Besitzt den cpal-Eingabestream und dessen Echtzeit-Callback. Der
//! Callback richtet variable Hardware-Bursts auf logische Frames aus
//! (Akkumulations-Puffer), laesst die Filterkette laufen und schreibt
//! entweder rohes PCM in den PCM-Ring oder kodiert direkt im Callback in
//! den Paket-Ring (Drop-Oldest bei vollem Ring).
//!
//! Lebenszyklus: `create` → (`configure_encoder`) → `start_stream` →
//! `stop_stream` → `destroy`. `configure_encoder` vor `create` schlaegt
//! mit `NichtErstellt` fehl.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, Stream, StreamConfig};
use tracing::{debug, error, info, warn};

use fernsprech_protocol::CodecParams;

use crate::codec::VoiceCodec;
use crate::device;
use crate::dsp::{FilterChainConfig, VoiceFilterChain};
use crate::error::{AudioError, AudioResult};
use crate::ring::{
    EncodedConsumer, EncodedProducer, EncodedRingBuffer, PcmConsumer, PcmProducer, PcmRingBuffer,
    RingReadError, WriteOutcome,
};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Slots im Paket-Ring des Encode-Pfads
pub const ENCODED_RING_SLOTS: usize = 32;

/// Maximale Paketgroesse pro Slot in Bytes
pub const ENCODED_RING_SLOT_BYTES: usize = 1500;

// ---------------------------------------------------------------------------
// Konfiguration und Statistik
// ---------------------------------------------------------------------------

/// Konfiguration der Capture-Engine
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Name des Eingabegeraets (None = Standard)
    pub device_name: Option<String>,
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Kanalanzahl
    pub channels: u16,
    /// Interleaved int16-Samples pro logischem Frame
    pub frame_samples: usize,
    /// Kapazitaet des PCM-Rings in Frames
    pub max_buffer_frames: usize,
    /// Sprach-Filterkette (HPF → LPF → AGC) aktivieren
    pub enable_filters: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            sample_rate: 48000,
            channels: 1,
            frame_samples: 960, // 20 ms bei 48 kHz mono
            max_buffer_frames: 32,
            enable_filters: true,
        }
    }
}

/// Diagnose-Zaehler, geteilt mit dem Callback (nur Relaxed-Zugriffe)
#[derive(Default)]
struct CaptureCounters {
    frames_captured: AtomicU64,
    frames_dropped: AtomicU64,
    encode_errors: AtomicU64,
}

/// Snapshot der Capture-Statistik
#[derive(Debug, Clone, Default)]
pub struct CaptureStats {
    /// Vollstaendig akkumulierte Frames seit Start
    pub frames_captured: u64,
    /// Per Drop-Oldest verworfene Frames/Pakete
    pub frames_dropped: u64,
    /// Encode-Fehler (Frame verworfen, Strom laeuft weiter)
    pub encode_errors: u64,
    /// Aktuell lesbare PCM-Frames
    pub buffered_frames: usize,
    /// Aktuell lesbare kodierte Pakete
    pub buffered_packets: usize,
}

// ---------------------------------------------------------------------------
// Callback-Worker
// ---------------------------------------------------------------------------

/// Encode-Zustand des Callbacks (Encode-Modus)
struct EncodeState {
    codec: VoiceCodec,
    producer: EncodedProducer,
    encode_buf: Vec<u8>,
}

/// Gesamter Zustand des Echtzeit-Callbacks
///
/// Gehoert exklusiv dem Callback-Thread; die Engine haelt nur die
/// atomaren Flags und Zaehler. Kein Feld wird nach `start_stream` vom
/// Kontrollpfad angefasst.
struct CaptureWorker {
    frame_samples: usize,
    accum: Vec<i16>,
    accum_count: usize,
    silence: Vec<i16>,
    filter: Option<VoiceFilterChain>,
    encode: Option<EncodeState>,
    pcm_producer: PcmProducer,
    recording: Arc<AtomicBool>,
    muted: Arc<AtomicBool>,
    counters: Arc<CaptureCounters>,
}

impl CaptureWorker {
    /// Verarbeitet einen Hardware-Burst beliebiger Groesse.
    fn on_input(&mut self, input: &[i16]) {
        if !self.recording.load(Ordering::Relaxed) {
            return;
        }

        let total = input.len();
        let mut processed = 0;
        while processed < total {
            let needed = self.frame_samples - self.accum_count;
            let to_copy = (total - processed).min(needed);
            self.accum[self.accum_count..self.accum_count + to_copy]
                .copy_from_slice(&input[processed..processed + to_copy]);
            self.accum_count += to_copy;
            processed += to_copy;

            if self.accum_count == self.frame_samples {
                self.finish_frame();
                self.accum_count = 0;
            }
        }
    }

    /// Ein vollstaendiger logischer Frame liegt im Akkumulations-Puffer.
    fn finish_frame(&mut self) {
        let CaptureWorker {
            accum,
            silence,
            filter,
            encode,
            pcm_producer,
            muted,
            counters,
            ..
        } = self;

        // Mute: Stille statt Mikrofondaten; der Akkumulations-Puffer
        // bleibt unveraendert
        let frame: &mut [i16] = if muted.load(Ordering::Relaxed) {
            &mut silence[..]
        } else {
            &mut accum[..]
        };

        if let Some(kette) = filter {
            kette.process_frame(frame);
        }

        match encode {
            Some(state) => match state.codec.encode(frame, &mut state.encode_buf) {
                Ok(n) if n > 0 => match state.producer.write_drop_oldest(&state.encode_buf[..n]) {
                    Ok(WriteOutcome::DroppedOldest) => {
                        counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(WriteOutcome::Stored) => {}
                    Err(_) => {
                        counters.encode_errors.fetch_add(1, Ordering::Relaxed);
                    }
                },
                Ok(_) => {}
                // Kein Logging im RT-Pfad; der Frame wird verworfen, der
                // naechste Callback liefert den naechsten
                Err(_) => {
                    counters.encode_errors.fetch_add(1, Ordering::Relaxed);
                }
            },
            None => match pcm_producer.write_drop_oldest(frame) {
                Ok(WriteOutcome::DroppedOldest) => {
                    counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            },
        }

        counters.frames_captured.fetch_add(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// CaptureEngine
// ---------------------------------------------------------------------------

/// Capture-Engine: Eingabestream, Akkumulation, Filter, Encode
pub struct CaptureEngine {
    config: Option<CaptureConfig>,
    filter_config: FilterChainConfig,
    encoder_params: Option<CodecParams>,

    pcm_consumer: Option<PcmConsumer>,
    encoded_consumer: Option<EncodedConsumer>,

    recording: Arc<AtomicBool>,
    muted: Arc<AtomicBool>,
    route_error: Arc<AtomicBool>,
    counters: Arc<CaptureCounters>,

    stream: Option<Stream>,
}

impl CaptureEngine {
    pub fn new() -> Self {
        Self {
            config: None,
            filter_config: FilterChainConfig::default(),
            encoder_params: None,
            pcm_consumer: None,
            encoded_consumer: None,
            recording: Arc::new(AtomicBool::new(false)),
            muted: Arc::new(AtomicBool::new(false)),
            route_error: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(CaptureCounters::default()),
            stream: None,
        }
    }

    /// Allokiert Ring und Puffer; oeffnet noch keinen Stream.
    ///
    /// Eine bereits erstellte Engine wird zuerst zerstoert.
    pub fn create(&mut self, config: CaptureConfig) -> AudioResult<()> {
        if self.config.is_some() {
            warn!("Engine bereits erstellt – wird zuerst zerstoert");
            self.destroy();
        }

        let (_producer, consumer) =
            PcmRingBuffer::new(config.max_buffer_frames, config.frame_samples);
        // Die Producer-Haelfte entsteht beim Stream-Start neu aus der
        // Consumer-Sicht; bis dahin schreibt niemand.
        drop(_producer);
        self.pcm_consumer = Some(consumer);
        self.counters = Arc::new(CaptureCounters::default());

        info!(
            rate = config.sample_rate,
            channels = config.channels,
            frame_samples = config.frame_samples,
            max_frames = config.max_buffer_frames,
            filters = config.enable_filters,
            "Capture-Engine erstellt"
        );
        self.config = Some(config);
        Ok(())
    }

    /// Konfiguriert den Encoder; ab dann wird im Callback kodiert.
    ///
    /// Legal im Zustand CREATED oder RUNNING; vor `create` schlaegt der
    /// Aufruf mit `NichtErstellt` fehl. Bei laufendem Stream greift der
    /// neue Encoder beim naechsten Stream-Start.
    pub fn configure_encoder(&mut self, params: CodecParams) -> AudioResult<()> {
        if self.config.is_none() {
            return Err(AudioError::NichtErstellt);
        }

        // Parameter sofort pruefen, damit ein Profilwechsel mit BadConfig
        // scheitert ohne die laufende Engine anzufassen
        let _probe = VoiceCodec::from_params(&params)?;

        let (_producer, consumer) =
            EncodedRingBuffer::new(ENCODED_RING_SLOTS, ENCODED_RING_SLOT_BYTES);
        drop(_producer);
        self.encoded_consumer = Some(consumer);
        self.encoder_params = Some(params);

        info!(?params, "Encoder konfiguriert");
        Ok(())
    }

    /// Entfernt den Encoder; die Engine faellt auf den PCM-Pfad zurueck.
    pub fn destroy_encoder(&mut self) {
        self.encoder_params = None;
        self.encoded_consumer = None;
    }

    /// Oeffnet den Eingabestream und startet die Aufnahme.
    pub fn start_stream(&mut self) -> AudioResult<()> {
        let config = self.config.as_ref().ok_or(AudioError::NichtErstellt)?;
        if self.recording.load(Ordering::Relaxed) {
            warn!("Stream laeuft bereits");
            return Ok(());
        }

        let encode = match (&self.encoder_params, &self.encoded_consumer) {
            (Some(params), Some(consumer)) => Some(EncodeState {
                codec: VoiceCodec::from_params(params)?,
                producer: consumer.make_producer(),
                encode_buf: vec![0u8; ENCODED_RING_SLOT_BYTES],
            }),
            _ => None,
        };

        let mut worker = CaptureWorker {
            frame_samples: config.frame_samples,
            accum: vec![0i16; config.frame_samples],
            accum_count: 0,
            silence: vec![0i16; config.frame_samples],
            filter: config.enable_filters.then(|| {
                VoiceFilterChain::new(
                    config.channels as usize,
                    config.sample_rate,
                    config.frame_samples,
                    self.filter_config,
                )
            }),
            encode,
            pcm_producer: self
                .pcm_consumer
                .as_ref()
                .expect("create hat den Ring allokiert")
                .make_producer(),
            recording: Arc::clone(&self.recording),
            muted: Arc::clone(&self.muted),
            counters: Arc::clone(&self.counters),
        };

        let device = device::input_device(config.device_name.as_deref())?;
        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: BufferSize::Default,
        };

        let route_error = Arc::clone(&self.route_error);
        let err_fn = move |err: cpal::StreamError| {
            error!("Capture-Stream-Fehler: {}", err);
            route_error.store(true, Ordering::Release);
        };

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| worker.on_input(data),
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

        // recording VOR dem Start setzen: der RT-Callback kann sofort
        // feuern und wuerde bei false seinen ersten Burst verwerfen
        self.recording.store(true, Ordering::Release);
        self.route_error.store(false, Ordering::Release);

        if let Err(e) = stream.play() {
            self.recording.store(false, Ordering::Release);
            return Err(AudioError::StreamFehler(e.to_string()));
        }

        self.stream = Some(stream);
        info!(
            rate = config.sample_rate,
            channels = config.channels,
            "Capture-Stream gestartet"
        );
        Ok(())
    }

    /// Stoppt und schliesst den Eingabestream; Ring-Inhalte bleiben.
    pub fn stop_stream(&mut self) {
        // Flag strikt vor dem Schliessen zuruecknehmen
        self.recording.store(false, Ordering::Release);
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            drop(stream);
            debug!("Capture-Stream geschlossen");
        }
    }

    /// Schliesst den Stream und oeffnet ihn neu (Audio-Routing-Wechsel).
    pub fn restart_stream(&mut self) -> AudioResult<()> {
        if !self.recording.load(Ordering::Relaxed) {
            return Err(AudioError::NichtAktiv);
        }
        self.stop_stream();
        self.start_stream()
    }

    /// Gibt Ressourcen in umgekehrter Aufbau-Reihenfolge frei.
    pub fn destroy(&mut self) {
        let war_erstellt = self.config.is_some();
        self.stop_stream();
        self.destroy_encoder();
        self.pcm_consumer = None;
        self.config = None;
        if war_erstellt {
            info!("Capture-Engine zerstoert");
        }
    }

    // -- Consumer-Seite (Kontroll-/Worker-Thread) --------------------------

    /// Liest einen PCM-Frame; `Ok(false)` wenn der Ring leer ist.
    pub fn read_samples(&mut self, dest: &mut [i16]) -> AudioResult<bool> {
        let consumer = self.pcm_consumer.as_mut().ok_or(AudioError::NichtErstellt)?;
        match consumer.read(dest) {
            Ok(()) => Ok(true),
            Err(RingReadError::Empty) => Ok(false),
            Err(RingReadError::SizeMismatch) => Err(AudioError::Konfiguration(format!(
                "Zielpuffer muss {} Samples fassen",
                consumer.frame_samples()
            ))),
        }
    }

    /// Liest das naechste kodierte Paket; `Ok(None)` wenn keines ansteht.
    pub fn read_encoded_packet(&mut self, dest: &mut [u8]) -> AudioResult<Option<usize>> {
        let consumer = self
            .encoded_consumer
            .as_mut()
            .ok_or(AudioError::NichtErstellt)?;
        match consumer.read(dest) {
            Ok(n) => Ok(Some(n)),
            Err(_) => Ok(None),
        }
    }

    // -- Flags und Diagnose ------------------------------------------------

    /// Mute-Flag; der Callback liest es relaxed und blockiert nie.
    pub fn set_capture_mute(&self, mute: bool) {
        self.muted.store(mute, Ordering::Release);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    /// Stream-Fehler seit dem letzten Start (Geraetewechsel o.ae.)
    pub fn has_route_error(&self) -> bool {
        self.route_error.load(Ordering::Acquire)
    }

    pub fn is_created(&self) -> bool {
        self.config.is_some()
    }

    /// Anzahl aktuell lesbarer PCM-Frames
    pub fn buffered_frame_count(&self) -> usize {
        self.pcm_consumer
            .as_ref()
            .map(|c| c.available_frames())
            .unwrap_or(0)
    }

    /// Anzahl aktuell lesbarer kodierter Pakete
    pub fn buffered_packet_count(&self) -> usize {
        self.encoded_consumer
            .as_ref()
            .map(|c| c.available_slots())
            .unwrap_or(0)
    }

    /// Snapshot der Diagnose-Zaehler
    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.counters.frames_captured.load(Ordering::Relaxed),
            frames_dropped: self.counters.frames_dropped.load(Ordering::Relaxed),
            encode_errors: self.counters.encode_errors.load(Ordering::Relaxed),
            buffered_frames: self.buffered_frame_count(),
            buffered_packets: self.buffered_packet_count(),
        }
    }
}

impl Default for CaptureEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
