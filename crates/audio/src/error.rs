//! Fehlertypen fuer die Audio-Engine

use thiserror::Error;

/// Alle moeglichen Fehler des Kontrollpfads
///
/// Die Echtzeit-Callbacks werfen nie – sie zaehlen Diagnose-Zaehler hoch
/// und fuellen mit Stille oder PLC. Nur der Kontrollpfad (create, configure,
/// start, stop) liefert strukturierte Fehler.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Operation erfordert eine erstellte Engine (vor `create` oder nach `destroy`)
    #[error("Engine nicht erstellt")]
    NichtErstellt,

    /// Operation erfordert einen laufenden Stream
    #[error("Stream laeuft nicht")]
    NichtAktiv,

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Stream-Fehler: {0}")]
    StreamFehler(String),

    #[error("Audio-Geraet nicht gefunden: {0}")]
    GeraetNichtGefunden(String),

    #[error("Kein Standard-Eingabegeraet verfuegbar")]
    KeinStandardEingabegeraet,

    #[error("Kein Standard-Ausgabegeraet verfuegbar")]
    KeinStandardAusgabegeraet,

    #[error("Kodier-Fehler: {0}")]
    KodierFehler(String),

    #[error("Dekodier-Fehler: {0}")]
    DekodierFehler(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unerwarteter Fehler: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type AudioResult<T> = Result<T, AudioError>;
