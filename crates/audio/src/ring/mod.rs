//! Lock-freie SPSC Ring-Puffer fuer den Echtzeit-Pfad
//!
//! Zwei Varianten:
//! - [`PcmRingBuffer`]: Slots fester Groesse fuer int16-Frames
//! - [`EncodedRingBuffer`]: Slots mit int32-Laengenpraefix fuer Pakete
//!   variabler Laenge
//!
//! Beide sind strikt Single-Producer/Single-Consumer: die Konstruktion
//! liefert je eine Producer- und eine Consumer-Haelfte, keine davon
//! klonbar. Acquire/Release auf den Indizes stellt sicher, dass ein
//! erfolgreiches `write` happens-before dem zugehoerigen `read` liegt.
//! Der Hot Path kommt ohne Locks und ohne Allokationen aus.

pub mod encoded;
pub mod pcm;

pub use encoded::{EncodedConsumer, EncodedProducer, EncodedRingBuffer};
pub use pcm::{PcmConsumer, PcmProducer, PcmRingBuffer};

/// Fehler der Producer-Seite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingWriteError {
    /// Puffer voll (ein Slot bleibt immer frei, um voll von leer zu
    /// unterscheiden)
    Full,
    /// Frame-Laenge entspricht nicht der Slot-Groesse
    SizeMismatch,
    /// Paket passt nicht in einen Slot
    TooLarge,
}

/// Fehler der Consumer-Seite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingReadError {
    /// Puffer leer – oder der Slot wurde verworfen, weil der Zielpuffer
    /// zu klein war (verlustbehaftet schlaegt Deadlock auf dem RT-Pfad)
    Empty,
    /// Zielpuffer entspricht nicht der Slot-Groesse
    SizeMismatch,
}

/// Ergebnis eines Drop-Oldest-Schreibvorgangs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Frame gespeichert, nichts verworfen
    Stored,
    /// Puffer war voll – aeltester Frame verworfen, neuer gespeichert
    DroppedOldest,
}
