//! fernsprech-protocol – Wire-Kontrakt des Voice-Engines
//!
//! Definiert alles, worauf sich beide Gespraechsseiten einigen muessen:
//! - die Profil-Tabelle (Codec, Abtastrate, Frame-Dauer, Bitrate)
//! - das Ein-Byte-Codec-Tag jedes Transport-Pakets
//! - die Codec2 Mode-Header ↔ Library-Mode Bijektion
//!
//! Der eigentliche Transport (Routing, Verschluesselung, Links) liegt
//! ausserhalb dieses Crates – hier wohnt nur der Inhalt der Pakete.

pub mod profile;
pub mod wire;

// Re-Exporte fuer bequemen Zugriff
pub use profile::{
    ChannelCount, Codec2Mode, CodecKind, CodecParams, FrameTime, OpusApplication, OpusParams,
    Profile, ProfileId, SampleRate,
};
pub use wire::{split_tagged, tag_packet, CODEC_TAG_CODEC2, CODEC_TAG_OPUS};
