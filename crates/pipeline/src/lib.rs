//! fernsprech-pipeline – Koordinator zwischen Audio-Engines und Transport
//!
//! Verbindet die Capture- und Playback-Engine aus `fernsprech-audio` mit
//! einem [`PacketRouter`]: Profilwahl, Codec-Tag-Framing, aufgeschobener
//! Playback-Start nach Vorpufferung und Profilwechsel zur Laufzeit.
//!
//! Der Transport selbst (Routing, Verschluesselung, Links) und die
//! Anruf-Zustandsmaschine (Klingeln, Angenommen, Besetzt) liegen
//! ausserhalb; Signal-Codes werden opak durchgereicht.

pub mod coordinator;
pub mod router;

// Bequeme Re-Exporte der wichtigsten Typen
pub use coordinator::{PipelineConfig, PipelineCoordinator, PipelineStats};
pub use router::{LoopbackRouter, PacketCallback, PacketRouter};
