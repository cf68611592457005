//! Transport-Schnittstelle des Voice-Engines
//!
//! Der eigentliche Transport (Routing, Verschluesselung, Links) liegt
//! ausserhalb des Kerns; der Koordinator sieht nur diese schmale Flaeche:
//! rohe Pakete rein, getaggte Pakete raus, opake Signal-Codes als
//! Durchreiche.

use parking_lot::Mutex;

/// Callback fuer eingehende rohe Pakete (inklusive Tag-Byte)
pub type PacketCallback = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Vom Transport bereitgestellte Flaeche, die der Kern konsumiert
pub trait PacketRouter: Send + Sync {
    /// Installiert den Callback fuer eingehende Pakete.
    fn set_packet_callback(&self, callback: PacketCallback);

    /// Sendet ein ausgehendes, getaggtes Paket.
    fn send_packet(&self, packet: &[u8]);

    /// Reicht einen opaken Steuer-Code durch (Klingeln, Besetzt, ...).
    fn send_signal(&self, code: i32);
}

// ---------------------------------------------------------------------------
// LoopbackRouter
// ---------------------------------------------------------------------------

/// In-Memory-Router fuer Tests und lokale Demos
///
/// Zeichnet gesendete Pakete und Signale auf; `deliver` speist ein
/// eingehendes Paket in den installierten Callback ein. Mit `echo`
/// landet jedes gesendete Paket direkt wieder im Callback.
pub struct LoopbackRouter {
    callback: Mutex<Option<PacketCallback>>,
    sent_packets: Mutex<Vec<Vec<u8>>>,
    sent_signals: Mutex<Vec<i32>>,
    echo: bool,
}

impl LoopbackRouter {
    pub fn new() -> Self {
        Self {
            callback: Mutex::new(None),
            sent_packets: Mutex::new(Vec::new()),
            sent_signals: Mutex::new(Vec::new()),
            echo: false,
        }
    }

    /// Router, der jedes gesendete Paket an sich selbst zurueckliefert.
    pub fn with_echo() -> Self {
        Self {
            echo: true,
            ..Self::new()
        }
    }

    /// Speist ein eingehendes Paket ein (simulierter Transport).
    pub fn deliver(&self, packet: &[u8]) {
        if let Some(cb) = self.callback.lock().as_ref() {
            cb(packet);
        }
    }

    /// Bisher gesendete Pakete (Kopie).
    pub fn sent_packets(&self) -> Vec<Vec<u8>> {
        self.sent_packets.lock().clone()
    }

    /// Bisher gesendete Signal-Codes (Kopie).
    pub fn sent_signals(&self) -> Vec<i32> {
        self.sent_signals.lock().clone()
    }
}

impl Default for LoopbackRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketRouter for LoopbackRouter {
    fn set_packet_callback(&self, callback: PacketCallback) {
        *self.callback.lock() = Some(callback);
    }

    fn send_packet(&self, packet: &[u8]) {
        self.sent_packets.lock().push(packet.to_vec());
        if self.echo {
            self.deliver(packet);
        }
    }

    fn send_signal(&self, code: i32) {
        self.sent_signals.lock().push(code);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn deliver_ruft_callback() {
        let router = LoopbackRouter::new();
        let zaehler = Arc::new(AtomicUsize::new(0));
        let z = Arc::clone(&zaehler);
        router.set_packet_callback(Box::new(move |paket| {
            assert_eq!(paket, &[1, 2, 3]);
            z.fetch_add(1, Ordering::SeqCst);
        }));

        router.deliver(&[1, 2, 3]);
        assert_eq!(zaehler.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deliver_ohne_callback_ist_noop() {
        let router = LoopbackRouter::new();
        router.deliver(&[1, 2, 3]);
    }

    #[test]
    fn send_packet_wird_aufgezeichnet() {
        let router = LoopbackRouter::new();
        router.send_packet(&[0x01, 0xAA]);
        router.send_packet(&[0x02, 0xBB]);
        assert_eq!(router.sent_packets(), vec![vec![0x01, 0xAA], vec![0x02, 0xBB]]);
    }

    #[test]
    fn echo_liefert_an_sich_selbst() {
        let router = LoopbackRouter::with_echo();
        let zaehler = Arc::new(AtomicUsize::new(0));
        let z = Arc::clone(&zaehler);
        router.set_packet_callback(Box::new(move |_| {
            z.fetch_add(1, Ordering::SeqCst);
        }));

        router.send_packet(&[0x01, 0xCC]);
        assert_eq!(zaehler.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn signale_werden_durchgereicht() {
        let router = LoopbackRouter::new();
        router.send_signal(7);
        router.send_signal(42);
        assert_eq!(router.sent_signals(), vec![7, 42]);
    }
}
