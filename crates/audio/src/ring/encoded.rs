//! SPSC Ring-Puffer fuer kodierte Pakete variabler Laenge
//!
//! Jeder Slot fasst `4 + max_bytes_per_slot` Bytes: ein int32-Laengenpraefix
//! (little-endian) gefolgt von der Payload. Producer ist der Capture-Callback
//! (Encode im Callback), Consumer der Sende-Worker des Koordinators.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{RingReadError, RingWriteError, WriteOutcome};

/// Groesse des Laengenpraefixes pro Slot
const LEN_PREFIX_SIZE: usize = std::mem::size_of::<i32>();

struct EncodedRingInner {
    max_slots: usize,
    max_bytes_per_slot: usize,
    slot_size: usize,
    slab: UnsafeCell<Box<[u8]>>,
    write_index: AtomicUsize,
    read_index: AtomicUsize,
}

// SPSC-Vertrag wie beim PCM-Ring: die Haelften sind nicht klonbar.
unsafe impl Send for EncodedRingInner {}
unsafe impl Sync for EncodedRingInner {}

impl EncodedRingInner {
    fn slot_ptr(&self, slot: usize) -> *mut u8 {
        unsafe { (*self.slab.get()).as_mut_ptr().add(slot * self.slot_size) }
    }

    fn write(&self, data: &[u8]) -> Result<(), RingWriteError> {
        if data.is_empty() || data.len() > self.max_bytes_per_slot {
            return Err(RingWriteError::TooLarge);
        }

        let w = self.write_index.load(Ordering::Relaxed);
        let r = self.read_index.load(Ordering::Acquire);
        let next_w = (w + 1) % self.max_slots;
        if next_w == r {
            return Err(RingWriteError::Full);
        }

        let len = (data.len() as i32).to_le_bytes();
        unsafe {
            let slot = self.slot_ptr(w);
            std::ptr::copy_nonoverlapping(len.as_ptr(), slot, LEN_PREFIX_SIZE);
            std::ptr::copy_nonoverlapping(data.as_ptr(), slot.add(LEN_PREFIX_SIZE), data.len());
        }
        self.write_index.store(next_w, Ordering::Release);
        Ok(())
    }

    /// Liest das naechste Paket in `dest` und gibt dessen Laenge zurueck.
    ///
    /// Ist `dest` zu klein, wird der Slot VERWORFEN und `Empty` geliefert:
    /// auf dem Echtzeit-Pfad ist Verlust dem Blockieren vorzuziehen.
    fn read(&self, dest: &mut [u8]) -> Result<usize, RingReadError> {
        let r = self.read_index.load(Ordering::Relaxed);
        let w = self.write_index.load(Ordering::Acquire);
        if r == w {
            return Err(RingReadError::Empty);
        }

        let slot = self.slot_ptr(r);
        let mut len_bytes = [0u8; LEN_PREFIX_SIZE];
        unsafe {
            std::ptr::copy_nonoverlapping(slot.cast_const(), len_bytes.as_mut_ptr(), LEN_PREFIX_SIZE);
        }
        let len = i32::from_le_bytes(len_bytes) as usize;

        if len > dest.len() {
            self.read_index
                .store((r + 1) % self.max_slots, Ordering::Release);
            return Err(RingReadError::Empty);
        }

        unsafe {
            std::ptr::copy_nonoverlapping(
                slot.add(LEN_PREFIX_SIZE).cast_const(),
                dest.as_mut_ptr(),
                len,
            );
        }
        self.read_index
            .store((r + 1) % self.max_slots, Ordering::Release);
        Ok(len)
    }

    fn available_slots(&self) -> usize {
        let w = self.write_index.load(Ordering::Acquire);
        let r = self.read_index.load(Ordering::Acquire);
        (w + self.max_slots - r) % self.max_slots
    }
}

/// Konstruktor-Typ: liefert die beiden Haelften des Puffers
pub struct EncodedRingBuffer;

impl EncodedRingBuffer {
    /// Erstellt einen Ring fuer `max_slots` Pakete zu je hoechstens
    /// `max_bytes_per_slot` Bytes.
    pub fn new(max_slots: usize, max_bytes_per_slot: usize) -> (EncodedProducer, EncodedConsumer) {
        assert!(max_slots >= 2, "Ring braucht mindestens 2 Slots");
        assert!(max_bytes_per_slot >= 1, "Slot braucht mindestens 1 Byte");

        let slot_size = LEN_PREFIX_SIZE + max_bytes_per_slot;
        let inner = Arc::new(EncodedRingInner {
            max_slots,
            max_bytes_per_slot,
            slot_size,
            slab: UnsafeCell::new(vec![0u8; max_slots * slot_size].into_boxed_slice()),
            write_index: AtomicUsize::new(0),
            read_index: AtomicUsize::new(0),
        });

        (
            EncodedProducer {
                inner: Arc::clone(&inner),
                drop_scratch: vec![0u8; max_bytes_per_slot],
            },
            EncodedConsumer { inner },
        )
    }
}

/// Producer-Haelfte des Paket-Rings
pub struct EncodedProducer {
    inner: Arc<EncodedRingInner>,
    drop_scratch: Vec<u8>,
}

impl EncodedProducer {
    /// Schreibt ein Paket; `Full` wenn kein Slot frei, `TooLarge` wenn es
    /// nicht in einen Slot passt.
    pub fn write(&mut self, data: &[u8]) -> Result<(), RingWriteError> {
        self.inner.write(data)
    }

    /// Schreibt mit Drop-Oldest-Ueberlaufverhalten (Consumer zu langsam).
    pub fn write_drop_oldest(&mut self, data: &[u8]) -> Result<WriteOutcome, RingWriteError> {
        match self.inner.write(data) {
            Ok(()) => Ok(WriteOutcome::Stored),
            Err(RingWriteError::Full) => {
                let _ = self.inner.read(&mut self.drop_scratch);
                self.inner.write(data)?;
                Ok(WriteOutcome::DroppedOldest)
            }
            Err(e) => Err(e),
        }
    }

    pub fn available_slots(&self) -> usize {
        self.inner.available_slots()
    }

    pub fn max_bytes_per_slot(&self) -> usize {
        self.inner.max_bytes_per_slot
    }
}

/// Consumer-Haelfte des Paket-Rings
pub struct EncodedConsumer {
    inner: Arc<EncodedRingInner>,
}

impl EncodedConsumer {
    /// Liest das naechste Paket in `dest`; liefert die tatsaechliche Laenge.
    pub fn read(&mut self, dest: &mut [u8]) -> Result<usize, RingReadError> {
        self.inner.read(dest)
    }

    pub fn available_slots(&self) -> usize {
        self.inner.available_slots()
    }

    pub fn max_bytes_per_slot(&self) -> usize {
        self.inner.max_bytes_per_slot
    }

    /// Setzt beide Indizes zurueck; nur im Ruhezustand aufrufen.
    pub fn reset(&mut self) {
        self.inner.write_index.store(0, Ordering::Relaxed);
        self.inner.read_index.store(0, Ordering::Relaxed);
    }

    /// Crate-intern: Producer-Sicht fuer einen neu geoeffneten
    /// Stream-Callback. Nur gueltig, wenn der vorherige Producer mit dem
    /// alten Stream zerstoert wurde.
    pub(crate) fn make_producer(&self) -> EncodedProducer {
        EncodedProducer {
            inner: Arc::clone(&self.inner),
            drop_scratch: vec![0u8; self.inner.max_bytes_per_slot],
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
    fn write_read_laenge_erhalten() {
        let (mut prod, mut cons) = EncodedRingBuffer::new(4, 64);
        prod.write(&[1, 2, 3]).unwrap();
        prod.write(&[9; 64]).unwrap();

        let mut dest = vec![0u8; 64];
        let n = cons.read(&mut dest).unwrap();
        assert_eq!(&dest[..n], &[1, 2, 3]);
        let n = cons.read(&mut dest).unwrap();
        assert_eq!(n, 64);
        assert!(dest.iter().all(|&b| b == 9));
    }

    #[test]
    fn zu_grosses_paket() {
        let (mut prod, _cons) = EncodedRingBuffer::new(4, 16);
        assert_eq!(prod.write(&[0u8; 17]), Err(RingWriteError::TooLarge));
        assert_eq!(prod.write(&[]), Err(RingWriteError::TooLarge));
    }

    #[test]
    fn voll_und_leer() {
        let (mut prod, mut cons) = EncodedRingBuffer::new(3, 8);
        prod.write(&[1]).unwrap();
        prod.write(&[2]).unwrap();
        assert_eq!(prod.write(&[3]), Err(RingWriteError::Full));

        let mut dest = vec![0u8; 8];
        cons.read(&mut dest).unwrap();
        cons.read(&mut dest).unwrap();
        assert_eq!(cons.read(&mut dest), Err(RingReadError::Empty));
    }

    #[test]
    fn zu_kleiner_zielpuffer_verwirft_den_slot() {
        let (mut prod, mut cons) = EncodedRingBuffer::new(4, 64);
        prod.write(&[7; 32]).unwrap();
        prod.write(&[8; 4]).unwrap();

        let mut zu_klein = vec![0u8; 8];
        // Slot wird verworfen, Empty gemeldet
        assert_eq!(cons.read(&mut zu_klein), Err(RingReadError::Empty));
        // Das naechste Paket ist noch da und passt
        let n = cons.read(&mut zu_klein).unwrap();
        assert_eq!(&zu_klein[..n], &[8; 4]);
    }

    #[test]
    fn drop_oldest_bei_vollem_ring() {
        let (mut prod, mut cons) = EncodedRingBuffer::new(3, 8);
        prod.write(&[1]).unwrap();
        prod.write(&[2]).unwrap();
        let outcome = prod.write_drop_oldest(&[3]).unwrap();
        assert_eq!(outcome, WriteOutcome::DroppedOldest);

        let mut dest = vec![0u8; 8];
        assert_eq!(cons.read(&mut dest).unwrap(), 1);
        assert_eq!(dest[0], 2, "Paket 1 muss verworfen worden sein");
        assert_eq!(cons.read(&mut dest).unwrap(), 1);
        assert_eq!(dest[0], 3);
    }

    #[test]
    fn wraparound_mit_variablen_laengen() {
        let (mut prod, mut cons) = EncodedRingBuffer::new(3, 32);
        let mut dest = vec![0u8; 32];
        for runde in 0u8..30 {
            let paket = vec![runde; 1 + (runde as usize % 20)];
            prod.write(&paket).unwrap();
            let n = cons.read(&mut dest).unwrap();
            assert_eq!(&dest[..n], &paket[..]);
        }
    }

    #[test]
    fn producer_und_consumer_auf_threads() {
        let (mut prod, mut cons) = EncodedRingBuffer::new(8, 16);
        let schreiber = std::thread::spawn(move || {
            for i in 0..500u16 {
                let paket = [(i & 0xFF) as u8, (i >> 8) as u8];
                loop {
                    match prod.write(&paket) {
                        Ok(()) => break,
                        Err(RingWriteError::Full) => std::thread::yield_now(),
                        Err(e) => panic!("unerwartet: {:?}", e),
                    }
                }
            }
        });

        let mut dest = vec![0u8; 16];
        let mut erwartet = 0u16;
        while erwartet < 500 {
            match cons.read(&mut dest) {
                Ok(n) => {
                    assert_eq!(n, 2);
                    let wert = dest[0] as u16 | ((dest[1] as u16) << 8);
                    assert_eq!(wert, erwartet, "FIFO-Reihenfolge verletzt");
                    erwartet += 1;
                }
                Err(RingReadError::Empty) => std::thread::yield_now(),
                Err(e) => panic!("unerwartet: {:?}", e),
            }
        }
        schreiber.join().unwrap();
    }
}
