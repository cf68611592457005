//! SPSC Ring-Puffer fuer int16-Frames fester Groesse
//!
//! Producer ist je nach Engine der RT-Callback (Capture) oder der
//! Decode-Worker (Playback); Consumer entsprechend umgekehrt. Der Slab ist
//! ein zusammenhaengendes Array von `max_frames * frame_samples` int16;
//! zwei atomare Indizes laufen in `[0, max_frames)`. Ein Slot bleibt immer
//! reserviert: `available_frames() <= max_frames - 1`.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{RingReadError, RingWriteError, WriteOutcome};

struct PcmRingInner {
    max_frames: usize,
    frame_samples: usize,
    slab: UnsafeCell<Box<[i16]>>,
    write_index: AtomicUsize,
    read_index: AtomicUsize,
}

// SPSC-Vertrag: genau ein Thread schreibt write_index, genau einer
// read_index. Die Haelften sind nicht klonbar, der Vertrag haelt damit
// per Konstruktion.
unsafe impl Send for PcmRingInner {}
unsafe impl Sync for PcmRingInner {}

impl PcmRingInner {
    fn slot_ptr(&self, slot: usize) -> *mut i16 {
        // Slot-Index ist immer < max_frames
        unsafe { (*self.slab.get()).as_mut_ptr().add(slot * self.frame_samples) }
    }

    fn write(&self, frame: &[i16]) -> Result<(), RingWriteError> {
        if frame.len() != self.frame_samples {
            return Err(RingWriteError::SizeMismatch);
        }

        let w = self.write_index.load(Ordering::Relaxed);
        let r = self.read_index.load(Ordering::Acquire);
        let next_w = (w + 1) % self.max_frames;
        if next_w == r {
            return Err(RingWriteError::Full);
        }

        unsafe {
            std::ptr::copy_nonoverlapping(frame.as_ptr(), self.slot_ptr(w), self.frame_samples);
        }
        self.write_index.store(next_w, Ordering::Release);
        Ok(())
    }

    fn read(&self, dest: &mut [i16]) -> Result<(), RingReadError> {
        if dest.len() != self.frame_samples {
            return Err(RingReadError::SizeMismatch);
        }

        let r = self.read_index.load(Ordering::Relaxed);
        let w = self.write_index.load(Ordering::Acquire);
        if r == w {
            return Err(RingReadError::Empty);
        }

        unsafe {
            std::ptr::copy_nonoverlapping(self.slot_ptr(r), dest.as_mut_ptr(), self.frame_samples);
        }
        self.read_index.store((r + 1) % self.max_frames, Ordering::Release);
        Ok(())
    }

    fn available_frames(&self) -> usize {
        let w = self.write_index.load(Ordering::Acquire);
        let r = self.read_index.load(Ordering::Acquire);
        (w + self.max_frames - r) % self.max_frames
    }
}

/// Konstruktor-Typ: liefert die beiden Haelften des Puffers
pub struct PcmRingBuffer;

impl PcmRingBuffer {
    /// Erstellt einen Ring fuer `max_frames` Frames zu je `frame_samples`
    /// int16 und gibt Producer- und Consumer-Haelfte zurueck.
    pub fn new(max_frames: usize, frame_samples: usize) -> (PcmProducer, PcmConsumer) {
        assert!(max_frames >= 2, "Ring braucht mindestens 2 Slots");
        assert!(frame_samples >= 1, "Frame braucht mindestens 1 Sample");

        let inner = Arc::new(PcmRingInner {
            max_frames,
            frame_samples,
            slab: UnsafeCell::new(vec![0i16; max_frames * frame_samples].into_boxed_slice()),
            write_index: AtomicUsize::new(0),
            read_index: AtomicUsize::new(0),
        });

        (
            PcmProducer {
                inner: Arc::clone(&inner),
                drop_scratch: vec![0i16; frame_samples],
            },
            PcmConsumer { inner },
        )
    }
}

/// Producer-Haelfte des PCM-Rings
pub struct PcmProducer {
    inner: Arc<PcmRingInner>,
    /// Eigener Scratch fuer den Drop-Oldest-Pfad. Darf NIE mit dem
    /// Partial-Frame-Puffer des Playback-Callbacks geteilt werden.
    drop_scratch: Vec<i16>,
}

impl PcmProducer {
    /// Schreibt einen Frame; `Full` wenn kein Slot frei ist.
    pub fn write(&mut self, frame: &[i16]) -> Result<(), RingWriteError> {
        self.inner.write(frame)
    }

    /// Schreibt einen Frame mit Drop-Oldest-Ueberlaufverhalten.
    ///
    /// Bei vollem Puffer wird der aelteste Frame in den eigenen Scratch
    /// gelesen (und verworfen) und der Schreibvorgang wiederholt. Der
    /// Rueckgabewert meldet den Drop fuer die Diagnose-Zaehler.
    pub fn write_drop_oldest(&mut self, frame: &[i16]) -> Result<WriteOutcome, RingWriteError> {
        match self.inner.write(frame) {
            Ok(()) => Ok(WriteOutcome::Stored),
            Err(RingWriteError::Full) => {
                let _ = self.inner.read(&mut self.drop_scratch);
                self.inner.write(frame)?;
                Ok(WriteOutcome::DroppedOldest)
            }
            Err(e) => Err(e),
        }
    }

    /// Anzahl lesbarer Frames; darf um einen Slot veraltet sein.
    pub fn available_frames(&self) -> usize {
        self.inner.available_frames()
    }

    pub fn frame_samples(&self) -> usize {
        self.inner.frame_samples
    }

    pub fn capacity(&self) -> usize {
        self.inner.max_frames
    }

    /// Crate-intern: Consumer-Sicht fuer einen neu geoeffneten
    /// Stream-Callback. Nur gueltig, wenn der vorherige Consumer mit dem
    /// alten Stream zerstoert wurde – es darf je Seite immer nur eine
    /// lebende Haelfte geben.
    pub(crate) fn make_consumer(&self) -> PcmConsumer {
        PcmConsumer {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Consumer-Haelfte des PCM-Rings
pub struct PcmConsumer {
    inner: Arc<PcmRingInner>,
}

impl PcmConsumer {
    /// Liest einen Frame; `Empty` wenn die Indizes gleich sind.
    pub fn read(&mut self, dest: &mut [i16]) -> Result<(), RingReadError> {
        self.inner.read(dest)
    }

    /// Anzahl lesbarer Frames; darf um einen Slot veraltet sein.
    pub fn available_frames(&self) -> usize {
        self.inner.available_frames()
    }

    pub fn frame_samples(&self) -> usize {
        self.inner.frame_samples
    }

    /// Verwirft Frames, bis hoechstens `keep` uebrig sind.
    ///
    /// Rueckt nur den Read-Index vor, ohne Daten zu kopieren. Sicher vom
    /// Consumer aus oder im Ruhezustand; der Producer liest den Read-Index
    /// nur fuer die Kapazitaetspruefung.
    pub fn drain(&mut self, keep: usize) {
        let avail = self.inner.available_frames();
        if avail <= keep {
            return;
        }
        let to_drop = avail - keep;
        let r = self.inner.read_index.load(Ordering::Relaxed);
        self.inner
            .read_index
            .store((r + to_drop) % self.inner.max_frames, Ordering::Release);
    }

    /// Setzt beide Indizes auf 0 zurueck.
    ///
    /// Nur aufrufbar, wenn weder Producer noch Consumer aktiv sind.
    pub fn reset(&mut self) {
        self.inner.write_index.store(0, Ordering::Relaxed);
        self.inner.read_index.store(0, Ordering::Relaxed);
    }

    /// Crate-intern: Producer-Sicht fuer einen neu geoeffneten
    /// Stream-Callback (Gegenstueck zu [`PcmProducer::make_consumer`]).
    pub(crate) fn make_producer(&self) -> PcmProducer {
        PcmProducer {
            inner: Arc::clone(&self.inner),
            drop_scratch: vec![0i16; self.inner.frame_samples],
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(n: i16, len: usize) -> Vec<i16> {
        vec![n; len]
    }

    #[test]
    fn write_read_fifo() {
        let (mut prod, mut cons) = PcmRingBuffer::new(4, 8);
        for n in 0..3 {
            prod.write(&frame(n, 8)).unwrap();
        }
        let mut dest = vec![0i16; 8];
        for n in 0..3 {
            cons.read(&mut dest).unwrap();
            assert_eq!(dest, frame(n, 8), "FIFO-Reihenfolge verletzt");
        }
        assert_eq!(cons.read(&mut dest), Err(RingReadError::Empty));
    }

    #[test]
    fn ein_slot_bleibt_reserviert() {
        let (mut prod, cons) = PcmRingBuffer::new(4, 2);
        // Kapazitaet 4 => maximal 3 Frames gleichzeitig
        prod.write(&[1, 1]).unwrap();
        prod.write(&[2, 2]).unwrap();
        prod.write(&[3, 3]).unwrap();
        assert_eq!(prod.write(&[4, 4]), Err(RingWriteError::Full));
        assert_eq!(cons.available_frames(), 3);
    }

    #[test]
    fn size_mismatch() {
        let (mut prod, mut cons) = PcmRingBuffer::new(4, 8);
        assert_eq!(prod.write(&[0i16; 7]), Err(RingWriteError::SizeMismatch));
        prod.write(&[0i16; 8]).unwrap();
        let mut zu_klein = vec![0i16; 4];
        assert_eq!(cons.read(&mut zu_klein), Err(RingReadError::SizeMismatch));
    }

    #[test]
    fn drop_oldest_verwirft_den_aeltesten() {
        let n = 8;
        let (mut prod, mut cons) = PcmRingBuffer::new(n, 4);
        // Bis zur Kapazitaet fuellen: Frames 0..N-2
        for i in 0..(n as i16 - 1) {
            prod.write(&frame(i, 4)).unwrap();
        }
        // Ein weiterer Frame N-1 verdraengt Frame 0
        let outcome = prod.write_drop_oldest(&frame(n as i16 - 1, 4)).unwrap();
        assert_eq!(outcome, WriteOutcome::DroppedOldest);

        let mut dest = vec![0i16; 4];
        for erwartet in 1..n as i16 {
            cons.read(&mut dest).unwrap();
            assert_eq!(dest, frame(erwartet, 4));
        }
        assert_eq!(cons.read(&mut dest), Err(RingReadError::Empty));
    }

    #[test]
    fn drop_oldest_ohne_ueberlauf() {
        let (mut prod, _cons) = PcmRingBuffer::new(4, 2);
        assert_eq!(
            prod.write_drop_oldest(&[7, 7]).unwrap(),
            WriteOutcome::Stored
        );
    }

    #[test]
    fn drain_behaelt_die_neuesten() {
        let (mut prod, mut cons) = PcmRingBuffer::new(8, 2);
        for i in 0..6i16 {
            prod.write(&frame(i, 2)).unwrap();
        }
        cons.drain(2);
        assert_eq!(cons.available_frames(), 2);
        let mut dest = vec![0i16; 2];
        cons.read(&mut dest).unwrap();
        assert_eq!(dest, frame(4, 2), "drain muss die aeltesten verwerfen");
    }

    #[test]
    fn drain_unter_keep_ist_noop() {
        let (mut prod, mut cons) = PcmRingBuffer::new(8, 2);
        prod.write(&[1, 1]).unwrap();
        cons.drain(5);
        assert_eq!(cons.available_frames(), 1);
    }

    #[test]
    fn reset_leert_den_ring() {
        let (mut prod, mut cons) = PcmRingBuffer::new(4, 2);
        prod.write(&[1, 1]).unwrap();
        prod.write(&[2, 2]).unwrap();
        cons.reset();
        assert_eq!(cons.available_frames(), 0);
        let mut dest = vec![0i16; 2];
        assert_eq!(cons.read(&mut dest), Err(RingReadError::Empty));
    }

    #[test]
    fn wraparound_erhaelt_daten() {
        let (mut prod, mut cons) = PcmRingBuffer::new(3, 2);
        let mut dest = vec![0i16; 2];
        // Mehrfach ueber die Ringgrenze schreiben und lesen
        for runde in 0..20i16 {
            prod.write(&frame(runde, 2)).unwrap();
            cons.read(&mut dest).unwrap();
            assert_eq!(dest, frame(runde, 2));
        }
    }

    #[test]
    fn producer_und_consumer_auf_threads() {
        let (mut prod, mut cons) = PcmRingBuffer::new(16, 4);
        let schreiber = std::thread::spawn(move || {
            for i in 0..1000i16 {
                loop {
                    match prod.write(&frame(i, 4)) {
                        Ok(()) => break,
                        Err(RingWriteError::Full) => std::thread::yield_now(),
                        Err(e) => panic!("unerwartet: {:?}", e),
                    }
                }
            }
        });

        let mut dest = vec![0i16; 4];
        let mut erwartet = 0i16;
        while erwartet < 1000 {
            match cons.read(&mut dest) {
                Ok(()) => {
                    assert_eq!(dest, frame(erwartet, 4), "Daten muessen byte-identisch sein");
                    erwartet += 1;
                }
                Err(RingReadError::Empty) => std::thread::yield_now(),
                Err(e) => panic!("unerwartet: {:?}", e),
            }
        }
        schreiber.join().unwrap();
    }
}
