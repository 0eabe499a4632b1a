//! Variable-Length Packet Ring Buffer (multi-producer, multi-subscriber)
//!
//! Setiap paket ditulis utuh di bawah satu lock. Jika ruang tidak cukup,
//! paket tertua di-evict sampai paket baru muat: producer tidak pernah
//! menunggu. Setiap subscriber membawa cursor sendiri dan membaca ulang
//! stream dari posisi terakhirnya; cursor yang tertinggal di belakang
//! eviction frontier di-snap maju saat dibaca.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use super::framing::{
    copy_in, copy_out_to_vec, frame_len, frame_within, is_in_range, read_header, round_capacity,
    write_header, FRAME_HEADER_LEN,
};
use super::stats::ChannelStats;
use crate::error::{ChannelError, Result};

/// Hasil satu pembacaan paket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Panjang payload yang dibaca
    pub len: usize,
    /// Bytes yang dilewati karena cursor tertinggal (0 jika tidak lag)
    pub skipped: u64,
}

/// State yang dilindungi lock
struct RingState {
    storage: Box<[u8]>,
    // Semua posisi unbounded, di-mask hanya saat akses storage
    write_pos: u64,
    evict_pos: u64,
    latest_pos: u64,
    packets_written: u64,
    bytes_written: u64,
    dropped_packets: u64,
    dropped_bytes: u64,
    lag_events: u64,
    peak_used: usize,
    max_packet_len: usize,
}

impl RingState {
    /// Alokasi storage tanpa panic; gagal jika `capacity` tidak bisa dialokasikan
    fn try_new(capacity: usize, start_pos: u64) -> Result<Self> {
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|_| ChannelError::CapacityTooLarge { capacity })?;
        storage.resize(capacity, 0u8);

        Ok(Self {
            storage: storage.into_boxed_slice(),
            write_pos: start_pos,
            evict_pos: start_pos,
            latest_pos: start_pos,
            packets_written: 0,
            bytes_written: 0,
            dropped_packets: 0,
            dropped_bytes: 0,
            lag_events: 0,
            peak_used: 0,
            max_packet_len: 0,
        })
    }

    #[inline(always)]
    fn used(&self) -> usize {
        self.write_pos.wrapping_sub(self.evict_pos) as usize
    }

    #[inline(always)]
    fn available(&self) -> usize {
        self.storage.len() - self.used()
    }

    /// Buang satu paket di `evict_pos`, return ukuran frame-nya
    fn evict_oldest(&mut self) -> usize {
        let len = read_header(&self.storage, self.evict_pos) as usize;
        let frame = FRAME_HEADER_LEN + len;

        self.evict_pos = self.evict_pos.wrapping_add(frame as u64);
        self.dropped_packets += 1;
        self.dropped_bytes += frame as u64;
        frame
    }
}

/// Ring buffer paket dengan panjang variabel
///
/// Semua state ada di balik satu `Mutex`; pembaca yang menunggu data
/// parkir di `Condvar` yang melepas lock selama menunggu.
pub struct PacketRing {
    state: Mutex<RingState>,
    readable: Condvar,
    capacity: usize,
    name: String,
}

impl PacketRing {
    /// Membuat ring baru. Kapasitas dibulatkan ke power of 2 (minimum 2).
    ///
    /// # Panics
    /// Panic jika storage sebesar kapasitas hasil pembulatan tidak bisa
    /// dialokasikan. Gunakan [`PacketRing::try_new`] untuk versi tanpa panic.
    pub fn new(requested_capacity: usize) -> Self {
        Self::with_name(requested_capacity, "varcast")
    }

    /// Seperti [`PacketRing::new`], dengan nama untuk field tracing
    ///
    /// # Panics
    /// Sama dengan [`PacketRing::new`].
    pub fn with_name(requested_capacity: usize, name: impl Into<String>) -> Self {
        match Self::try_with_name(requested_capacity, name) {
            Ok(ring) => ring,
            Err(err) => panic!("{}", err),
        }
    }

    /// Returns `CapacityTooLarge` jika storage tidak bisa dialokasikan
    pub fn try_new(requested_capacity: usize) -> Result<Self> {
        Self::try_with_name(requested_capacity, "varcast")
    }

    pub fn try_with_name(requested_capacity: usize, name: impl Into<String>) -> Result<Self> {
        Self::build(requested_capacity, name.into(), 0)
    }

    fn build(requested_capacity: usize, name: String, start_pos: u64) -> Result<Self> {
        let capacity = round_capacity(requested_capacity);
        let state = match RingState::try_new(capacity, start_pos) {
            Ok(state) => state,
            Err(err) => {
                debug!(
                    ring = %name,
                    requested = requested_capacity,
                    %err,
                    "packet ring allocation failed"
                );
                return Err(err);
            }
        };
        debug!(
            ring = %name,
            requested = requested_capacity,
            capacity,
            "packet ring created"
        );

        Ok(Self {
            state: Mutex::new(state),
            readable: Condvar::new(),
            capacity,
            name,
        })
    }

    /// Menulis satu paket. Paket tertua di-evict jika ruang tidak cukup.
    ///
    /// Gagal tanpa efek samping jika payload + header lebih besar dari
    /// kapasitas ring.
    pub fn write_packet(&self, payload: &[u8]) -> Result<()> {
        let Some(frame) = frame_len(payload.len(), self.capacity) else {
            debug!(
                ring = %self.name,
                payload = payload.len(),
                capacity = self.capacity,
                "rejected packet larger than ring"
            );
            return Err(ChannelError::PacketTooLarge {
                payload: payload.len(),
                capacity: self.capacity,
            });
        };

        let mut state = self.state.lock();

        // Discard old data. Selalu berhenti: ring kosong pasti muat `frame`.
        let mut evicted = 0usize;
        let mut evicted_bytes = 0usize;
        while state.available() < frame {
            evicted_bytes += state.evict_oldest();
            evicted += 1;
        }
        if evicted > 0 {
            debug!(
                ring = %self.name,
                packets = evicted,
                bytes = evicted_bytes,
                evict_pos = state.evict_pos,
                "evicted oldest packets"
            );
        }

        let pos = state.write_pos;
        write_header(&mut state.storage, pos, payload.len() as u32);
        copy_in(
            &mut state.storage,
            pos.wrapping_add(FRAME_HEADER_LEN as u64),
            payload,
        );

        state.latest_pos = pos;
        state.write_pos = pos.wrapping_add(frame as u64);

        state.packets_written += 1;
        state.bytes_written += frame as u64;
        state.peak_used = state.peak_used.max(state.used());
        state.max_packet_len = state.max_packet_len.max(payload.len());

        trace!(
            ring = %self.name,
            len = payload.len(),
            pos,
            used = state.used(),
            "packet written"
        );

        drop(state);
        self.readable.notify_all();
        Ok(())
    }

    /// Membaca paket berikutnya relatif terhadap `cursor`.
    ///
    /// * `timeout = None` - tunggu sampai ada data
    /// * `timeout = Some(Duration::ZERO)` - tidak menunggu
    /// * `timeout = Some(d)` - tunggu paling lama `d`
    ///
    /// Returns `None` jika tidak ada data baru; `cursor` dan `out` tidak
    /// disentuh. Jika `cursor` sudah di luar `[evict_pos, write_pos]`,
    /// cursor di-snap ke `evict_pos` sebelum membaca.
    ///
    /// `cursor` harus berasal dari [`PacketRing::latest_pos`] atau dari
    /// pembacaan sebelumnya. Cursor yang tidak jatuh di awal header dan
    /// membaca panjang yang melewati `write_pos` juga di-snap ke `evict_pos`.
    pub fn read_packet(
        &self,
        cursor: &mut u64,
        out: &mut Vec<u8>,
        timeout: Option<Duration>,
    ) -> Option<Delivery> {
        let from = *cursor;
        let mut state = self.state.lock();

        match timeout {
            Some(t) if t.is_zero() => {}
            Some(t) => match Instant::now().checked_add(t) {
                Some(deadline) => {
                    self.readable
                        .wait_while_until(&mut state, |s| s.write_pos == from, deadline);
                }
                None => self.readable.wait_while(&mut state, |s| s.write_pos == from),
            },
            None => self.readable.wait_while(&mut state, |s| s.write_pos == from),
        }

        if state.write_pos == from {
            return None;
        }

        let mut pos = from;
        let mut skipped = 0;

        // Reader tertinggal terlalu jauh: sebagian paket sudah hilang
        if !is_in_range(state.evict_pos, pos, state.write_pos) {
            skipped = state.evict_pos.wrapping_sub(pos);
            pos = state.evict_pos;
            state.lag_events += 1;
            debug!(
                ring = %self.name,
                cursor = from,
                evict_pos = pos,
                skipped,
                "reader lagged behind eviction frontier"
            );
        }

        let mut len = read_header(&state.storage, pos) as usize;

        // Cursor tidak sejajar dengan header: frame melewati write_pos
        if !frame_within(pos, len, state.write_pos) {
            let snapped = state.evict_pos;
            warn!(
                ring = %self.name,
                cursor = pos,
                len,
                evict_pos = snapped,
                "cursor not on a packet boundary, snapping to eviction frontier"
            );
            pos = snapped;
            skipped = 0;
            state.lag_events += 1;
            len = read_header(&state.storage, pos) as usize;
        }

        let payload_pos = pos.wrapping_add(FRAME_HEADER_LEN as u64);
        copy_out_to_vec(&state.storage, payload_pos, len, out);
        *cursor = payload_pos.wrapping_add(len as u64);

        trace!(ring = %self.name, len, pos, "packet read");

        Some(Delivery { len, skipped })
    }

    /// Cek apakah ada data yang belum dibaca oleh `cursor`.
    /// Tidak menunggu dan tidak mengubah state apa pun.
    #[inline]
    pub fn has_new_data(&self, cursor: u64) -> bool {
        self.state.lock().write_pos != cursor
    }

    /// Posisi header paket terbaru
    #[inline]
    pub fn latest_pos(&self) -> u64 {
        self.state.lock().latest_pos
    }

    /// Payload terpanjang yang pernah ditulis
    #[inline]
    pub fn max_packet_len(&self) -> usize {
        self.state.lock().max_packet_len
    }

    /// Kapasitas ring setelah pembulatan
    #[inline(always)]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> ChannelStats {
        let state = self.state.lock();
        ChannelStats {
            capacity: self.capacity,
            used: state.used(),
            write_pos: state.write_pos,
            evict_pos: state.evict_pos,
            latest_pos: state.latest_pos,
            packets_written: state.packets_written,
            bytes_written: state.bytes_written,
            dropped_packets: state.dropped_packets,
            dropped_bytes: state.dropped_bytes,
            lag_events: state.lag_events,
            peak_used: state.peak_used,
            max_packet_len: state.max_packet_len,
        }
    }
}

impl std::fmt::Debug for PacketRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketRing")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn read_all(ring: &PacketRing, cursor: &mut u64) -> Vec<Vec<u8>> {
        let mut packets = Vec::new();
        let mut out = Vec::new();
        while ring.read_packet(cursor, &mut out, Some(Duration::ZERO)).is_some() {
            packets.push(out.clone());
        }
        packets
    }

    #[test]
    fn test_basic_write_read() {
        let ring = PacketRing::new(64);
        let mut cursor = ring.latest_pos();

        assert!(!ring.has_new_data(cursor));
        ring.write_packet(b"hello").unwrap();
        assert!(ring.has_new_data(cursor));

        let mut out = Vec::new();
        let delivery = ring
            .read_packet(&mut cursor, &mut out, Some(Duration::ZERO))
            .unwrap();
        assert_eq!(delivery, Delivery { len: 5, skipped: 0 });
        assert_eq!(out, b"hello");
        assert_eq!(cursor, 9);
        assert!(!ring.has_new_data(cursor));
    }

    #[test]
    fn test_empty_payload() {
        let ring = PacketRing::new(16);
        let mut cursor = ring.latest_pos();

        ring.write_packet(&[]).unwrap();
        let mut out = vec![1, 2, 3];
        let delivery = ring
            .read_packet(&mut cursor, &mut out, Some(Duration::ZERO))
            .unwrap();
        assert_eq!(delivery.len, 0);
        assert!(out.is_empty());
        assert_eq!(cursor, FRAME_HEADER_LEN as u64);
    }

    #[test]
    fn test_oversized_packet_rejected() {
        let ring = PacketRing::new(100);
        assert_eq!(ring.capacity(), 128);
        let mut cursor = ring.latest_pos();

        ring.write_packet(&[7u8; 10]).unwrap();
        let before = ring.stats();

        let err = ring.write_packet(&[0u8; 200]).unwrap_err();
        assert_eq!(
            err,
            ChannelError::PacketTooLarge {
                payload: 200,
                capacity: 128
            }
        );
        // 125 + 4 > 128
        assert!(ring.write_packet(&[0u8; 125]).is_err());
        assert_eq!(ring.stats(), before);

        let packets = read_all(&ring, &mut cursor);
        assert_eq!(packets, vec![vec![7u8; 10]]);
    }

    #[test]
    fn test_packet_filling_whole_ring() {
        let ring = PacketRing::new(16);
        let mut cursor = ring.latest_pos();

        ring.write_packet(&[1u8; 4]).unwrap();
        ring.write_packet(&[2u8; 12]).unwrap();

        let stats = ring.stats();
        assert_eq!(stats.used, 16);
        assert_eq!(stats.dropped_packets, 1);

        let packets = read_all(&ring, &mut cursor);
        assert_eq!(packets, vec![vec![2u8; 12]]);
    }

    #[test]
    fn test_eviction_drops_oldest() {
        let ring = PacketRing::new(16);
        let mut cursor = ring.latest_pos();

        ring.write_packet(&[1u8; 4]).unwrap();
        ring.write_packet(&[2u8; 4]).unwrap();
        ring.write_packet(&[3u8; 4]).unwrap();

        let stats = ring.stats();
        assert_eq!(stats.used, 16);
        assert_eq!(stats.evict_pos, 8);
        assert_eq!(stats.write_pos, 24);
        assert_eq!(stats.latest_pos, 16);
        assert_eq!(stats.dropped_packets, 1);
        assert_eq!(stats.dropped_bytes, 8);

        let mut out = Vec::new();
        let first = ring
            .read_packet(&mut cursor, &mut out, Some(Duration::ZERO))
            .unwrap();
        assert_eq!(first.skipped, 8);
        assert_eq!(out, vec![2u8; 4]);

        let packets = read_all(&ring, &mut cursor);
        assert_eq!(packets, vec![vec![3u8; 4]]);
        assert_eq!(ring.stats().lag_events, 1);
    }

    #[test]
    fn test_late_subscriber_starts_at_latest() {
        let ring = PacketRing::new(128);
        ring.write_packet(b"a").unwrap();
        ring.write_packet(b"bb").unwrap();
        ring.write_packet(b"ccc").unwrap();

        let mut cursor = ring.latest_pos();
        assert_eq!(cursor, 11);

        let packets = read_all(&ring, &mut cursor);
        assert_eq!(packets, vec![b"ccc".to_vec()]);

        ring.write_packet(b"dddd").unwrap();
        let packets = read_all(&ring, &mut cursor);
        assert_eq!(packets, vec![b"dddd".to_vec()]);
    }

    #[test]
    fn test_used_never_exceeds_capacity() {
        let ring = PacketRing::new(64);
        for i in 0..500usize {
            let len = (i * 7) % 60;
            ring.write_packet(&vec![i as u8; len]).unwrap();
            let stats = ring.stats();
            assert!(stats.used <= stats.capacity);
            assert!(stats.peak_used <= stats.capacity);
        }
        assert_eq!(ring.max_packet_len(), 59);
    }

    #[test]
    fn test_try_read_on_empty_leaves_state() {
        let ring = PacketRing::new(32);
        let mut cursor = ring.latest_pos();
        let mut out = vec![42u8];

        assert!(ring
            .read_packet(&mut cursor, &mut out, Some(Duration::ZERO))
            .is_none());
        assert_eq!(cursor, 0);
        assert_eq!(out, vec![42u8]);
    }

    #[test]
    fn test_bounded_read_waits_for_timeout() {
        let ring = PacketRing::new(32);
        let mut cursor = ring.latest_pos();
        let mut out = Vec::new();

        let timeout = Duration::from_millis(50);
        let start = Instant::now();
        assert!(ring
            .read_packet(&mut cursor, &mut out, Some(timeout))
            .is_none());
        assert!(start.elapsed() >= timeout);
    }

    #[test]
    fn test_blocking_read_woken_by_writer() {
        let ring = Arc::new(PacketRing::new(256));
        let mut cursor = ring.latest_pos();

        let writer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                ring.write_packet(b"wake up").unwrap();
            })
        };

        let mut out = Vec::new();
        let delivery = ring.read_packet(&mut cursor, &mut out, None).unwrap();
        assert_eq!(delivery.len, 7);
        assert_eq!(out, b"wake up");

        writer.join().unwrap();
    }

    #[test]
    fn test_counter_wraparound() {
        // Mulai tepat sebelum u64::MAX supaya counter wrap di tengah test
        let start = u64::MAX - 40;
        let ring = PacketRing::build(32, "wrap".to_string(), start).unwrap();
        let mut cursor = ring.latest_pos();
        assert_eq!(cursor, start);

        let mut out = Vec::new();
        for i in 0..20u8 {
            ring.write_packet(&[i, i, i]).unwrap();
            ring.read_packet(&mut cursor, &mut out, Some(Duration::ZERO))
                .unwrap();
            assert_eq!(out, vec![i, i, i]);
        }
        assert!(ring.stats().write_pos < start);

        // Subscriber lain tertinggal melewati titik wrap
        let mut lagging = start;
        for i in 20..30u8 {
            ring.write_packet(&[i; 5]).unwrap();
        }
        let mut out = Vec::new();
        let delivery = ring
            .read_packet(&mut lagging, &mut out, Some(Duration::ZERO))
            .unwrap();
        assert!(delivery.skipped > 0);
        let stats = ring.stats();
        assert_eq!(lagging, stats.evict_pos.wrapping_add(9));
        assert!(stats.used <= stats.capacity);
    }

    #[test]
    fn test_capacity_too_large() {
        let err = PacketRing::try_new(usize::MAX).unwrap_err();
        assert_eq!(
            err,
            ChannelError::CapacityTooLarge {
                capacity: 1 << (usize::BITS - 1)
            }
        );
        assert!(err.is_invalid_argument());

        assert_eq!(PacketRing::try_new(64).unwrap().capacity(), 64);
    }

    #[test]
    fn test_misaligned_cursor_snaps() {
        let ring = PacketRing::new(16);
        ring.write_packet(&[0xFF; 8]).unwrap();

        // Posisi 5 masih di dalam range tapi jatuh di tengah payload:
        // header yang terbaca adalah 0xFFFF_FFFF
        let mut cursor = 5;
        let mut out = Vec::new();
        let delivery = ring
            .read_packet(&mut cursor, &mut out, Some(Duration::ZERO))
            .unwrap();

        assert_eq!(out, vec![0xFF; 8]);
        assert_eq!(delivery, Delivery { len: 8, skipped: 0 });
        assert_eq!(cursor, 12);
        assert_eq!(ring.stats().lag_events, 1);
        assert!(ring.read_packet(&mut cursor, &mut out, Some(Duration::ZERO)).is_none());
    }
}
