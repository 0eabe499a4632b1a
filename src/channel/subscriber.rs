//! Subscriber: cursor privat + scratch buffer yang dipakai ulang

use std::sync::Arc;
use std::time::Duration;

use crate::core::{ChannelStats, Delivery, PacketRing};

/// Handle baca ke sebuah channel
///
/// Setiap subscriber membawa cursor sendiri, jadi banyak subscriber bisa
/// membaca stream yang sama secara independen. Payload terakhir disimpan di
/// buffer internal dan tetap valid sampai pembacaan berikutnya.
#[derive(Debug)]
pub struct Subscriber {
    ring: Arc<PacketRing>,
    cursor: u64,
    data: Vec<u8>,
    packets_read: u64,
    skipped_bytes: u64,
    lag_events: u64,
}

impl Subscriber {
    pub(crate) fn new(ring: Arc<PacketRing>) -> Self {
        let cursor = ring.latest_pos();
        let data = Vec::with_capacity(ring.max_packet_len());
        Self {
            ring,
            cursor,
            data,
            packets_read: 0,
            skipped_bytes: 0,
            lag_events: 0,
        }
    }

    /// Cek apakah ada paket yang belum dibaca, tanpa menunggu
    #[inline]
    pub fn peek(&self) -> bool {
        self.ring.has_new_data(self.cursor)
    }

    /// Baca paket berikutnya, menunggu tanpa batas sampai ada data
    pub fn read(&mut self) -> &[u8] {
        // Tanpa timeout read_packet hanya kembali setelah ada data
        while self.read_with(None).is_none() {}
        &self.data
    }

    /// Baca paket berikutnya tanpa menunggu
    pub fn try_read(&mut self) -> Option<&[u8]> {
        self.read_with(Some(Duration::ZERO))?;
        Some(&self.data)
    }

    /// Baca paket berikutnya, menunggu paling lama `timeout`
    pub fn read_timeout(&mut self, timeout: Duration) -> Option<&[u8]> {
        self.read_with(Some(timeout))?;
        Some(&self.data)
    }

    fn read_with(&mut self, timeout: Option<Duration>) -> Option<Delivery> {
        let delivery = self
            .ring
            .read_packet(&mut self.cursor, &mut self.data, timeout)?;

        self.packets_read += 1;
        if delivery.skipped > 0 {
            self.skipped_bytes += delivery.skipped;
            self.lag_events += 1;
        }
        Some(delivery)
    }

    /// Payload terakhir yang berhasil dibaca
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Posisi unbounded berikutnya yang akan dibaca
    #[inline]
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn packets_read(&self) -> u64 {
        self.packets_read
    }

    /// Total bytes yang terlewat karena subscriber ini tertinggal
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_bytes
    }

    pub fn lag_events(&self) -> u64 {
        self.lag_events
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn stats(&self) -> ChannelStats {
        self.ring.stats()
    }
}

#[cfg(test)]
mod tests {
    use crate::channel::Channel;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_peek_does_not_consume() {
        let channel = Channel::new(64);
        let publisher = channel.publisher();
        let mut subscriber = channel.subscriber();

        assert!(!subscriber.peek());
        publisher.publish(b"abc").unwrap();
        assert!(subscriber.peek());
        assert!(subscriber.peek());

        assert_eq!(subscriber.try_read(), Some(&b"abc"[..]));
        assert!(!subscriber.peek());
        assert_eq!(subscriber.packets_read(), 1);
    }

    #[test]
    fn test_data_stable_after_failed_read() {
        let channel = Channel::new(64);
        let publisher = channel.publisher();
        let mut subscriber = channel.subscriber();

        publisher.publish(b"first").unwrap();
        subscriber.try_read().unwrap();
        assert!(subscriber.try_read().is_none());
        assert!(subscriber
            .read_timeout(Duration::from_millis(5))
            .is_none());
        assert_eq!(subscriber.data(), b"first");
    }

    #[test]
    fn test_scratch_buffer_presized() {
        let channel = Channel::new(1024);
        let publisher = channel.publisher();
        publisher.publish(&[0u8; 300]).unwrap();

        let subscriber = channel.subscriber();
        assert!(subscriber.data.capacity() >= 300);
    }

    #[test]
    fn test_lag_counters() {
        let channel = Channel::new(16);
        let publisher = channel.publisher();
        let mut subscriber = channel.subscriber();

        for i in 1..=3u8 {
            publisher.publish(&[i; 4]).unwrap();
        }

        assert_eq!(subscriber.try_read(), Some(&[2u8; 4][..]));
        assert_eq!(subscriber.try_read(), Some(&[3u8; 4][..]));
        assert!(subscriber.try_read().is_none());

        assert_eq!(subscriber.skipped_bytes(), 8);
        assert_eq!(subscriber.lag_events(), 1);
        assert_eq!(subscriber.stats().lag_events, 1);
    }

    #[test]
    fn test_blocking_read() {
        let channel = Channel::new(256);
        let publisher = channel.publisher();
        let mut subscriber = channel.subscriber();

        let start = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            publisher.publish(b"late").unwrap();
        });

        assert_eq!(subscriber.read(), b"late");
        assert!(start.elapsed() >= Duration::from_millis(30));
        handle.join().unwrap();
    }
}
