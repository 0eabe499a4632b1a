/// Snapshot statistik satu ring
///
/// Diambil di bawah lock yang sama dengan operasi tulis/baca, jadi semua
/// field konsisten satu sama lain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Kapasitas ring dalam bytes (sudah dibulatkan ke power of 2)
    pub capacity: usize,
    /// Bytes yang masih valid (header + payload)
    pub used: usize,
    pub write_pos: u64,
    pub evict_pos: u64,
    pub latest_pos: u64,
    pub packets_written: u64,
    /// Bytes yang ditulis termasuk length prefix
    pub bytes_written: u64,
    /// Paket yang di-evict oleh producer untuk memberi ruang
    pub dropped_packets: u64,
    pub dropped_bytes: u64,
    /// Berapa kali subscriber tertinggal dan di-snap ke eviction frontier
    pub lag_events: u64,
    /// High-water mark dari `used`
    pub peak_used: usize,
    /// Payload terpanjang yang pernah ditulis
    pub max_packet_len: usize,
}

impl ChannelStats {
    #[inline]
    pub fn available(&self) -> usize {
        self.capacity - self.used
    }

    /// Rasio bytes yang hilang terhadap total bytes yang ditulis
    pub fn drop_ratio(&self) -> f64 {
        if self.bytes_written == 0 {
            0.0
        } else {
            self.dropped_bytes as f64 / self.bytes_written as f64
        }
    }
}
