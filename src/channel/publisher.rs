use std::sync::Arc;

use crate::core::{ChannelStats, PacketRing};
use crate::error::Result;

/// Handle tulis ke sebuah channel
///
/// Tidak punya state sendiri; clone murah dan aman dipakai dari banyak thread.
#[derive(Debug, Clone)]
pub struct Publisher {
    ring: Arc<PacketRing>,
}

impl Publisher {
    pub(crate) fn new(ring: Arc<PacketRing>) -> Self {
        Self { ring }
    }

    /// Publish satu paket. Data lama akan ditimpa jika ring penuh.
    #[inline]
    pub fn publish(&self, payload: &[u8]) -> Result<()> {
        self.ring.write_packet(payload)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn stats(&self) -> ChannelStats {
        self.ring.stats()
    }
}
