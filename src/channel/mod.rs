//! Channel Layer: Publisher/Subscriber handles di atas satu `PacketRing`
//!
//! `Channel` membuat ring dan membagikannya ke handle lewat `Arc`.
//! Drop channel atau handle mana pun tidak memengaruhi handle lain;
//! storage dibebaskan saat referensi terakhir hilang.

mod publisher;
mod subscriber;

use std::sync::Arc;

use tracing::debug;

use crate::core::{ChannelStats, PacketRing};
use crate::error::Result;

pub use publisher::Publisher;
pub use subscriber::Subscriber;

/// Configuration for a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Requested ring size in bytes, rounded up to a power of 2 (minimum 2)
    pub capacity: usize,
    /// Name attached to tracing events of this channel
    pub name: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: 1024 * 1024,
            name: "varcast".to_string(),
        }
    }
}

impl ChannelConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Factory yang memiliki satu ring dan membuat handle untuknya
#[derive(Debug, Clone)]
pub struct Channel {
    ring: Arc<PacketRing>,
}

impl Default for Channel {
    fn default() -> Self {
        Self::with_config(ChannelConfig::default())
    }
}

impl Channel {
    /// Membuat channel dengan kapasitas tertentu.
    ///
    /// Kapasitas dibulatkan ke power of 2; gunakan [`Channel::capacity`]
    /// untuk ukuran sebenarnya.
    ///
    /// # Panics
    /// Panic jika storage tidak bisa dialokasikan; lihat [`Channel::try_new`].
    pub fn new(requested_capacity: usize) -> Self {
        Self::with_config(ChannelConfig::default().with_capacity(requested_capacity))
    }

    /// # Panics
    /// Sama dengan [`Channel::new`].
    pub fn with_config(config: ChannelConfig) -> Self {
        Self {
            ring: Arc::new(PacketRing::with_name(config.capacity, config.name)),
        }
    }

    /// Seperti [`Channel::new`], tapi mengembalikan `CapacityTooLarge`
    /// alih-alih panic jika alokasi gagal
    pub fn try_new(requested_capacity: usize) -> Result<Self> {
        Self::try_with_config(ChannelConfig::default().with_capacity(requested_capacity))
    }

    pub fn try_with_config(config: ChannelConfig) -> Result<Self> {
        let ring = PacketRing::try_with_name(config.capacity, config.name)?;
        Ok(Self {
            ring: Arc::new(ring),
        })
    }

    /// Membuat publisher baru untuk ring ini
    pub fn publisher(&self) -> Publisher {
        Publisher::new(Arc::clone(&self.ring))
    }

    /// Membuat subscriber baru.
    ///
    /// Subscriber mulai dari paket terbaru, bukan dari awal channel.
    pub fn subscriber(&self) -> Subscriber {
        let subscriber = Subscriber::new(Arc::clone(&self.ring));
        debug!(
            ring = self.ring.name(),
            cursor = subscriber.cursor(),
            "subscriber created"
        );
        subscriber
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn name(&self) -> &str {
        self.ring.name()
    }

    pub fn stats(&self) -> ChannelStats {
        self.ring.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;

    #[test]
    fn test_config_builder() {
        let config = ChannelConfig::default()
            .with_capacity(100)
            .with_name("telemetry");
        assert_eq!(config.capacity, 100);
        assert_eq!(config.name, "telemetry");

        let channel = Channel::with_config(config);
        assert_eq!(channel.capacity(), 128);
        assert_eq!(channel.name(), "telemetry");
    }

    #[test]
    fn test_try_new_rejects_huge_capacity() {
        let err = Channel::try_new(usize::MAX).unwrap_err();
        assert!(matches!(err, ChannelError::CapacityTooLarge { .. }));

        let config = ChannelConfig::default().with_capacity(usize::MAX / 2 + 2);
        assert!(Channel::try_with_config(config).is_err());

        let channel = Channel::try_new(100).unwrap();
        assert_eq!(channel.capacity(), 128);
    }

    #[test]
    fn test_default_channel() {
        let channel = Channel::default();
        assert_eq!(channel.capacity(), 1024 * 1024);
        assert_eq!(channel.stats().used, 0);
    }

    #[test]
    fn test_handles_outlive_channel() {
        let channel = Channel::new(64);
        let publisher = channel.publisher();
        let mut subscriber = channel.subscriber();
        drop(channel);

        publisher.publish(b"still here").unwrap();
        assert_eq!(subscriber.try_read(), Some(&b"still here"[..]));
    }

    #[test]
    fn test_dropping_handle_keeps_siblings() {
        let channel = Channel::new(64);
        let first = channel.publisher();
        let second = first.clone();
        let mut subscriber = channel.subscriber();
        let other = channel.subscriber();

        drop(first);
        drop(other);

        second.publish(b"x").unwrap();
        assert_eq!(subscriber.try_read(), Some(&b"x"[..]));
    }
}
