//! Varcast - Lossy Broadcast Channel
//!
//! Arsitektur:
//! - Packet Ring: satu buffer byte power-of-2, paket dengan length prefix
//! - Latest Wins: producer tidak pernah menunggu, paket tertua di-evict
//! - Broadcast: setiap subscriber punya cursor sendiri
//! - C ABI: handle opaque untuk pemanggil non-Rust
//!
//! ```
//! use varcast::Channel;
//!
//! let channel = Channel::new(100); // dibulatkan ke 128
//! let publisher = channel.publisher();
//! let mut subscriber = channel.subscriber();
//!
//! publisher.publish(b"telemetry").unwrap();
//! assert_eq!(subscriber.try_read(), Some(&b"telemetry"[..]));
//! assert!(subscriber.try_read().is_none());
//! ```

pub mod channel;
pub mod core;
pub mod error;
pub mod ffi;

pub use channel::{Channel, ChannelConfig, Publisher, Subscriber};
pub use crate::core::{ChannelStats, Delivery, PacketRing};
pub use error::{ChannelError, HandleKind, Result};
