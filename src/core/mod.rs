//! Core module: Variable-Length Packet Ring Buffer
//!
//! Prinsip desain:
//! - Power-of-2 capacity: posisi diubah ke offset storage dengan bitmask
//! - Unbounded counters: posisi tidak pernah di-wrap, hanya di-mask saat akses
//! - Lossy: producer tidak pernah menunggu, paket lama di-evict
//! - Satu lock per ring, pembaca menunggu lewat condition variable

mod framing;
mod ring_buffer;
mod stats;

pub use framing::{round_capacity, FRAME_HEADER_LEN};
pub use ring_buffer::{Delivery, PacketRing};
pub use stats::ChannelStats;
