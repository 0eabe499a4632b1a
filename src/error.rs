//! Error types untuk varcast
//!
//! Hanya kegagalan argumen yang menjadi error. Timeout baca dan data yang
//! hilang karena eviction bukan error: timeout dikembalikan sebagai `None`,
//! kehilangan data hanya terlihat lewat statistik.

use thiserror::Error;

/// Jenis handle di foreign binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Channel,
    Publisher,
    Subscriber,
}

impl std::fmt::Display for HandleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HandleKind::Channel => "channel",
            HandleKind::Publisher => "publisher",
            HandleKind::Subscriber => "subscriber",
        };
        f.write_str(name)
    }
}

/// Errors that can occur on channel operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Payload plus its 4-byte length prefix can never fit in the ring
    #[error("packet too large: payload={payload} bytes, frame={} bytes, capacity={capacity} bytes", .payload.saturating_add(crate::core::FRAME_HEADER_LEN))]
    PacketTooLarge { payload: usize, capacity: usize },

    /// Ring storage of the rounded capacity could not be allocated
    #[error("capacity too large: cannot allocate {capacity} bytes")]
    CapacityTooLarge { capacity: usize },

    /// Absent payload pointer (foreign callers only)
    #[error("null payload pointer")]
    NullPointer,

    /// Handle was destroyed, never issued, or belongs to another kind
    #[error("invalid {kind} handle: {handle:#x}")]
    InvalidHandle { kind: HandleKind, handle: u64 },
}

impl ChannelError {
    /// Returns true if the caller passed something unusable.
    /// Buffer state is never changed by such a call.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            ChannelError::PacketTooLarge { .. }
                | ChannelError::CapacityTooLarge { .. }
                | ChannelError::NullPointer
        )
    }

    /// Returns true if the error comes from a stale or foreign handle
    pub fn is_invalid_handle(&self) -> bool {
        matches!(self, ChannelError::InvalidHandle { .. })
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
