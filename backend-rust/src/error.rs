use thiserror::Error;

/// Per-packet decode failures. None of these ever stops the ingestion loop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid frame marker {found:#010x}")]
    InvalidMarker { found: u32 },

    #[error("checksum mismatch: frame carries {carried:#06x}, computed {computed:#06x}")]
    ChecksumMismatch { carried: u16, computed: u16 },

    /// Completes the taxonomy only: the 2-byte wire field cannot hold an id
    /// above 65535, so the decoder never builds this. The frame encoder
    /// reports it as `EncodeError::InvalidPacketId`.
    #[error("incorrect packet id {0}")]
    InvalidPacketId(u32),

    #[error("truncated data: need {needed} bytes at offset {offset}, {remaining} left")]
    TruncatedData {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("string field at offset {offset} is not valid UTF-8")]
    InvalidEncoding { offset: usize },

    #[error("unknown payload type {0:#04x}")]
    UnknownPacketType(u8),
}

impl DecodeError {
    /// Partial captures and unsupported firmware produce these all day long.
    pub fn is_noise(&self) -> bool {
        matches!(self, Self::ChecksumMismatch { .. } | Self::UnknownPacketType(_))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HubError {
    #[error("timed out waiting for a reply")]
    TimeoutWaitingForReply,

    #[error("push channel closed")]
    ChannelClosed,

    #[error("push channel outbox full")]
    ChannelFull,

    #[error("failed to encode push message: {0}")]
    Encode(String),
}
