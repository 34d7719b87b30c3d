//! Frame validation and dispatch to the payload registry.
//!
//! ```text
//! offset  size  field
//! 0       4     marker 0xFFA00010
//! 4       4     receiver ip
//! 8       4     sender ip
//! 12      2     packet id (0 = no confirmation required)
//! 14      1     major version
//! 15      1     minor version
//! 16      2     payload size
//! 18      2     checksum (CRC-16/CCITT-FALSE with this field zeroed)
//! 20      ...   payload, first byte = type code
//! ```

use std::net::Ipv4Addr;

use transit_types::{frame_checksum, AckCode, Event, FrameHeader, PayloadType, FRAME_MARKER};

use crate::error::DecodeError;

use super::payload::{decode_payload, DecodeContext};
use super::reader::FieldReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    Success,
    Error,
}

/// Acknowledgment owed to the sending device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub to: Ipv4Addr,
    pub code: AckCode,
}

/// Outcome of decoding one datagram. Never an `Err`: a bad frame is a
/// value the ingestion loop logs and drops.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Set once the header was read, even when a later step failed.
    pub header: Option<FrameHeader>,
    pub payload: Option<Event>,
    pub status: DecodeStatus,
    pub error: Option<DecodeError>,
    pub ack: Option<Ack>,
}

impl DecodedFrame {
    fn failed(header: Option<FrameHeader>, error: DecodeError) -> Self {
        Self {
            header,
            payload: None,
            status: DecodeStatus::Error,
            error: Some(error),
            ack: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DecodeStatus::Success
    }
}

fn read_header(r: &mut FieldReader<'_>) -> Result<FrameHeader, DecodeError> {
    let marker = r.read_u32()?;
    if marker != FRAME_MARKER {
        return Err(DecodeError::InvalidMarker { found: marker });
    }
    Ok(FrameHeader {
        receiver: r.read_ipv4()?,
        sender: r.read_ipv4()?,
        packet_id: r.read_u16()?,
        major_version: r.read_byte()?,
        minor_version: r.read_byte()?,
        payload_size: r.read_u16()?,
        checksum: r.read_u16()?,
    })
}

pub fn decode_frame(data: &[u8], ctx: &DecodeContext<'_>) -> DecodedFrame {
    let mut r = FieldReader::new(data);
    let header = match read_header(&mut r) {
        Ok(header) => header,
        Err(e) => return DecodedFrame::failed(None, e),
    };

    let computed = frame_checksum(data);
    if computed != header.checksum {
        let e = DecodeError::ChecksumMismatch {
            carried: header.checksum,
            computed,
        };
        return DecodedFrame::failed(Some(header), e);
    }

    if header.payload_size == 0 {
        return DecodedFrame {
            header: Some(header),
            payload: None,
            status: DecodeStatus::Success,
            error: None,
            ack: None,
        };
    }

    // Route updates are confirmed whether or not they decode.
    let acked = r
        .rest()
        .first()
        .and_then(|&code| PayloadType::from_code(code))
        .is_some_and(PayloadType::is_acknowledged);
    let ack = |code| acked.then_some(Ack { to: header.sender, code });

    let decoded = r
        .take(header.payload_size as usize)
        .and_then(|payload| decode_payload(payload[0], &payload[1..], ctx));

    match decoded {
        Ok(event) => DecodedFrame {
            header: Some(header),
            payload: Some(event),
            status: DecodeStatus::Success,
            error: None,
            ack: ack(AckCode::Success),
        },
        Err(e) => DecodedFrame {
            ack: ack(AckCode::Failure),
            ..DecodedFrame::failed(Some(header), e)
        },
    }
}
