//! Frame and payload encoder: the device side of the protocol.
//!
//! The server never encodes frames; the simulator and the decoder tests do.

use std::net::Ipv4Addr;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::{
    frame_checksum, AuxiliaryTelemetry, DeviceRecord, PayloadType, RouteUpdateRecord, Telemetry,
    CHECKSUM_OFFSET, FRAME_MARKER, HEADER_LEN,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("packet id {0} outside 0..=65535")]
    InvalidPacketId(u32),
    #[error("payload of {0} bytes does not fit the 16-bit size field")]
    PayloadTooLarge(usize),
    #[error("string of {0} bytes does not fit the 16-bit length prefix")]
    StringTooLong(usize),
    #[error("{0} records do not fit the 8-bit count field")]
    TooManyRecords(usize),
}

// ── Frame builder ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct FrameBuilder {
    receiver: Ipv4Addr,
    sender: Ipv4Addr,
    packet_id: u16,
    major_version: u8,
    minor_version: u8,
}

impl FrameBuilder {
    pub fn new(receiver: Ipv4Addr, sender: Ipv4Addr) -> Self {
        Self {
            receiver,
            sender,
            packet_id: 0,
            major_version: 1,
            minor_version: 0,
        }
    }

    pub fn packet_id(mut self, id: u32) -> Result<Self, EncodeError> {
        self.packet_id = u16::try_from(id).map_err(|_| EncodeError::InvalidPacketId(id))?;
        Ok(self)
    }

    pub fn version(mut self, major: u8, minor: u8) -> Self {
        self.major_version = major;
        self.minor_version = minor;
        self
    }

    /// Header + payload with the checksum filled in.
    pub fn build(&self, payload: &[u8]) -> Result<Bytes, EncodeError> {
        let size =
            u16::try_from(payload.len()).map_err(|_| EncodeError::PayloadTooLarge(payload.len()))?;

        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
        buf.put_u32(FRAME_MARKER);
        buf.put_slice(&self.receiver.octets());
        buf.put_slice(&self.sender.octets());
        buf.put_u16(self.packet_id);
        buf.put_u8(self.major_version);
        buf.put_u8(self.minor_version);
        buf.put_u16(size);
        buf.put_u16(0);
        buf.put_slice(payload);

        let crc = frame_checksum(&buf);
        buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&crc.to_be_bytes());
        Ok(buf.freeze())
    }
}

// ── Payload writer ────────────────────────────────────────────────────────────

/// Big-endian field writer mirroring the server's field reader.
pub struct PayloadWriter {
    buf: BytesMut,
}

impl PayloadWriter {
    /// Starts a payload with its type code.
    pub fn new(payload_type: PayloadType) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(payload_type.code());
        Self { buf }
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.put_u8(v);
        self
    }

    pub fn i8(&mut self, v: i8) -> &mut Self {
        self.buf.put_i8(v);
        self
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.buf.put_i32(v);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.put_u32(v);
        self
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.buf.put_f32(v);
        self
    }

    pub fn count(&mut self, n: usize) -> Result<&mut Self, EncodeError> {
        let n = u8::try_from(n).map_err(|_| EncodeError::TooManyRecords(n))?;
        Ok(self.u8(n))
    }

    pub fn str(&mut self, s: &str) -> Result<&mut Self, EncodeError> {
        let len = u16::try_from(s.len()).map_err(|_| EncodeError::StringTooLong(s.len()))?;
        self.buf.put_u16(len);
        self.buf.put_slice(s.as_bytes());
        Ok(self)
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

// ── Typed payload encoders ────────────────────────────────────────────────────

/// Resolved station indices are server-side only and are not encoded.
pub fn encode_telemetry(t: &Telemetry) -> Result<Bytes, EncodeError> {
    let mut w = PayloadWriter::new(PayloadType::Telemetry);
    w.str(&t.time)?
        .f32(t.latitude)
        .f32(t.longitude)
        .i8(t.speed)
        .u8(t.mode)
        .i32(t.next_station_id)
        .i32(t.next_station_distance)
        .u8(t.next_station_side)
        .i8(t.next_station_path_num)
        .u8(t.door_state);
    Ok(w.finish())
}

pub fn encode_auxiliary(aux: &AuxiliaryTelemetry) -> Result<Bytes, EncodeError> {
    let mut w = PayloadWriter::new(PayloadType::AuxiliaryTelemetry);
    w.i8(aux.outside_temp).count(aux.records.len())?;
    for r in &aux.records {
        w.i8(r.id).i8(r.train).i8(r.temp).i8(r.passengers);
    }
    Ok(w.finish())
}

pub fn encode_route_update(route: &RouteUpdateRecord) -> Result<Bytes, EncodeError> {
    let mut w = PayloadWriter::new(PayloadType::RouteUpdate);
    w.str(&route.train_number)?
        .str(&route.head_sign)?
        .i8(route.route_number)
        .count(route.stops.len())?;
    for stop in &route.stops {
        w.i32(stop.station_id)
            .str(&stop.name)?
            .u32(stop.arrive)
            .u32(stop.depart);
    }
    Ok(w.finish())
}

pub fn encode_device_configuration(devices: &[DeviceRecord]) -> Result<Bytes, EncodeError> {
    let mut w = PayloadWriter::new(PayloadType::DeviceConfiguration);
    w.count(devices.len())?;
    for d in devices {
        w.u32(d.raw_id).u8(d.direction);
    }
    Ok(w.finish())
}
