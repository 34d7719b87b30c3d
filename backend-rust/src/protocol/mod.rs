//! Binary telemetry protocol: frame validation and payload decoding.

pub mod device_config;
pub mod frame;
pub mod payload;
pub mod reader;
pub mod route;

pub use frame::{decode_frame, Ack, DecodeStatus, DecodedFrame};
pub use payload::{decode_payload, DecodeContext};
pub use reader::FieldReader;
