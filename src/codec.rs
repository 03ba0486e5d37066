//! Pinba wire format.
//!
//! Each datagram carries one protobuf (proto2) `Request` message. Only the
//! fields the collector aggregates are declared here; timer, tag and
//! dictionary fields are skipped by the decoder as unknown fields.

use prost::Message;
use thiserror::Error;

use crate::stats::RequestEvent;

/// Largest datagram the receiver will read; longer ones are truncated by the
/// transport and will then fail to decode.
pub const MAX_DATAGRAM_SIZE: usize = 65_536;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed request packet: {0}")]
    Malformed(#[from] prost::DecodeError),

    #[error("invalid `{field}` value: {value}")]
    InvalidMetric { field: &'static str, value: f32 },
}

/// `Pinba.Request` as sent by the PHP extension.
#[derive(Clone, PartialEq, Message)]
pub struct PinbaRequest {
    #[prost(string, required, tag = "1")]
    pub hostname: String,
    #[prost(string, required, tag = "2")]
    pub server_name: String,
    #[prost(string, required, tag = "3")]
    pub script_name: String,
    #[prost(uint32, required, tag = "4")]
    pub request_count: u32,
    #[prost(uint32, required, tag = "5")]
    pub document_size: u32,
    #[prost(uint32, required, tag = "6")]
    pub memory_peak: u32,
    #[prost(float, required, tag = "7")]
    pub request_time: f32,
    #[prost(float, required, tag = "8")]
    pub ru_utime: f32,
    #[prost(float, required, tag = "9")]
    pub ru_stime: f32,
}

/// Decode one datagram into a request event.
pub fn decode_request(buf: &[u8]) -> Result<RequestEvent, DecodeError> {
    let req = PinbaRequest::decode(buf)?;

    for (field, value) in [
        ("request_time", req.request_time),
        ("ru_utime", req.ru_utime),
        ("ru_stime", req.ru_stime),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(DecodeError::InvalidMetric { field, value });
        }
    }

    Ok(RequestEvent {
        hostname: req.hostname,
        server_name: req.server_name,
        script_name: req.script_name,
        request_time: f64::from(req.request_time),
        ru_utime: f64::from(req.ru_utime),
        ru_stime: f64::from(req.ru_stime),
        document_size: u64::from(req.document_size),
        memory_peak: u64::from(req.memory_peak),
    })
}

/// Encode an event the way a PHP instance would send it. Sizes above
/// `u32::MAX` are clamped.
pub fn encode_request(event: &RequestEvent) -> Vec<u8> {
    let req = PinbaRequest {
        hostname: event.hostname.clone(),
        server_name: event.server_name.clone(),
        script_name: event.script_name.clone(),
        request_count: 1,
        document_size: u32::try_from(event.document_size).unwrap_or(u32::MAX),
        memory_peak: u32::try_from(event.memory_peak).unwrap_or(u32::MAX),
        request_time: event.request_time as f32,
        ru_utime: event.ru_utime as f32,
        ru_stime: event.ru_stime as f32,
    };
    req.encode_to_vec()
}
