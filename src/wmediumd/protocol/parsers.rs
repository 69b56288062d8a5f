use crate::error::ProtocolError;

use super::constants::*;
use super::types::{StationId, UpdateStatus, response_len, response_type_for};

/// Decoded response to one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub tag: u8,
    pub status: UpdateStatus,
    /// Index assigned by an add request.
    pub station_id: Option<StationId>,
}

#[inline]
pub fn get_message_type(buf: &[u8]) -> Option<u8> {
    buf.first().copied()
}

/// Decode `buf` as the response to the encoded `request`.
///
/// The response must carry the matching response tag and echo the request
/// byte for byte; anything else means the stream is out of step.
pub fn parse_response(request: &[u8], buf: &[u8]) -> Result<Response, ProtocolError> {
    let request_tag = get_message_type(request).ok_or(ProtocolError::EchoMismatch { tag: 0 })?;
    let expected = response_type_for(request_tag).ok_or(ProtocolError::UnexpectedResponseType { expected: 0, got: request_tag })?;
    let got = get_message_type(buf).ok_or(ProtocolError::UnexpectedResponseType { expected, got: 0 })?;
    if got != expected {
        return Err(ProtocolError::UnexpectedResponseType { expected, got });
    }
    if buf.len() != response_len(request_tag, request.len()) {
        return Err(ProtocolError::EchoMismatch { tag: got });
    }
    let echo_end = TAG_LEN + request.len();
    if &buf[TAG_LEN..echo_end] != request {
        return Err(ProtocolError::EchoMismatch { tag: got });
    }
    let station_id = if request_tag == WSERVER_ADD_REQUEST_TYPE {
        let b = &buf[echo_end..echo_end + INT_LEN];
        Some(StationId(i32::from_be_bytes([b[0], b[1], b[2], b[3]])))
    } else {
        None
    };
    Ok(Response {
        tag: got,
        status: UpdateStatus::from(buf[buf.len() - STATUS_LEN]),
        station_id,
    })
}
