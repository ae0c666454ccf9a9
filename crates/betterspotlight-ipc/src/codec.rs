//! Frame codec: `u32` big-endian length followed by a UTF-8 JSON object.

use betterspotlight_domain::constants::ipc::MAX_MESSAGE_SIZE;
use betterspotlight_domain::{Error, Result};
use serde_json::Value;

/// A decoded message and how many buffer bytes it consumed.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub message: Value,
    pub bytes_consumed: usize,
}

/// Encode a JSON object into a length-prefixed frame.
///
/// # Errors
///
/// Returns a codec error when the value is not an object or the encoded
/// payload exceeds the 16 MiB cap.
pub fn encode(message: &Value) -> Result<Vec<u8>> {
    if !message.is_object() {
        return Err(Error::codec("IPC messages must be JSON objects"));
    }
    let payload = serde_json::to_vec(message)?;
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(Error::codec(format!(
            "message of {} bytes exceeds {} byte cap",
            payload.len(),
            MAX_MESSAGE_SIZE
        )));
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode exactly one message from the front of `buffer`.
///
/// Returns `Ok(None)` when the buffer does not yet hold a complete frame.
/// An oversized length header is rejected before any payload allocation.
///
/// # Errors
///
/// Returns a codec error for an oversized header or an invalid payload.
pub fn decode(buffer: &[u8]) -> Result<Option<Decoded>> {
    if buffer.len() < 4 {
        return Ok(None);
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&buffer[..4]);
    let length = u32::from_be_bytes(len_bytes) as usize;

    if length > MAX_MESSAGE_SIZE {
        return Err(Error::codec(format!(
            "length header {length} exceeds {MAX_MESSAGE_SIZE} byte cap"
        )));
    }
    if buffer.len() < 4 + length {
        return Ok(None);
    }

    let payload = &buffer[4..4 + length];
    let message: Value = serde_json::from_slice(payload)
        .map_err(|e| Error::codec(format!("invalid JSON payload: {e}")))?;
    if !message.is_object() {
        return Err(Error::codec("decoded payload is not a JSON object"));
    }

    Ok(Some(Decoded {
        message,
        bytes_consumed: 4 + length,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trip_reports_bytes_consumed() {
        let msg = json!({"type": "request", "id": 7, "method": "ping"});
        let frame = encode(&msg).unwrap();
        let decoded = decode(&frame).unwrap().unwrap();
        assert_eq!(decoded.message, msg);
        assert_eq!(decoded.bytes_consumed, frame.len());
    }

    #[test]
    fn partial_frame_is_not_an_error() {
        let frame = encode(&json!({"type": "notification", "method": "x"})).unwrap();
        assert!(decode(&frame[..3]).unwrap().is_none());
        assert!(decode(&frame[..frame.len() - 1]).unwrap().is_none());
    }

    #[test]
    fn concatenated_frames_decode_one_at_a_time() {
        let a = json!({"type": "request", "id": 1, "method": "a"});
        let b = json!({"type": "request", "id": 2, "method": "b"});
        let mut buf = encode(&a).unwrap();
        let frame_a_len = buf.len();
        buf.extend_from_slice(&encode(&b).unwrap());

        let first = decode(&buf).unwrap().unwrap();
        assert_eq!(first.message, a);
        assert_eq!(first.bytes_consumed, frame_a_len);

        let second = decode(&buf[first.bytes_consumed..]).unwrap().unwrap();
        assert_eq!(second.message, b);
    }

    #[test]
    fn oversized_header_rejected_without_allocation() {
        let mut buf = ((MAX_MESSAGE_SIZE + 1) as u32).to_be_bytes().to_vec();
        buf.extend_from_slice(b"anything");
        assert!(decode(&buf).is_err());
    }
}
