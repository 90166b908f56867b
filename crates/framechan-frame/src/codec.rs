use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Length field size. The field counts itself.
pub const HEADER_SIZE: usize = 4;

/// Receive buffer capacity.
pub const BUFFER_CAPACITY: usize = 4096;

/// Largest payload a receiver accepts: 4092 bytes.
pub const MAX_PAYLOAD: usize = BUFFER_CAPACITY - HEADER_SIZE;

/// Largest payload whose length field still fits in a `u32`.
pub const MAX_ENCODABLE_PAYLOAD: usize = u32::MAX as usize - HEADER_SIZE;

/// Encode the length field for a payload of `payload_len` bytes.
///
/// Wire format:
/// ```text
/// ┌────────────────────────────┬──────────────────────────┐
/// │ Length (4B LE)             │ Payload                  │
/// │ = payload length + 4       │ (Length - 4 bytes)       │
/// └────────────────────────────┴──────────────────────────┘
/// ```
pub fn encode_header(payload_len: usize) -> Result<[u8; HEADER_SIZE]> {
    if payload_len > MAX_ENCODABLE_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: MAX_ENCODABLE_PAYLOAD,
        });
    }
    Ok(((payload_len + HEADER_SIZE) as u32).to_le_bytes())
}

/// Decode a length field into the payload length that follows it.
pub fn decode_header(header: [u8; HEADER_SIZE], max_payload: usize) -> Result<usize> {
    let total = u32::from_le_bytes(header);
    let payload_len = (total as usize)
        .checked_sub(HEADER_SIZE)
        .ok_or(FrameError::MalformedLength { total })?;
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }
    Ok(payload_len)
}

/// Append one encoded frame to `dst`.
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let header = encode_header(payload.len())?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&header);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one frame from an accumulating buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&src[..HEADER_SIZE]);
    let payload_len = decode_header(header, max_payload)?;

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(payload_len).freeze()))
}
