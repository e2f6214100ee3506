//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Request Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Verb (1) │ Len (4)  │     Body (JSON / NDJSON)    │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Frame (server → client) Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Event (1) │ Len (4)  │           Body              │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! Lengths are big-endian and never exceed [`MAX_PAYLOAD_SIZE`].

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{MpdbError, Result};

use super::{CommandType, Event, Frame, Request, Response};

/// Header size: 1 byte verb/event + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum body size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a request to bytes
pub fn encode_request(request: &Request) -> Bytes {
    encode(request.kind as u8, &request.body)
}

/// Decode a request from bytes
pub fn decode_request(bytes: &[u8]) -> Result<Request> {
    let (tag, body) = split_frame(bytes)?;
    let kind = CommandType::from_byte(tag)
        .ok_or_else(|| MpdbError::Protocol(format!("Unknown command type: 0x{:02x}", tag)))?;
    Ok(Request {
        kind,
        body: Bytes::copy_from_slice(body),
    })
}

// =============================================================================
// Frame Encoding/Decoding
// =============================================================================

/// Encode an outbound frame to bytes
pub fn encode_frame(frame: &Frame) -> Result<Bytes> {
    let event = frame.event() as u8;
    Ok(match frame {
        Frame::Response(response) => encode(event, &serde_json::to_vec(response)?),
        Frame::Export(buffer) => encode(event, buffer),
        Frame::Shutdown => encode(event, &[]),
    })
}

/// Decode an outbound frame from bytes
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    let (tag, body) = split_frame(bytes)?;
    match tag {
        t if t == Event::Response as u8 => {
            let response: Response = serde_json::from_slice(body)?;
            Ok(Frame::Response(response))
        }
        t if t == Event::Export as u8 => Ok(Frame::Export(Bytes::copy_from_slice(body))),
        t if t == Event::Shutdown as u8 => {
            if !body.is_empty() {
                return Err(MpdbError::Protocol(format!(
                    "Shutdown frame: unexpected body of {} bytes",
                    body.len()
                )));
            }
            Ok(Frame::Shutdown)
        }
        _ => Err(MpdbError::Protocol(format!("Unknown event type: 0x{:02x}", tag))),
    }
}

fn encode(tag: u8, body: &[u8]) -> Bytes {
    let mut message = BytesMut::with_capacity(HEADER_SIZE + body.len());
    message.put_u8(tag);
    message.put_u32(body.len() as u32);
    message.put_slice(body);
    message.freeze()
}

/// Validate the header and return the tag and the body slice
fn split_frame(bytes: &[u8]) -> Result<(u8, &[u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(MpdbError::Protocol(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let body_len = body_length(&bytes[..HEADER_SIZE])?;
    let total_len = HEADER_SIZE + body_len;
    if bytes.len() < total_len {
        return Err(MpdbError::Protocol(format!(
            "Incomplete body: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }

    Ok((bytes[0], &bytes[HEADER_SIZE..total_len]))
}

fn body_length(header: &[u8]) -> Result<usize> {
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    if len > MAX_PAYLOAD_SIZE {
        return Err(MpdbError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok(len as usize)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one raw frame (header + body) from a stream
///
/// Blocks until a complete frame is received or an error occurs
fn read_raw<R: Read>(reader: &mut R) -> Result<BytesMut> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;
    let body_len = body_length(&header)?;

    let mut message = BytesMut::zeroed(HEADER_SIZE + body_len);
    message[..HEADER_SIZE].copy_from_slice(&header);
    if body_len > 0 {
        reader.read_exact(&mut message[HEADER_SIZE..])?;
    }
    Ok(message)
}

/// Read a complete request from a stream
pub fn read_request<R: Read>(reader: &mut R) -> Result<Request> {
    let message = read_raw(reader)?;
    decode_request(&message)
}

/// Write a request to a stream
pub fn write_request<W: Write>(writer: &mut W, request: &Request) -> Result<()> {
    writer.write_all(&encode_request(request))?;
    writer.flush()?;
    Ok(())
}

/// Read a complete frame from a stream
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame> {
    let message = read_raw(reader)?;
    decode_frame(&message)
}

/// Write a frame to a stream
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<()> {
    writer.write_all(&encode_frame(frame)?)?;
    writer.flush()?;
    Ok(())
}
