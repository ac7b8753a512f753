//! Frame decoding.
//!
//! Feeds may interleave plain text frames with binary-compressed frames on the
//! same stream. Binary frames are sniffed by header and inflated before JSON
//! parsing. A frame that cannot be inflated or parsed yields `WsError::Decode`;
//! the adapter reports it and moves on.

use crate::error::{WsError, WsResult};
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use std::io::Read;

/// Upper bound for an inflated frame.
const MAX_INFLATED_BYTES: u64 = 16 * 1024 * 1024;

/// Detected encoding of a binary frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEncoding {
    Gzip,
    Zlib,
    /// Uncompressed JSON sent as a binary frame.
    Plain,
    /// No recognizable header; attempted as raw deflate.
    Deflate,
}

impl FrameEncoding {
    pub fn detect(data: &[u8]) -> Self {
        if data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b {
            return Self::Gzip;
        }
        // RFC 1950: CM=8 in the low nibble and header checksum divisible by 31.
        if data.len() >= 2
            && (data[0] & 0x0f) == 0x08
            && (u16::from(data[0]) << 8 | u16::from(data[1])) % 31 == 0
        {
            return Self::Zlib;
        }
        match data.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') | Some(b'[') => Self::Plain,
            _ => Self::Deflate,
        }
    }
}

/// Parse a text frame.
pub fn decode_text(text: &str) -> WsResult<serde_json::Value> {
    serde_json::from_str(text).map_err(|e| WsError::Decode(format!("invalid JSON text frame: {e}")))
}

/// Inflate (if needed) and parse a binary frame.
pub fn decode_binary(data: &[u8]) -> WsResult<serde_json::Value> {
    let encoding = FrameEncoding::detect(data);
    let bytes = match encoding {
        FrameEncoding::Plain => {
            // A raw deflate stream can start with '{' or '['.
            return parse_bytes(data, encoding).or_else(|plain_err| {
                inflate(DeflateDecoder::new(data), FrameEncoding::Deflate)
                    .and_then(|bytes| parse_bytes(&bytes, FrameEncoding::Deflate))
                    .map_err(|_| plain_err)
            });
        }
        FrameEncoding::Gzip => inflate(GzDecoder::new(data), encoding)?,
        FrameEncoding::Zlib => inflate(ZlibDecoder::new(data), encoding)?,
        FrameEncoding::Deflate => inflate(DeflateDecoder::new(data), encoding)?,
    };
    parse_bytes(&bytes, encoding)
}

fn inflate<R: Read>(reader: R, encoding: FrameEncoding) -> WsResult<Vec<u8>> {
    let mut out = Vec::new();
    reader
        .take(MAX_INFLATED_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| WsError::Decode(format!("{encoding:?} inflate failed: {e}")))?;
    Ok(out)
}

fn parse_bytes(bytes: &[u8], encoding: FrameEncoding) -> WsResult<serde_json::Value> {
    serde_json::from_slice(bytes)
        .map_err(|e| WsError::Decode(format!("invalid JSON in {encoding:?} frame: {e}")))
}
