// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Connect streaming envelopes.
//!
//! Each envelope is a flags byte, a big-endian `u32` payload length and the
//! payload. See <https://connectrpc.com/docs/protocol/#streaming-rpcs>.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::CrpcError;

/// Content type of streaming calls with protobuf payloads.
pub const APPLICATION_CONNECT_PROTO: &str = "application/connect+proto";
/// The payload is compressed.
pub const FLAG_COMPRESSED: u8 = 0b01;
/// The envelope is the end-of-stream message.
pub const FLAG_END_STREAM: u8 = 0b10;
/// Size of the envelope prefix.
pub const PREFIX_LEN: usize = 5;
/// Default cap on a single envelope payload.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 4 * 1024 * 1024;

/// Envelope decoding errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The announced payload exceeds the configured maximum.
    #[error("envelope payload of {0} bytes exceeds limit of {1} bytes")]
    TooLarge(usize, usize),
    /// Compression was not negotiated.
    #[error("compressed envelopes are not supported")]
    Compressed,
    /// The stream ended inside an envelope.
    #[error("stream ended with {0} bytes of an incomplete envelope")]
    Truncated(usize),
    /// The end-of-stream payload is not valid JSON.
    #[error("malformed end-of-stream message: {0}")]
    MalformedEndStream(String),
}

/// A single framed stream element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Envelope flags.
    pub flags: u8,
    /// Raw payload.
    pub payload: Bytes,
}

impl Envelope {
    /// Wraps an encoded message.
    pub fn message(payload: impl Into<Bytes>) -> Self {
        Self {
            flags: 0,
            payload: payload.into(),
        }
    }

    /// Builds the end-of-stream envelope, optionally carrying an error.
    pub fn end_stream(error: Option<CrpcError>) -> Self {
        let payload = serde_json::to_vec(&EndStreamMessage { error }).unwrap_or_else(|_| {
            br#"{"error":{"code":"internal","message":"failed to serialize error"}}"#.to_vec()
        });
        Self {
            flags: FLAG_END_STREAM,
            payload: payload.into(),
        }
    }

    /// Returns true for the end-of-stream envelope.
    pub fn is_end_stream(&self) -> bool {
        self.flags & FLAG_END_STREAM != 0
    }

    /// Parses the JSON payload of an end-of-stream envelope.
    pub fn end_stream_message(&self) -> Result<EndStreamMessage, EnvelopeError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| EnvelopeError::MalformedEndStream(e.to_string()))
    }

    /// Serializes prefix and payload.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PREFIX_LEN + self.payload.len());
        buf.put_u8(self.flags);
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// Payload of the end-of-stream envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndStreamMessage {
    /// Set if the stream terminated with an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CrpcError>,
}

/// Incremental decoder for a chunked stream of envelopes.
#[derive(Debug)]
pub struct EnvelopeDecoder {
    buf: BytesMut,
    max_payload_len: usize,
}

impl Default for EnvelopeDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_LEN)
    }
}

impl EnvelopeDecoder {
    /// Creates a decoder that rejects payloads above `max_payload_len`.
    pub fn new(max_payload_len: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_payload_len,
        }
    }

    /// Appends received bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Returns the next complete envelope, or `None` if more bytes are needed.
    pub fn next_envelope(&mut self) -> Result<Option<Envelope>, EnvelopeError> {
        if self.buf.len() < PREFIX_LEN {
            return Ok(None);
        }
        let flags = self.buf[0];
        let len = u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]) as usize;
        if flags & FLAG_COMPRESSED != 0 {
            return Err(EnvelopeError::Compressed);
        }
        if len > self.max_payload_len {
            return Err(EnvelopeError::TooLarge(len, self.max_payload_len));
        }
        if self.buf.len() < PREFIX_LEN + len {
            return Ok(None);
        }
        self.buf.advance(PREFIX_LEN);
        let payload = self.buf.split_to(len).freeze();
        Ok(Some(Envelope { flags, payload }))
    }

    /// Fails if buffered bytes do not form a complete envelope. Call once the
    /// underlying stream has ended.
    pub fn finish(&self) -> Result<(), EnvelopeError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(EnvelopeError::Truncated(self.buf.len()))
        }
    }
}

/// Decodes a buffer that holds exactly one envelope, as sent by clients of
/// server streaming calls.
pub fn decode_single(bytes: &[u8], max_payload_len: usize) -> Result<Envelope, EnvelopeError> {
    let mut decoder = EnvelopeDecoder::new(max_payload_len);
    decoder.push(bytes);
    let envelope = decoder
        .next_envelope()?
        .ok_or(EnvelopeError::Truncated(bytes.len()))?;
    decoder.finish()?;
    Ok(envelope)
}
