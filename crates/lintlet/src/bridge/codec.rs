//! Framed codec for controller/worker communication.
//!
//! Uses LengthDelimitedCodec for framing + serde_json for serialization.
//! Works over any AsyncRead/AsyncWrite (in-memory pipes, child stdio, sockets).
//!
//! A frame that arrives intact but does not parse as `T` is yielded as
//! `Err(MalformedFrame)` instead of failing the stream, so one unreadable
//! message only costs the call it belonged to.

use std::io;
use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Default upper bound on a single frame body.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
#[error("malformed frame ({len} bytes): {source}")]
pub struct MalformedFrame {
    pub len: usize,
    #[source]
    pub source: serde_json::Error,
}

/// An outgoing message that would exceed the frame limit. Nothing is written,
/// so the stream stays usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("frame of {len} bytes exceeds the {max} byte limit")]
pub struct FrameTooLarge {
    pub len: usize,
    pub max: usize,
}

impl FrameTooLarge {
    /// Recover the rejection from the `io::Error` a sink reports.
    pub fn from_io(err: &io::Error) -> Option<&Self> {
        err.get_ref().and_then(|inner| inner.downcast_ref::<Self>())
    }
}

/// Codec that frames messages with length prefix and serializes with JSON.
pub struct JsonCodec<T> {
    inner: LengthDelimitedCodec,
    max_frame_len: usize,
    _phantom: PhantomData<T>,
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .length_field_length(4)
                .max_frame_length(max_frame_len)
                .new_codec(),
            max_frame_len,
            _phantom: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Decoder for JsonCodec<T> {
    type Item = Result<T, MalformedFrame>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(bytes) => {
                let item = serde_json::from_slice(&bytes).map_err(|source| MalformedFrame {
                    len: bytes.len(),
                    source,
                });
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}

impl<T: Serialize> Encoder<T> for JsonCodec<T> {
    type Error = io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json =
            serde_json::to_vec(&item).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let json_len = json.len();
        tracing::trace!(json_size_bytes = json_len, "Encoding frame");
        if json_len > 100_000 {
            tracing::info!(
                json_size_bytes = json_len,
                json_size_kb = json_len / 1024,
                "Large frame being encoded"
            );
        }
        if json_len > self.max_frame_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                FrameTooLarge {
                    len: json_len,
                    max: self.max_frame_len,
                },
            ));
        }
        self.inner.encode(Bytes::from(json), dst)
    }
}
