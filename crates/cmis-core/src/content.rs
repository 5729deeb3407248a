use std::fmt;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

use crate::error::{CmisError, Result};

/// Chunked document content.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Document content: a byte stream with its declared MIME type and length.
///
/// Downloaded bodies are handed out as a stream; nothing in the client
/// buffers them unless the caller asks for `into_bytes`.
pub struct ContentStream {
    filename: Option<String>,
    mime_type: String,
    length: Option<u64>,
    body: ByteStream,
}

impl ContentStream {
    pub fn new(
        filename: Option<String>,
        mime_type: impl Into<String>,
        length: Option<u64>,
        body: ByteStream,
    ) -> Self {
        Self {
            filename,
            mime_type: mime_type.into(),
            length,
            body,
        }
    }

    /// Content held fully in memory, e.g. for uploads of generated data.
    pub fn from_bytes(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data: Bytes = data.into();
        Self {
            filename: Some(filename.into()),
            mime_type: mime_type.into(),
            length: Some(data.len() as u64),
            body: Box::pin(futures::stream::once(async move { Ok::<_, CmisError>(data) })),
        }
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Replace the file name, keeping the body.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn into_body(self) -> ByteStream {
        self.body
    }

    /// Drain the body into memory.
    ///
    /// Fails with `Protocol` when the received size contradicts the declared length.
    pub async fn into_bytes(self) -> Result<Bytes> {
        let declared = self.length;
        let mut body = self.body;
        let mut buf = BytesMut::with_capacity(declared.unwrap_or(0).min(16 * 1024 * 1024) as usize);
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }

        if let Some(expected) = declared {
            if buf.len() as u64 != expected {
                return Err(CmisError::Protocol(format!(
                    "content length mismatch: declared {} bytes, received {}",
                    expected,
                    buf.len()
                )));
            }
        }

        Ok(buf.freeze())
    }
}

impl fmt::Debug for ContentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentStream")
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}
