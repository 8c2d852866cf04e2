use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use std::io;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

type BodyChunk = io::Result<Bytes>;

/// Inbound request handle as seen by the pipeline.
///
/// The body arrives through a channel fed by the transport with a
/// [`BodySender`]; dropping the sender signals end-of-body.
#[derive(Debug)]
pub struct IncomingRequest {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<BodyChunk>>>,
}

impl IncomingRequest {
    pub fn new(method: Method, uri: impl Into<String>, headers: HeaderMap) -> (Self, BodySender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let request = Self {
            method,
            uri: uri.into(),
            headers,
            body: tokio::sync::Mutex::new(Some(rx)),
        };
        (request, BodySender { tx })
    }

    /// A request whose body is already complete (and empty).
    pub fn without_body(method: Method, uri: impl Into<String>) -> Self {
        let (request, _) = Self::new(method, uri, HeaderMap::new());
        request
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Next body chunk; `None` once the body ended or was already consumed.
    pub async fn next_chunk(&self) -> Option<BodyChunk> {
        let mut body = self.body.lock().await;
        let receiver = body.as_mut()?;
        match receiver.recv().await {
            Some(chunk) => Some(chunk),
            None => {
                body.take();
                None
            }
        }
    }
}

/// Transport side of a request body.
#[derive(Debug)]
pub struct BodySender {
    tx: mpsc::UnboundedSender<BodyChunk>,
}

impl BodySender {
    /// Returns `false` when the request side is gone.
    pub fn push(&self, chunk: impl Into<Bytes>) -> bool {
        self.tx.send(Ok(chunk.into())).is_ok()
    }

    pub fn fail(self, error: io::Error) {
        let _ = self.tx.send(Err(error));
    }

    /// End-of-body.
    pub fn finish(self) {}
}

/// Per-request buffer the body chunks are collected into, in arrival order.
#[derive(Debug, Default)]
pub struct BodyBuffer {
    chunks: Mutex<Vec<Bytes>>,
}

impl BodyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the total buffered size.
    pub fn push(&self, chunk: Bytes) -> usize {
        let mut chunks = self.chunks.lock().unwrap_or_else(PoisonError::into_inner);
        chunks.push(chunk);
        chunks.iter().map(Bytes::len).sum()
    }

    pub fn chunks(&self) -> Vec<Bytes> {
        self.chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_bytes(&self) -> Bytes {
        let chunks = self.chunks.lock().unwrap_or_else(PoisonError::into_inner);
        Bytes::from(chunks.concat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn chunks_arrive_in_order_then_end() {
        let (request, body) = IncomingRequest::new(Method::PUT, "/items/1", HeaderMap::new());
        body.push("a");
        body.push("b");
        body.finish();

        assert_eq!(request.next_chunk().await.unwrap().unwrap(), "a");
        assert_eq!(request.next_chunk().await.unwrap().unwrap(), "b");
        assert!(request.next_chunk().await.is_none());
        assert!(request.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn transport_errors_are_delivered() {
        let (request, body) = IncomingRequest::new(Method::POST, "/", HeaderMap::new());
        body.fail(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        let chunk = request.next_chunk().await.unwrap();
        assert_eq!(chunk.unwrap_err().kind(), io::ErrorKind::ConnectionReset);
    }

    #[test]
    fn buffer_tracks_total_size() {
        let buffer = BodyBuffer::new();
        assert_eq!(buffer.push(Bytes::from_static(b"ab")), 2);
        assert_eq!(buffer.push(Bytes::from_static(b"cde")), 5);
        assert_eq!(buffer.to_bytes(), "abcde");
    }
}
