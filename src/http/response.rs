use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::sync::{Mutex, PoisonError};
use strum_macros::{AsRefStr, Display};
use thiserror::Error;
use tokio::sync::broadcast;

/// Terminal notifications of a response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ResponseEvent {
    /// The response was fully written.
    Finish,
    /// The connection went away before the response ended.
    Close,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResponseError {
    #[error("Response already finished")]
    AlreadyFinished,

    #[error("Connection closed before the response finished")]
    Closed,
}

#[derive(Debug, Default)]
struct ResponseState {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<Bytes>,
    finished: bool,
    closed: bool,
}

/// Response-writing handle shared between the transport and the pipeline.
///
/// The pipeline writes the head, the body, then ends the response; the
/// transport drains the result and calls [`ServerResponse::close`] when the
/// connection drops early. Both outcomes are broadcast as [`ResponseEvent`]s.
#[derive(Debug)]
pub struct ServerResponse {
    state: Mutex<ResponseState>,
    events: broadcast::Sender<ResponseEvent>,
}

impl Default for ServerResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerResponse {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(4);
        Self {
            state: Mutex::new(ResponseState::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResponseEvent> {
        self.events.subscribe()
    }

    fn writable(state: &ResponseState) -> Result<(), ResponseError> {
        if state.closed {
            return Err(ResponseError::Closed);
        }
        if state.finished {
            return Err(ResponseError::AlreadyFinished);
        }
        Ok(())
    }

    pub fn write_head(
        &self,
        status: StatusCode,
        headers: &[(HeaderName, HeaderValue)],
    ) -> Result<(), ResponseError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Self::writable(&state)?;
        state.status = Some(status);
        for (name, value) in headers {
            state.headers.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    pub fn write(&self, chunk: impl Into<Bytes>) -> Result<(), ResponseError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Self::writable(&state)?;
        state.body.push(chunk.into());
        Ok(())
    }

    /// Finish the response and notify listeners with [`ResponseEvent::Finish`].
    pub fn end(&self) -> Result<(), ResponseError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            Self::writable(&state)?;
            state.finished = true;
        }
        let _ = self.events.send(ResponseEvent::Finish);
        Ok(())
    }

    /// Transport-side: the connection was terminated.
    pub fn close(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.closed {
                return;
            }
            state.closed = true;
        }
        let _ = self.events.send(ResponseEvent::Close);
    }

    /// Status written so far, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    pub fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .headers
            .get(name)
            .cloned()
    }

    pub fn body(&self) -> Bytes {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Bytes::from(state.body.concat())
    }

    pub fn is_finished(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finished
    }

    pub fn is_closed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::CONTENT_TYPE;

    #[tokio::test]
    async fn end_broadcasts_finish_once() {
        let response = ServerResponse::new();
        let mut events = response.subscribe();

        response
            .write_head(
                StatusCode::OK,
                &[(CONTENT_TYPE, HeaderValue::from_static("text/html"))],
            )
            .unwrap();
        response.write("hello").unwrap();
        response.end().unwrap();

        assert_eq!(events.recv().await.unwrap(), ResponseEvent::Finish);
        assert_eq!(response.body(), "hello");
        assert_eq!(response.end(), Err(ResponseError::AlreadyFinished));
    }

    #[test]
    fn closed_connection_rejects_writes() {
        let response = ServerResponse::new();
        response.close();
        response.close();
        assert_eq!(response.write("late"), Err(ResponseError::Closed));
        assert!(response.status().is_none());
    }

    #[test]
    fn event_names_are_snake_case() {
        assert_eq!(ResponseEvent::Finish.to_string(), "finish");
        assert_eq!(ResponseEvent::Close.as_ref(), "close");
    }
}
