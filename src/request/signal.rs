use crate::di::{Arguments, Injectable};
use crate::error::Result;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

/// Notification emitted by a [`RequestSignal`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestEvent {
    Destroyed,
}

/// End-of-life signal of one request.
///
/// Anything that holds request-bound resources subscribes here and releases
/// them when the request is destroyed. Firing emits a single
/// [`RequestEvent::Destroyed`] and then drops every listener; later
/// subscriptions observe the signal as already fired.
#[derive(Debug)]
pub struct RequestSignal {
    sender: Mutex<Option<broadcast::Sender<RequestEvent>>>,
}

impl Default for RequestSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender: Mutex::new(Some(sender)),
        }
    }

    /// `None` once the signal has fired.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<RequestEvent>> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(broadcast::Sender::subscribe)
    }

    /// Emit `Destroyed` and detach all listeners. Returns `false` if already fired.
    pub fn fire(&self) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(sender) => {
                let _ = sender.send(RequestEvent::Destroyed);
                true
            }
            None => false,
        }
    }

    pub fn is_fired(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Resolves once the signal fired.
    pub async fn destroyed(&self) {
        if let Some(mut receiver) = self.subscribe() {
            // Either the event or the closed channel means the same thing.
            let _ = receiver.recv().await;
        }
    }
}

impl Injectable for RequestSignal {
    fn construct(_args: Arguments) -> Result<Self> {
        Ok(Self::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn fires_exactly_once() {
        let signal = RequestSignal::new();
        let mut listener = signal.subscribe().unwrap();

        assert!(signal.fire());
        assert!(!signal.fire());

        assert_eq!(listener.recv().await, Ok(RequestEvent::Destroyed));
        assert_eq!(listener.recv().await, Err(RecvError::Closed));
        assert!(signal.subscribe().is_none());
    }

    #[tokio::test]
    async fn destroyed_resolves_after_fire() {
        let signal = std::sync::Arc::new(RequestSignal::new());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.destroyed().await })
        };
        tokio::task::yield_now().await;
        signal.fire();
        waiter.await.unwrap();

        // Already fired: returns immediately.
        signal.destroyed().await;
    }
}
