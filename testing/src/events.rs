//! Collector for the engine event stream.

use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;
use trotro_core::events::EngineEvent;

/// Drains engine events from a broadcast receiver without blocking.
///
/// Subscribe before driving the engine, then call [`EventCapture::drain`]
/// after the operations under test have completed.
pub struct EventCapture {
    rx: Receiver<EngineEvent>,
}

impl EventCapture {
    /// Wraps a receiver obtained from `Engine::subscribe`.
    #[must_use]
    pub const fn new(rx: Receiver<EngineEvent>) -> Self {
        Self { rx }
    }

    /// Everything published since the last drain, in publish order.
    ///
    /// # Panics
    ///
    /// Panics if the capture lagged behind the channel capacity; a test
    /// that overflows the buffer should use a larger one.
    #[allow(clippy::panic)] // Test helper
    pub fn drain(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(missed)) => {
                    panic!("event capture lagged; {missed} events lost")
                }
            }
        }
        events
    }

    /// Names of everything published since the last drain.
    pub fn drain_names(&mut self) -> Vec<&'static str> {
        self.drain().iter().map(EngineEvent::name).collect()
    }
}
