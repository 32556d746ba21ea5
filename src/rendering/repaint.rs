use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;

/// Creates a connected repaint signal/receiver pair.
///
/// The channel holds at most one request, so any number of requests made
/// before the painter wakes up collapse into a single repaint.
pub fn repaint_channel() -> (RepaintSignal, RepaintReceiver) {
    let (tx, rx) = bounded(1);
    (RepaintSignal { tx }, RepaintReceiver { rx })
}

/// Producer side; cheap to clone and callable from any thread.
#[derive(Debug, Clone)]
pub struct RepaintSignal {
    tx: Sender<()>,
}

impl RepaintSignal {
    /// Fire-and-forget. Returns `false` if a request was already pending or
    /// nobody listens anymore.
    pub fn request(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RepaintReceiver {
    rx: Receiver<()>,
}

impl RepaintReceiver {
    /// Consumes a pending request without blocking.
    pub fn try_take(&self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// Waits up to `timeout` for a request.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}
