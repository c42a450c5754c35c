//! A periodic callback on its own thread, scoped to the handle that owns it.
//!
//! Dropping the [`Ticker`] stops the callback and joins the thread, so a view
//! that goes away cannot leave a timer behind, whichever path it leaves by.

use log::{debug, warn};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What the callback wants after a tick.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TickFlow {
    Continue,
    Stop,
}

pub struct Ticker {
    name: String,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Calls `tick` every `period` until it returns [`TickFlow::Stop`] or the
    /// ticker is dropped. With `fire_immediately` the first call happens right away.
    pub fn spawn<F>(name: &str, period: Duration, fire_immediately: bool, mut tick: F) -> Ticker
    where
        F: FnMut() -> TickFlow + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread_name = name.to_string();
        let handle = thread::spawn(move || {
            // Fixed rate: each deadline is one period after the previous one.
            let mut next = Instant::now() + period;
            if fire_immediately && tick() == TickFlow::Stop {
                return;
            }
            loop {
                match stop_rx.recv_timeout(next.saturating_duration_since(Instant::now())) {
                    Err(RecvTimeoutError::Timeout) => {
                        if tick() == TickFlow::Stop {
                            break;
                        }
                        next += period;
                        let now = Instant::now();
                        if next <= now {
                            // Too late for the missed slots.
                            next = now + period;
                        }
                    }
                    // An explicit stop or a dropped handle.
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("ticker {}: stopped", thread_name);
        });
        Ticker {
            name: name.to_string(),
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// True once the callback asked to stop (or the ticker was shut down).
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }

    /// Stops the ticker and waits for an in-progress tick to return.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            // The thread may already be gone.
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("ticker {}: callback panicked", self.name);
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
