//! Control handle for a running training engine
//!
//! The manager owns one handle per session and flips its flags; the engine
//! polls the handle at epoch boundaries and waits on the condvar while
//! paused. No signals cross thread boundaries as exceptions or results;
//! they are plain state reads.

use std::sync::{Arc, Condvar, Mutex};

#[derive(Debug, Default)]
struct Flags {
    stop_requested: bool,
    pause_requested: bool,
}

/// Shared pause/resume/stop signaling for one session
#[derive(Debug, Clone, Default)]
pub struct ControlHandle {
    inner: Arc<ControlInner>,
}

#[derive(Debug, Default)]
struct ControlInner {
    flags: Mutex<Flags>,
    signal: Condvar,
}

impl ControlHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the engine to stop at the next epoch boundary. Also wakes a
    /// paused engine so it can exit.
    pub fn request_stop(&self) {
        let mut flags = self.inner.flags.lock().expect("control lock");
        flags.stop_requested = true;
        self.inner.signal.notify_all();
    }

    /// Request the engine to pause after the current epoch
    pub fn request_pause(&self) {
        let mut flags = self.inner.flags.lock().expect("control lock");
        flags.pause_requested = true;
    }

    /// Release a paused engine
    pub fn resume(&self) {
        let mut flags = self.inner.flags.lock().expect("control lock");
        flags.pause_requested = false;
        self.inner.signal.notify_all();
    }

    pub fn stop_requested(&self) -> bool {
        self.inner.flags.lock().expect("control lock").stop_requested
    }

    pub fn pause_requested(&self) -> bool {
        self.inner.flags.lock().expect("control lock").pause_requested
    }

    /// Block until resumed or stopped; returns true if stop was requested
    pub fn wait_while_paused(&self) -> bool {
        let mut flags = self.inner.flags.lock().expect("control lock");
        while flags.pause_requested && !flags.stop_requested {
            flags = self.inner.signal.wait(flags).expect("control lock");
        }
        flags.stop_requested
    }
}
