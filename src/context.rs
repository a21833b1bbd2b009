use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Cancellation and deadline carried through long-running operations.
///
/// Clones share the cancel flag, so canceling any clone cancels all of them.
#[derive(Debug, Clone)]
pub struct Context {
    stop: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Context {
    pub fn background() -> Context {
        Context {
            stop: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Derived context sharing the cancel flag, expiring after `timeout` or at
    /// the current deadline, whichever comes first.
    pub fn with_timeout(&self, timeout: Duration) -> Context {
        let deadline = Instant::now() + timeout;

        Context {
            stop: self.stop.clone(),
            deadline: Some(match self.deadline {
                Some(d) if d < deadline => d,
                _ => deadline,
            }),
        }
    }

    pub fn cancel(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_done(&self) -> bool {
        self.check().is_err()
    }

    pub fn check(&self) -> Result<()> {
        if self.stop.load(Ordering::Relaxed) {
            return Err(Error::Canceled);
        }

        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Error::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

impl Default for Context {
    fn default() -> Context {
        Context::background()
    }
}
