//! Cancellation and delay primitives used by the protocol engine
//!
//! Every intentional suspension in this crate (The pre-read latency delay and
//! the handshake backoff) goes through a [Sleeper], so that tests can run the
//! retry logic without waiting in real time, and so that a [CancelToken] can
//! abort a long wait.

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::{DiagError, DiagServerResult};

/// Granularity at which [ThreadSleeper] checks for cancellation
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Shared cancellation flag.
///
/// Cloning the token yields a handle to the same flag, so a token can be handed to
/// another thread which can then abort a blocking read or the handshake loop.
/// Once cancelled, the token stays cancelled until [CancelToken::reset] is called.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a new token in the non-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of any in-flight operation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed)
    }

    /// Clears a previous cancellation request
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Relaxed)
    }

    /// Returns true if cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Returns [DiagError::Cancelled] if cancellation has been requested
    pub fn check(&self) -> DiagServerResult<()> {
        if self.is_cancelled() {
            Err(DiagError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Abstraction over a blocking delay
pub trait Sleeper: Send + Sync + Debug {
    /// Blocks for `duration`, or until `cancel` is triggered, in which case
    /// [DiagError::Cancelled] is returned
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> DiagServerResult<()>;
}

/// [Sleeper] which blocks the current thread
#[derive(Debug, Copy, Clone, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> DiagServerResult<()> {
        let start = Instant::now();
        loop {
            cancel.check()?;
            let elapsed = start.elapsed();
            if elapsed >= duration {
                return Ok(());
            }
            std::thread::sleep(std::cmp::min(CANCEL_POLL_INTERVAL, duration - elapsed));
        }
    }
}
