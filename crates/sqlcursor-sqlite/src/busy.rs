//! Retry policy applied when the engine reports `SQLITE_BUSY`.
//!
//! This is the only retry loop in the crate. It bounds the time spent
//! waiting for another writer's lock; it does not bound statement run time.

use crate::ffi;
use std::ffi::c_int;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// User busy callback. Receives the number of retries so far and returns
/// `true` to retry immediately or `false` to give up.
pub type BusyHandler = Arc<dyn Fn(u32) -> bool + Send + Sync>;

/// How a connection waits out `SQLITE_BUSY`.
#[derive(Clone)]
pub enum BusyPolicy {
    /// Sleep `0.01 * 2^n` seconds between attempts until `timeout` has
    /// elapsed since the first attempt.
    Backoff { timeout: Duration },
    /// Ask the user callback after every busy result.
    Handler(BusyHandler),
}

impl BusyPolicy {
    /// Run `step` until it returns something other than `SQLITE_BUSY` or
    /// the policy gives up, returning the last result code.
    pub fn step_with_retry(&self, mut step: impl FnMut() -> c_int) -> c_int {
        let mut retries: u32 = 0;
        match self {
            BusyPolicy::Handler(handler) => loop {
                let rc = step();
                if !is_busy(rc) {
                    return rc;
                }
                if !handler(retries) {
                    tracing::debug!(retries, "Busy handler gave up");
                    return rc;
                }
                retries = retries.saturating_add(1);
            },
            BusyPolicy::Backoff { timeout } => {
                let start = Instant::now();
                loop {
                    let rc = step();
                    if !is_busy(rc) {
                        return rc;
                    }
                    let elapsed = start.elapsed();
                    if elapsed >= *timeout {
                        tracing::debug!(
                            retries,
                            timeout_ms = timeout.as_millis() as u64,
                            "Busy timeout expired"
                        );
                        return rc;
                    }
                    let delay = backoff_delay(retries).min(*timeout - elapsed);
                    tracing::debug!(
                        retries,
                        delay_ms = delay.as_millis() as u64,
                        "Database busy, backing off"
                    );
                    thread::sleep(delay);
                    retries = retries.saturating_add(1);
                }
            }
        }
    }
}

impl fmt::Debug for BusyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusyPolicy::Backoff { timeout } => f
                .debug_struct("Backoff")
                .field("timeout", timeout)
                .finish(),
            BusyPolicy::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

fn is_busy(rc: c_int) -> bool {
    rc & 0xff == ffi::SQLITE_BUSY
}

/// Delay before retry number `retry`: `0.01 * 2^retry` seconds.
pub fn backoff_delay(retry: u32) -> Duration {
    let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
    Duration::try_from_secs_f64(0.01 * 2f64.powi(exponent)).unwrap_or(Duration::MAX)
}
