//! Single-slot renewal timer.

use std::{
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use {tokio::task::JoinHandle, tracing::debug};

use crate::{Error, Result};

#[derive(Default)]
struct Slot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// Holds at most one pending renewal. Arming replaces (and aborts) whatever
/// was pending before.
#[derive(Default)]
pub struct RenewalTimer {
    slot: Arc<Mutex<Slot>>,
}

impl RenewalTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_fire` after `delay`, cancelling any previously armed timer.
    ///
    /// When the timer fires it leaves the slot before running `on_fire`, so
    /// `on_fire` may arm the next renewal itself.
    pub fn arm<F>(&self, delay: Duration, on_fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.handle.take() {
            previous.abort();
            debug!("replaced pending renewal timer");
        }
        slot.generation += 1;
        let generation = slot.generation;

        let shared = Arc::clone(&self.slot);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slot = shared.lock().unwrap_or_else(|e| e.into_inner());
                if slot.generation != generation {
                    return;
                }
                slot.handle = None;
            }
            on_fire.await;
        });
        slot.handle = Some(handle);
        debug!(delay_secs = delay.as_secs(), "renewal timer armed");
    }

    /// Cancel the pending timer, if any. Idempotent.
    pub fn cancel(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.generation += 1;
        if let Some(handle) = slot.handle.take() {
            handle.abort();
            debug!("renewal timer cancelled");
        }
    }

    /// Whether a timer is waiting to fire.
    pub fn is_armed(&self) -> bool {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for RenewalTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Time to wait before renewing a token that expires at `expires_at` so that
/// `headroom_secs` of validity remain.
pub fn renewal_delay(expires_at: u64, now: u64, headroom_secs: u64) -> Result<Duration> {
    let lifetime_secs = expires_at as i64 - now as i64;
    let delay = lifetime_secs - headroom_secs as i64;
    if delay <= 0 {
        return Err(Error::HeadroomUnattainable {
            lifetime_secs,
            min_validity_secs: headroom_secs,
        });
    }
    Ok(Duration::from_secs(delay as u64))
}
