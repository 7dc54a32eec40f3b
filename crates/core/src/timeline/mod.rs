use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick};

/// Callback invoked once per scheduled tick.
pub type TickFn = Box<dyn FnMut() + Send>;

/// Minimal clock capability the session engine depends on. Production code
/// uses [`ThreadScheduler`]; tests substitute [`ManualScheduler`] and drive
/// ticks by hand, so no unit test ever needs a real timer.
pub trait TickScheduler {
    /// Registers `callback` to fire once per second until the returned
    /// handle is cancelled or dropped.
    fn every_second(&self, callback: TickFn) -> TickHandle;
}

/// Cancellation handle for a scheduler registration. Cancels on drop, so
/// holding at most one live handle enforces the single-active-timer rule
/// by construction.
pub struct TickHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TickHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Stops the registration. Further ticks will not be delivered; a tick
    /// already executing is allowed to finish (ticks never overlap).
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for TickHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for TickHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickHandle")
            .field("live", &self.cancel.is_some())
            .finish()
    }
}

/// Real scheduler backed by a dedicated ticker thread. Ticks are strictly
/// serialized: the thread runs the callback to completion before waiting
/// for the next interval.
#[derive(Debug, Clone)]
pub struct ThreadScheduler {
    interval: Duration,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        Self::with_interval(Duration::from_secs(1))
    }

    /// Shortened intervals are only intended for demos and integration
    /// smoke tests; the session semantics assume one tick per second.
    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TickScheduler for ThreadScheduler {
    fn every_second(&self, mut callback: TickFn) -> TickHandle {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let ticker = tick(self.interval);

        std::thread::spawn(move || loop {
            select! {
                recv(ticker) -> _ => callback(),
                recv(cancel_rx) -> _ => break,
            }
        });

        // Signal-only cancellation: the ticker thread may currently be
        // inside the callback (which itself may be dropping this handle),
        // so the handle never joins the thread.
        TickHandle::new(move || {
            let _ = cancel_tx.try_send(());
        })
    }
}

/// Test scheduler that stores the registered callback and fires it only
/// when told to, making tick delivery fully deterministic.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    slot: Arc<Mutex<Option<TickFn>>>,
    cancelled: Arc<AtomicBool>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers one tick to the registered callback, if any.
    pub fn fire(&self) {
        // The callback is moved out for the duration of the call so it can
        // cancel its own registration without deadlocking on the slot.
        let callback = match self.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let Some(mut callback) = callback else {
            return;
        };
        callback();
        if !self.cancelled.load(Ordering::SeqCst) {
            if let Ok(mut slot) = self.slot.lock() {
                *slot = Some(callback);
            }
        }
    }

    pub fn fire_many(&self, ticks: u32) {
        for _ in 0..ticks {
            self.fire();
        }
    }

    /// True while a registration is live.
    pub fn is_scheduled(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst)
            && self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

impl TickScheduler for ManualScheduler {
    fn every_second(&self, callback: TickFn) -> TickHandle {
        self.cancelled.store(false, Ordering::SeqCst);
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(callback);
        }

        let slot = self.slot.clone();
        let cancelled = self.cancelled.clone();
        TickHandle::new(move || {
            cancelled.store(true, Ordering::SeqCst);
            if let Ok(mut slot) = slot.lock() {
                slot.take();
            }
        })
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("scheduled", &self.is_scheduled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn manual_scheduler_fires_only_on_demand() {
        let scheduler = ManualScheduler::new();
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();

        let handle = scheduler.every_second(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        scheduler.fire_many(5);
        assert_eq!(count.load(Ordering::SeqCst), 5);

        handle.cancel();
        scheduler.fire();
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert!(!scheduler.is_scheduled());
    }

    #[test]
    fn dropping_the_handle_cancels_the_registration() {
        let scheduler = ManualScheduler::new();
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();

        {
            let _handle = scheduler.every_second(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
            scheduler.fire();
        }

        scheduler.fire();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_cancel_its_own_registration() {
        let scheduler = ManualScheduler::new();
        let slot: Arc<Mutex<Option<TickHandle>>> = Arc::new(Mutex::new(None));
        let inner = slot.clone();

        let handle = scheduler.every_second(Box::new(move || {
            if let Some(handle) = inner.lock().unwrap().take() {
                handle.cancel();
            }
        }));
        *slot.lock().unwrap() = Some(handle);

        scheduler.fire();
        assert!(!scheduler.is_scheduled());
        scheduler.fire(); // must be a no-op, not a panic
    }

    #[test]
    fn thread_scheduler_delivers_and_cancels() {
        let scheduler = ThreadScheduler::with_interval(Duration::from_millis(5));
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();

        let handle = scheduler.every_second(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        std::thread::sleep(Duration::from_millis(60));
        handle.cancel();
        let at_cancel = count.load(Ordering::SeqCst);
        assert!(at_cancel >= 2, "expected a few ticks, got {at_cancel}");

        std::thread::sleep(Duration::from_millis(30));
        assert!(count.load(Ordering::SeqCst) <= at_cancel + 1);
    }
}
