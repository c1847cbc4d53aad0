//! Background control-tick thread.
//!
//! Spawns a thread that runs `tick()` on a shared `TachoCore` at the
//! configured period, paced against absolute deadlines so that a slow tick
//! does not shift every later one. Latest reports are pushed via a bounded
//! channel; overruns (a tick that started after its deadline had already
//! passed by a full period) are counted.
//!
//! Safety: Each `Ticker` spawns exactly one thread that is automatically
//! shut down when the `Ticker` is dropped, preventing thread leaks.
use crossbeam_channel as xch;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tacho_traits::MotorDriver;
use tacho_traits::clock::Clock;

use crate::core::TachoCore;
use crate::status::TickReport;

pub struct Ticker {
    rx: xch::Receiver<TickReport>,
    ticks: Arc<AtomicU64>,
    overruns: Arc<AtomicU64>,
    /// Shutdown flag for immediate response (atomic for lock-free check)
    shutdown: Arc<AtomicBool>,
    /// Join handle for graceful thread cleanup
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn<D, C>(core: Arc<Mutex<TachoCore<D>>>, period: Duration, clock: C) -> Self
    where
        D: MotorDriver + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let (tx, rx) = xch::bounded(1);
        let stale = rx.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let ticks = Arc::new(AtomicU64::new(0));
        let ticks_clone = ticks.clone();
        let overruns = Arc::new(AtomicU64::new(0));
        let overruns_clone = overruns.clone();
        let period = period.max(Duration::from_micros(100));

        let join_handle = std::thread::spawn(move || {
            let mut deadline: Instant = clock.now() + period;
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("Ticker thread received shutdown signal");
                    break;
                }

                let report = match core.lock() {
                    Ok(mut guard) => guard.tick(),
                    Err(_) => {
                        tracing::warn!("core mutex poisoned; ticker exiting");
                        break;
                    }
                };
                ticks_clone.fetch_add(1, Ordering::Relaxed);
                // keep only the newest report; a slow reader never stalls the loop
                if let Err(xch::TrySendError::Full(report)) = tx.try_send(report) {
                    let _ = stale.try_recv();
                    let _ = tx.try_send(report);
                }

                let now = clock.now();
                if now > deadline + period {
                    overruns_clone.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(late_us = (now - deadline).as_micros() as u64, "tick overrun");
                    deadline = now + period;
                } else {
                    clock.sleep(deadline.saturating_duration_since(now));
                    deadline += period;
                }
            }
            tracing::trace!("Ticker thread exiting cleanly");
        });

        Self {
            rx,
            ticks,
            overruns,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Newest report, if one arrived since the last call.
    pub fn latest(&self) -> Option<TickReport> {
        self.rx.try_iter().last()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Ask the thread to stop without waiting for it.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        // The thread exits after at most one tick plus one period.
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!("Ticker thread joined successfully");
                }
                Err(e) => {
                    // Thread panicked; log but don't propagate (we're in Drop)
                    tracing::warn!(?e, "Ticker thread panicked during shutdown");
                }
            }
        }
    }
}
