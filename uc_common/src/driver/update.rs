//! Poll/event update pipeline of a PHI.
//!
//! Two threads per driver instance:
//!
//! ```text
//!  ┌─────────────┐  notify()   ┌────────────┐   wait()   ┌──────────────────┐
//!  │  scheduler  │────────────►│ WakeSignal │───────────►│    processor     │
//!  │ (stepped    │             │ (one slot) │            │ perform_update() │
//!  │  sleep)     │             └────────────┘            └────────┬─────────┘
//!  └─────────────┘                                                │ delta
//!                                                                 ▼
//!                                                           EventSink
//! ```
//!
//! The wake signal is a single boolean, not a queue: wakes issued while an
//! update is running coalesce into one further pass. `get()` always reads
//! current equipment state, so only the latest state matters.

use crate::driver::StateMap;
use crate::driver::error::DriverError;
use crate::driver::phi::Phi;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Compute the part of `state` that differs from `previous`.
///
/// Without a previous state the whole state is the delta.
pub fn compute_delta(previous: Option<&StateMap>, state: &StateMap) -> StateMap {
    match previous {
        None => state.clone(),
        Some(previous) => state
            .iter()
            .filter(|(port, value)| previous.get(*port) != Some(*value))
            .map(|(port, value)| (port.clone(), value.clone()))
            .collect(),
    }
}

/// Coalescing binary wake flag.
#[derive(Debug, Default)]
pub struct WakeSignal {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl WakeSignal {
    /// Create a cleared signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Raising an already raised flag is a no-op.
    pub fn notify(&self) {
        let mut flag = self.flag.lock();
        *flag = true;
        self.cond.notify_one();
    }

    /// Block until the flag is raised, then clear it.
    pub fn wait(&self) {
        let mut flag = self.flag.lock();
        while !*flag {
            self.cond.wait(&mut flag);
        }
        *flag = false;
    }

    /// Like [`wait`](Self::wait) with an upper bound. Returns whether the
    /// flag was consumed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flag = self.flag.lock();
        while !*flag {
            if self.cond.wait_until(&mut flag, deadline).timed_out() {
                break;
            }
        }
        std::mem::replace(&mut *flag, false)
    }

    /// Whether the flag is currently raised.
    pub fn is_set(&self) -> bool {
        *self.flag.lock()
    }
}

/// Throughput counters for `benchmark` mode.
#[derive(Debug, Default)]
struct BenchCounters {
    count: u64,
    last_reset: Option<Instant>,
}

/// Threads of one running pipeline generation.
struct Workers {
    active: Arc<AtomicBool>,
    wake: Arc<WakeSignal>,
    scheduler: Option<JoinHandle<()>>,
}

/// Scheduler/processor pair plus last published state.
pub struct UpdatePipeline {
    interval: Option<Duration>,
    benchmark: bool,
    workers: Mutex<Option<Workers>>,
    last_state: Mutex<Option<StateMap>>,
    bench: Mutex<BenchCounters>,
}

impl UpdatePipeline {
    /// Create a stopped pipeline. `interval` of `None` disables scheduling.
    pub fn new(interval: Option<Duration>, benchmark: bool) -> Self {
        Self {
            interval: interval.filter(|i| !i.is_zero()),
            benchmark,
            workers: Mutex::new(None),
            last_state: Mutex::new(None),
            bench: Mutex::new(BenchCounters::default()),
        }
    }

    /// Configured update interval.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Whether throughput logging is enabled.
    pub fn benchmark(&self) -> bool {
        self.benchmark
    }

    /// Whether the threads are running.
    pub fn is_running(&self) -> bool {
        self.workers.lock().is_some()
    }

    /// Last full state seen by a scheduled update.
    pub fn last_state(&self) -> Option<StateMap> {
        self.last_state.lock().clone()
    }

    /// Start the scheduler and processor threads. Idempotent.
    ///
    /// The processor holds only a weak reference to the driver, so an
    /// unloaded instance is never kept alive by its own threads.
    pub fn start(
        &self,
        phi: Weak<dyn Phi>,
        name: &str,
        sleep_step: Duration,
    ) -> Result<(), DriverError> {
        let Some(interval) = self.interval else {
            return Ok(());
        };
        let mut workers = self.workers.lock();
        if workers.is_some() {
            return Ok(());
        }

        let active = Arc::new(AtomicBool::new(true));
        let wake = Arc::new(WakeSignal::new());

        let processor = {
            let active = Arc::clone(&active);
            let wake = Arc::clone(&wake);
            let name = name.to_string();
            thread::Builder::new()
                .name(format!("update_processor_{name}"))
                .spawn(move || run_processor(phi, &wake, &active, &name))
                .map_err(|e| DriverError::ThreadSpawn(e.to_string()))?
        };
        // The processor stops by itself once `active` is cleared and woken.
        drop(processor);

        let scheduler = {
            let active = Arc::clone(&active);
            let wake = Arc::clone(&wake);
            let name = name.to_string();
            thread::Builder::new()
                .name(format!("update_scheduler_{name}"))
                .spawn(move || run_scheduler(interval, sleep_step, &wake, &active, &name))
        };
        let scheduler = match scheduler {
            Ok(handle) => handle,
            Err(e) => {
                active.store(false, Ordering::SeqCst);
                wake.notify();
                return Err(DriverError::ThreadSpawn(e.to_string()));
            }
        };

        *workers = Some(Workers {
            active,
            wake,
            scheduler: Some(scheduler),
        });
        Ok(())
    }

    /// Stop both threads. Idempotent.
    ///
    /// Joins the scheduler (bounded by one sleep step). The processor is
    /// only signalled: it may be inside a slow `get()` and exits on its own.
    pub fn stop(&self) {
        let Some(mut workers) = self.workers.lock().take() else {
            return;
        };
        workers.active.store(false, Ordering::SeqCst);
        workers.wake.notify();
        if let Some(handle) = workers.scheduler.take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("update scheduler terminated abnormally");
            }
        }
    }

    /// Request an update pass now. Ignored while stopped.
    pub fn wake(&self) {
        if let Some(workers) = self.workers.lock().as_ref() {
            workers.wake.notify();
        }
    }

    /// Forget the last published state; the next update publishes everything.
    pub fn reset(&self) {
        *self.last_state.lock() = None;
    }

    /// Store `state` as the last full state and return the delta to publish.
    pub(crate) fn record(&self, owner: &str, state: StateMap) -> StateMap {
        let delta = {
            let mut last = self.last_state.lock();
            let delta = compute_delta(last.as_ref(), &state);
            if self.benchmark {
                let mut bench = self.bench.lock();
                if last.is_none() {
                    bench.last_reset = Some(Instant::now());
                    warn!("{owner}: benchmark mode");
                }
                bench.count += 1;
            }
            *last = Some(state);
            delta
        };
        if self.benchmark {
            self.report_benchmark(owner);
        }
        delta
    }

    fn report_benchmark(&self, owner: &str) {
        let Some(interval) = self.interval else {
            return;
        };
        let mut bench = self.bench.lock();
        if (bench.count as f64) <= 1.0 / interval.as_secs_f64() {
            return;
        }
        let now = Instant::now();
        let elapsed = bench
            .last_reset
            .map(|t| now.duration_since(t).as_secs_f64())
            .unwrap_or_default();
        if elapsed > 0.0 {
            warn!(
                "{owner}: update benchmark: {}/s",
                (bench.count as f64 / elapsed).round()
            );
        }
        bench.count = 0;
        bench.last_reset = Some(now);
    }
}

impl Drop for UpdatePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_scheduler(
    interval: Duration,
    sleep_step: Duration,
    wake: &WakeSignal,
    active: &AtomicBool,
    name: &str,
) {
    debug!("{name} update scheduler started");
    let step = if sleep_step.is_zero() {
        interval
    } else {
        sleep_step
    };
    while active.load(Ordering::SeqCst) {
        let deadline = Instant::now() + interval;
        loop {
            let now = Instant::now();
            if now >= deadline || !active.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(step.min(deadline - now));
        }
        if !active.load(Ordering::SeqCst) {
            break;
        }
        wake.notify();
    }
    debug!("{name} update scheduler stopped");
}

fn run_processor(phi: Weak<dyn Phi>, wake: &WakeSignal, active: &AtomicBool, name: &str) {
    debug!("{name} update processor started");
    while active.load(Ordering::SeqCst) {
        wake.wait();
        if !active.load(Ordering::SeqCst) {
            break;
        }
        let Some(phi) = phi.upgrade() else {
            break;
        };
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| phi.perform_update())) {
            error!("{name}: scheduled update error: {}", panic_message(&panic));
        }
    }
    debug!("{name} update processor stopped");
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
