//! Per-run kernel counters.

use portable_atomic::{AtomicU64, Ordering};

/// Counters updated by the kernel as it runs.
#[derive(Debug, Default)]
pub struct KernelStats {
    context_switches: AtomicU64,
    threads_created: AtomicU64,
    threads_exited: AtomicU64,
    creates_rejected: AtomicU64,
    yields_rejected: AtomicU64,
    idle_schedules: AtomicU64,
}

/// Point-in-time copy of [`KernelStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Completed switches, self-yields and exit hand-offs included.
    pub context_switches: u64,
    /// Threads created, thread 0 included.
    pub threads_created: u64,
    pub threads_exited: u64,
    pub creates_rejected: u64,
    pub yields_rejected: u64,
    /// `sched_thread` calls that found nobody else to run.
    pub idle_schedules: u64,
}

impl KernelStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_switch(&self) {
        self.context_switches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_create(&self) {
        self.threads_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exit(&self) {
        self.threads_exited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_create_rejected(&self) {
        self.creates_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_yield_rejected(&self) {
        self.yields_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_idle_schedule(&self) {
        self.idle_schedules.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            context_switches: self.context_switches.load(Ordering::Relaxed),
            threads_created: self.threads_created.load(Ordering::Relaxed),
            threads_exited: self.threads_exited.load(Ordering::Relaxed),
            creates_rejected: self.creates_rejected.load(Ordering::Relaxed),
            yields_rejected: self.yields_rejected.load(Ordering::Relaxed),
            idle_schedules: self.idle_schedules.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Threads created but not yet exited.
    pub fn live_threads(&self) -> u64 {
        self.threads_created - self.threads_exited
    }
}
