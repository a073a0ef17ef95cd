//! Kernel configuration.
//!
//! A [`KernelConfig`] is fixed for the lifetime of one run: the registry is
//! sized from `max_threads` once and never resized.

use crate::error::{KernelError, KernelResult};
use crate::stack::MIN_STACK_SIZE;
use crate::{MAX_THREADS, STACK_SIZE};

/// How the kernel picks the next thread on `sched_thread` and `exit_thread`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedPolicy {
    /// Next active slot in circular ID order, starting just after the
    /// current thread.
    #[default]
    RoundRobin,
    /// Ready queue: threads join the tail when created or switched away from
    /// and leave it when resumed; the head runs next.
    Fifo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// Number of thread slots, thread 0 included.
    pub max_threads: usize,
    /// Usable bytes per thread stack, rounded up to the page size.
    pub stack_size: usize,
    pub policy: SchedPolicy,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_threads: MAX_THREADS,
            stack_size: STACK_SIZE,
            policy: SchedPolicy::RoundRobin,
        }
    }
}

impl KernelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub fn with_policy(mut self, policy: SchedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn validate(&self) -> KernelResult<()> {
        if self.max_threads == 0 {
            return Err(KernelError::InvalidConfig("max_threads must be at least 1"));
        }
        if i32::try_from(self.max_threads).is_err() {
            return Err(KernelError::InvalidConfig("max_threads must fit in an i32"));
        }
        if self.stack_size < MIN_STACK_SIZE {
            return Err(KernelError::InvalidConfig(
                "stack_size is below the minimum stack size",
            ));
        }
        Ok(())
    }
}
