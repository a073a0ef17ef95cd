use std::io;

use thiserror::Error;

use crate::thread::ThreadId;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("no free thread slot ({capacity} threads active)")]
    NoFreeSlot { capacity: usize },
    #[error("thread id {0} is out of range")]
    InvalidThreadId(i64),
    #[error("thread {0} is not active")]
    ThreadNotActive(ThreadId),
    #[error("failed to allocate a {size}-byte thread stack")]
    StackAllocation {
        size: usize,
        #[source]
        source: io::Error,
    },
    #[error("a kernel is already running on this OS thread")]
    AlreadyRunning,
    #[error("invalid kernel configuration: {0}")]
    InvalidConfig(&'static str),
}

pub type KernelResult<T> = Result<T, KernelError>;
