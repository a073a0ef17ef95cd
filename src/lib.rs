//! A cooperative, user-level threading kernel.
//!
//! Up to [`MAX_THREADS`] threads share the calling OS thread. Each one runs
//! on its own [`STACK_SIZE`]-byte stack and keeps the CPU until it yields to
//! a named thread, asks the scheduler to pick one, or exits. Nothing is ever
//! preempted.
//!
//! ```no_run
//! use mykernel::{create_thread, exit_thread, get_thread, init_threads, yield_thread};
//!
//! fn worker(parent: i32) {
//!     println!("T{} running", get_thread());
//!     yield_thread(parent);
//! }
//!
//! init_threads(|| {
//!     let me = get_thread();
//!     let child = create_thread(worker, me);
//!     assert_eq!(yield_thread(child), child);
//!     exit_thread();
//! })
//! .unwrap();
//! ```

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod kernel;
pub mod scheduler;
pub mod stack;
pub mod stats;
pub mod thread;

/// Default number of thread slots, thread 0 included.
pub const MAX_THREADS: usize = 10;

/// Default usable bytes per thread stack.
pub const STACK_SIZE: usize = 65536;

pub use api::{
    create_thread, exit_thread, get_thread, init_threads, init_threads_with, sched_thread,
    yield_thread, ThreadFn, FAILED,
};
pub use config::{KernelConfig, SchedPolicy};
pub use error::{KernelError, KernelResult};
pub use kernel::{active_threads, current, exit, is_running, run, schedule, spawn, stats, yield_to};
pub use stack::MIN_STACK_SIZE;
pub use stats::StatsSnapshot;
pub use thread::{ThreadId, ThreadState};
