//! Integer-ID surface of the kernel.
//!
//! Thread IDs are plain `i32`s and both recoverable failures, a full
//! registry on create and a bad target on yield, come back as [`FAILED`].
//! Everything else forwards to [`crate::kernel`].

use crate::config::KernelConfig;
use crate::error::KernelResult;
use crate::kernel;
use crate::stats::StatsSnapshot;
use crate::thread::ThreadId;

/// Returned by [`create_thread`] and [`yield_thread`] on failure.
pub const FAILED: i32 = -1;

/// Entry point of a thread created with [`create_thread`].
pub type ThreadFn = fn(i32);

/// Resets the kernel with the default configuration and runs `main` as
/// thread 0, returning once every thread has exited.
pub fn init_threads<F>(main: F) -> KernelResult<StatsSnapshot>
where
    F: FnOnce() + 'static,
{
    kernel::run(KernelConfig::default(), main)
}

/// [`init_threads`] with an explicit configuration.
pub fn init_threads_with<F>(config: KernelConfig, main: F) -> KernelResult<StatsSnapshot>
where
    F: FnOnce() + 'static,
{
    kernel::run(config, main)
}

/// Creates a thread running `entry(arg)` and returns its ID, or [`FAILED`]
/// when no slot is free.
pub fn create_thread(entry: ThreadFn, arg: i32) -> i32 {
    kernel::spawn(move || entry(arg)).map_or(FAILED, to_raw)
}

pub fn get_thread() -> i32 {
    to_raw(kernel::current())
}

/// Hands off to `target`; returns the ID of whoever resumes the caller, or
/// [`FAILED`] without switching when `target` is out of range or inactive.
pub fn yield_thread(target: i32) -> i32 {
    kernel::yield_checked(i64::from(target)).map_or(FAILED, to_raw)
}

pub fn sched_thread() {
    kernel::schedule();
}

pub fn exit_thread() -> ! {
    kernel::exit()
}

fn to_raw(id: ThreadId) -> i32 {
    // Configurations whose capacity does not fit an i32 are rejected.
    i32::try_from(id).unwrap_or(FAILED)
}
