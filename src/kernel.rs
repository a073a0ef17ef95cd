//! The running kernel.
//!
//! A kernel is bound to the OS thread that starts it with [`run`]: its state
//! lives behind a thread-local pointer for the duration of the run, so the
//! free functions in this module can be called from any kernel thread
//! without passing a handle around. Independent kernels may run on
//! different OS threads at the same time.
//!
//! Every operation follows the same shape: borrow the state, finish all
//! bookkeeping, drop the borrow, and only then switch stacks.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use tracing::{debug, error, trace};

use crate::config::KernelConfig;
use crate::context::{switch_context, Context};
use crate::error::{KernelError, KernelResult};
use crate::scheduler::Scheduler;
use crate::stack::StackPool;
use crate::stats::{KernelStats, StatsSnapshot};
use crate::thread::{ThreadBody, ThreadId};

struct Kernel {
    scheduler: Scheduler,
    pool: StackPool,
    /// Where the OS thread that called `run` is parked.
    host: Context,
    /// Write-only sink for the registers of threads that never resume.
    graveyard: Context,
    panic: Option<Box<dyn Any + Send + 'static>>,
    stats: KernelStats,
}

thread_local! {
    static KERNEL: Cell<*mut Kernel> = const { Cell::new(ptr::null_mut()) };
}

fn with_kernel<R>(f: impl FnOnce(&mut Kernel) -> R) -> R {
    let kernel = KERNEL.with(Cell::get);
    assert!(!kernel.is_null(), "mykernel: called outside a running kernel");
    // SAFETY: the pointer is live for the whole run, only one kernel thread
    // executes at a time, and callers never switch while the borrow is held.
    f(unsafe { &mut *kernel })
}

/// Whether a kernel is running on the calling OS thread.
pub fn is_running() -> bool {
    !KERNEL.with(Cell::get).is_null()
}

/// Starts a fresh kernel and runs `main` as thread 0.
///
/// Returns once no thread is left, with the final counters. A panic escaping
/// any kernel thread ends the run early and is re-raised here.
///
/// # Errors
/// [`KernelError::InvalidConfig`] for a bad configuration,
/// [`KernelError::AlreadyRunning`] when called from inside a kernel thread,
/// [`KernelError::StackAllocation`] when thread 0's stack cannot be mapped.
pub fn run<F>(config: KernelConfig, main: F) -> KernelResult<StatsSnapshot>
where
    F: FnOnce() + 'static,
{
    config.validate()?;
    if is_running() {
        return Err(KernelError::AlreadyRunning);
    }

    let mut pool = StackPool::new(config.stack_size, config.max_threads);
    let stack = pool.acquire()?;
    // SAFETY: the stack top is page aligned and the stack is owned by slot 0.
    let context = unsafe { Context::prepare(stack.top(), trampoline) };
    let mut scheduler = Scheduler::new(config.max_threads, config.policy);
    scheduler.install_main(stack, context, Box::new(main));

    let stats = KernelStats::new();
    stats.record_create();

    let kernel = Box::into_raw(Box::new(Kernel {
        scheduler,
        pool,
        host: Context::default(),
        graveyard: Context::default(),
        panic: None,
        stats,
    }));
    debug!(
        max_threads = config.max_threads,
        stack_size = config.stack_size,
        policy = ?config.policy,
        "kernel initialized"
    );

    KERNEL.with(|k| k.set(kernel));
    // SAFETY: `kernel` stays allocated until `Box::from_raw` below, and the
    // last thread to exit switches back into `host`.
    unsafe {
        let host = ptr::addr_of_mut!((*kernel).host);
        let main = (*kernel).scheduler.context_ptr(0);
        switch_context(host, main);
    }
    KERNEL.with(|k| k.set(ptr::null_mut()));

    // SAFETY: no kernel thread can run any more; we are back on the host stack.
    let Kernel {
        scheduler,
        pool,
        panic: payload,
        stats,
        ..
    } = *unsafe { Box::from_raw(kernel) };
    let snapshot = stats.snapshot();
    drop(scheduler);
    drop(pool);

    if let Some(payload) = payload {
        panic::resume_unwind(payload);
    }
    debug!(?snapshot, "kernel run finished");
    Ok(snapshot)
}

/// First code run by every kernel thread.
extern "C" fn trampoline() -> ! {
    let entry = with_kernel(|k| k.scheduler.take_entry());
    if let Some(entry) = entry {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(entry)) {
            abandon(payload);
        }
    }
    exit()
}

/// Gives up on the run after a thread panicked and returns to the host.
fn abandon(payload: Box<dyn Any + Send + 'static>) -> ! {
    let (from, to) = with_kernel(|k| {
        error!(
            thread = k.scheduler.current_thread(),
            "kernel thread panicked, abandoning run"
        );
        k.panic = Some(payload);
        (ptr::addr_of_mut!(k.graveyard), ptr::addr_of!(k.host))
    });
    // SAFETY: the host context was saved by `run`, whose frame is still live.
    unsafe { switch_context(from, to) };
    unreachable!("abandoned kernel thread was resumed")
}

/// Creates a thread running `f`. Never suspends the caller.
///
/// # Errors
/// [`KernelError::NoFreeSlot`] when every slot is active, or
/// [`KernelError::StackAllocation`]. Nothing changes in either case.
///
/// # Panics
/// When called outside a running kernel.
pub fn spawn<F>(f: F) -> KernelResult<ThreadId>
where
    F: FnOnce() + 'static,
{
    with_kernel(|k| k.spawn(Box::new(f)))
}

impl Kernel {
    fn spawn(&mut self, entry: ThreadBody) -> KernelResult<ThreadId> {
        let creator = self.scheduler.current_thread();
        let Some(id) = self.scheduler.find_free() else {
            self.stats.record_create_rejected();
            debug!(creator, "thread creation rejected, no free slot");
            return Err(KernelError::NoFreeSlot {
                capacity: self.scheduler.capacity(),
            });
        };
        let stack = match self.pool.acquire() {
            Ok(stack) => stack,
            Err(err) => {
                self.stats.record_create_rejected();
                debug!(creator, %err, "thread creation rejected");
                return Err(err);
            }
        };

        // SAFETY: the stack top is page aligned and the stack now belongs to `id`.
        let context = unsafe { Context::prepare(stack.top(), trampoline) };
        self.scheduler.admit(id, stack, context, entry);
        self.stats.record_create();
        debug!(thread = id, creator, "thread created");
        Ok(id)
    }
}

/// ID of the running thread.
///
/// # Panics
/// When called outside a running kernel.
pub fn current() -> ThreadId {
    with_kernel(|k| k.scheduler.current_thread())
}

/// Hands the CPU to `target`.
///
/// Returns, once the caller runs again, the ID of whichever thread resumed
/// it, which after a chain of hand-offs need not be `target`. Yielding to
/// oneself is allowed.
///
/// # Errors
/// [`KernelError::InvalidThreadId`] or [`KernelError::ThreadNotActive`],
/// without switching.
///
/// # Panics
/// When called outside a running kernel.
pub fn yield_to(target: ThreadId) -> KernelResult<ThreadId> {
    yield_checked(i64::try_from(target).unwrap_or(i64::MAX))
}

pub(crate) fn yield_checked(target: i64) -> KernelResult<ThreadId> {
    let target = with_kernel(|k| {
        k.scheduler.validate_target(target).inspect_err(|err| {
            k.stats.record_yield_rejected();
            debug!(thread = k.scheduler.current_thread(), %err, "yield rejected");
        })
    })?;
    Ok(switch_to(target))
}

/// Yields to the thread the scheduling policy picks.
///
/// Returns the resumer once the caller runs again, or `None` without
/// switching when no other thread is active.
///
/// # Panics
/// When called outside a running kernel.
pub fn schedule() -> Option<ThreadId> {
    let next = with_kernel(|k| {
        let next = k.scheduler.pick_next();
        if next.is_none() {
            k.stats.record_idle_schedule();
            trace!(thread = k.scheduler.current_thread(), "nothing else to schedule");
        }
        next
    });
    next.map(switch_to)
}

/// Ends the running thread.
///
/// Its slot is freed and its stack released, then the scheduling policy
/// picks who runs next. After the last thread exits, [`run`] returns.
/// Locals still on the exiting thread's stack are not dropped.
///
/// # Panics
/// When called outside a running kernel.
pub fn exit() -> ! {
    let (from, to) = with_kernel(|k| {
        let id = k.scheduler.current_thread();
        if let Some(stack) = k.scheduler.retire_current() {
            // Still running on it; the pool hands it out again only after
            // the switch below.
            k.pool.release(stack);
        }
        k.stats.record_exit();

        let from = ptr::addr_of_mut!(k.graveyard);
        match k.scheduler.pick_next() {
            Some(next) => {
                k.scheduler.hand_off(next);
                k.stats.record_switch();
                debug!(thread = id, next, cached_stacks = k.pool.cached(), "thread exited");
                (from, k.scheduler.context_ptr(next).cast_const())
            }
            None => {
                debug!(thread = id, "last thread exited");
                (from, ptr::addr_of!(k.host))
            }
        }
    });
    // SAFETY: `to` is a live thread's saved context or the host's.
    unsafe { switch_context(from, to) };
    unreachable!("exited kernel thread was resumed")
}

/// Counters of the running kernel.
///
/// # Panics
/// When called outside a running kernel.
pub fn stats() -> StatsSnapshot {
    with_kernel(|k| k.stats.snapshot())
}

/// Number of active threads, the caller included.
///
/// # Panics
/// When called outside a running kernel.
pub fn active_threads() -> usize {
    with_kernel(|k| k.scheduler.active_count())
}

/// Switches to an active `target` and returns whoever eventually resumes
/// the caller.
fn switch_to(target: ThreadId) -> ThreadId {
    let (from, to) = with_kernel(|k| {
        let prev = k.scheduler.hand_off(target);
        k.stats.record_switch();
        trace!(from = prev, to = target, "switch");
        (
            k.scheduler.context_ptr(prev),
            k.scheduler.context_ptr(target).cast_const(),
        )
    });
    // SAFETY: both slots are active; `from` is saved before `to` is loaded,
    // so a self-switch is fine.
    unsafe { switch_context(from, to) };

    with_kernel(|k| {
        let me = k.scheduler.current_thread();
        k.scheduler.resumed_by(me).unwrap_or(me)
    })
}
