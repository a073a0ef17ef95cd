//! Thread registry, ID allocation and successor selection.
//!
//! Nothing in here switches stacks: every method completes its bookkeeping
//! and returns, and the kernel performs the switch afterwards.

use std::collections::VecDeque;

use crate::config::SchedPolicy;
use crate::context::Context;
use crate::error::{KernelError, KernelResult};
use crate::stack::Stack;
use crate::thread::{Thread, ThreadBody, ThreadId};

pub struct Scheduler {
    threads: Box<[Thread]>,
    current_thread: ThreadId,
    last_assigned: ThreadId,
    policy: SchedPolicy,
    /// Ready threads in arrival order; only maintained under `Fifo`.
    run_queue: VecDeque<ThreadId>,
}

impl Scheduler {
    /// A registry with every slot free, positioned at thread 0.
    pub fn new(capacity: usize, policy: SchedPolicy) -> Self {
        Scheduler {
            threads: (0..capacity).map(Thread::free).collect(),
            current_thread: 0,
            last_assigned: 0,
            policy,
            run_queue: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.threads.len()
    }

    pub fn current_thread(&self) -> ThreadId {
        self.current_thread
    }

    pub fn last_assigned(&self) -> ThreadId {
        self.last_assigned
    }

    pub fn is_active(&self, id: ThreadId) -> bool {
        self.threads.get(id).is_some_and(Thread::is_active)
    }

    pub fn active_count(&self) -> usize {
        self.threads.iter().filter(|t| t.is_active()).count()
    }

    /// Installs the first thread in slot 0 and makes it current.
    pub fn install_main(&mut self, stack: Stack, context: Context, entry: ThreadBody) {
        self.threads[0].activate(stack, context, entry);
        self.current_thread = 0;
        self.last_assigned = 0;
    }

    /// First free slot scanning circularly from just past the last
    /// assigned ID.
    pub fn find_free(&self) -> Option<ThreadId> {
        let capacity = self.capacity();
        (1..=capacity)
            .map(|offset| (self.last_assigned + offset) % capacity)
            .find(|&id| !self.threads[id].is_active())
    }

    /// Activates a slot returned by [`find_free`](Self::find_free).
    pub fn admit(&mut self, id: ThreadId, stack: Stack, context: Context, entry: ThreadBody) {
        self.threads[id].activate(stack, context, entry);
        self.last_assigned = id;
        if self.policy == SchedPolicy::Fifo {
            self.run_queue.push_back(id);
        }
    }

    /// Checks that `target` names an active slot.
    pub fn validate_target(&self, target: i64) -> KernelResult<ThreadId> {
        let id = usize::try_from(target)
            .ok()
            .filter(|&id| id < self.capacity())
            .ok_or(KernelError::InvalidThreadId(target))?;
        if !self.threads[id].is_active() {
            return Err(KernelError::ThreadNotActive(id));
        }
        Ok(id)
    }

    /// Thread the policy would run next, never the current one.
    pub fn pick_next(&self) -> Option<ThreadId> {
        match self.policy {
            SchedPolicy::RoundRobin => {
                let capacity = self.capacity();
                (1..capacity)
                    .map(|offset| (self.current_thread + offset) % capacity)
                    .find(|&id| self.threads[id].is_active())
            }
            SchedPolicy::Fifo => self.run_queue.front().copied(),
        }
    }

    /// Bookkeeping for a switch from the current thread to `target`.
    ///
    /// Returns the thread being switched away from. Afterwards `target` is
    /// current and remembers who resumed it.
    pub fn hand_off(&mut self, target: ThreadId) -> ThreadId {
        let prev = self.current_thread;
        if self.policy == SchedPolicy::Fifo {
            if self.threads[prev].is_active() {
                self.run_queue.push_back(prev);
            }
            if let Some(pos) = self.run_queue.iter().position(|&id| id == target) {
                self.run_queue.remove(pos);
            }
        }
        self.threads[target].resumed_by = Some(prev);
        self.current_thread = target;
        prev
    }

    /// Frees the running thread's slot.
    ///
    /// `current_thread` keeps naming the freed slot until the following
    /// [`hand_off`](Self::hand_off).
    pub fn retire_current(&mut self) -> Option<Stack> {
        let id = self.current_thread;
        self.run_queue.retain(|&queued| queued != id);
        self.threads[id].release()
    }

    pub fn take_entry(&mut self) -> Option<ThreadBody> {
        self.threads[self.current_thread].entry.take()
    }

    pub fn resumed_by(&self, id: ThreadId) -> Option<ThreadId> {
        self.threads.get(id).and_then(|t| t.resumed_by)
    }

    /// Raw pointer to a slot's saved context, for the switch primitive.
    pub fn context_ptr(&mut self, id: ThreadId) -> *mut Context {
        &mut self.threads[id].context
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("current_thread", &self.current_thread)
            .field("last_assigned", &self.last_assigned)
            .field("policy", &self.policy)
            .field("run_queue", &self.run_queue)
            .field(
                "active",
                &self.threads.iter().filter(|t| t.is_active()).map(|t| t.id).collect::<Vec<_>>(),
            )
            .finish()
    }
}
