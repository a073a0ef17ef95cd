use std::ops::Range;

use crate::context::Context;
use crate::stack::Stack;

/// Slot index of a thread, in `0..max_threads`.
pub type ThreadId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Free,
    Active,
}

/// Body of a thread that has not started running yet.
pub type ThreadBody = Box<dyn FnOnce() + 'static>;

/// One registry slot.
pub struct Thread {
    pub id: ThreadId,
    pub state: ThreadState,
    /// Saved registers; only meaningful while active and not running.
    pub context: Context,
    pub stack: Option<Stack>,
    /// Taken by the trampoline on first resume.
    pub entry: Option<ThreadBody>,
    /// Whoever most recently switched into this slot.
    pub resumed_by: Option<ThreadId>,
}

impl Thread {
    pub fn free(id: ThreadId) -> Self {
        Thread {
            id,
            state: ThreadState::Free,
            context: Context::default(),
            stack: None,
            entry: None,
            resumed_by: None,
        }
    }

    pub fn activate(&mut self, stack: Stack, context: Context, entry: ThreadBody) {
        debug_assert_eq!(self.state, ThreadState::Free);
        self.state = ThreadState::Active;
        self.context = context;
        self.stack = Some(stack);
        self.entry = Some(entry);
        self.resumed_by = None;
    }

    /// Frees the slot and hands back its stack.
    ///
    /// When the slot belongs to the running thread, the caller must not let
    /// the stack be reused before switching away from it.
    pub fn release(&mut self) -> Option<Stack> {
        self.state = ThreadState::Free;
        self.context = Context::default();
        self.entry = None;
        self.resumed_by = None;
        self.stack.take()
    }

    pub fn is_active(&self) -> bool {
        self.state == ThreadState::Active
    }

    pub fn stack_region(&self) -> Option<Range<usize>> {
        self.stack.as_ref().map(Stack::region)
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("stack", &self.stack)
            .field("started", &self.entry.is_none())
            .field("resumed_by", &self.resumed_by)
            .finish()
    }
}
