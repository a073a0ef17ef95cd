//! Thread stacks.
//!
//! Every active thread runs on its own [`Stack`], a region disjoint from all
//! others. On Linux the region is an anonymous mapping with an inaccessible
//! guard page below it, so running off the bottom faults instead of
//! scribbling over a neighbour. Elsewhere it comes from the global allocator.

use std::io;
use std::ops::Range;
use std::ptr::NonNull;

use tracing::trace;

use crate::error::{KernelError, KernelResult};

/// Smallest stack the kernel will hand out.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Alignment of the initial stack pointer required by both supported ABIs.
pub const STACK_ALIGN: usize = 16;

const FALLBACK_PAGE_SIZE: usize = 4096;

static PAGE_SIZE: spin::Once<usize> = spin::Once::new();

/// Page size of the host, queried once per process.
pub fn page_size() -> usize {
    *PAGE_SIZE.call_once(|| {
        #[cfg(target_os = "linux")]
        {
            // SAFETY: sysconf has no preconditions.
            let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
            if size > 0 {
                return size as usize;
            }
        }
        FALLBACK_PAGE_SIZE
    })
}

/// An owned, page-aligned stack region.
pub struct Stack {
    /// Start of the whole allocation, guard page included.
    mapping: NonNull<u8>,
    mapping_len: usize,
    guard_len: usize,
    /// Usable bytes above the guard.
    len: usize,
}

impl Stack {
    /// Allocates a stack with at least `size` usable bytes.
    ///
    /// The size is raised to [`MIN_STACK_SIZE`] and rounded up to a page.
    pub fn new(size: usize) -> KernelResult<Self> {
        let page = page_size();
        let len = size
            .max(MIN_STACK_SIZE)
            .checked_next_multiple_of(page)
            .ok_or_else(|| oversized(size))?;
        let stack = Self::map(len, page)?;
        trace!(
            bottom = stack.bottom() as usize,
            len = stack.len,
            "allocated thread stack"
        );
        Ok(stack)
    }

    #[cfg(target_os = "linux")]
    fn map(len: usize, page: usize) -> KernelResult<Self> {
        let guard_len = page;
        let mapping_len = len.checked_add(guard_len).ok_or_else(|| oversized(len))?;

        // SAFETY: anonymous private mapping, no address hint.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                mapping_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(allocation_error(len, io::Error::last_os_error()));
        }

        // SAFETY: the first page lies inside the mapping created above.
        if unsafe { libc::mprotect(ptr, guard_len, libc::PROT_NONE) } != 0 {
            let source = io::Error::last_os_error();
            // SAFETY: unmapping exactly what was mapped.
            unsafe { libc::munmap(ptr, mapping_len) };
            return Err(allocation_error(len, source));
        }

        let mapping = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| allocation_error(len, io::ErrorKind::OutOfMemory.into()))?;
        Ok(Self {
            mapping,
            mapping_len,
            guard_len,
            len,
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn map(len: usize, page: usize) -> KernelResult<Self> {
        let layout = std::alloc::Layout::from_size_align(len, page)
            .map_err(|e| allocation_error(len, io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { std::alloc::alloc(layout) };
        let mapping = NonNull::new(ptr)
            .ok_or_else(|| allocation_error(len, io::ErrorKind::OutOfMemory.into()))?;
        Ok(Self {
            mapping,
            mapping_len: len,
            guard_len: 0,
            len,
        })
    }

    /// Usable size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Lowest usable address.
    pub fn bottom(&self) -> *mut u8 {
        // SAFETY: the guard is a prefix of the mapping.
        unsafe { self.mapping.as_ptr().add(self.guard_len) }
    }

    /// One past the highest usable address; the initial stack pointer.
    pub fn top(&self) -> *mut u8 {
        // SAFETY: bottom + len is the end of the mapping.
        unsafe { self.bottom().add(self.len) }
    }

    /// Usable address range.
    pub fn region(&self) -> Range<usize> {
        self.bottom() as usize..self.top() as usize
    }

    pub fn contains(&self, addr: usize) -> bool {
        self.region().contains(&addr)
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        trace!(bottom = self.bottom() as usize, "releasing thread stack");
        self.unmap();
    }
}

impl Stack {
    #[cfg(target_os = "linux")]
    fn unmap(&mut self) {
        // SAFETY: the mapping was created by `map` with this length.
        unsafe {
            libc::munmap(self.mapping.as_ptr().cast(), self.mapping_len);
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn unmap(&mut self) {
        // SAFETY: allocated by `map` with the same layout.
        unsafe {
            let layout =
                std::alloc::Layout::from_size_align_unchecked(self.mapping_len, page_size());
            std::alloc::dealloc(self.mapping.as_ptr(), layout);
        }
    }
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("bottom", &format_args!("{:#x}", self.bottom() as usize))
            .field("top", &format_args!("{:#x}", self.top() as usize))
            .field("guard_len", &self.guard_len)
            .finish()
    }
}

fn allocation_error(size: usize, source: io::Error) -> KernelError {
    KernelError::StackAllocation { size, source }
}

fn oversized(size: usize) -> KernelError {
    allocation_error(
        size,
        io::Error::new(io::ErrorKind::InvalidInput, "stack size overflows the address space"),
    )
}

/// Released stacks waiting to back a future thread.
///
/// The pool never frees anything itself: the registry caps how many stacks
/// can exist, and the stack of an exiting thread is parked here while that
/// thread is still running on it.
#[derive(Debug)]
pub struct StackPool {
    stack_size: usize,
    free: Vec<Stack>,
}

impl StackPool {
    pub fn new(stack_size: usize, capacity: usize) -> Self {
        Self {
            stack_size,
            free: Vec::with_capacity(capacity),
        }
    }

    /// Hands out a recycled stack, or maps a fresh one.
    pub fn acquire(&mut self) -> KernelResult<Stack> {
        match self.free.pop() {
            Some(stack) => Ok(stack),
            None => Stack::new(self.stack_size),
        }
    }

    /// Takes back a stack whose owner has exited.
    ///
    /// The memory is not reused before the next [`acquire`](Self::acquire).
    pub fn release(&mut self, stack: Stack) {
        self.free.push(stack);
    }

    /// Number of stacks ready for reuse.
    pub fn cached(&self) -> usize {
        self.free.len()
    }
}
