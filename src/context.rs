//! Saved execution state and the raw switch primitive.
//!
//! A [`Context`] holds the callee-saved registers of a suspended thread. The
//! caller-saved ones are already spilled by the compiler around the call to
//! [`switch_context`], so this is everything needed to resume it.

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("mykernel only supports x86_64 and aarch64");

/// Entry point of a freshly primed context. It must never return.
pub type EntryFn = extern "C" fn() -> !;

#[cfg(target_arch = "x86_64")]
#[repr(C)]
#[derive(Debug, Default)]
pub struct Context {
    /// Points at the resume address left by the call into `switch_context`.
    pub rsp: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub mxcsr: u32,
    pub x87_cw: u32,
}

#[cfg(target_arch = "aarch64")]
#[repr(C)]
#[derive(Debug, Default)]
pub struct Context {
    pub x19: u64,
    pub x20: u64,
    pub x21: u64,
    pub x22: u64,
    pub x23: u64,
    pub x24: u64,
    pub x25: u64,
    pub x26: u64,
    pub x27: u64,
    pub x28: u64,
    /// Frame pointer (x29).
    pub fp: u64,
    /// Link register (x30); the resume address.
    pub lr: u64,
    pub sp: u64,
    pub d8: u64,
    pub d9: u64,
    pub d10: u64,
    pub d11: u64,
    pub d12: u64,
    pub d13: u64,
    pub d14: u64,
    pub d15: u64,
}

impl Context {
    /// Builds a context whose first resume calls `entry` on the stack ending
    /// at `stack_top`.
    ///
    /// # Safety
    /// `stack_top` must be 16-byte aligned and be the end of a writable
    /// region with room for at least two words.
    #[cfg(target_arch = "x86_64")]
    pub unsafe fn prepare(stack_top: *mut u8, entry: EntryFn) -> Self {
        const DEFAULT_MXCSR: u32 = 0x1f80;
        const DEFAULT_X87_CW: u32 = 0x037f;

        debug_assert_eq!(stack_top as usize % crate::stack::STACK_ALIGN, 0);
        let top = stack_top.cast::<u64>();
        // `ret` pops the entry address, leaving rsp at top - 8 exactly as a
        // call would. The zero word is the entry's (never used) return address.
        unsafe {
            top.sub(1).write(0);
            top.sub(2).write(entry as usize as u64);
        }
        Self {
            rsp: unsafe { top.sub(2) } as u64,
            mxcsr: DEFAULT_MXCSR,
            x87_cw: DEFAULT_X87_CW,
            ..Self::default()
        }
    }

    /// Builds a context whose first resume calls `entry` on the stack ending
    /// at `stack_top`.
    ///
    /// # Safety
    /// `stack_top` must be 16-byte aligned and be the end of a writable
    /// region.
    #[cfg(target_arch = "aarch64")]
    pub unsafe fn prepare(stack_top: *mut u8, entry: EntryFn) -> Self {
        debug_assert_eq!(stack_top as usize % crate::stack::STACK_ALIGN, 0);
        Self {
            lr: entry as usize as u64,
            sp: stack_top as u64,
            ..Self::default()
        }
    }
}

/// Saves the current registers into `from` and resumes `to`.
///
/// Returns when some later switch names `from` as its target. `from` and
/// `to` may be the same context.
///
/// # Safety
/// `to` must hold a context saved by this function or built by
/// [`Context::prepare`], whose stack is still alive. Both pointers must stay
/// valid until the switch back into `from`.
#[cfg(target_arch = "x86_64")]
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(from: *mut Context, to: *const Context) {
    core::arch::naked_asm!(
        "
        mov qword ptr [rdi + 0x00], rsp
        mov qword ptr [rdi + 0x08], rbp
        mov qword ptr [rdi + 0x10], rbx
        mov qword ptr [rdi + 0x18], r12
        mov qword ptr [rdi + 0x20], r13
        mov qword ptr [rdi + 0x28], r14
        mov qword ptr [rdi + 0x30], r15
        stmxcsr dword ptr [rdi + 0x38]
        fnstcw word ptr [rdi + 0x3c]

        mov rsp, qword ptr [rsi + 0x00]
        mov rbp, qword ptr [rsi + 0x08]
        mov rbx, qword ptr [rsi + 0x10]
        mov r12, qword ptr [rsi + 0x18]
        mov r13, qword ptr [rsi + 0x20]
        mov r14, qword ptr [rsi + 0x28]
        mov r15, qword ptr [rsi + 0x30]
        ldmxcsr dword ptr [rsi + 0x38]
        fldcw word ptr [rsi + 0x3c]

        ret
        "
    );
}

/// Saves the current registers into `from` and resumes `to`.
///
/// # Safety
/// See the x86_64 variant.
#[cfg(target_arch = "aarch64")]
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(from: *mut Context, to: *const Context) {
    core::arch::naked_asm!(
        "
        stp x19, x20, [x0, #0]
        stp x21, x22, [x0, #16]
        stp x23, x24, [x0, #32]
        stp x25, x26, [x0, #48]
        stp x27, x28, [x0, #64]
        stp x29, x30, [x0, #80]
        mov x9, sp
        str x9, [x0, #96]
        stp d8, d9, [x0, #104]
        stp d10, d11, [x0, #120]
        stp d12, d13, [x0, #136]
        stp d14, d15, [x0, #152]

        ldp x19, x20, [x1, #0]
        ldp x21, x22, [x1, #16]
        ldp x23, x24, [x1, #32]
        ldp x25, x26, [x1, #48]
        ldp x27, x28, [x1, #64]
        ldp x29, x30, [x1, #80]
        ldr x9, [x1, #96]
        mov sp, x9
        ldp d8, d9, [x1, #104]
        ldp d10, d11, [x1, #120]
        ldp d12, d13, [x1, #136]
        ldp d14, d15, [x1, #152]

        ret
        "
    );
}
