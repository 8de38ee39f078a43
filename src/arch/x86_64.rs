use core::arch::{asm, naked_asm};

use crate::context::{mc_context_bootstrap, MCEntryFn};

pub(crate) type Flags = usize;

/// Machine context of one thread of control (x86-64, System V ABI).
///
/// Holds the callee-saved register file, the RFLAGS image, the resume address
/// and the stack pointer. RDI/RSI/RDX are kept as well: a context produced by
/// `mc_context_make` passes the bootstrap arguments through them.
#[repr(C)]
pub struct MCContext
{
    rip: usize,     // 0x00
    rsp: usize,     // 0x08
    rbx: usize,     // 0x10
    rbp: usize,     // 0x18
    r12: usize,     // 0x20
    r13: usize,     // 0x28
    r14: usize,     // 0x30
    r15: usize,     // 0x38
    rdi: usize,     // 0x40
    rsi: usize,     // 0x48
    rdx: usize,     // 0x50
    rflags: usize   // 0x58
}

impl MCContext
{
    pub const fn new() -> MCContext
    {
        MCContext {
            rip: 0,
            rsp: 0,
            rbx: 0,
            rbp: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            rdi: 0,
            rsi: 0,
            rdx: 0,
            rflags: 0
        }
    }
}

#[inline(always)]
pub(crate) fn read_flags() -> Flags
{
    let flags: usize;
    unsafe {
        asm!(
            "pushfq",
            "pop {0}",
            out(reg) flags
        );
    }
    flags
}

#[unsafe(naked)]
pub(crate) unsafe extern "C" fn mc_context_capture(_cp: *mut MCContext, _flags: Flags)
{
    naked_asm!(
        // resume address and post-return stack pointer
        "mov rax, [rsp]",
        "mov [rdi + 0x00], rax",
        "lea rax, [rsp + 8]",
        "mov [rdi + 0x08], rax",
        // callee-saved register file
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], rbp",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], r13",
        "mov [rdi + 0x30], r14",
        "mov [rdi + 0x38], r15",
        // argument-register slots
        "mov [rdi + 0x40], rdi",
        "mov [rdi + 0x48], rsi",
        "mov [rdi + 0x50], rdx",
        // flags word as snapshotted by the caller
        "mov [rdi + 0x58], rsi",
        "ret"
    );
}

#[unsafe(naked)]
pub(crate) unsafe extern "C" fn mc_context_restore(_cp: *const MCContext) -> !
{
    naked_asm!(
        "push qword ptr [rdi + 0x58]",
        "popfq",
        "mov rbx, [rdi + 0x10]",
        "mov rbp, [rdi + 0x18]",
        "mov r12, [rdi + 0x20]",
        "mov r13, [rdi + 0x28]",
        "mov r14, [rdi + 0x30]",
        "mov r15, [rdi + 0x38]",
        "mov rsi, [rdi + 0x48]",
        "mov rdx, [rdi + 0x50]",
        "mov rsp, [rdi + 0x08]",
        "mov rax, [rdi + 0x00]",
        // the base register goes last
        "mov rdi, [rdi + 0x40]",
        "jmp rax"
    );
}

#[unsafe(naked)]
pub(crate) unsafe extern "C" fn mc_context_swap(_oucp: *mut MCContext, _cp: *const MCContext, _flags: Flags)
{
    naked_asm!(
        // capture into oucp (rdi)
        "mov rax, [rsp]",
        "mov [rdi + 0x00], rax",
        "lea rax, [rsp + 8]",
        "mov [rdi + 0x08], rax",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], rbp",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], r13",
        "mov [rdi + 0x30], r14",
        "mov [rdi + 0x38], r15",
        "mov [rdi + 0x40], rdi",
        "mov [rdi + 0x48], rsi",
        "mov [rdi + 0x50], rdx",
        "mov [rdi + 0x58], rdx",
        // restore from cp (rsi)
        "push qword ptr [rsi + 0x58]",
        "popfq",
        "mov rbx, [rsi + 0x10]",
        "mov rbp, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov r13, [rsi + 0x28]",
        "mov r14, [rsi + 0x30]",
        "mov r15, [rsi + 0x38]",
        "mov rdx, [rsi + 0x50]",
        "mov rsp, [rsi + 0x08]",
        "mov rax, [rsi + 0x00]",
        "mov rdi, [rsi + 0x40]",
        "mov rsi, [rsi + 0x48]",
        "jmp rax"
    );
}

/// Rewrites a captured context so that its activation enters
/// `mc_context_bootstrap(successor, func, arg)` on `stack`.
pub(crate) unsafe fn mc_context_make(
    cp: &mut MCContext,
    stack: *mut u8, stack_size: usize,
    successor: *const MCContext,
    func: MCEntryFn, arg: *mut ())
{
    let top = (stack as usize + stack_size) & !0xf;

    // entered by a jump, so mimic the stack layout right after a call;
    // a zeroed return address slot keeps stack walkers from running wild
    let sp = top - 8;
    (sp as *mut usize).write(0);

    cp.rsp = sp;
    cp.rip = mc_context_bootstrap as *const () as usize;
    cp.rdi = successor as usize;
    cp.rsi = func as usize;
    cp.rdx = arg as usize;
}

pub(crate) fn halt() -> !
{
    loop {
        core::hint::spin_loop();
    }
}
