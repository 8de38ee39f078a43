use core::arch::{asm, naked_asm};

use crate::context::{mc_context_bootstrap, MCEntryFn};

pub(crate) type Flags = usize;

/// Machine context of one thread of control (AArch64, AAPCS64).
///
/// Holds the callee-saved register file including the FP callee-saved half,
/// the NZCV flags, the resume address and the stack pointer. x0-x2 are kept
/// as well: a context produced by `mc_context_make` passes the bootstrap
/// arguments through them.
#[repr(C)]
pub struct MCContext
{
    pc: usize,              // 0x00
    sp: usize,              // 0x08
    x19_x28: [usize; 10],   // 0x10
    x29: usize,             // 0x60
    lr: usize,              // 0x68
    x0: usize,              // 0x70
    x1: usize,              // 0x78
    x2: usize,              // 0x80
    flags: usize,           // 0x88
    d8_d15: [u64; 8]        // 0x90
}

impl MCContext
{
    pub const fn new() -> MCContext
    {
        MCContext {
            pc: 0,
            sp: 0,
            x19_x28: [0; 10],
            x29: 0,
            lr: 0,
            x0: 0,
            x1: 0,
            x2: 0,
            flags: 0,
            d8_d15: [0; 8]
        }
    }
}

#[inline(always)]
pub(crate) fn read_flags() -> Flags
{
    let flags: usize;
    unsafe {
        asm!(
            "mrs {0}, nzcv",
            out(reg) flags
        );
    }
    flags
}

#[unsafe(naked)]
pub(crate) unsafe extern "C" fn mc_context_capture(_cp: *mut MCContext, _flags: Flags)
{
    naked_asm!(
        // resume address is the return address; sp is already the caller's
        "mov x9, sp",
        "stp x30, x9, [x0, #0x00]",
        "stp x19, x20, [x0, #0x10]",
        "stp x21, x22, [x0, #0x20]",
        "stp x23, x24, [x0, #0x30]",
        "stp x25, x26, [x0, #0x40]",
        "stp x27, x28, [x0, #0x50]",
        "stp x29, x30, [x0, #0x60]",
        // argument-register slots, then the caller-snapshotted flags word
        "stp x0, x1, [x0, #0x70]",
        "stp x2, x1, [x0, #0x80]",
        "stp d8, d9, [x0, #0x90]",
        "stp d10, d11, [x0, #0xa0]",
        "stp d12, d13, [x0, #0xb0]",
        "stp d14, d15, [x0, #0xc0]",
        "ret"
    );
}

#[unsafe(naked)]
pub(crate) unsafe extern "C" fn mc_context_restore(_cp: *const MCContext) -> !
{
    naked_asm!(
        "ldr x9, [x0, #0x88]",
        "msr nzcv, x9",
        "ldp d8, d9, [x0, #0x90]",
        "ldp d10, d11, [x0, #0xa0]",
        "ldp d12, d13, [x0, #0xb0]",
        "ldp d14, d15, [x0, #0xc0]",
        "ldp x19, x20, [x0, #0x10]",
        "ldp x21, x22, [x0, #0x20]",
        "ldp x23, x24, [x0, #0x30]",
        "ldp x25, x26, [x0, #0x40]",
        "ldp x27, x28, [x0, #0x50]",
        "ldp x29, x30, [x0, #0x60]",
        "ldr x9, [x0, #0x08]",
        "mov sp, x9",
        "ldr x9, [x0, #0x00]",
        "ldr x2, [x0, #0x80]",
        // the base register goes last
        "ldp x0, x1, [x0, #0x70]",
        "br x9"
    );
}

#[unsafe(naked)]
pub(crate) unsafe extern "C" fn mc_context_swap(_oucp: *mut MCContext, _cp: *const MCContext, _flags: Flags)
{
    naked_asm!(
        // capture into oucp (x0)
        "mov x9, sp",
        "stp x30, x9, [x0, #0x00]",
        "stp x19, x20, [x0, #0x10]",
        "stp x21, x22, [x0, #0x20]",
        "stp x23, x24, [x0, #0x30]",
        "stp x25, x26, [x0, #0x40]",
        "stp x27, x28, [x0, #0x50]",
        "stp x29, x30, [x0, #0x60]",
        "stp x0, x1, [x0, #0x70]",
        "stp x2, x2, [x0, #0x80]",
        "stp d8, d9, [x0, #0x90]",
        "stp d10, d11, [x0, #0xa0]",
        "stp d12, d13, [x0, #0xb0]",
        "stp d14, d15, [x0, #0xc0]",
        // restore from cp (x1)
        "mov x9, x1",
        "ldr x10, [x9, #0x88]",
        "msr nzcv, x10",
        "ldp d8, d9, [x9, #0x90]",
        "ldp d10, d11, [x9, #0xa0]",
        "ldp d12, d13, [x9, #0xb0]",
        "ldp d14, d15, [x9, #0xc0]",
        "ldp x19, x20, [x9, #0x10]",
        "ldp x21, x22, [x9, #0x20]",
        "ldp x23, x24, [x9, #0x30]",
        "ldp x25, x26, [x9, #0x40]",
        "ldp x27, x28, [x9, #0x50]",
        "ldp x29, x30, [x9, #0x60]",
        "ldr x10, [x9, #0x08]",
        "mov sp, x10",
        "ldr x10, [x9, #0x00]",
        "ldr x2, [x9, #0x80]",
        "ldp x0, x1, [x9, #0x70]",
        "br x10"
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
    cp.sp = (stack as usize + stack_size) & !0xf;
    cp.pc = mc_context_bootstrap as *const () as usize;
    cp.x29 = 0;
    cp.lr = 0;
    cp.x0 = successor as usize;
    cp.x1 = func as usize;
    cp.x2 = arg as usize;
}

pub(crate) fn halt() -> !
{
    loop {
        core::hint::spin_loop();
    }
}
