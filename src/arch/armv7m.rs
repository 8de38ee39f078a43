use core::arch::{asm, naked_asm};

use crate::context::{mc_context_bootstrap, MCEntryFn};

// APSR condition flags in the upper bits, PRIMASK in bit 0.
pub(crate) type Flags = usize;

/// Machine context of one thread of control (Armv7-M and Armv8-M Mainline, AAPCS).
///
/// Holds r4-r11, the APSR/PRIMASK word, the resume address and the stack
/// pointer. r0-r2 are kept as well: a context produced by `mc_context_make`
/// passes the bootstrap arguments through them.
///
/// Hard-float (`eabihf`) targets are out of scope: s16-s31 and FPSCR are
/// not part of the context image.
#[repr(C)]
pub struct MCContext
{
    pc: usize,          // 0x00
    sp: usize,          // 0x04
    r4_r11: [usize; 8], // 0x08
    r0: usize,          // 0x28
    r1: usize,          // 0x2c
    r2: usize,          // 0x30
    flags: usize        // 0x34
}

impl MCContext
{
    pub const fn new() -> MCContext
    {
        MCContext {
            pc: 0,
            sp: 0,
            r4_r11: [0; 8],
            r0: 0,
            r1: 0,
            r2: 0,
            flags: 0
        }
    }
}

#[inline(always)]
pub(crate) fn read_flags() -> Flags
{
    let apsr: usize;
    let primask: usize;
    unsafe {
        asm!(
            "mrs {0}, apsr",
            "mrs {1}, primask",
            out(reg) apsr,
            out(reg) primask
        );
    }
    apsr | (primask & 1)
}

#[unsafe(naked)]
pub(crate) unsafe extern "C" fn mc_context_capture(_cp: *mut MCContext, _flags: Flags)
{
    naked_asm!(
        // resume address is the return address; sp is already the caller's
        "str lr, [r0, #0x00]",
        "mov r12, sp",
        "str r12, [r0, #0x04]",
        "add r12, r0, #0x08",
        "stmia r12!, {{r4-r11}}",
        // argument-register slots, then the caller-snapshotted flags word
        "str r0, [r0, #0x28]",
        "str r1, [r0, #0x2c]",
        "str r2, [r0, #0x30]",
        "str r1, [r0, #0x34]",
        "bx lr"
    );
}

#[unsafe(naked)]
pub(crate) unsafe extern "C" fn mc_context_restore(_cp: *const MCContext) -> !
{
    naked_asm!(
        "ldr r12, [r0, #0x34]",
        "msr apsr_nzcvq, r12",
        "and r12, r12, #1",
        "msr primask, r12",
        "add r12, r0, #0x08",
        "ldmia r12!, {{r4-r11}}",
        "ldr r12, [r0, #0x04]",
        "mov sp, r12",
        "ldr r1, [r0, #0x2c]",
        "ldr r2, [r0, #0x30]",
        "ldr r12, [r0, #0x00]",
        // the base register goes last
        "ldr r0, [r0, #0x28]",
        "bx r12"
    );
}

#[unsafe(naked)]
pub(crate) unsafe extern "C" fn mc_context_swap(_oucp: *mut MCContext, _cp: *const MCContext, _flags: Flags)
{
    naked_asm!(
        // capture into oucp (r0)
        "str lr, [r0, #0x00]",
        "mov r12, sp",
        "str r12, [r0, #0x04]",
        "add r12, r0, #0x08",
        "stmia r12!, {{r4-r11}}",
        "str r0, [r0, #0x28]",
        "str r1, [r0, #0x2c]",
        "str r2, [r0, #0x30]",
        "str r2, [r0, #0x34]",
        // restore from cp (r1)
        "ldr r12, [r1, #0x34]",
        "msr apsr_nzcvq, r12",
        "and r12, r12, #1",
        "msr primask, r12",
        "add r12, r1, #0x08",
        "ldmia r12!, {{r4-r11}}",
        "ldr r12, [r1, #0x04]",
        "mov sp, r12",
        "ldr r2, [r1, #0x30]",
        "ldr r12, [r1, #0x00]",
        "ldr r0, [r1, #0x28]",
        "ldr r1, [r1, #0x2c]",
        "bx r12"
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
    // AAPCS wants an 8-byte aligned stack; the Thumb bit comes with the
    // function pointer value
    cp.sp = (stack as usize + stack_size) & !0x7;
    cp.pc = mc_context_bootstrap as *const () as usize;
    cp.r0 = successor as usize;
    cp.r1 = func as usize;
    cp.r2 = arg as usize;
}

/// Masks interrupts; a ready-made guard for [`crate::set_swap_guard`].
/// The flags word captured into the outgoing context predates the mask,
/// so resuming that context unmasks again.
pub fn irq_lock()
{
    cortex_m::interrupt::disable();
}

pub(crate) fn halt() -> !
{
    loop {
        cortex_m::asm::bkpt();
    }
}
