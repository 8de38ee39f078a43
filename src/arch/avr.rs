use core::arch::{asm, naked_asm};

use crate::context::{mc_context_bootstrap, MCEntryFn};

// SREG snapshot.
pub(crate) type Flags = u8;

// I/O addresses shared by every AVR device.
// SREG = 0x3f, SPH = 0x3e, SPL = 0x3d.

/// Machine context of one thread of control (AVR, avr-gcc ABI).
///
/// The full 37-byte image: SREG, all 32 general-purpose registers, the
/// resume address and the stack pointer. A context produced by
/// `mc_context_make` passes the bootstrap arguments through the r25:r24,
/// r23:r22 and r21:r20 slots, as the avr-gcc calling convention wants them.
///
/// Interrupt-path integration works by handing an *explicit* `*mut MCContext`
/// to capture/restore from the service routine; there is deliberately no
/// process-wide current-context pointer in this crate.
#[repr(C)]
pub struct MCContext
{
    sreg: u8,       // 0
    r: [u8; 32],    // 1..=32
    pc: [u8; 2],    // 33, 34 (low, high)
    sp: [u8; 2]     // 35, 36 (low, high)
}

impl MCContext
{
    pub const fn new() -> MCContext
    {
        MCContext {
            sreg: 0,
            r: [0; 32],
            pc: [0; 2],
            sp: [0; 2]
        }
    }
}

#[inline(always)]
pub(crate) fn read_flags() -> Flags
{
    let sreg: u8;
    unsafe {
        asm!(
            "in {0}, 0x3f",
            out(reg) sreg
        );
    }
    sreg
}

/*
The save sequence expects the return address on top of the stack (the state
right after a CALL) and the context address in Z. It walks the structure
front to back with post-increment stores, then fixes up the registers it had
to clobber on the way (r26-r31 and, transiently, SREG) so the caller cannot
tell the difference. The restore sequence is the mirror image, walking back
to front with pre-decrement loads and leaving via RET with the saved resume
address planted on the new stack.
*/

#[unsafe(naked)]
pub(crate) unsafe extern "C" fn mc_context_capture(_cp: *mut MCContext, _flags: Flags)
{
    naked_asm!(
        // cp arrives in r25:r24, the SREG snapshot in r22
        "push r30",
        "push r31",
        "mov r30, r24",
        "mov r31, r25",
        "st Z+, r22",
        "st Z+, r0",
        "st Z+, r1",
        "st Z+, r2",
        "st Z+, r3",
        "st Z+, r4",
        "st Z+, r5",
        "st Z+, r6",
        "st Z+, r7",
        "st Z+, r8",
        "st Z+, r9",
        "st Z+, r10",
        "st Z+, r11",
        "st Z+, r12",
        "st Z+, r13",
        "st Z+, r14",
        "st Z+, r15",
        "st Z+, r16",
        "st Z+, r17",
        "st Z+, r18",
        "st Z+, r19",
        "st Z+, r20",
        "st Z+, r21",
        "st Z+, r22",
        "st Z+, r23",
        "st Z+, r24",
        "st Z+, r25",
        "st Z+, r26",
        "st Z+, r27",
        "st Z+, r28",
        "st Z+, r29",
        // Z itself was saved on entry; move the cursor to Y and store it
        "mov r28, r30",
        "mov r29, r31",
        "pop r31",
        "pop r30",
        "st Y+, r30",
        "st Y+, r31",
        // the return address doubles as the resume address
        "pop r30",
        "pop r31",
        "st Y+, r31",
        "st Y+, r30",
        "in r26, 0x3d",
        "in r27, 0x3e",
        "st Y+, r26",
        "st Y, r27",
        // put the return address back for the RET below
        "push r31",
        "push r30",
        // undo the clobbering of r26-r31 (SREG kept intact around SBIW)
        "mov r30, r28",
        "mov r31, r29",
        "in r28, 0x3f",
        "sbiw r30, 9",
        "out 0x3f, r28",
        "ld r26, Z+",
        "ld r27, Z+",
        "ld r28, Z+",
        "ld r29, Z+",
        "push r28",
        "push r29",
        "mov r28, r30",
        "mov r29, r31",
        "ld r30, Y+",
        "ld r31, Y",
        "pop r29",
        "pop r28",
        "ret"
    );
}

#[unsafe(naked)]
pub(crate) unsafe extern "C" fn mc_context_restore(_cp: *const MCContext) -> !
{
    naked_asm!(
        // cp arrives in r25:r24; start from the stack pointer at the back
        "mov r30, r24",
        "mov r31, r25",
        "adiw r30, 36",
        "ld r0, Z",
        "out 0x3e, r0",
        "ld r0, -Z",
        "out 0x3d, r0",
        // plant the resume address on the new stack
        "ld r1, -Z",
        "ld r0, -Z",
        "push r0",
        "push r1",
        // stash the saved Z value below it
        "mov r28, r30",
        "mov r29, r31",
        "ld r31, -Y",
        "ld r30, -Y",
        "push r31",
        "push r30",
        "mov r30, r28",
        "mov r31, r29",
        "ld r29, -Z",
        "ld r28, -Z",
        "ld r27, -Z",
        "ld r26, -Z",
        "ld r25, -Z",
        "ld r24, -Z",
        "ld r23, -Z",
        "ld r22, -Z",
        "ld r21, -Z",
        "ld r20, -Z",
        "ld r19, -Z",
        "ld r18, -Z",
        "ld r17, -Z",
        "ld r16, -Z",
        "ld r15, -Z",
        "ld r14, -Z",
        "ld r13, -Z",
        "ld r12, -Z",
        "ld r11, -Z",
        "ld r10, -Z",
        "ld r9, -Z",
        "ld r8, -Z",
        "ld r7, -Z",
        "ld r6, -Z",
        "ld r5, -Z",
        "ld r4, -Z",
        "ld r3, -Z",
        "ld r2, -Z",
        "ld r1, -Z",
        "ld r0, -Z",
        // SREG, then the stashed Z, then RET pops the resume address
        "push r0",
        "ld r0, -Z",
        "out 0x3f, r0",
        "pop r0",
        "pop r30",
        "pop r31",
        "ret"
    );
}

#[unsafe(naked)]
pub(crate) unsafe extern "C" fn mc_context_swap(_oucp: *mut MCContext, _cp: *const MCContext, _flags: Flags)
{
    naked_asm!(
        // oucp in r25:r24, cp in r23:r22, the SREG snapshot in r20;
        // the save block mirrors mc_context_capture and leaves r22/r23 intact
        "push r30",
        "push r31",
        "mov r30, r24",
        "mov r31, r25",
        "st Z+, r20",
        "st Z+, r0",
        "st Z+, r1",
        "st Z+, r2",
        "st Z+, r3",
        "st Z+, r4",
        "st Z+, r5",
        "st Z+, r6",
        "st Z+, r7",
        "st Z+, r8",
        "st Z+, r9",
        "st Z+, r10",
        "st Z+, r11",
        "st Z+, r12",
        "st Z+, r13",
        "st Z+, r14",
        "st Z+, r15",
        "st Z+, r16",
        "st Z+, r17",
        "st Z+, r18",
        "st Z+, r19",
        "st Z+, r20",
        "st Z+, r21",
        "st Z+, r22",
        "st Z+, r23",
        "st Z+, r24",
        "st Z+, r25",
        "st Z+, r26",
        "st Z+, r27",
        "st Z+, r28",
        "st Z+, r29",
        "mov r28, r30",
        "mov r29, r31",
        "pop r31",
        "pop r30",
        "st Y+, r30",
        "st Y+, r31",
        "pop r30",
        "pop r31",
        "st Y+, r31",
        "st Y+, r30",
        "in r26, 0x3d",
        "in r27, 0x3e",
        "st Y+, r26",
        "st Y, r27",
        "push r31",
        "push r30",
        "mov r30, r28",
        "mov r31, r29",
        "in r28, 0x3f",
        "sbiw r30, 9",
        "out 0x3f, r28",
        "ld r26, Z+",
        "ld r27, Z+",
        "ld r28, Z+",
        "ld r29, Z+",
        "push r28",
        "push r29",
        "mov r28, r30",
        "mov r29, r31",
        "ld r30, Y+",
        "ld r31, Y",
        "pop r29",
        "pop r28",
        // activate cp; the restore block mirrors mc_context_restore
        "mov r30, r22",
        "mov r31, r23",
        "adiw r30, 36",
        "ld r0, Z",
        "out 0x3e, r0",
        "ld r0, -Z",
        "out 0x3d, r0",
        "ld r1, -Z",
        "ld r0, -Z",
        "push r0",
        "push r1",
        "mov r28, r30",
        "mov r29, r31",
        "ld r31, -Y",
        "ld r30, -Y",
        "push r31",
        "push r30",
        "mov r30, r28",
        "mov r31, r29",
        "ld r29, -Z",
        "ld r28, -Z",
        "ld r27, -Z",
        "ld r26, -Z",
        "ld r25, -Z",
        "ld r24, -Z",
        "ld r23, -Z",
        "ld r22, -Z",
        "ld r21, -Z",
        "ld r20, -Z",
        "ld r19, -Z",
        "ld r18, -Z",
        "ld r17, -Z",
        "ld r16, -Z",
        "ld r15, -Z",
        "ld r14, -Z",
        "ld r13, -Z",
        "ld r12, -Z",
        "ld r11, -Z",
        "ld r10, -Z",
        "ld r9, -Z",
        "ld r8, -Z",
        "ld r7, -Z",
        "ld r6, -Z",
        "ld r5, -Z",
        "ld r4, -Z",
        "ld r3, -Z",
        "ld r2, -Z",
        "ld r1, -Z",
        "ld r0, -Z",
        "push r0",
        "ld r0, -Z",
        "out 0x3f, r0",
        "pop r0",
        "pop r30",
        "pop r31",
        "ret"
    );
}

/// Rewrites a captured context so that its activation enters
/// `mc_context_bootstrap(successor, func, arg)` on `stack`.
///
/// The stack pointer starts at the last byte of the region (AVR pushes
/// post-decrement); the three arguments land in the register slots the
/// avr-gcc calling convention assigns them.
pub(crate) unsafe fn mc_context_make(
    cp: &mut MCContext,
    stack: *mut u8, stack_size: usize,
    successor: *const MCContext,
    func: MCEntryFn, arg: *mut ())
{
    let sp = stack as usize + stack_size - 1;
    cp.sp = [(sp & 0xff) as u8, (sp >> 8) as u8];

    let pc = mc_context_bootstrap as *const () as usize;
    cp.pc = [(pc & 0xff) as u8, (pc >> 8) as u8];

    let successor = successor as usize;
    cp.r[24] = (successor & 0xff) as u8;
    cp.r[25] = (successor >> 8) as u8;

    let func = func as usize;
    cp.r[22] = (func & 0xff) as u8;
    cp.r[23] = (func >> 8) as u8;

    let arg = arg as usize;
    cp.r[20] = (arg & 0xff) as u8;
    cp.r[21] = (arg >> 8) as u8;
}

/// Masks interrupts; a ready-made guard for [`crate::set_swap_guard`].
/// The SREG snapshot captured into the outgoing context predates the mask,
/// so resuming that context unmasks again.
pub fn irq_lock()
{
    unsafe {
        asm!("cli");
    }
}

pub(crate) fn halt() -> !
{
    loop {}
}
