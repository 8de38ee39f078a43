/*!
Execution context switching.

`capture`, `restore`, `swap` and `construct` are more or less direct
substitutes for the `getcontext`/`setcontext`/`swapcontext`/`makecontext`
family that used to be part of the POSIX standard, reduced to what a bare
microcontroller needs.

There are two important differences from the POSIX functions:

* No sanity checking of parameters. These operations are barely useful on
  their own; in most cases they are the basis of a higher-level abstraction,
  and that is the right place to validate. They also sit in the hot spots of
  an application, where a context switch can happen thousands of times per
  second on a core running at a few MHz.
* As a direct consequence: no error reporting. Whatever you pass in is taken
  at face value, and passing garbage is undefined behaviour. One could call
  the operations "unsafe"; "sharp" is closer to the intent. The checked tier
  lives in [`crate::MCCoro`].

A context value is meaningful only if it was produced by `capture`, `swap`
or `construct`.
*/

use crate::arch;

pub use crate::arch::MCContext;

/// Entry routine type accepted by [`construct`].
pub type MCEntryFn = extern "C" fn(arg: *mut ());

//

static mut O_SWAP_GUARD: Option<fn()> = None;

/// Installs the critical-section guard that [`swap`] invokes right before
/// capturing the outgoing context.
///
/// On targets where an interrupt may fire mid-transfer, pass a routine that
/// masks interrupts (`irq_lock` on AVR and Armv7-M). The flags word of the
/// outgoing context is snapshotted *before* the guard runs, so resuming that
/// context re-establishes the pre-guard interrupt state; no unlock
/// counterpart is needed.
///
/// `None` (the default) is a valid configuration on targets without
/// asynchronous reentry. Install the guard once, before the first coroutine
/// activity; there is no synchronisation around the slot.
pub fn set_swap_guard(guard: Option<fn()>)
{
    unsafe {
        O_SWAP_GUARD = guard;
    }
}

fn swap_guard() -> Option<fn()>
{
    unsafe {
        O_SWAP_GUARD
    }
}

//

/// Fills `cp` with a snapshot of the current execution state.
///
/// Restoring the snapshot later resumes execution as if this call had just
/// returned. Always succeeds; no side effects beyond the write into `cp`.
///
/// Forced inline so that the resume point lands in the caller's own frame,
/// which is the one still alive when the snapshot gets restored.
#[inline(always)]
pub unsafe fn capture(cp: &mut MCContext)
{
    arch::mc_context_capture(cp, arch::read_flags());
}

/// Overwrites the live machine state from `cp` and transfers control there.
///
/// `cp` must have been produced by [`capture`], [`swap`] or [`construct`];
/// anything else is undefined behaviour. Never returns to its caller.
#[inline(always)]
pub unsafe fn restore(cp: &MCContext) -> !
{
    arch::mc_context_restore(cp)
}

/// Captures the current state into `oucp`, then restores `cp`, as one
/// transfer.
///
/// Returns to its original caller only when some later operation restores
/// `oucp`. The installed [swap guard](set_swap_guard) runs immediately
/// before the capture; the flags word stored into `oucp` predates it.
///
/// Forced inline for the same reason as [`capture`].
#[inline(always)]
pub unsafe fn swap(oucp: &mut MCContext, cp: &MCContext)
{
    let flags = arch::read_flags();

    if let Some(guard) = swap_guard() {
        guard();
    }

    arch::mc_context_swap(oucp, cp, flags);
}

/// Mutates a context previously produced by [`capture`] into a fresh one
/// that, once restored or swapped to, runs `func(arg)` on `stack`.
///
/// When `func` returns, control transfers to `successor`, which therefore
/// must already be valid by the time the fresh context is first activated.
/// `stack` must stay usable as a call stack for the full lifetime of any
/// activation; the engine does not validate its size, and overflowing it is
/// undefined behaviour.
pub unsafe fn construct(
    cp: &mut MCContext,
    stack: *mut u8, stack_size: usize,
    successor: *const MCContext,
    func: MCEntryFn, arg: *mut ())
{
    arch::mc_context_make(cp, stack, stack_size, successor, func, arg);
}

/// Fixed first frame of every constructed context.
///
/// The backend's `mc_context_make` points the fresh context here, with the
/// three parameters planted in the argument-register slots.
pub(crate) extern "C" fn mc_context_bootstrap(
    successor: *const MCContext,
    func: MCEntryFn, arg: *mut ()) -> !
{
    func(arg);

    unsafe {
        restore(&*successor)
    }
}

//

#[cfg(test)]
mod tests
{
    use super::*;

    use core::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn capture_then_restore_resumes_after_the_capture()
    {
        let hits = AtomicUsize::new(0);
        let mut ctx = MCContext::new();

        unsafe {
            capture(&mut ctx);
        }

        // runs twice: once after the capture, once after the restore
        if hits.fetch_add(1, Ordering::SeqCst) == 0 {
            unsafe {
                restore(&ctx);
            }
        }

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn construct_runs_entry_then_activates_successor()
    {
        static HITS: AtomicUsize = AtomicUsize::new(0);

        extern "C" fn entry(arg: *mut ())
        {
            let n = arg as usize;
            HITS.fetch_add(n, Ordering::SeqCst);
        }

        let mut stack = [0u8; 32 * 1024];
        let mut main_ctx = MCContext::new();
        let mut ctx = MCContext::new();

        unsafe {
            capture(&mut ctx);
            construct(
                &mut ctx,
                stack.as_mut_ptr(), stack.len(),
                &main_ctx,
                entry, 3 as *mut ());

            // entry runs on its own stack, then the successor brings us back
            swap(&mut main_ctx, &ctx);
        }

        assert_eq!(HITS.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn swap_round_trips_between_two_contexts()
    {
        static TRACE: AtomicUsize = AtomicUsize::new(1);

        struct Channel
        {
            main_ctx: MCContext,
            side_ctx: MCContext
        }

        extern "C" fn entry(arg: *mut ())
        {
            let ch = unsafe { &mut *(arg as *mut Channel) };

            TRACE.fetch_add(10, Ordering::SeqCst);
            unsafe {
                swap(&mut ch.side_ctx, &ch.main_ctx);
            }

            TRACE.fetch_add(100, Ordering::SeqCst);
            // falling out of the entry activates the successor
        }

        let mut stack = [0u8; 32 * 1024];
        let mut ch = Channel {
            main_ctx: MCContext::new(),
            side_ctx: MCContext::new()
        };

        let ch_ptr = &mut ch as *mut Channel;

        unsafe {
            capture(&mut ch.side_ctx);
            construct(
                &mut ch.side_ctx,
                stack.as_mut_ptr(), stack.len(),
                &ch.main_ctx,
                entry, ch_ptr as *mut ());

            swap(&mut ch.main_ctx, &ch.side_ctx);
            assert_eq!(TRACE.load(Ordering::SeqCst), 11);

            swap(&mut ch.main_ctx, &ch.side_ctx);
            assert_eq!(TRACE.load(Ordering::SeqCst), 111);
        }
    }
}
