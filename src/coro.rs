use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr;
use core::ptr::NonNull;

use crate::bkptpanic::BKUnwrap;
use crate::context;
use crate::context::MCContext;
use crate::memory::MCStackBlk;

/// Coroutine state code
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MCState
{
    /// Initialised, or parked at a yield; a resume may run it.
    Suspended = 0,
    /// Between a resume and the matching yield/finish.
    Running = 1,
    /// The entry function has returned. Terminal.
    Dead = 2,
    /// Not a real state: the query found an uninitialised handle or a
    /// corrupt status byte.
    Illegal = 3
}

/// Coroutine operation error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MCError
{
    /// `init` was given a zero-sized stack block.
    ZeroSizedStack,
    /// `resume` on a coroutine that isn't `Suspended`.
    NotSuspended,
    /// `suspend` outside of a `Running` coroutine.
    NotRunning
}

impl core::fmt::Display for MCError
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result
    {
        match self {
            MCError::ZeroSizedStack => write!(f, "zero-sized stack block"),
            MCError::NotSuspended => write!(f, "coroutine is not suspended"),
            MCError::NotRunning => write!(f, "coroutine is not running")
        }
    }
}

/// Coroutine entry function type.
/// * Receives the yield handle and the data value of the first resume.
/// * The returned value is handed to the resume that observes the death.
pub type MCCoroFn<T> = fn(&mut MCYielder<T>, T) -> T;

// a status byte outside the enumerated states, so that a handle which was
// never initialised reports Illegal instead of something actionable
const STATUS_VIRGIN: u8 = u8::MAX;

/// Asymmetric coroutine
///
/// Owns the resumer's and its own execution context, a status byte and the
/// exchange slot through which exactly one `T` crosses at every
/// resume/suspend boundary, in each direction.
///
/// A coroutine borrows its stack block for `'a` and never owns it. It also
/// stores its own address into the constructed context, so it must stay
/// where it is from `init` until it is `Dead`; moving it in between leaves
/// the contexts pointing at the old location.
pub struct MCCoro<'a, T>
{
    status: u8,
    ret: MCContext,
    exec: MCContext,
    data: MaybeUninit<T>,
    func: Option<MCCoroFn<T>>,
    phantom: PhantomData<&'a mut [u8]>
}

impl<'a, T> MCCoro<'a, T>
{
    /// Reserves a stack memory block for a coroutine.
    /// * Any type `B` specifies a size of the block. Typically use `[u8; N]` for `N` bytes.
    /// * Returns the reserved block.
    pub const fn stack<B>() -> MCStackBlk<B>
    {
        MCStackBlk::new()
    }

    /// Creates an inert coroutine handle.
    /// * `state` reports `Illegal` until `init` succeeds.
    pub const fn new() -> MCCoro<'a, T>
    {
        MCCoro {
            status: STATUS_VIRGIN,
            ret: MCContext::new(),
            exec: MCContext::new(),
            data: MaybeUninit::uninit(),
            func: None,
            phantom: PhantomData
        }
    }

    /// Initialises the coroutine.
    /// * `stack` - stack memory block, borrowed for the life of the coroutine.
    /// * `func` - entry function.
    /// * On success the coroutine is `Suspended` and ready for a first resume.
    /// * Returns `MCError::ZeroSizedStack` and changes nothing if `stack` is empty.
    pub fn init<B>(&mut self, stack: &'a mut MCStackBlk<B>, func: MCCoroFn<T>) -> Result<(), MCError>
    {
        let stack_size = stack.size();
        if stack_size == 0 {
            return Err(MCError::ZeroSizedStack);
        }
        let stack_head = stack.head();

        self.func = Some(func);

        let this: *mut Self = self;

        unsafe {
            // the capture seeds the register file with sane live values;
            // construct then rewrites resume address, stack pointer and the
            // trampoline argument slots
            context::capture(&mut (*this).exec);
            context::construct(
                &mut (*this).exec,
                stack_head, stack_size,
                &(*this).ret,
                mc_coro_trampoline::<T>,
                this as *mut ());
        }

        self.status = MCState::Suspended as u8;

        Ok(())
    }

    /// Resumes the coroutine until its next yield or its death.
    /// * `data` - sent to the coroutine; overwritten with the value it
    ///   yields or returns before this call comes back.
    /// * Returns `MCError::NotSuspended` and changes nothing unless the
    ///   coroutine is `Suspended`.
    pub fn resume(&mut self, data: &mut T) -> Result<(), MCError>
    {
        if self.status != MCState::Suspended as u8 {
            return Err(MCError::NotSuspended);
        }

        self.status = MCState::Running as u8;

        let this: *mut Self = self;

        unsafe {
            ptr::swap(data, (*this).data.as_mut_ptr());

            context::swap(&mut (*this).ret, &(*this).exec);

            // back from a yield or from the trampoline epilogue
            ptr::swap((*this).data.as_mut_ptr(), data);
        }

        Ok(())
    }

    /// Queries the coroutine state.
    /// * Pure query; a status byte outside the enumerated values maps to
    ///   `Illegal` instead of being undefined behaviour, so memory
    ///   corruption surfaces without a crash.
    pub fn state(&self) -> MCState
    {
        match self.status {
            s if s == MCState::Suspended as u8 => MCState::Suspended,
            s if s == MCState::Running as u8 => MCState::Running,
            s if s == MCState::Dead as u8 => MCState::Dead,
            _ => MCState::Illegal
        }
    }
}

/// Yield handle of a running coroutine
///
/// Handed to the entry function by the trampoline; there is no other way to
/// obtain one, so a yield can only be attempted from coroutine context.
pub struct MCYielder<T>
{
    coro: NonNull<()>,
    phantom: PhantomData<*mut T>
}

impl<T> MCYielder<T>
{
    /// Suspends the coroutine and hands control back to the pending resume.
    /// * `data` - yielded to the resumer; overwritten with the next resume's
    ///   value when this call comes back.
    /// * Returns `MCError::NotRunning` and changes nothing unless the
    ///   coroutine is `Running` (e.g. a yield handle smuggled out of a dead
    ///   coroutine).
    pub fn suspend(&mut self, data: &mut T) -> Result<(), MCError>
    {
        let this = self.coro.as_ptr() as *mut MCCoro<T>;

        unsafe {
            if (*this).status != MCState::Running as u8 {
                return Err(MCError::NotRunning);
            }

            (*this).status = MCState::Suspended as u8;

            ptr::swap(data, (*this).data.as_mut_ptr());

            context::swap(&mut (*this).exec, &(*this).ret);

            // back from the next resume
            ptr::swap((*this).data.as_mut_ptr(), data);
        }

        Ok(())
    }
}

/// Fixed coroutine entry point, invoked exactly once per coroutine by the
/// context constructed in `init`.
///
/// Takes the first resume's value out of the exchange slot, runs the entry
/// function, parks its return value in the slot and marks the coroutine
/// `Dead`. Returning from here lands in the engine bootstrap, which restores
/// the resumer's context - the only path to `Dead`, and it never comes back.
extern "C" fn mc_coro_trampoline<T>(arg: *mut ())
{
    let this = arg as *mut MCCoro<T>;

    unsafe {
        let func = (*this).func.bk_unwrap();
        let input = (*this).data.as_ptr().read();

        let mut yielder = MCYielder {
            coro: NonNull::new_unchecked(arg),
            phantom: PhantomData
        };

        let output = func(&mut yielder, input);

        (*this).data.as_mut_ptr().write(output);
        (*this).status = MCState::Dead as u8;
    }
}

//

#[cfg(test)]
mod tests
{
    use super::*;

    const STACK_LEN: usize = 64 * 1024;

    #[test]
    fn fresh_handle_is_illegal_until_init()
    {
        let mut stack = MCCoro::<usize>::stack::<[u8; STACK_LEN]>();
        let mut coro = MCCoro::<usize>::new();

        assert_eq!(coro.state(), MCState::Illegal);

        fn nop(_co: &mut MCYielder<usize>, x: usize) -> usize { x }
        coro.init(&mut stack, nop).unwrap();

        assert_eq!(coro.state(), MCState::Suspended);
    }

    #[test]
    fn zero_sized_stack_is_rejected()
    {
        let mut stack = MCCoro::<usize>::stack::<[u8; 0]>();
        let mut coro = MCCoro::<usize>::new();

        fn nop(_co: &mut MCYielder<usize>, x: usize) -> usize { x }

        assert_eq!(coro.init(&mut stack, nop), Err(MCError::ZeroSizedStack));
        assert_eq!(coro.state(), MCState::Illegal);
    }

    #[test]
    fn corrupt_status_byte_reads_as_illegal()
    {
        let mut stack = MCCoro::<usize>::stack::<[u8; STACK_LEN]>();
        let mut coro = MCCoro::<usize>::new();

        fn nop(_co: &mut MCYielder<usize>, x: usize) -> usize { x }
        coro.init(&mut stack, nop).unwrap();

        coro.status = 9;

        assert_eq!(coro.state(), MCState::Illegal);

        let mut d = 0;
        assert_eq!(coro.resume(&mut d), Err(MCError::NotSuspended));
        assert_eq!(coro.status, 9);
    }

    #[test]
    fn double_yields_then_returns()
    {
        fn double(co: &mut MCYielder<usize>, x: usize) -> usize
        {
            let mut d = x * 2;
            co.suspend(&mut d).unwrap();

            x * 3
        }

        let mut stack = MCCoro::<usize>::stack::<[u8; STACK_LEN]>();
        let mut coro = MCCoro::<usize>::new();

        coro.init(&mut stack, double).unwrap();

        let mut data = 21;
        coro.resume(&mut data).unwrap();
        assert_eq!(data, 42);
        assert_eq!(coro.state(), MCState::Suspended);

        coro.resume(&mut data).unwrap();
        assert_eq!(data, 63);
        assert_eq!(coro.state(), MCState::Dead);

        assert_eq!(coro.resume(&mut data), Err(MCError::NotSuspended));
        assert_eq!(coro.state(), MCState::Dead);
    }

    #[test]
    fn values_flow_both_ways_across_every_boundary()
    {
        // resume(X) delivers X; yield(Y) delivers Y back; resume(Z)
        // reappears as the yield's output
        fn echo(co: &mut MCYielder<usize>, x: usize) -> usize
        {
            assert_eq!(x, 1000);

            let mut d = x + 1;
            co.suspend(&mut d).unwrap();
            // d now holds the second resume's value
            assert_eq!(d, 2000);

            let mut d2 = d + 1;
            co.suspend(&mut d2).unwrap();
            assert_eq!(d2, 3000);

            d2 + 1
        }

        let mut stack = MCCoro::<usize>::stack::<[u8; STACK_LEN]>();
        let mut coro = MCCoro::<usize>::new();

        coro.init(&mut stack, echo).unwrap();

        let mut data = 1000;
        coro.resume(&mut data).unwrap();
        assert_eq!(data, 1001);

        data = 2000;
        coro.resume(&mut data).unwrap();
        assert_eq!(data, 2001);

        data = 3000;
        coro.resume(&mut data).unwrap();
        assert_eq!(data, 3001);
        assert_eq!(coro.state(), MCState::Dead);
    }

    #[test]
    fn resume_of_a_running_coroutine_fails_without_state_change()
    {
        // the coroutine receives its own handle and tries to resume itself
        fn reenter(co: &mut MCYielder<usize>, p: usize) -> usize
        {
            let this = unsafe { &mut *(p as *mut MCCoro<usize>) };

            let mut scratch = 0;
            let ok = this.state() == MCState::Running
                && this.resume(&mut scratch) == Err(MCError::NotSuspended)
                && this.state() == MCState::Running;

            let mut d = ok as usize;
            co.suspend(&mut d).unwrap();

            0
        }

        let mut stack = MCCoro::<usize>::stack::<[u8; STACK_LEN]>();
        let mut coro = MCCoro::<usize>::new();

        coro.init(&mut stack, reenter).unwrap();

        let mut data = &mut coro as *mut MCCoro<usize> as usize;
        coro.resume(&mut data).unwrap();

        assert_eq!(data, 1);
        assert_eq!(coro.state(), MCState::Suspended);
    }

    #[test]
    fn suspend_outside_a_running_coroutine_fails_without_state_change()
    {
        fn nop(_co: &mut MCYielder<usize>, x: usize) -> usize { x }

        let mut stack = MCCoro::<usize>::stack::<[u8; STACK_LEN]>();
        let mut coro = MCCoro::<usize>::new();

        coro.init(&mut stack, nop).unwrap();

        // a yield handle fabricated outside of coroutine context
        let mut yielder = MCYielder::<usize> {
            coro: NonNull::from(&mut coro).cast(),
            phantom: PhantomData
        };

        let mut d = 0;
        assert_eq!(yielder.suspend(&mut d), Err(MCError::NotRunning));
        assert_eq!(coro.state(), MCState::Suspended);

        coro.resume(&mut d).unwrap();
        assert_eq!(coro.state(), MCState::Dead);

        assert_eq!(yielder.suspend(&mut d), Err(MCError::NotRunning));
        assert_eq!(coro.state(), MCState::Dead);
    }

    #[test]
    fn nested_coroutines_keep_isolated_state()
    {
        fn inner_fn(co: &mut MCYielder<usize>, x: usize) -> usize
        {
            let mut d = x * 10;
            co.suspend(&mut d).unwrap();

            d + 3
        }

        fn outer_fn(co: &mut MCYielder<usize>, p: usize) -> usize
        {
            let inner = unsafe { &mut *(p as *mut MCCoro<usize>) };

            let marker = 40;

            let mut d = 4;
            inner.resume(&mut d).unwrap();
            assert_eq!(d, marker);

            let mut out = d + 1;
            co.suspend(&mut out).unwrap();

            // the local survived the suspension untouched
            let mut d2 = out + marker;
            inner.resume(&mut d2).unwrap();

            d2
        }

        let mut inner_stack = MCCoro::<usize>::stack::<[u8; STACK_LEN]>();
        let mut inner = MCCoro::<usize>::new();
        inner.init(&mut inner_stack, inner_fn).unwrap();

        let mut outer_stack = MCCoro::<usize>::stack::<[u8; STACK_LEN]>();
        let mut outer = MCCoro::<usize>::new();
        outer.init(&mut outer_stack, outer_fn).unwrap();

        let mut data = &mut inner as *mut MCCoro<usize> as usize;
        outer.resume(&mut data).unwrap();

        assert_eq!(data, 41);
        assert_eq!(outer.state(), MCState::Suspended);
        assert_eq!(inner.state(), MCState::Suspended);

        data = 9;
        outer.resume(&mut data).unwrap();

        // inner got 9 + 40 and returned 52; outer passed it through
        assert_eq!(data, 52);
        assert_eq!(outer.state(), MCState::Dead);
        assert_eq!(inner.state(), MCState::Dead);
    }

    #[test]
    fn control_alternates_strictly()
    {
        fn walker(co: &mut MCYielder<usize>, p: usize) -> usize
        {
            let trace = unsafe { &mut *(p as *mut Vec<usize>) };
            let id = trace.len();

            trace.push(id);
            let mut d = p;
            co.suspend(&mut d).unwrap();

            let trace = unsafe { &mut *(d as *mut Vec<usize>) };
            trace.push(id + 100);

            0
        }

        let mut stack_a = MCCoro::<usize>::stack::<[u8; STACK_LEN]>();
        let mut coro_a = MCCoro::<usize>::new();
        coro_a.init(&mut stack_a, walker).unwrap();

        let mut stack_b = MCCoro::<usize>::stack::<[u8; STACK_LEN]>();
        let mut coro_b = MCCoro::<usize>::new();
        coro_b.init(&mut stack_b, walker).unwrap();

        let mut trace: Vec<usize> = Vec::new();
        let p = &mut trace as *mut Vec<usize> as usize;

        let mut d = p;
        coro_a.resume(&mut d).unwrap();

        trace.push(1);

        let mut d = p;
        coro_b.resume(&mut d).unwrap();

        trace.push(3);

        let mut d = p;
        coro_a.resume(&mut d).unwrap();

        let mut d = p;
        coro_b.resume(&mut d).unwrap();

        // each body ran exactly in the windows its resumer opened
        assert_eq!(trace, [0, 1, 2, 3, 100, 102]);
    }

    #[test]
    fn swap_guard_runs_once_per_transfer()
    {
        use std::cell::Cell;

        // thread-local so that concurrently running tests, whose swaps also
        // invoke the installed guard, cannot disturb the count; a coroutine
        // shares its resumer's OS thread
        std::thread_local! {
            static GUARD_HITS: Cell<usize> = Cell::new(0);
        }

        fn counting_guard()
        {
            GUARD_HITS.with(|hits| hits.set(hits.get() + 1));
        }

        fn one_yield(co: &mut MCYielder<usize>, x: usize) -> usize
        {
            let mut d = x;
            co.suspend(&mut d).unwrap();

            d
        }

        let mut stack = MCCoro::<usize>::stack::<[u8; STACK_LEN]>();
        let mut coro = MCCoro::<usize>::new();

        coro.init(&mut stack, one_yield).unwrap();

        context::set_swap_guard(Some(counting_guard));

        let mut data = 1;
        coro.resume(&mut data).unwrap();

        // two transfers so far: the resume's swap and the yield's swap
        assert_eq!(GUARD_HITS.with(|hits| hits.get()), 2);

        coro.resume(&mut data).unwrap();

        context::set_swap_guard(None);

        assert_eq!(coro.state(), MCState::Dead);

        // the second resume adds one swap; the finish path restores the
        // resumer's context without capturing, so no guard runs there
        assert_eq!(GUARD_HITS.with(|hits| hits.get()), 3);
    }

    #[test]
    fn owned_values_cross_the_boundary_intact()
    {
        fn tag(co: &mut MCYielder<String>, s: String) -> String
        {
            let mut d = format!("{}-yield", s);
            co.suspend(&mut d).unwrap();

            format!("{}-ret", d)
        }

        let mut stack = MCCoro::<String>::stack::<[u8; STACK_LEN]>();
        let mut coro = MCCoro::<String>::new();

        coro.init(&mut stack, tag).unwrap();

        let mut data = String::from("a");
        coro.resume(&mut data).unwrap();
        assert_eq!(data, "a-yield");

        data = String::from("b");
        coro.resume(&mut data).unwrap();
        assert_eq!(data, "b-ret");
        assert_eq!(coro.state(), MCState::Dead);
    }
}
