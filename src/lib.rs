/*!
This crate for Rust provides a minimal stackful coroutine library `minicoro` for microcontrollers.

# Target

**Single-core**, OS-less systems of

* AVR  (`avr-unknown-gnu-atmegaXXX`; needs a nightly toolchain, as any AVR Rust does)
* Armv7-M / Armv7E-M / Armv8-M Mainline  (`thumbv7m-none-eabi`, `thumbv7em-none-eabi`, `thumbv8m.main-none-eabi`)

In addition, x86-64 and AArch64 hosts are supported so that the test suite and the
demos run on an ordinary development machine.

# Features

* `ucontext`-style execution context switching
  * `capture`, `restore`, `swap` and `construct` work on a plain value type `MCContext`.
  * Deliberately unchecked and free of bookkeeping: a switch costs a handful of
    register moves, nothing else.
* Asymmetric coroutines
  * `MCCoro` runs a function on its own caller-supplied stack.
  * `resume` and `suspend` hand exactly one data value across in each direction.
  * A finished coroutine turns `Dead`; a corrupt or uninitialised handle reports
    `Illegal` instead of crashing.
* Static memory allocation
  * `minicoro` doesn't require a global allocator; a coroutine stack is a `MCStackBlk`
    reserved by the caller in advance.
* Interrupt awareness
  * A customizable guard (`set_swap_guard`) runs right before every context capture,
    so a target can mask interrupts for the duration of the register transfer.

# Examples
## Usage Outline

```
use minicoro::*;

fn double(co: &mut MCYielder<usize>, x: usize) -> usize {
    let mut d = x * 2;
    co.suspend(&mut d).unwrap(); // yields x * 2, gets the next resume value back in d

    x * 3
}

fn main() {
    let mut stack = MCCoro::<usize>::stack::<[u8; 16384]>();
    let mut coro = MCCoro::<usize>::new();

    coro.init(&mut stack, double).unwrap();
    assert_eq!(coro.state(), MCState::Suspended);

    let mut data = 21;
    coro.resume(&mut data).unwrap();
    assert_eq!(data, 42);

    coro.resume(&mut data).unwrap();
    assert_eq!(data, 63);
    assert_eq!(coro.state(), MCState::Dead);

    assert_eq!(coro.resume(&mut data), Err(MCError::NotSuspended));
}
```

## Other Examples

You can find a runnable generator demo in `demos/fibonacci.rs`.
*/

#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_arch = "avr", feature(asm_experimental_arch))]

mod arch;
mod bkptpanic;
mod memory;

pub mod context;

mod coro;

pub use crate::context::{set_swap_guard, MCContext, MCEntryFn};
pub use crate::coro::{MCCoro, MCCoroFn, MCError, MCState, MCYielder};
pub use crate::memory::MCStackBlk;

#[cfg(any(target_arch = "avr", all(target_arch = "arm", target_os = "none")))]
pub use crate::arch::irq_lock;
