/*
Register-transfer backends.

Each backend module provides, for exactly one `target_arch`:

* `MCContext` - the fixed-size machine context value (flags word, register file,
  resume address, stack pointer),
* `Flags` and `read_flags()` - the status/flags word snapshot type,
* `mc_context_capture(cp, flags)` - fill `cp` so that restoring it resumes
  right after the capture call,
* `mc_context_restore(cp) -> !` - reload the machine state from `cp`,
* `mc_context_swap(oucp, cp, flags)` - capture into `oucp`, then restore `cp`,
  as one transfer,
* `mc_context_make(..)` - turn a captured context into a fresh one that enters
  `mc_context_bootstrap` on its own stack,
* `halt()` - the backend's way of stopping on unrecoverable corruption.

The `flags` argument is snapshotted by the caller *before* the swap guard runs,
so the stored context reopens interrupts on resume even when the guard masked
them for the transfer.

The construction convention is the same everywhere: the successor context,
the entry function and its argument go into the backend's first three
argument-register slots, and the resume address points at the fixed
`mc_context_bootstrap` routine. Clients of the coroutine layer never see this.
*/

#[cfg(target_arch = "avr")]
mod avr;
#[cfg(target_arch = "avr")]
pub(crate) use avr::*;
#[cfg(target_arch = "avr")]
pub use avr::{irq_lock, MCContext};

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod armv7m;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub(crate) use armv7m::*;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use armv7m::{irq_lock, MCContext};

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
pub(crate) use x86_64::*;
#[cfg(target_arch = "x86_64")]
pub use x86_64::MCContext;

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
pub(crate) use aarch64::*;
#[cfg(target_arch = "aarch64")]
pub use aarch64::MCContext;

#[cfg(not(any(
    target_arch = "avr",
    all(target_arch = "arm", target_os = "none"),
    target_arch = "x86_64",
    target_arch = "aarch64"
)))]
compile_error!("minicoro has no register-transfer backend for this target");
