use core::mem::{size_of, MaybeUninit};

/// Stack memory block backing one coroutine
///
/// Any type `B` specifies the size of the block; typically `[u8; N]` for `N`
/// bytes. The block is reserved by the caller and only ever *borrowed* by a
/// coroutine, so it must stay alive for as long as the coroutine can run.
/// Reclaiming it while the coroutine is `Suspended` (rather than `Dead`)
/// frees memory a later resume would execute on.
pub struct MCStackBlk<B>(MaybeUninit<B>);

impl<B> MCStackBlk<B>
{
    pub(crate) const fn new() -> MCStackBlk<B>
    {
        MCStackBlk(MaybeUninit::<B>::uninit())
    }

    pub(crate) fn size(&self) -> usize
    {
        size_of::<B>()
    }

    pub(crate) fn head(&mut self) -> *mut u8
    {
        self.0.as_mut_ptr() as *mut u8
    }
}
