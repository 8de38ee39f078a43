// Corruption handling: loud in debug, halted in release.
// Release builds on a bare target stop in the backend's halt (a breakpoint
// loop on Arm) instead of dragging in panic formatting machinery.

macro_rules! bk_panic {
    ($($arg:tt)*) => ({
        if cfg!(debug_assertions) {
            panic!($($arg)*);
        }
        else {
            crate::arch::halt()
        }
    });
}

pub(crate) trait BKUnwrap<T>
{
    fn bk_unwrap(self) -> T;
}

impl<T> BKUnwrap<T> for Option<T>
{
    fn bk_unwrap(self) -> T
    {
        match self {
            Some(v) => v,
            None => bk_panic!("Unwrapping on `None`")
        }
    }
}
