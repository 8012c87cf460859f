//! Synchronization primitives of [`crate::smp::ReleaseGate`]. Built with `--cfg loom`, the tests
//! swap them for the model checked versions of the `loom` crate.

#[cfg(not(all(test, loom)))]
pub(crate) use core::sync::atomic::{AtomicU8, Ordering};
#[cfg(all(test, loom))]
pub(crate) use loom::sync::atomic::{AtomicU8, Ordering};

#[cfg(all(test, loom))]
pub(crate) use loom::cell::UnsafeCell;

/// `core::cell::UnsafeCell` with the closure based access of `loom::cell::UnsafeCell`.
#[cfg(not(all(test, loom)))]
pub(crate) struct UnsafeCell<T>(core::cell::UnsafeCell<T>);

#[cfg(not(all(test, loom)))]
impl<T> UnsafeCell<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self(core::cell::UnsafeCell::new(value))
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(*const T) -> R) -> R {
        f(self.0.get())
    }

    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(*mut T) -> R) -> R {
        f(self.0.get())
    }
}
