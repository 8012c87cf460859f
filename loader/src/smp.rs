//! Synchronization between the primary core and the secondary cores.
//!
//! All cores start executing the loader at the same time. The secondary cores wait in
//! [`ReleaseGate::wait()`] until the primary core has loaded the kernel and set up the boot
//! address space, and publishes the kernel's placement with [`ReleaseGate::publish()`].
//!
//! Both types only use plain atomic loads and stores (no read-modify-write operations), since
//! they are used while the MMU and caches are still off.

use core::fmt::{Display, Formatter};
use core::mem::MaybeUninit;
use core::sync::atomic::AtomicBool;

use crate::sync::{AtomicU8, Ordering, UnsafeCell};

const EMPTY: u8 = 0;
const RELEASED: u8 = 1;

/// Returned when a [`ReleaseGate`] is published a second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyReleased;

impl Display for AlreadyReleased {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "already released")
    }
}

/// A value written once by a single core and then read by any number of waiting cores.
///
/// The payload is written before the gate is opened with a release store, and waiting cores
/// observe the open gate with an acquire load. Therefore everything the publishing core wrote
/// before calling [`ReleaseGate::publish()`] (including the payload) is visible to a core once
/// [`ReleaseGate::wait()`] returns.
pub struct ReleaseGate<T> {
    state: AtomicU8,
    payload: UnsafeCell<MaybeUninit<T>>,
}

// SAFETY: The payload is written exactly once before `state` becomes `RELEASED` and only read
// after that, so shared references to it never alias a write.
unsafe impl<T: Send + Sync> Sync for ReleaseGate<T> {}

impl<T> ReleaseGate<T> {
    #[cfg(not(all(test, loom)))]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            payload: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    #[cfg(all(test, loom))]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            payload: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Store `value` and open the gate, returning a reference to the stored value.
    ///
    /// ### Safety
    ///
    /// Only one core may ever publish a given gate. Calling this concurrently from two cores is a
    /// data race on the payload. Sequential calls are fine; all but the first fail.
    pub unsafe fn publish(&self, value: T) -> Result<&T, AlreadyReleased> {
        if self.state.load(Ordering::Relaxed) == RELEASED {
            return Err(AlreadyReleased);
        }
        self.payload.with_mut(|payload| unsafe {
            // SAFETY: Single publisher and nobody reads the payload before the release store.
            (*payload).write(value);
        });
        self.state.store(RELEASED, Ordering::Release);
        Ok(self.payload.with(|payload| unsafe {
            // SAFETY: Initialized right above and never written again.
            (*payload).assume_init_ref()
        }))
    }

    pub fn is_released(&self) -> bool {
        self.state.load(Ordering::Acquire) == RELEASED
    }

    /// The published value, if the gate is open.
    pub fn get(&self) -> Option<&T> {
        if self.is_released() {
            Some(self.payload.with(|payload| unsafe {
                // SAFETY: The acquire load synchronizes with the release store in `publish()`,
                // which happened after the payload had been written.
                (*payload).assume_init_ref()
            }))
        } else {
            None
        }
    }

    /// Spin until the gate is opened, calling `idle` between two polls. There is no timeout: if
    /// the gate is never opened, this never returns.
    pub fn wait(&self, mut idle: impl FnMut()) -> &T {
        loop {
            if let Some(value) = self.get() {
                return value;
            }
            idle();
        }
    }
}

impl<T> Drop for ReleaseGate<T> {
    fn drop(&mut self) {
        if self.state.load(Ordering::Relaxed) == RELEASED {
            self.payload.with_mut(|payload| unsafe {
                // SAFETY: Released implies initialized, and `&mut self` excludes readers.
                (*payload).assume_init_drop();
            });
        }
    }
}

/// Keeps track of which of the `N` cores have reached the point where they wait to be released.
pub struct CoreRegistry<const N: usize> {
    up: [AtomicBool; N],
}

impl<const N: usize> CoreRegistry<N> {
    pub const fn new() -> Self {
        Self {
            up: [const { AtomicBool::new(false) }; N],
        }
    }

    /// Record that core `id` is up. Returns `false` if `id` is out of range.
    pub fn mark_up(&self, id: usize) -> bool {
        match self.up.get(id) {
            Some(up) => {
                up.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn is_core_up(&self, id: usize) -> bool {
        self.up
            .get(id)
            .is_some_and(|up| up.load(Ordering::Acquire))
    }

    pub fn count_up(&self) -> usize {
        self.up
            .iter()
            .filter(|up| up.load(Ordering::Acquire))
            .count()
    }
}
