use std::cell::UnsafeCell;

/// Cell for state owned by the PulseAudio threaded mainloop.
///
/// libpulse objects are neither `Send` nor `Sync`, but the C library makes
/// them safe to use from any thread that holds the mainloop lock, and the
/// mainloop thread holds that lock while it dispatches callbacks. `LoopCell`
/// carries that contract: every [`LoopCell::get`] must happen either inside a
/// mainloop callback or while a [`crate::hw::pulse::LoopGuard`] is alive.
#[derive(Debug)]
pub struct LoopCell<T> {
    data: UnsafeCell<T>,
}

impl<T> LoopCell<T> {
    pub fn new(data: T) -> Self {
        LoopCell {
            data: UnsafeCell::new(data),
        }
    }

    /// # Safety
    /// The caller holds the mainloop lock and no other reference obtained
    /// from this cell is alive.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get(&self) -> &mut T {
        unsafe { &mut *self.data.get() }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

unsafe impl<T> Send for LoopCell<T> {}
unsafe impl<T> Sync for LoopCell<T> {}
