//! `ServiceCell<T>`: a write-once, read-many slot for a `&'static` service
//! table, registered during boot by the crate that has visibility into the
//! concrete implementation.
//!
//! Same shape as [`crate::klog`]'s backend dispatch: an `AtomicPtr` rather
//! than a lock, because services are read from IRQ context where taking a
//! lock would be unsound.

use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

pub struct ServiceCell<T: 'static> {
    ptr: AtomicPtr<T>,
    _marker: PhantomData<T>,
}

impl<T: 'static> ServiceCell<T> {
    pub const fn new() -> Self {
        Self {
            ptr: AtomicPtr::new(ptr::null_mut()),
            _marker: PhantomData,
        }
    }

    /// Register the service implementation. Intended to be called exactly
    /// once, early in boot; later calls simply replace the pointer.
    pub fn register(&self, svc: &'static T) {
        self.ptr.store(svc as *const T as *mut T, Ordering::Release);
    }

    pub fn is_registered(&self) -> bool {
        !self.ptr.load(Ordering::Acquire).is_null()
    }

    /// # Panics
    /// Panics if no implementation has been registered yet.
    pub fn get(&self) -> &'static T {
        let p = self.ptr.load(Ordering::Acquire);
        assert!(!p.is_null(), "service accessed before registration");
        unsafe { &*p }
    }
}

// SAFETY: the pointee is `&'static T`, shared across CPUs by construction.
unsafe impl<T: 'static> Sync for ServiceCell<T> {}
