//! Reference-counted object handles
//!
//! Objects are shared through [`GcRef`], a cloneable handle compared by
//! identity. [`WeakRef`] observes an object without keeping it alive; the
//! membrane's identity maps are built on it.

use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::{Arc, Weak};

/// Handle to a heap object.
///
/// Equality and hashing are by identity, never by contents.
pub struct GcRef<T>(Arc<T>);

impl<T> GcRef<T> {
    /// Allocate a new object and return a handle to it
    pub fn new(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Check whether two handles refer to the same object
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Raw address of the object, stable for as long as any handle exists
    pub fn as_ptr(&self) -> *const T {
        Arc::as_ptr(&self.0)
    }

    /// Address as an integer, for identity-keyed tables
    pub fn addr(&self) -> usize {
        self.as_ptr() as usize
    }

    /// Create a weak handle to the same object
    pub fn downgrade(&self) -> WeakRef<T> {
        WeakRef(Arc::downgrade(&self.0))
    }

    /// Number of strong handles currently alive
    pub fn strong_count(this: &Self) -> usize {
        Arc::strong_count(&this.0)
    }
}

impl<T> Clone for GcRef<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for GcRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> PartialEq for GcRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl<T> Eq for GcRef<T> {}

impl<T> Hash for GcRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for GcRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Weak handle to a heap object
pub struct WeakRef<T>(Weak<T>);

impl<T> WeakRef<T> {
    /// Recover a strong handle if the object is still alive
    pub fn upgrade(&self) -> Option<GcRef<T>> {
        self.0.upgrade().map(GcRef)
    }

    /// Whether the object has been dropped
    pub fn is_dead(&self) -> bool {
        self.0.strong_count() == 0
    }

    /// Address of the (possibly dead) object
    pub fn addr(&self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl<T> Clone for WeakRef<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}
