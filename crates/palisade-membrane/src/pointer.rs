//! Pointer protocol
//!
//! Objects never cross the boundary as references. A side that wants to
//! hand an object to the other side mints a [`Pointer`]: an opaque
//! capability which, when invoked, stages its object into the minting side's
//! single-slot [`TargetRegister`]. Only the minting side can read the slot
//! back, so the receiver of a pointer learns nothing except that invoking it
//! later names the same object.
//!
//! Self pointers (to a side's own targets) hold their object strongly: the
//! foreign proxy that carries the pointer is what keeps the target alive.
//! Proxy pointers (to a side's proxies, cached by the other side) start out
//! pinned so the proxy survives until the other side first receives it, and
//! then hold it weakly.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use palisade_realm::{GcRef, JsObject, WeakRef};

static NEXT_REGISTER_ID: AtomicU64 = AtomicU64::new(1);

/// Single-slot register owned by one side of a connection
pub struct TargetRegister {
    id: u64,
    slot: Mutex<Option<GcRef<JsObject>>>,
}

impl TargetRegister {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_REGISTER_ID.fetch_add(1, Ordering::Relaxed),
            slot: Mutex::new(None),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    fn select(&self, target: GcRef<JsObject>) {
        *self.slot.lock() = Some(target);
    }

    /// Read and clear the slot
    pub fn take_selected(&self) -> Option<GcRef<JsObject>> {
        self.slot.lock().take()
    }
}

impl std::fmt::Debug for TargetRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TargetRegister({})", self.id)
    }
}

enum Referent {
    Strong(GcRef<JsObject>),
    Pinned(GcRef<JsObject>),
    Weak(WeakRef<JsObject>),
}

struct PointerCell {
    register: Arc<TargetRegister>,
    referent: Mutex<Referent>,
}

/// Opaque, cloneable handle naming one object of the side that minted it
#[derive(Clone)]
pub struct Pointer(Arc<PointerCell>);

impl Pointer {
    fn mint(register: &Arc<TargetRegister>, referent: Referent) -> Self {
        Self(Arc::new(PointerCell {
            register: register.clone(),
            referent: Mutex::new(referent),
        }))
    }

    /// Pointer to one of the minting side's own targets
    pub(crate) fn strong(register: &Arc<TargetRegister>, target: GcRef<JsObject>) -> Self {
        Self::mint(register, Referent::Strong(target))
    }

    /// Pointer to a freshly created proxy; weak after its first invocation
    pub(crate) fn pinned(register: &Arc<TargetRegister>, proxy: GcRef<JsObject>) -> Self {
        Self::mint(register, Referent::Pinned(proxy))
    }

    /// Stage the referent into the minting side's register.
    ///
    /// Returns `false` if the referent has been reclaimed.
    pub fn invoke(&self) -> bool {
        let mut referent = self.0.referent.lock();
        let target = match &*referent {
            Referent::Strong(target) => Some(target.clone()),
            Referent::Pinned(proxy) => {
                let proxy = proxy.clone();
                *referent = Referent::Weak(proxy.downgrade());
                Some(proxy)
            }
            Referent::Weak(weak) => weak.upgrade(),
        };
        drop(referent);
        match target {
            Some(target) => {
                self.0.register.select(target);
                true
            }
            None => false,
        }
    }

    /// Whether invoking this pointer would still stage an object
    pub fn is_live(&self) -> bool {
        match &*self.0.referent.lock() {
            Referent::Strong(_) | Referent::Pinned(_) => true,
            Referent::Weak(weak) => !weak.is_dead(),
        }
    }

    /// Whether `register` is the register this pointer stages into
    pub fn minted_by(&self, register: &TargetRegister) -> bool {
        self.0.register.id == register.id
    }

    /// Whether both handles are the same pointer
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl std::fmt::Debug for Pointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Pointer(<opaque>)")
    }
}
