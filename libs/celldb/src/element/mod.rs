//! Immutable element records.
//!
//! Records are created through validating factories that return `Arc`s.
//! Derivations (`with_*`) take `self: &Arc<Self>` and return the same `Arc`
//! when the requested value equals the current one, so callers can detect
//! sharing with [`Arc::ptr_eq`].

mod arc;
mod export;
mod meta;
mod node;

pub use arc::{ArcEnd, ArcInst, End};
pub use export::{Export, PortCharacteristic};
pub use meta::CellMeta;
pub use node::{cell_center_id, NodeInst, PortInst};

use std::sync::Arc;

/// An immutable array of shared records.
pub type ImmutableArray<T> = Arc<[Arc<T>]>;

/// Returns `this` if `f` leaves the record unchanged, else a new `Arc`.
pub(crate) fn derive_with<T: Clone + PartialEq>(this: &Arc<T>, f: impl FnOnce(&mut T)) -> Arc<T> {
    let mut next = T::clone(this);
    f(&mut next);
    if next == **this {
        this.clone()
    } else {
        Arc::new(next)
    }
}

/// Returns `true` if both arrays hold the same records in the same order.
pub(crate) fn same_records<T>(a: &[Arc<T>], b: &[Arc<T>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Arc::ptr_eq(x, y))
}
