//! Admission filters.
//!
//! - [`LifoFilter`] (`lifo`) carries its own limits and gets a gate private to
//!   its route.
//! - [`LifoGroupFilter`] (`lifoGroup`) names a group and shares that group's
//!   gate with every other route naming it.
//!
//! Both are bound by the [`RouteTableSynchronizer`](crate::sync::RouteTableSynchronizer)
//! and call [`admit`](LifoFilter::admit) at request time.

mod group;
mod lifo;

pub use group::LifoGroupFilter;
pub use lifo::LifoFilter;

use crate::gate::Gate;
use parking_lot::RwLock;
use std::sync::Arc;

/// The gate currently bound to a filter instance.
///
/// Rebinding swaps the reference; requests already holding a permit from the
/// previous gate keep it.
#[derive(Default)]
struct BoundGate {
    gate: RwLock<Option<Arc<Gate>>>,
}

impl BoundGate {
    fn get(&self) -> Option<Arc<Gate>> {
        self.gate.read().clone()
    }

    fn set(&self, gate: Arc<Gate>) {
        *self.gate.write() = Some(gate);
    }
}
