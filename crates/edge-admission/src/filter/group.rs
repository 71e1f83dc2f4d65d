//! Group LIFO admission filter.

use super::BoundGate;
use crate::error::AdmissionResult;
use crate::gate::Gate;
use crate::route::{Admission, AdmissionScope, RouteFilter, admit_through};
use std::sync::Arc;

/// `lifoGroup` filter: every route naming the same group shares one gate,
/// whose limits come from the startup configuration.
pub struct LifoGroupFilter {
    group: String,
    bound: BoundGate,
}

impl LifoGroupFilter {
    pub const NAME: &'static str = "lifoGroup";

    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            bound: BoundGate::default(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn gate(&self) -> Option<Arc<Gate>> {
        self.bound.get()
    }

    /// Wait for a slot on the group's gate; unprotected while unbound.
    pub async fn admit(&self) -> AdmissionResult<Admission> {
        admit_through(self.bound.get(), Self::NAME).await
    }
}

impl RouteFilter for LifoGroupFilter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn admission_scope(&self) -> Option<AdmissionScope<'_>> {
        Some(AdmissionScope::Group(&self.group))
    }

    fn bind_gate(&self, gate: Arc<Gate>) {
        self.bound.set(gate);
    }
}
