//! Per-route LIFO admission filter.

use super::BoundGate;
use crate::config::GateConfig;
use crate::error::AdmissionResult;
use crate::gate::Gate;
use crate::route::{Admission, AdmissionScope, RouteFilter, admit_through};
use std::sync::Arc;

/// `lifo` filter: admission limits declared on the route itself.
///
/// Rebuilding the route table with the same limits keeps the gate; changing
/// them replaces it.
pub struct LifoFilter {
    config: GateConfig,
    bound: BoundGate,
}

impl LifoFilter {
    pub const NAME: &'static str = "lifo";

    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            bound: BoundGate::default(),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn gate(&self) -> Option<Arc<Gate>> {
        self.bound.get()
    }

    /// Wait for a slot on the bound gate.
    ///
    /// An unbound filter is a control-plane misconfiguration; the request is
    /// served as [`Admission::Unprotected`] rather than failed.
    pub async fn admit(&self) -> AdmissionResult<Admission> {
        admit_through(self.bound.get(), Self::NAME).await
    }
}

impl RouteFilter for LifoFilter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn admission_scope(&self) -> Option<AdmissionScope<'_>> {
        Some(AdmissionScope::Route(self.config))
    }

    fn bind_gate(&self, gate: Arc<Gate>) {
        self.bound.set(gate);
    }
}
