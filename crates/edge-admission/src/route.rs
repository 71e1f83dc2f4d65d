//! Route-table boundary types.
//!
//! The router owns route matching and the filter chain; this crate only needs
//! to know, per route, which filters ask for an admission gate. A filter
//! says so through [`RouteFilter::admission_scope`] and receives its gate
//! through [`RouteFilter::bind_gate`].

use crate::config::GateConfig;
use crate::error::AdmissionResult;
use crate::gate::{Gate, GatePermit};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Which gate a filter wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionScope<'a> {
    /// A gate private to the route, with the filter's own limits.
    Route(GateConfig),
    /// The shared gate of a named group.
    Group(&'a str),
}

/// A filter instance in a route's filter chain.
///
/// Filters unrelated to admission keep the defaults.
pub trait RouteFilter: Send + Sync {
    fn name(&self) -> &str;

    /// `Some` when this filter needs an admission gate bound to it.
    fn admission_scope(&self) -> Option<AdmissionScope<'_>> {
        None
    }

    /// Receive the gate resolved for [`admission_scope`](Self::admission_scope).
    fn bind_gate(&self, _gate: Arc<Gate>) {}
}

/// Outcome of a successful admission check.
#[derive(Debug)]
pub enum Admission {
    /// A slot is held until the permit is released or dropped.
    Admitted(GatePermit),
    /// No gate is bound; the request runs without admission control.
    Unprotected,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted(_))
    }

    /// Release the held slot, if any.
    pub fn release(&mut self) {
        if let Admission::Admitted(permit) = self {
            permit.release();
        }
    }
}

/// Acquire from the filter's bound gate, or report the request as
/// unprotected.
pub(crate) async fn admit_through(
    gate: Option<Arc<Gate>>,
    filter: &str,
) -> AdmissionResult<Admission> {
    match gate {
        Some(gate) => gate.acquire().await.map(Admission::Admitted),
        None => {
            warn!(filter, "no admission gate bound, serving unprotected");
            Ok(Admission::Unprotected)
        }
    }
}

/// One entry of the route table.
#[derive(Clone)]
pub struct Route {
    pub id: String,
    pub filters: Vec<Arc<dyn RouteFilter>>,
    /// Global gate bound by the synchronizer when no filter asks for one.
    fallback_gate: Option<Arc<Gate>>,
}

impl Route {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filters: Vec::new(),
            fallback_gate: None,
        }
    }

    /// Builder: append a filter to the chain.
    pub fn with_filter(mut self, filter: Arc<dyn RouteFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// True when some filter in the chain asks for an admission gate.
    pub fn has_admission_filter(&self) -> bool {
        self.filters.iter().any(|f| f.admission_scope().is_some())
    }

    pub fn fallback_gate(&self) -> Option<&Arc<Gate>> {
        self.fallback_gate.as_ref()
    }

    pub(crate) fn set_fallback_gate(&mut self, gate: Option<Arc<Gate>>) {
        self.fallback_gate = gate;
    }

    /// Admission for a route without its own admission filter: goes through
    /// the fallback gate when one is bound.
    pub async fn admit(&self) -> AdmissionResult<Admission> {
        match &self.fallback_gate {
            Some(gate) => gate.acquire().await.map(Admission::Admitted),
            None => {
                warn!(route_id = %self.id, "route has no admission gate, serving unprotected");
                Ok(Admission::Unprotected)
            }
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.filters.iter().map(|f| f.name()).collect();
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("filters", &names)
            .field("fallback_gate", &self.fallback_gate.is_some())
            .finish()
    }
}
