//! Route-table synchronizer.
//!
//! Runs as a post-processing step every time the router publishes a new
//! route table and binds each admission filter to its gate:
//!
//! ```text
//! route table ──► for each route
//!                   for each filter with an admission scope
//!                     Route(cfg)  ──► registry.route_gate(route.id, cfg) ─┐
//!                     Group(name) ──► registry.group_gate(name) ──────────┤
//!                                                                          ▼
//!                                                          filter.bind_gate(gate)
//!                   no admission filter ──► error log + global fallback gate
//! route gates of routes no longer in the table ──► evicted from the registry
//! ```
//!
//! Re-running the pass on an unchanged table creates no gates, so requests
//! admitted through the previous binding are not disturbed.

use crate::registry::{GateRegistry, GateResolution};
use crate::route::{AdmissionScope, Route};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Post-processing hook invoked with every freshly built route table.
pub trait RoutePostProcessor: Send + Sync {
    fn process(&self, routes: Vec<Route>) -> Vec<Route>;
}

/// What one synchronization pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub routes: usize,
    pub created: usize,
    pub reused: usize,
    pub replaced: usize,
    /// Group filters bound to their group's gate.
    pub group_bindings: usize,
    /// Routes with no admission filter.
    pub unprotected: Vec<String>,
    /// Route gates evicted because their route left the table.
    pub stale: Vec<String>,
}

/// Binds route-table filters to gates from a shared [`GateRegistry`].
pub struct RouteTableSynchronizer {
    registry: Arc<GateRegistry>,
    /// Serializes passes so concurrent rebuilds cannot interleave.
    pass: Mutex<()>,
}

impl RouteTableSynchronizer {
    pub fn new(registry: Arc<GateRegistry>) -> Self {
        Self {
            registry,
            pass: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<GateRegistry> {
        &self.registry
    }

    /// Bind every admission filter in `routes` and report what changed.
    pub fn sync(&self, routes: &mut [Route]) -> SyncReport {
        let _pass = self.pass.lock();
        let mut report = SyncReport {
            routes: routes.len(),
            ..SyncReport::default()
        };
        let mut live = HashSet::new();

        for route in routes.iter_mut() {
            let mut protected = false;

            for filter in &route.filters {
                let Some(scope) = filter.admission_scope() else {
                    continue;
                };
                let gate = match scope {
                    AdmissionScope::Route(config) => {
                        live.insert(route.id.clone());
                        let (gate, resolution) =
                            self.registry.resolve_route_gate(&route.id, config);
                        match resolution {
                            GateResolution::Created => report.created += 1,
                            GateResolution::Reused => report.reused += 1,
                            GateResolution::Replaced => report.replaced += 1,
                        }
                        gate
                    }
                    AdmissionScope::Group(name) => {
                        report.group_bindings += 1;
                        self.registry.group_gate(name)
                    }
                };
                filter.bind_gate(gate);
                protected = true;
            }

            if protected {
                route.set_fallback_gate(None);
            } else {
                error!(
                    route_id = %route.id,
                    global_fallback = self.registry.global_gate().is_some(),
                    "route has no admission filter"
                );
                route.set_fallback_gate(self.registry.global_gate());
                report.unprotected.push(route.id.clone());
            }
        }

        report.stale = self.registry.evict_route_gates(&live);
        if !report.stale.is_empty() {
            warn!(stale = ?report.stale, "evicted route gates no longer in the route table");
        }
        report
    }
}

impl RoutePostProcessor for RouteTableSynchronizer {
    fn process(&self, mut routes: Vec<Route>) -> Vec<Route> {
        let report = self.sync(&mut routes);
        info!(
            routes = report.routes,
            created = report.created,
            reused = report.reused,
            replaced = report.replaced,
            group_bindings = report.group_bindings,
            unprotected = report.unprotected.len(),
            stale = report.stale.len(),
            "route table admission sync complete"
        );
        routes
    }
}
