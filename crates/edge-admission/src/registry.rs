//! Gate registry: owns every live [`Gate`] and decides when to reuse,
//! create, or replace one.
//!
//! | Scope  | Key        | Created              | Replaced                 |
//! |--------|------------|----------------------|--------------------------|
//! | global | -          | at construction      | never                    |
//! | group  | group name | on first reference   | never                    |
//! | route  | route id   | on first reference   | when the config changes  |
//!
//! A route gate is dropped from the registry once its route leaves the
//! route table.
//!
//! Route and group gates live in separate maps so a route id can never
//! shadow a group name.

use crate::config::{AdmissionConfig, GateConfig};
use crate::gate::Gate;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// What a route-gate lookup did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateResolution {
    /// An existing gate with an equal config was returned.
    Reused,
    /// No gate existed for the key; a new one was created.
    Created,
    /// The existing gate had a different config; it was closed and replaced.
    Replaced,
}

/// Explicitly owned registry of admission gates.
///
/// Shared as `Arc<GateRegistry>` between the route-table synchronizer and
/// shutdown code. Request handling never consults it after binding.
pub struct GateRegistry {
    global: Option<Arc<Gate>>,
    group_configs: HashMap<String, GateConfig>,
    groups: Mutex<HashMap<String, Arc<Gate>>>,
    routes: Mutex<HashMap<String, Arc<Gate>>>,
    closed: AtomicBool,
}

impl GateRegistry {
    /// Create the registry, building the global gate eagerly.
    ///
    /// Group gates are created lazily on first reference.
    pub fn new(global: Option<GateConfig>, groups: HashMap<String, GateConfig>) -> Self {
        Self {
            global: global.map(|config| Arc::new(Gate::new(config))),
            group_configs: groups,
            groups: Mutex::new(HashMap::new()),
            routes: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self::new(config.global, config.groups.clone())
    }

    /// The process-wide fallback gate, if one was configured.
    pub fn global_gate(&self) -> Option<Arc<Gate>> {
        self.global.clone()
    }

    /// Gate for `route_id`, reused when its config equals `config`.
    pub fn route_gate(&self, route_id: &str, config: GateConfig) -> Arc<Gate> {
        self.resolve_route_gate(route_id, config).0
    }

    pub(crate) fn resolve_route_gate(
        &self,
        route_id: &str,
        config: GateConfig,
    ) -> (Arc<Gate>, GateResolution) {
        let mut routes = self.routes.lock();

        let resolution = match routes.get(route_id) {
            Some(existing) if *existing.config() == config => {
                return (Arc::clone(existing), GateResolution::Reused);
            }
            Some(existing) => {
                info!(
                    route_id,
                    old = ?existing.config(),
                    new = ?config,
                    "route admission config changed, replacing gate"
                );
                existing.close();
                GateResolution::Replaced
            }
            None => GateResolution::Created,
        };

        let gate = self.new_gate(config);
        routes.insert(route_id.to_string(), Arc::clone(&gate));
        debug!(route_id, config = ?config, "route admission gate created");
        (gate, resolution)
    }

    /// Forget route gates whose id is not in `live`, returning the evicted
    /// ids in sorted order.
    ///
    /// Evicted gates are not closed: requests admitted or queued through them
    /// finish normally and the gate is freed with its last reference.
    pub(crate) fn evict_route_gates(&self, live: &HashSet<String>) -> Vec<String> {
        let mut routes = self.routes.lock();
        let mut evicted: Vec<String> = routes
            .keys()
            .filter(|id| !live.contains(*id))
            .cloned()
            .collect();
        for route_id in &evicted {
            routes.remove(route_id);
        }
        evicted.sort();
        evicted
    }

    /// Shared gate for `group`, created on first use from the startup config.
    ///
    /// A group missing from the startup config gets [`GateConfig::default()`].
    /// Once created a group gate is never reconfigured.
    pub fn group_gate(&self, group: &str) -> Arc<Gate> {
        let mut groups = self.groups.lock();
        if let Some(existing) = groups.get(group) {
            return Arc::clone(existing);
        }

        let config = match self.group_configs.get(group) {
            Some(config) => *config,
            None => {
                let config = GateConfig::default();
                warn!(
                    group,
                    config = ?config,
                    "no admission config for group, using defaults"
                );
                config
            }
        };

        let gate = self.new_gate(config);
        groups.insert(group.to_string(), Arc::clone(&gate));
        debug!(group, config = ?config, "group admission gate created");
        gate
    }

    /// Close every route, group and global gate.
    ///
    /// Meant for shutdown. Calling it again is harmless. Gates created after
    /// this point start out closed.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("gate registry already closed");
            return;
        }

        let routes = self.routes.lock();
        let groups = self.groups.lock();
        for gate in routes.values().chain(groups.values()) {
            gate.close();
        }
        if let Some(global) = &self.global {
            global.close();
        }
        info!(
            routes = routes.len(),
            groups = groups.len(),
            global = self.global.is_some(),
            "gate registry closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn route_gate_count(&self) -> usize {
        self.routes.lock().len()
    }

    pub fn group_gate_count(&self) -> usize {
        self.groups.lock().len()
    }

    fn new_gate(&self, config: GateConfig) -> Arc<Gate> {
        let gate = Arc::new(Gate::new(config));
        if self.is_closed() {
            gate.close();
        }
        gate
    }
}

impl Drop for GateRegistry {
    fn drop(&mut self) {
        if !self.is_closed() {
            self.close();
        }
    }
}
