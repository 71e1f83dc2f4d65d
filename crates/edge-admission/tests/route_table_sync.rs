//! Route-table rebuilds against a live registry.

use edge_admission::filter::{LifoFilter, LifoGroupFilter};
use edge_admission::{
    Admission, AdmissionError, GateConfig, GateRegistry, Route, RoutePostProcessor,
    RouteTableSynchronizer,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn cfg(max_concurrency: usize, max_stack_size: usize) -> GateConfig {
    GateConfig::new(max_concurrency, max_stack_size, Duration::from_secs(10)).unwrap()
}

fn setup() -> (Arc<GateRegistry>, RouteTableSynchronizer) {
    let mut groups = HashMap::new();
    groups.insert("search".to_string(), cfg(2, 0));
    let registry = Arc::new(GateRegistry::new(Some(cfg(100, 100)), groups));
    let synchronizer = RouteTableSynchronizer::new(Arc::clone(&registry));
    (registry, synchronizer)
}

fn lifo_route(id: &str, config: GateConfig) -> (Route, Arc<LifoFilter>) {
    let filter = Arc::new(LifoFilter::new(config));
    (Route::new(id).with_filter(filter.clone()), filter)
}

#[tokio::test]
async fn unchanged_rebuild_keeps_gate_and_in_flight_requests() {
    let (registry, sync) = setup();

    let (route, first) = lifo_route("api", cfg(1, 1));
    sync.process(vec![route]);
    let mut in_flight = first.admit().await.unwrap();
    assert!(in_flight.is_admitted());

    // The router rebuilds the table, constructing fresh filter instances.
    let (mut route, second) = lifo_route("api", cfg(1, 1));
    let report = sync.sync(std::slice::from_mut(&mut route));
    assert_eq!(report.created, 0);
    assert_eq!(report.reused, 1);
    assert_eq!(registry.route_gate_count(), 1);

    let old_gate = first.gate().unwrap();
    let new_gate = second.gate().unwrap();
    assert!(Arc::ptr_eq(&old_gate, &new_gate));
    assert!(!new_gate.is_closed());
    assert_eq!(new_gate.stats().active, 1);

    in_flight.release();
    assert_eq!(new_gate.stats().active, 0);
}

#[tokio::test(start_paused = true)]
async fn changed_config_replaces_gate_and_fails_its_waiters() {
    let (registry, sync) = setup();

    let (route, first) = lifo_route("api", cfg(1, 1));
    sync.process(vec![route]);
    let mut in_flight = first.admit().await.unwrap();

    let waiter_filter = Arc::clone(&first);
    let waiter = tokio::spawn(async move { waiter_filter.admit().await.map(|_| ()) });
    let old_gate = first.gate().unwrap();
    while old_gate.stats().waiting == 0 {
        tokio::task::yield_now().await;
    }

    let (mut route, second) = lifo_route("api", cfg(2, 1));
    let report = sync.sync(std::slice::from_mut(&mut route));
    assert_eq!(report.replaced, 1);
    assert_eq!(registry.route_gate_count(), 1);

    assert_eq!(waiter.await.unwrap().unwrap_err(), AdmissionError::Closed);
    assert!(old_gate.is_closed());

    // The request admitted before the swap finishes normally.
    in_flight.release();
    assert_eq!(old_gate.stats().active, 0);

    let new_gate = second.gate().unwrap();
    assert!(!Arc::ptr_eq(&old_gate, &new_gate));
    let _a = second.admit().await.unwrap();
    let _b = second.admit().await.unwrap();
    assert_eq!(new_gate.stats().active, 2);
}

#[tokio::test]
async fn routes_in_the_same_group_share_one_gate() {
    let (registry, sync) = setup();
    let search = Arc::new(LifoGroupFilter::new("search"));
    let suggest = Arc::new(LifoGroupFilter::new("search"));

    sync.process(vec![
        Route::new("search").with_filter(search.clone()),
        Route::new("suggest").with_filter(suggest.clone()),
    ]);

    assert!(Arc::ptr_eq(&search.gate().unwrap(), &suggest.gate().unwrap()));
    assert_eq!(registry.group_gate_count(), 1);

    // The group limit of 2 spans both routes.
    let _a = search.admit().await.unwrap();
    let _b = suggest.admit().await.unwrap();
    assert_eq!(search.admit().await.unwrap_err(), AdmissionError::QueueFull);
    assert_eq!(suggest.admit().await.unwrap_err(), AdmissionError::QueueFull);
}

#[tokio::test]
async fn unprotected_route_falls_back_to_global_gate() {
    let (registry, sync) = setup();
    let routes = sync.process(vec![Route::new("legacy")]);

    let global = registry.global_gate().unwrap();
    assert!(Arc::ptr_eq(routes[0].fallback_gate().unwrap(), &global));

    let admission = routes[0].admit().await.unwrap();
    assert!(matches!(admission, Admission::Admitted(_)));
    assert_eq!(global.stats().active, 1);
}

#[tokio::test]
async fn registry_close_rejects_everything() {
    let (registry, sync) = setup();
    let (route, lifo) = lifo_route("api", cfg(4, 4));
    let group = Arc::new(LifoGroupFilter::new("search"));
    let routes = sync.process(vec![
        route,
        Route::new("search").with_filter(group.clone()),
        Route::new("legacy"),
    ]);

    registry.close();
    registry.close();

    assert_eq!(lifo.admit().await.unwrap_err(), AdmissionError::Closed);
    assert_eq!(group.admit().await.unwrap_err(), AdmissionError::Closed);
    assert_eq!(routes[2].admit().await.unwrap_err(), AdmissionError::Closed);
}

#[test]
fn concurrent_passes_create_one_gate_per_route() {
    let (registry, sync) = setup();

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..50 {
                    let (route, _) = lifo_route("api", cfg(3, 3));
                    let group = Arc::new(LifoGroupFilter::new("search"));
                    sync.process(vec![route, Route::new("search").with_filter(group)]);
                }
            });
        }
    });

    assert_eq!(registry.route_gate_count(), 1);
    assert_eq!(registry.group_gate_count(), 1);
    assert!(!registry.route_gate("api", cfg(3, 3)).is_closed());
}

#[tokio::test]
async fn renamed_routes_do_not_accumulate_gates() {
    let (registry, sync) = setup();

    let (route, first) = lifo_route("v0", cfg(1, 1));
    sync.process(vec![route]);
    let mut in_flight = first.admit().await.unwrap();

    for version in 1..20 {
        let (mut route, _) = lifo_route(&format!("v{version}"), cfg(1, 1));
        let report = sync.sync(std::slice::from_mut(&mut route));
        assert_eq!(report.created, 1);
        assert_eq!(report.stale, vec![format!("v{}", version - 1)]);
    }
    assert_eq!(registry.route_gate_count(), 1);

    // The request admitted on the first version is unaffected by eviction.
    let old_gate = first.gate().unwrap();
    assert!(!old_gate.is_closed());
    in_flight.release();
    assert_eq!(old_gate.stats().active, 0);
}
