//! `edge-admission` — LIFO admission control for an HTTP edge router.
//!
//! Bounds how many requests run concurrently per route or per named group of
//! routes, parks the excess on a bounded last-in-first-out stack, and rejects
//! or times out requests once capacity is exhausted.
//!
//! | Piece | Type |
//! |-------|------|
//! | Bounded LIFO gate | [`gate::Gate`] |
//! | Gate ownership, reuse, replacement | [`registry::GateRegistry`] |
//! | Route-table post-processing | [`sync::RouteTableSynchronizer`] |
//! | Admission filters | [`filter::LifoFilter`], [`filter::LifoGroupFilter`] |
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use edge_admission::config::{AdmissionConfig, GateConfig};
//! use edge_admission::filter::{LifoFilter, LifoGroupFilter};
//! use edge_admission::registry::GateRegistry;
//! use edge_admission::route::Route;
//! use edge_admission::sync::{RoutePostProcessor, RouteTableSynchronizer};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AdmissionConfig::default()
//!     .with_group("search", GateConfig::new(20, 40, Duration::from_secs(2))?);
//! let registry = Arc::new(GateRegistry::from_config(&config));
//! let synchronizer = RouteTableSynchronizer::new(Arc::clone(&registry));
//!
//! let checkout = Arc::new(LifoFilter::new(GateConfig::new(
//!     10,
//!     50,
//!     Duration::from_secs(5),
//! )?));
//! let routes = synchronizer.process(vec![
//!     Route::new("checkout").with_filter(checkout.clone()),
//!     Route::new("search").with_filter(Arc::new(LifoGroupFilter::new("search"))),
//! ]);
//!
//! // Request time.
//! let mut admission = checkout.admit().await?;
//! // ... call the backend ...
//! admission.release();
//!
//! // Shutdown.
//! registry.close();
//! # drop(routes);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod gate;
pub mod registry;
pub mod route;
pub mod sync;

pub use config::{AdmissionConfig, GateConfig};
pub use error::{AdmissionError, AdmissionResult, ConfigError};
pub use gate::{Gate, GatePermit, GateStats};
pub use registry::{GateRegistry, GateResolution};
pub use route::{Admission, AdmissionScope, Route, RouteFilter};
pub use sync::{RoutePostProcessor, RouteTableSynchronizer, SyncReport};
