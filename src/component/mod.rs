//! Managed components.
//!
//! ## Contents
//! - [`Component`], [`ComponentRef`] the contract between supervisor and component
//! - [`ComponentConfig`], [`ComponentStatus`] registration data and lifecycle state
//! - [`ComponentState`], [`HealthThresholds`] ready-made bookkeeping for implementors
//! - [`PerformanceMetrics`], [`ComponentMetadata`] self-reported snapshots
//! - [`ComponentContext`] explicit dependencies passed to factories

mod config;
mod context;
mod contract;
mod handler;
mod metrics;
mod state;

pub use config::{CRITICAL_PRIORITY, ComponentConfig, ComponentStatus};
pub use context::ComponentContext;
pub use contract::{Component, ComponentMetadata, ComponentRef};
pub(crate) use handler::ComponentHandler;
pub use metrics::PerformanceMetrics;
pub use state::{ComponentState, HealthThresholds};
