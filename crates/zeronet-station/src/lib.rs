//! ZeroNet Station Runtime
//!
//! The process side of a ZeroNet node: lifecycle, center membership and the
//! stations hosted locally.
//!
//! # Components
//!
//! - [`ZeroApplication`]: lifecycle state machine, center join, station
//!   registry and shutdown ordering
//! - [`StateHolder`]: the application and center state axes, with change
//!   observers
//! - [`monitor::EventMonitor`]: watches the center's broadcast channel and
//!   switches [`monitor::MonitorStateMachine`] variants with the application
//!   state
//! - [`station::SubStation`]: broadcast-receiving station loop with per
//!   message fault isolation
//! - [`ConfigRegistry`]: cached station descriptors with fetch-on-miss
//! - [`CenterClient`]: management operations against the center

pub mod application;
pub mod center;
pub mod config;
pub mod error;
pub mod global;
pub mod monitor;
pub mod registry;
pub mod state;
pub mod station;

pub use application::{ZeroApplication, ZeroNetEvent};
pub use center::{CenterClient, ZeroCenterClient};
pub use config::{MonitorConfig, ZeroAppConfig};
pub use error::{Result, StationError};
pub use global::{GlobalRef, GlobalRefs};
pub use registry::ConfigRegistry;
pub use state::{ApplicationState, CenterState, StateHolder, StateObserver, WorkModel};
