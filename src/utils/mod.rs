//! # Utility Modules
//!
//! Supporting utilities for event delivery, logging and observability.
//!
//! ## Components
//! - **Event Bus**: bounded, drop-newest fan-out used for the socket event stream
//! - **Logging**: structured logging setup
//! - **Metrics**: per-instance atomic counters

pub mod event_bus;
pub mod logging;
pub mod metrics;

pub use event_bus::{EventBus, EventStream};
pub use metrics::{Metrics, MetricsSnapshot};
