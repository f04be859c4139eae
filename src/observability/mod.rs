//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Listener / setup produce:
//!     → tracing events (routed through the engine by engine::layer)
//!     → metrics.rs (reconfiguration counters)
//!     → crash.rs (panics → registered crash reporter)
//! ```
//!
//! # Design Decisions
//! - Metrics are cheap (atomic increments) and no-ops without a recorder
//! - Crash reporting is a pluggable sink, never a hard dependency

pub mod crash;
pub mod metrics;
